//! Bookable desks and hourly time slots.
//!
//! Both lists are generated once at startup and stay fixed for the life of the
//! process. Availability is rolled per desk/slot unless the caller asks for a
//! fully open registry.

use crate::pricing::{DeskType, MembershipTier};
use crate::slot_time::SlotTime;
use crate::Booking;
use chrono::NaiveDate;
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const INDIVIDUAL_DESKS: u32 = 10;
pub const TEAM_DESKS: u32 = 5;
pub const FIRST_SLOT_HOUR: u8 = 8;
pub const LAST_SLOT_HOUR: u8 = 20;

const DESK_AVAILABLE_P: f64 = 0.7;
const SLOT_AVAILABLE_P: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Desk {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub desk_type: DeskType,
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub id: String,
    pub time: SlotTime,
    pub is_available: bool,
}

fn build_desks(mut available: impl FnMut() -> bool) -> Vec<Desk> {
    let individual = (1..=INDIVIDUAL_DESKS).map(|n| (n, format!("Desk {n}"), DeskType::Individual));
    let team = (1..=TEAM_DESKS).map(|n| (INDIVIDUAL_DESKS + n, format!("Team {n}"), DeskType::Team));

    individual
        .chain(team)
        .map(|(id, name, desk_type)| Desk {
            id,
            name,
            desk_type,
            is_available: available(),
        })
        .collect()
}

fn build_time_slots(mut available: impl FnMut() -> bool) -> Vec<TimeSlot> {
    (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR)
        .filter_map(|hour| SlotTime::new(hour).ok())
        .map(|time| TimeSlot {
            id: format!("time-{}", time.hour()),
            time,
            is_available: available(),
        })
        .collect()
}

/// Ten individual desks followed by five team desks, some randomly closed.
pub fn generate_desks<R: Rng>(rng: &mut R) -> Vec<Desk> {
    build_desks(|| rng.gen_bool(DESK_AVAILABLE_P))
}

pub fn generate_time_slots<R: Rng>(rng: &mut R) -> Vec<TimeSlot> {
    build_time_slots(|| rng.gen_bool(SLOT_AVAILABLE_P))
}

pub fn open_desks() -> Vec<Desk> {
    build_desks(|| true)
}

pub fn open_time_slots() -> Vec<TimeSlot> {
    build_time_slots(|| true)
}

/// Demo reservations shown to a fresh install.
pub fn seed_bookings() -> Vec<Booking> {
    let demo = |id: &str, desk_id, date: (i32, u32, u32), hours: (u8, u8), tier, price| {
        let start_time = SlotTime::new(hours.0).ok()?;
        let end_time = SlotTime::new(hours.1).ok()?;
        Some(Booking {
            id: id.to_string(),
            user_id: "demo-user".to_string(),
            desk_id,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2)?,
            start_time,
            end_time,
            duration: start_time.hours_until(end_time),
            membership_tier: tier,
            total_price: price,
        })
    };

    [
        demo("1", 1, (2025, 1, 15), (9, 12), MembershipTier::Basic, 30.0),
        demo("2", 5, (2025, 1, 16), (13, 18), MembershipTier::Premium, 67.5),
        demo("3", 11, (2025, 1, 17), (10, 14), MembershipTier::Executive, 90.0),
    ]
    .into_iter()
    .flatten()
    .collect()
}
