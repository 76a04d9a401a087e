use crate::authenticate::User;
use crate::config::Config;
use crate::dashboard::RevenueReport;
use crate::json_db::JsonDb;
use crate::pricing::{calculate_price, MembershipTier};
use crate::registry::{self, Desk, TimeSlot};
use crate::slot_time::SlotTime;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub desk_id: u32,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub duration: i64,
    pub membership_tier: MembershipTier,
    pub total_price: f64,
}

impl Booking {
    pub fn ends_at(&self) -> NaiveDateTime {
        let end = NaiveTime::from_hms_opt(u32::from(self.end_time.hour()), 0, 0)
            .unwrap_or_default();
        self.date.and_time(end)
    }

    /// Past bookings are read-only.
    pub fn is_past(&self, now: NaiveDateTime) -> bool {
        self.ends_at() <= now
    }

    fn overlaps(&self, desk_id: u32, date: NaiveDate, start: SlotTime, end: SlotTime) -> bool {
        self.desk_id == desk_id && self.date == date && start < self.end_time && end > self.start_time
    }
}

/// What a user has picked so far on the way to a booking.
///
/// `membership_tier` follows the user's account tier until a tier is picked
/// explicitly for this selection.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub date: NaiveDate,
    pub membership_tier: MembershipTier,
    pub desk_id: Option<u32>,
    pub start_time: Option<SlotTime>,
    pub end_time: Option<SlotTime>,
    #[serde(skip)]
    #[schemars(skip)]
    tier_override: Option<MembershipTier>,
}

impl Selection {
    fn new(date: NaiveDate, membership_tier: MembershipTier) -> Self {
        Self {
            date,
            membership_tier,
            desk_id: None,
            start_time: None,
            end_time: None,
            tier_override: None,
        }
    }

    fn for_user(mut self, user: &User) -> Self {
        self.membership_tier = self.tier_override.unwrap_or(user.membership_tier);
        self
    }

    fn clear_desk_and_times(&mut self) {
        self.desk_id = None;
        self.start_time = None;
        self.end_time = None;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookingError {
    NoDeskSelected,
    NoStartTime,
    NoEndTime,
    InvalidDuration { start: SlotTime, end: SlotTime },
    DeskNotFound(u32),
    DeskUnavailable(u32),
    SlotNotFound(SlotTime),
    SlotUnavailable(SlotTime),
    DateInPast(NaiveDate),
    EndsInPast { date: NaiveDate, end: SlotTime },
    Overlap { desk_id: u32, date: NaiveDate },
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDeskSelected => write!(f, "No desk selected"),
            Self::NoStartTime => write!(f, "No start time selected"),
            Self::NoEndTime => write!(f, "No end time selected"),
            Self::InvalidDuration { start, end } => {
                write!(f, "End time {} must be after start time {}", end, start)
            }
            Self::DeskNotFound(id) => write!(f, "Desk {} does not exist", id),
            Self::DeskUnavailable(id) => write!(f, "Desk {} is not available", id),
            Self::SlotNotFound(time) => write!(f, "No time slot at {}", time),
            Self::SlotUnavailable(time) => write!(f, "Time slot {} is not available", time),
            Self::DateInPast(date) => write!(f, "Date {} is in the past", date),
            Self::EndsInPast { date, end } => {
                write!(f, "Booking ending {} {} is already over", date, end)
            }
            Self::Overlap { desk_id, date } => write!(
                f,
                "Desk {} is already booked at that time on {}",
                desk_id, date
            ),
        }
    }
}

impl std::error::Error for BookingError {}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserBooking {
    #[serde(flatten)]
    pub booking: Booking,
    pub past: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct BookingDay {
    pub date: NaiveDate,
    pub bookings: Vec<UserBooking>,
}

pub struct BookingApp {
    desks: Vec<Desk>,
    time_slots: Vec<TimeSlot>,
    bookings: JsonDb<Vec<Booking>>,
    selections: HashMap<String, Selection>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl BookingApp {
    pub fn new(desks: Vec<Desk>, time_slots: Vec<TimeSlot>, bookings: JsonDb<Vec<Booking>>) -> Self {
        Self {
            desks,
            time_slots,
            bookings,
            selections: HashMap::new(),
        }
    }

    /// Build the registry and open the booking store. Must run inside a tokio runtime
    /// when a bookings file is configured.
    pub fn from_config(config: &Config) -> Self {
        let (desks, time_slots) = if config.all_available {
            (registry::open_desks(), registry::open_time_slots())
        } else {
            let mut rng = rand::thread_rng();
            (
                registry::generate_desks(&mut rng),
                registry::generate_time_slots(&mut rng),
            )
        };
        info!(
            "Registry: {} desks, {} time slots",
            desks.len(),
            time_slots.len()
        );

        let bookings = match &config.bookings_file {
            Some(path) => JsonDb::open(path),
            None => JsonDb::in_memory(Vec::new()),
        };

        if config.seed_bookings && bookings.read(|b| b.is_empty()) {
            info!("Seeding demo bookings");
            bookings.update(|b| b.extend(registry::seed_bookings()));
        }

        Self::new(desks, time_slots, bookings)
    }

    pub fn desks(&self) -> &[Desk] {
        &self.desks
    }

    pub fn time_slots(&self) -> &[TimeSlot] {
        &self.time_slots
    }

    pub fn desk(&self, id: u32) -> Option<&Desk> {
        self.desks.iter().find(|desk| desk.id == id)
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.bookings.read(|b| b.clone())
    }

    pub fn booking(&self, id: &str) -> Option<Booking> {
        self.bookings
            .read(|b| b.iter().find(|booking| booking.id == id).cloned())
    }

    pub async fn flush(&self) -> anyhow::Result<()> {
        self.bookings.flush().await
    }

    /// True iff no stored booking on this desk and date intersects `[start, end)`.
    pub fn is_desk_available(
        &self,
        desk_id: u32,
        date: NaiveDate,
        start: SlotTime,
        end: SlotTime,
    ) -> bool {
        self.bookings.read(|bookings| {
            !bookings
                .iter()
                .any(|booking| booking.overlaps(desk_id, date, start, end))
        })
    }

    fn check_slot(&self, time: SlotTime) -> Result<(), BookingError> {
        let slot = self
            .time_slots
            .iter()
            .find(|slot| slot.time == time)
            .ok_or(BookingError::SlotNotFound(time))?;
        if !slot.is_available {
            return Err(BookingError::SlotUnavailable(time));
        }
        Ok(())
    }

    pub fn selection(&self, user: &User) -> Selection {
        self.selections
            .get(&user.id)
            .cloned()
            .unwrap_or_else(|| Selection::new(today(), user.membership_tier))
            .for_user(user)
    }

    /// Run `edit` on a copy of the user's selection and keep the result only
    /// when every step succeeds.
    pub fn edit_selection<F>(&mut self, user: &User, edit: F) -> Result<(), BookingError>
    where
        F: FnOnce(&mut SelectionEditor<'_>) -> Result<(), BookingError>,
    {
        let mut editor = SelectionEditor {
            app: &*self,
            selection: self.selection(user),
        };
        edit(&mut editor)?;
        let selection = editor.selection;
        self.selections.insert(user.id.clone(), selection);
        Ok(())
    }

    pub fn set_date(&mut self, user: &User, date: NaiveDate) -> Result<(), BookingError> {
        self.edit_selection(user, |s| s.set_date(date))
    }

    pub fn set_membership_tier(&mut self, user: &User, tier: MembershipTier) {
        let mut selection = self.selection(user);
        selection.membership_tier = tier;
        selection.tier_override = Some(tier);
        self.selections.insert(user.id.clone(), selection);
    }

    pub fn select_desk(&mut self, user: &User, desk_id: Option<u32>) -> Result<(), BookingError> {
        self.edit_selection(user, |s| s.select_desk(desk_id))
    }

    pub fn set_start_time(&mut self, user: &User, time: SlotTime) -> Result<(), BookingError> {
        self.edit_selection(user, |s| s.set_start_time(time))
    }

    pub fn set_end_time(&mut self, user: &User, time: SlotTime) -> Result<(), BookingError> {
        self.edit_selection(user, |s| s.set_end_time(time))
    }

    /// Price of the current selection, 0 until it is complete and positive.
    pub fn quote(&self, user: &User) -> f64 {
        let selection = self.selection(user);
        let (Some(desk_id), Some(start), Some(end)) =
            (selection.desk_id, selection.start_time, selection.end_time)
        else {
            return 0.0;
        };
        let Some(desk) = self.desk(desk_id) else {
            return 0.0;
        };
        calculate_price(selection.membership_tier, desk.desk_type, start.hours_until(end))
    }

    fn next_id(&self) -> String {
        let millis = Local::now().timestamp_millis();
        let mut id = format!("booking-{}", millis);
        while self.booking(&id).is_some() {
            id = format!("booking-{}-{:04x}", millis, rand::random::<u16>());
        }
        id
    }

    /// Confirm the user's selection into a stored booking.
    ///
    /// Nothing is stored on failure. On success the desk and times of the
    /// selection are cleared, date and tier are kept.
    pub fn create_booking(&mut self, user: &User) -> Result<Booking, BookingError> {
        self.create_booking_at(user, Local::now().naive_local())
    }

    pub fn create_booking_at(
        &mut self,
        user: &User,
        now: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        let selection = self.selection(user);
        let desk_id = selection.desk_id.ok_or(BookingError::NoDeskSelected)?;
        let start = selection.start_time.ok_or(BookingError::NoStartTime)?;
        let end = selection.end_time.ok_or(BookingError::NoEndTime)?;

        let duration = start.hours_until(end);
        if duration <= 0 {
            return Err(BookingError::InvalidDuration { start, end });
        }

        if selection.date < now.date() {
            return Err(BookingError::DateInPast(selection.date));
        }

        let desk = self.desk(desk_id).ok_or(BookingError::DeskNotFound(desk_id))?;
        let desk_type = desk.desk_type;

        if !self.is_desk_available(desk_id, selection.date, start, end) {
            return Err(BookingError::Overlap {
                desk_id,
                date: selection.date,
            });
        }

        let booking = Booking {
            id: self.next_id(),
            user_id: user.id.clone(),
            desk_id,
            date: selection.date,
            start_time: start,
            end_time: end,
            duration,
            membership_tier: selection.membership_tier,
            total_price: calculate_price(selection.membership_tier, desk_type, duration),
        };

        if booking.is_past(now) {
            return Err(BookingError::EndsInPast {
                date: booking.date,
                end,
            });
        }

        info!(
            "Adding booking {} for {}: desk {} {} {}-{}",
            booking.id, booking.user_id, desk_id, booking.date, start, end
        );
        let stored = booking.clone();
        self.bookings.update(move |b| b.push(stored));
        let mut selection = selection;
        selection.clear_desk_and_times();
        self.selections.insert(user.id.clone(), selection);

        Ok(booking)
    }

    /// Remove the booking with this id. Returns whether anything was removed.
    pub fn cancel_booking(&mut self, id: &str) -> bool {
        let removed = self.bookings.update(|bookings| {
            let before = bookings.len();
            bookings.retain(|booking| booking.id != id);
            before != bookings.len()
        });
        if removed {
            info!("Cancelled booking {}", id);
        } else {
            debug!("No booking {} to cancel", id);
        }
        removed
    }

    /// A user's bookings grouped by date, earliest date first.
    pub fn user_bookings(&self, user_id: &str, now: NaiveDateTime) -> Vec<BookingDay> {
        let mut by_date: BTreeMap<NaiveDate, Vec<UserBooking>> = BTreeMap::new();
        self.bookings.read(|bookings| {
            for booking in bookings.iter().filter(|b| b.user_id == user_id) {
                by_date.entry(booking.date).or_default().push(UserBooking {
                    past: booking.is_past(now),
                    booking: booking.clone(),
                });
            }
        });

        by_date
            .into_iter()
            .map(|(date, mut bookings)| {
                bookings.sort_by_key(|b| b.booking.start_time);
                BookingDay { date, bookings }
            })
            .collect()
    }

    pub fn revenue_report(&self) -> RevenueReport {
        self.bookings
            .read(|bookings| RevenueReport::from_bookings(bookings, &self.desks))
    }
}

/// A pending change to one user's selection. See [`BookingApp::edit_selection`].
pub struct SelectionEditor<'a> {
    app: &'a BookingApp,
    selection: Selection,
}

impl SelectionEditor<'_> {
    pub fn set_date(&mut self, date: NaiveDate) -> Result<(), BookingError> {
        if date < today() {
            return Err(BookingError::DateInPast(date));
        }
        self.selection.date = date;
        Ok(())
    }

    pub fn set_membership_tier(&mut self, tier: MembershipTier) {
        self.selection.membership_tier = tier;
        self.selection.tier_override = Some(tier);
    }

    pub fn select_desk(&mut self, desk_id: Option<u32>) -> Result<(), BookingError> {
        if let Some(id) = desk_id {
            let desk = self.app.desk(id).ok_or(BookingError::DeskNotFound(id))?;
            if !desk.is_available {
                return Err(BookingError::DeskUnavailable(id));
            }
        }
        self.selection.desk_id = desk_id;
        Ok(())
    }

    /// Picking a start at or after the current end clears the end.
    pub fn set_start_time(&mut self, time: SlotTime) -> Result<(), BookingError> {
        self.app.check_slot(time)?;
        self.selection.start_time = Some(time);
        if self.selection.end_time.is_some_and(|end| end <= time) {
            debug!("Clearing end time before new start {}", time);
            self.selection.end_time = None;
        }
        Ok(())
    }

    pub fn set_end_time(&mut self, time: SlotTime) -> Result<(), BookingError> {
        self.app.check_slot(time)?;
        if let Some(start) = self.selection.start_time {
            if time <= start {
                return Err(BookingError::InvalidDuration { start, end: time });
            }
        }
        self.selection.end_time = Some(time);
        Ok(())
    }
}
