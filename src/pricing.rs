use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Flat hourly rate for team desks, independent of membership.
pub const TEAM_DESK_RATE: f64 = 25.0;

/// Bookings longer than this many hours get the long-stay discount.
const DISCOUNT_AFTER_HOURS: i64 = 3;
const DISCOUNT_FACTOR: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum MembershipTier {
    Basic,
    Premium,
    Executive,
}

impl MembershipTier {
    pub const ALL: [MembershipTier; 3] = [Self::Basic, Self::Premium, Self::Executive];

    pub fn hourly_rate(&self) -> f64 {
        match self {
            Self::Basic => 10.0,
            Self::Premium => 15.0,
            Self::Executive => 20.0,
        }
    }
}

impl std::fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Basic => "Basic",
            Self::Premium => "Premium",
            Self::Executive => "Executive",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeskType {
    Individual,
    Team,
}

/// Price of a booking of `duration` whole hours, rounded to cents.
/// Non-positive durations cost nothing.
pub fn calculate_price(tier: MembershipTier, desk_type: DeskType, duration: i64) -> f64 {
    if duration <= 0 {
        return 0.0;
    }

    let hourly_rate = match desk_type {
        DeskType::Individual => tier.hourly_rate(),
        DeskType::Team => TEAM_DESK_RATE,
    };

    let mut total = hourly_rate * duration as f64;
    if duration > DISCOUNT_AFTER_HOURS {
        total *= DISCOUNT_FACTOR;
    }

    round_cents(total)
}

pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
