//! Revenue analytics over every stored booking.

use crate::booker::Booking;
use crate::pricing::{round_cents, DeskType, MembershipTier};
use crate::registry::{Desk, INDIVIDUAL_DESKS};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::BTreeMap;

/// Number of most recent booking dates shown in the revenue chart.
pub const CHART_DAYS: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TierRevenue {
    pub tier: MembershipTier,
    pub revenue: f64,
    /// Share of total revenue in percent.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevenueReport {
    pub total_revenue: f64,
    pub total_bookings: usize,
    pub revenue_by_tier: Vec<TierRevenue>,
    pub individual_bookings: usize,
    pub team_bookings: usize,
    pub revenue_by_date: Vec<DailyRevenue>,
}

fn desk_type_of(desk_id: u32, desks: &[Desk]) -> DeskType {
    desks
        .iter()
        .find(|desk| desk.id == desk_id)
        .map(|desk| desk.desk_type)
        .unwrap_or(if desk_id > INDIVIDUAL_DESKS {
            DeskType::Team
        } else {
            DeskType::Individual
        })
}

impl RevenueReport {
    pub fn from_bookings(bookings: &[Booking], desks: &[Desk]) -> Self {
        let total_revenue: f64 = bookings.iter().map(|b| b.total_price).sum();

        let revenue_by_tier = MembershipTier::ALL
            .into_iter()
            .map(|tier| {
                let revenue: f64 = bookings
                    .iter()
                    .filter(|b| b.membership_tier == tier)
                    .map(|b| b.total_price)
                    .sum();
                let share = if total_revenue > 0.0 {
                    revenue / total_revenue * 100.0
                } else {
                    0.0
                };
                TierRevenue {
                    tier,
                    revenue: round_cents(revenue),
                    share: round_cents(share),
                }
            })
            .collect();

        let team_bookings = bookings
            .iter()
            .filter(|b| desk_type_of(b.desk_id, desks) == DeskType::Team)
            .count();

        let mut per_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for booking in bookings {
            *per_day.entry(booking.date).or_default() += booking.total_price;
        }
        let skip = per_day.len().saturating_sub(CHART_DAYS);
        let revenue_by_date = per_day
            .into_iter()
            .skip(skip)
            .map(|(date, revenue)| DailyRevenue {
                date,
                revenue: round_cents(revenue),
            })
            .collect();

        Self {
            total_revenue: round_cents(total_revenue),
            total_bookings: bookings.len(),
            revenue_by_tier,
            individual_bookings: bookings.len() - team_bookings,
            team_bookings,
            revenue_by_date,
        }
    }

    pub fn tier_revenue(&self, tier: MembershipTier) -> f64 {
        self.revenue_by_tier
            .iter()
            .find(|entry| entry.tier == tier)
            .map(|entry| entry.revenue)
            .unwrap_or(0.0)
    }
}
