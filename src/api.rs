use crate::booker::Selection;
use crate::pricing::{DeskType, MembershipTier};
use crate::slot_time::SlotTime;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeletePayload {
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub desk_id: u32,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct Availability {
    pub available: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuery {
    pub tier: MembershipTier,
    pub desk_type: DeskType,
    pub duration: i64,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct Quote {
    pub price: f64,
}

/// Partial update of a user's selection. Fields are applied in declaration order.
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectionPatch {
    pub membership_tier: Option<MembershipTier>,
    pub date: Option<NaiveDate>,
    pub desk_id: Option<u32>,
    /// Drop the selected desk.
    pub clear_desk: bool,
    pub start_time: Option<SlotTime>,
    pub end_time: Option<SlotTime>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectionView {
    #[serde(flatten)]
    pub selection: Selection,
    pub price: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MembershipPayload {
    pub membership_tier: MembershipTier,
}
