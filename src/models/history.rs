use rorm::fields::types::ForeignModel;
use rorm::{Model, Patch};

use crate::models::Account;

/// An append-only entry of a user's relationship timeline.
///
/// This trail is user-facing data, not the security audit log, which lives in
/// [ActivityLog](crate::models::ActivityLog).
#[derive(Model)]
pub struct PartnerHistory {
    /// Primary key of this entry
    #[rorm(id)]
    pub id: i64,

    /// The user this entry belongs to
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub account: ForeignModel<Account>,

    /// What happened, e.g. `request_sent` or `relationship_ended`
    #[rorm(max_length = 255)]
    pub action: String,

    /// Human readable details of the event
    #[rorm(max_length = 1024)]
    pub details: String,

    /// The point in time the entry was recorded
    #[rorm(auto_create_time)]
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Patch)]
#[rorm(model = "PartnerHistory")]
pub(crate) struct PartnerHistoryInsert {
    pub(crate) account: ForeignModel<Account>,
    pub(crate) action: String,
    pub(crate) details: String,
}
