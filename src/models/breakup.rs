use rorm::fields::types::ForeignModel;
use rorm::{DbEnum, Model, Patch};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Account;

/// The states a breakup request can be in
#[derive(DbEnum, Serialize, Deserialize, ToSchema, Copy, Clone, Debug, Eq, PartialEq)]
pub enum BreakupStatus {
    /// The breakup was proposed and has not been answered yet
    Pending,
    /// The counterparty accepted, the relationship has ended
    Accepted,
    /// The counterparty rejected, the relationship continues
    Rejected,
}

/// A proposal to end the relationship between two partners
#[derive(Model)]
pub struct BreakupRequest {
    /// Primary key of this request
    #[rorm(primary_key)]
    pub uuid: Uuid,

    /// The user that wants to end the relationship
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub from: ForeignModel<Account>,

    /// The user's current partner
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub to: ForeignModel<Account>,

    /// The current state of the request
    pub status: BreakupStatus,

    /// An optional reason given by the proposer
    #[rorm(max_length = 1024)]
    pub reason: Option<String>,

    /// The point in time the request was created
    #[rorm(auto_create_time)]
    pub created_at: chrono::NaiveDateTime,

    /// The point in time the request left the pending state
    pub responded_at: Option<chrono::NaiveDateTime>,
}

#[derive(Patch)]
#[rorm(model = "BreakupRequest")]
pub(crate) struct BreakupRequestInsert {
    pub(crate) uuid: Uuid,
    pub(crate) from: ForeignModel<Account>,
    pub(crate) to: ForeignModel<Account>,
    pub(crate) status: BreakupStatus,
    pub(crate) reason: Option<String>,
    pub(crate) responded_at: Option<chrono::NaiveDateTime>,
}
