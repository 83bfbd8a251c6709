use rorm::fields::types::ForeignModel;
use rorm::{DbEnum, Model, Patch};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Account;

/// The states a partner request can be in.
///
/// Every state except [RequestStatus::Pending] is terminal.
#[derive(DbEnum, Serialize, Deserialize, ToSchema, Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestStatus {
    /// The request was sent and has not been answered yet
    Pending,
    /// The recipient accepted the request
    Accepted,
    /// The recipient rejected the request
    Rejected,
    /// The sender retracted the request before it was answered
    Cancelled,
    /// The request was accepted once, but the relationship it started has ended.
    ///
    /// Accepted requests are kept as an audit record. This state marks them as
    /// no longer backing an active relationship.
    Superseded,
}

/// The representation of a partner request
///
/// The `uuid` is the only identifier of a request. The denormalized
/// [PendingRequestEntry](crate::models::PendingRequestEntry) references it
/// instead of carrying an id of its own.
#[derive(Model)]
pub struct PartnerRequest {
    /// Primary key of this request
    #[rorm(primary_key)]
    pub uuid: Uuid,

    /// The user that sent the request
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub from: ForeignModel<Account>,

    /// The user the request is addressed to
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub to: ForeignModel<Account>,

    /// The current state of the request
    pub status: RequestStatus,

    /// An optional message of the sender
    #[rorm(max_length = 500)]
    pub message: Option<String>,

    /// The point in time the request was created.
    ///
    /// Set explicitly so the denormalized entry can carry the exact same
    /// timestamp.
    pub created_at: chrono::NaiveDateTime,

    /// The point in time the request left the pending state
    pub responded_at: Option<chrono::NaiveDateTime>,
}

#[derive(Patch)]
#[rorm(model = "PartnerRequest")]
pub(crate) struct PartnerRequestInsert {
    pub(crate) uuid: Uuid,
    pub(crate) from: ForeignModel<Account>,
    pub(crate) to: ForeignModel<Account>,
    pub(crate) status: RequestStatus,
    pub(crate) message: Option<String>,
    pub(crate) created_at: chrono::NaiveDateTime,
    pub(crate) responded_at: Option<chrono::NaiveDateTime>,
}

/// Denormalized summary of an inbound pending request.
///
/// This is the fast-read projection of a user's unanswered requests. It is
/// created and removed in the same transaction as its [PartnerRequest] and
/// carries a snapshot of the sender's identity at request time.
#[derive(Model)]
pub struct PendingRequestEntry {
    /// Primary key of this entry
    #[rorm(id)]
    pub id: i64,

    /// The request this entry summarizes
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub request: ForeignModel<PartnerRequest>,

    /// The user whose inbox this entry lives in
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub recipient: ForeignModel<Account>,

    /// Snapshot: the sender's uuid
    pub sender: Uuid,

    /// Snapshot: the sender's username at request time
    #[rorm(max_length = 255)]
    pub sender_username: String,

    /// Snapshot: the sender's display name at request time
    #[rorm(max_length = 255)]
    pub sender_display_name: String,

    /// Snapshot: the sender's avatar at request time
    #[rorm(max_length = 1024)]
    pub sender_avatar_path: Option<String>,

    /// The point in time the underlying request was created
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Patch)]
#[rorm(model = "PendingRequestEntry")]
pub(crate) struct PendingRequestEntryInsert {
    pub(crate) request: ForeignModel<PartnerRequest>,
    pub(crate) recipient: ForeignModel<Account>,
    pub(crate) sender: Uuid,
    pub(crate) sender_username: String,
    pub(crate) sender_display_name: String,
    pub(crate) sender_avatar_path: Option<String>,
    pub(crate) created_at: chrono::NaiveDateTime,
}
