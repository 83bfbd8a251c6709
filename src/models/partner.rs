use rorm::fields::types::ForeignModel;
use rorm::{DbEnum, Model, Patch};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Account, PartnerRequest};

/// The states of a normalized relationship record
#[derive(DbEnum, Serialize, Deserialize, ToSchema, Copy, Clone, Debug, Eq, PartialEq)]
pub enum PartnerStatus {
    /// The relationship is ongoing
    Active,
    /// The relationship was ended by an accepted breakup
    Ended,
}

/// The normalized record of a relationship between two users.
///
/// This is the system of record. The per-user [PartnerEntry] and
/// [ExPartnerEntry] rows are projections of it and are rewritten in the same
/// transaction as every change to this model.
#[derive(Model)]
pub struct Partner {
    /// Primary key of this relationship
    #[rorm(primary_key)]
    pub uuid: Uuid,

    /// One of the two users
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub user1: ForeignModel<Account>,

    /// The other user
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub user2: ForeignModel<Account>,

    /// The request whose acceptance created this relationship
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub request: ForeignModel<PartnerRequest>,

    /// The current state of the relationship
    pub status: PartnerStatus,

    /// When the relationship started.
    ///
    /// If the pair re-paired within the restoration window, this is the start
    /// of the original relationship, not the time of re-acceptance.
    pub started_at: chrono::NaiveDateTime,

    /// When the relationship ended
    pub ended_at: Option<chrono::NaiveDateTime>,

    /// The user that accepted the breakup
    pub ended_by: Option<Uuid>,

    /// The reason given with the breakup request
    #[rorm(max_length = 1024)]
    pub ended_reason: Option<String>,
}

#[derive(Patch)]
#[rorm(model = "Partner")]
pub(crate) struct PartnerInsert {
    pub(crate) uuid: Uuid,
    pub(crate) user1: ForeignModel<Account>,
    pub(crate) user2: ForeignModel<Account>,
    pub(crate) request: ForeignModel<PartnerRequest>,
    pub(crate) status: PartnerStatus,
    pub(crate) started_at: chrono::NaiveDateTime,
    pub(crate) ended_at: Option<chrono::NaiveDateTime>,
    pub(crate) ended_by: Option<Uuid>,
    pub(crate) ended_reason: Option<String>,
}

/// The states of a user's active-partner slot
#[derive(DbEnum, Serialize, Deserialize, ToSchema, Copy, Clone, Debug, Eq, PartialEq)]
pub enum PartnerEntryStatus {
    /// The slot holds the user's current partner
    Active,
    /// The slot is kept but not counted as a current partner
    Inactive,
}

/// A user's single active-partner slot.
///
/// At most one row exists per account, which enforces the one-active-partner
/// invariant at the storage level. The partner's identity is snapshotted for
/// fast reads; [Partner] stays the system of record.
#[derive(Model)]
pub struct PartnerEntry {
    /// Primary key of this entry
    #[rorm(id)]
    pub id: i64,

    /// The user this slot belongs to
    #[rorm(unique, on_update = "Cascade", on_delete = "Cascade")]
    pub account: ForeignModel<Account>,

    /// The relationship this slot projects
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub partner_record: ForeignModel<Partner>,

    /// The state of the slot
    pub status: PartnerEntryStatus,

    /// Snapshot: the partner's uuid
    pub partner: Uuid,

    /// Snapshot: the partner's username
    #[rorm(max_length = 255)]
    pub partner_username: String,

    /// Snapshot: the partner's display name
    #[rorm(max_length = 255)]
    pub partner_display_name: String,

    /// Snapshot: the partner's avatar
    #[rorm(max_length = 1024)]
    pub partner_avatar_path: Option<String>,

    /// Snapshot: the partner's birthdate
    pub partner_birthdate: Option<chrono::NaiveDate>,

    /// Snapshot: the partner's gender
    #[rorm(max_length = 255)]
    pub partner_gender: Option<String>,

    /// When the relationship started, identical on both users' entries
    pub started_at: chrono::NaiveDateTime,
}

#[derive(Patch)]
#[rorm(model = "PartnerEntry")]
pub(crate) struct PartnerEntryInsert {
    pub(crate) account: ForeignModel<Account>,
    pub(crate) partner_record: ForeignModel<Partner>,
    pub(crate) status: PartnerEntryStatus,
    pub(crate) partner: Uuid,
    pub(crate) partner_username: String,
    pub(crate) partner_display_name: String,
    pub(crate) partner_avatar_path: Option<String>,
    pub(crate) partner_birthdate: Option<chrono::NaiveDate>,
    pub(crate) partner_gender: Option<String>,
    pub(crate) started_at: chrono::NaiveDateTime,
}

/// A terminated relationship, retained per user.
///
/// `breakup_date` is set once when the breakup is accepted and never changes.
/// `data_archived` flips false to true exactly once, after the restoration
/// window has elapsed without the pair re-pairing.
#[derive(Model)]
pub struct ExPartnerEntry {
    /// Primary key of this entry
    #[rorm(id)]
    pub id: i64,

    /// The user this history row belongs to
    #[rorm(on_update = "Cascade", on_delete = "Cascade")]
    pub account: ForeignModel<Account>,

    /// The ex-partner's uuid
    pub ex_partner: Uuid,

    /// Snapshot: the ex-partner's username at breakup time
    #[rorm(max_length = 255)]
    pub ex_partner_username: String,

    /// Snapshot: the ex-partner's display name at breakup time
    #[rorm(max_length = 255)]
    pub ex_partner_display_name: String,

    /// When the ended relationship had started
    pub started_at: chrono::NaiveDateTime,

    /// When the relationship ended
    pub ended_at: chrono::NaiveDateTime,

    /// The user that accepted the breakup
    pub ended_by: Uuid,

    /// The reason given with the breakup request
    #[rorm(max_length = 1024)]
    pub ended_reason: Option<String>,

    /// The immutable date of the breakup, anchor of the restoration window
    pub breakup_date: chrono::NaiveDateTime,

    /// Whether the restoration window has elapsed for this entry
    pub data_archived: bool,
}

#[derive(Patch)]
#[rorm(model = "ExPartnerEntry")]
pub(crate) struct ExPartnerEntryInsert {
    pub(crate) account: ForeignModel<Account>,
    pub(crate) ex_partner: Uuid,
    pub(crate) ex_partner_username: String,
    pub(crate) ex_partner_display_name: String,
    pub(crate) started_at: chrono::NaiveDateTime,
    pub(crate) ended_at: chrono::NaiveDateTime,
    pub(crate) ended_by: Uuid,
    pub(crate) ended_reason: Option<String>,
    pub(crate) breakup_date: chrono::NaiveDateTime,
    pub(crate) data_archived: bool,
}
