use rorm::{DbEnum, Model, Patch};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// The severity of an [ActivityLog] entry
#[derive(DbEnum, Serialize, Deserialize, ToSchema, Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    /// Routine activity
    Low,
    /// Relationship lifecycle events
    Medium,
    /// Failures that need operator attention
    High,
    /// Security relevant failures
    Critical,
}

/// The closed taxonomy of auditable actions
#[derive(DbEnum, Serialize, Deserialize, ToSchema, Copy, Clone, Debug, Eq, PartialEq)]
pub enum AuditAction {
    /// A partner request was created
    PartnerRequestSent,
    /// A partner request was accepted
    PartnerRequestAccepted,
    /// A partner request was rejected by its recipient
    PartnerRequestRejected,
    /// A partner request was retracted by its sender
    PartnerRequestCancelled,
    /// Stale pending requests were expired by the sweep
    PartnerRequestExpired,
    /// A relationship was created
    RelationshipStarted,
    /// A relationship was ended by an accepted breakup
    RelationshipEnded,
    /// A breakup was proposed
    BreakupRequested,
    /// A breakup proposal was rejected
    BreakupRejected,
    /// A prior relationship's start date was restored on re-pairing
    DataRestored,
    /// Ex-partner data left the restoration window
    DataArchived,
    /// Expired audit entries were purged
    AuditLogPurged,
    /// A push notification could not be delivered
    NotificationFailed,
    /// A login attempt failed
    AuthenticationFailed,
    /// A caller tried to act on a record it is no party of
    AuthorizationFailed,
}

/// An entry of the security audit log.
///
/// `account` and `target` are plain uuids instead of foreign keys: audit
/// entries must outlive account deletion and failed logins have no account
/// row to point at. Entries are purged by the sweep per retention policy.
#[derive(Model)]
pub struct ActivityLog {
    /// Primary key of this entry
    #[rorm(id)]
    pub id: i64,

    /// The user the entry is about
    pub account: Uuid,

    /// The other user involved, if any
    pub target: Option<Uuid>,

    /// What happened
    pub action: AuditAction,

    /// The severity, classified from the action
    pub severity: Severity,

    /// Free-form details of the event
    #[rorm(max_length = 2048)]
    pub details: String,

    /// The point in time the entry was recorded
    #[rorm(auto_create_time)]
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Patch)]
#[rorm(model = "ActivityLog")]
pub(crate) struct ActivityLogInsert {
    pub(crate) account: Uuid,
    pub(crate) target: Option<Uuid>,
    pub(crate) action: AuditAction,
    pub(crate) severity: Severity,
    pub(crate) details: String,
}
