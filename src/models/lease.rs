use rorm::{Model, Patch};
use uuid::Uuid;

/// A short-lived lease taken by a sweep job before it runs.
///
/// A job skips its tick if another holder's unexpired lease exists. Leases
/// are keyed by job name, so two instances of the same job exclude each
/// other while different jobs run independently.
#[derive(Model)]
pub struct JobLease {
    /// Primary key of this lease
    #[rorm(id)]
    pub id: i64,

    /// The name of the job the lease belongs to
    #[rorm(max_length = 255, unique)]
    pub job: String,

    /// The process instance currently holding the lease
    pub holder: Uuid,

    /// When the lease stops being valid
    pub expires_at: chrono::NaiveDateTime,
}

#[derive(Patch)]
#[rorm(model = "JobLease")]
pub(crate) struct JobLeaseInsert {
    pub(crate) job: String,
    pub(crate) holder: Uuid,
    pub(crate) expires_at: chrono::NaiveDateTime,
}
