//! The background sweep worker.
//!
//! Runs independent of request handling: expires stale partner requests,
//! archives ex-partner data whose restoration window has elapsed, purges old
//! audit entries and logs a periodic heartbeat. Every job is guarded by a
//! short-lived lease and filters by age, so overlapping or repeated runs
//! cause no additional mutation.

use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDateTime, Utc};
use log::{debug, error, info};
use rorm::{and, insert, or, query, update, Database, Model};
use rorm::FieldAccess;
use tokio::time;
use uuid::Uuid;

use crate::audit;
use crate::config::{AuditConfig, SweepConfig};
use crate::models::{
    Account, ActivityLog, ActivityLogInsert, AuditAction, ExPartnerEntry, JobLease,
    JobLeaseInsert, Partner, PartnerRequest, PartnerStatus, PendingRequestEntry, RequestStatus,
    Severity,
};
use crate::pairing::RESTORATION_WINDOW_DAYS;

const JOB_EXPIRE_REQUESTS: &str = "expire_stale_requests";
const JOB_ARCHIVE_EX_PARTNERS: &str = "archive_ex_partners";
const JOB_PURGE_AUDIT_LOG: &str = "purge_audit_log";

/// How long a job may hold its lease before it counts as abandoned
const LEASE_TTL_SECS: i64 = 300;

/// Whether a lease can be taken by `holder` at `now`.
///
/// A missing lease, the holder's own lease and any expired lease are free.
fn lease_is_free(existing: Option<(Uuid, NaiveDateTime)>, holder: Uuid, now: NaiveDateTime) -> bool {
    match existing {
        None => true,
        Some((current_holder, _)) if current_holder == holder => true,
        Some((_, expires_at)) => expires_at <= now,
    }
}

async fn acquire_lease(db: &Database, job: &str, holder: Uuid) -> Result<bool, rorm::Error> {
    let mut tx = db.start_transaction().await?;

    let now = Utc::now().naive_utc();
    let expires_at = now + Duration::seconds(LEASE_TTL_SECS);

    let existing = query!(&mut tx, JobLease)
        .condition(JobLease::F.job.equals(job))
        .optional()
        .await?;

    if !lease_is_free(
        existing.as_ref().map(|l| (l.holder, l.expires_at)),
        holder,
        now,
    ) {
        return Ok(false);
    }

    if existing.is_some() {
        update!(&mut tx, JobLease)
            .condition(JobLease::F.job.equals(job))
            .set(JobLease::F.holder, holder)
            .set(JobLease::F.expires_at, expires_at)
            .exec()
            .await?;
    } else {
        insert!(&mut tx, JobLeaseInsert)
            .single(&JobLeaseInsert {
                job: job.to_string(),
                holder,
                expires_at,
            })
            .await?;
    }

    tx.commit().await?;

    Ok(true)
}

async fn release_lease(db: &Database, job: &str, holder: Uuid) -> Result<(), rorm::Error> {
    rorm::delete!(db, JobLease)
        .condition(and!(
            JobLease::F.job.equals(job),
            JobLease::F.holder.equals(holder)
        ))
        .await?;

    Ok(())
}

/// Delete pending requests older than the configured ttl.
///
/// The request rows and their denormalized entries go in one transaction, a
/// single audit entry records the count. Selecting by age keeps the job
/// idempotent: a second run finds nothing left to expire.
async fn expire_stale_requests(db: &Database, ttl_days: i64) -> Result<u64, rorm::Error> {
    let cutoff = Utc::now().naive_utc() - Duration::days(ttl_days);

    let mut tx = db.start_transaction().await?;

    let stale = query!(&mut tx, PartnerRequest)
        .condition(and!(
            PartnerRequest::F.status.equals(RequestStatus::Pending),
            PartnerRequest::F.created_at.less_than(cutoff)
        ))
        .all()
        .await?;

    if stale.is_empty() {
        return Ok(0);
    }

    for request in &stale {
        rorm::delete!(&mut tx, PendingRequestEntry)
            .condition(PendingRequestEntry::F.request.equals(request.uuid.as_ref()))
            .await?;

        rorm::delete!(&mut tx, PartnerRequest)
            .condition(PartnerRequest::F.uuid.equals(request.uuid))
            .await?;
    }

    let count = stale.len() as u64;

    insert!(&mut tx, ActivityLogInsert)
        .single(&audit::entry(
            Uuid::nil(),
            None,
            AuditAction::PartnerRequestExpired,
            format!("Expired {count} stale partner requests"),
        ))
        .await?;

    tx.commit().await?;

    Ok(count)
}

/// Set `data_archived` on ex-partner entries whose restoration window has
/// elapsed.
///
/// The age filter makes the job idempotent, already archived rows are not
/// matched again.
async fn archive_ex_partners(db: &Database) -> Result<u64, rorm::Error> {
    let cutoff = Utc::now().naive_utc() - Duration::days(RESTORATION_WINDOW_DAYS);

    let mut tx = db.start_transaction().await?;

    let archived = update!(&mut tx, ExPartnerEntry)
        .condition(and!(
            ExPartnerEntry::F.data_archived.equals(false),
            ExPartnerEntry::F.breakup_date.less_than(cutoff)
        ))
        .set(ExPartnerEntry::F.data_archived, true)
        .exec()
        .await?;

    if archived > 0 {
        insert!(&mut tx, ActivityLogInsert)
            .single(&audit::entry(
                Uuid::nil(),
                None,
                AuditAction::DataArchived,
                format!("Archived {archived} ex-partner entries past the restoration window"),
            ))
            .await?;
    }

    tx.commit().await?;

    Ok(archived)
}

/// Purge audit entries past their retention.
///
/// Low and medium entries are purged after the short window, high and
/// critical ones only after the full retention period.
async fn purge_audit_log(db: &Database, config: &AuditConfig) -> Result<u64, rorm::Error> {
    let now = Utc::now().naive_utc();
    let long_cutoff = now - Duration::days(config.retention_days);
    let short_cutoff = now - Duration::days(config.short_retention_days);

    let mut tx = db.start_transaction().await?;

    let mut purged = rorm::delete!(&mut tx, ActivityLog)
        .condition(ActivityLog::F.created_at.less_than(long_cutoff))
        .await?;

    purged += rorm::delete!(&mut tx, ActivityLog)
        .condition(and!(
            or!(
                ActivityLog::F.severity.equals(Severity::Low),
                ActivityLog::F.severity.equals(Severity::Medium)
            ),
            ActivityLog::F.created_at.less_than(short_cutoff)
        ))
        .await?;

    if purged > 0 {
        insert!(&mut tx, ActivityLogInsert)
            .single(&audit::entry(
                Uuid::nil(),
                None,
                AuditAction::AuditLogPurged,
                format!("Purged {purged} expired audit entries"),
            ))
            .await?;
    }

    tx.commit().await?;

    Ok(purged)
}

/// Log a liveness line with a few basic figures.
///
/// Reads only; a failing heartbeat signals that the store is unreachable.
async fn heartbeat(db: &Database) -> Result<(), rorm::Error> {
    let accounts = query!(db, (Account::F.uuid.count(),)).one().await?.0;

    let relationships = query!(db, (Partner::F.uuid.count(),))
        .condition(Partner::F.status.equals(PartnerStatus::Active))
        .one()
        .await?
        .0;

    let pending = query!(db, (PartnerRequest::F.uuid.count(),))
        .condition(PartnerRequest::F.status.equals(RequestStatus::Pending))
        .one()
        .await?
        .0;

    info!(
        "Sweep heartbeat: store reachable, {} accounts, {} active relationships, {} pending requests",
        accounts,
        relationships,
        pending,
    );

    Ok(())
}

/// Start all sweep jobs.
///
/// Each job runs on its own timer tick, guarded by its own lease.
pub fn start_sweep_worker(db: Database, config: SweepConfig, audit_config: AuditConfig) {
    // One holder identity per process instance
    let holder = Uuid::new_v4();

    {
        let db = db.clone();
        let ttl_days = config.request_ttl_days;
        let mut interval = time::interval(StdDuration::from_secs(config.request_expiry_interval));
        tokio::spawn(async move {
            loop {
                interval.tick().await;

                match acquire_lease(&db, JOB_EXPIRE_REQUESTS, holder).await {
                    Ok(true) => {
                        match expire_stale_requests(&db, ttl_days).await {
                            Ok(0) => {}
                            Ok(count) => info!("Expired {count} stale partner requests"),
                            Err(err) => error!("Request expiry failed: {err}"),
                        }

                        if let Err(err) = release_lease(&db, JOB_EXPIRE_REQUESTS, holder).await {
                            error!("Could not release lease {JOB_EXPIRE_REQUESTS}: {err}");
                        }
                    }
                    Ok(false) => debug!("Lease {JOB_EXPIRE_REQUESTS} is held, skipping tick"),
                    Err(err) => error!("Could not acquire lease {JOB_EXPIRE_REQUESTS}: {err}"),
                }
            }
        });
    }

    {
        let db = db.clone();
        let mut interval = time::interval(StdDuration::from_secs(config.archive_interval));
        tokio::spawn(async move {
            loop {
                interval.tick().await;

                match acquire_lease(&db, JOB_ARCHIVE_EX_PARTNERS, holder).await {
                    Ok(true) => {
                        match archive_ex_partners(&db).await {
                            Ok(0) => {}
                            Ok(count) => info!("Archived {count} ex-partner entries"),
                            Err(err) => error!("Ex-partner archival failed: {err}"),
                        }

                        if let Err(err) = release_lease(&db, JOB_ARCHIVE_EX_PARTNERS, holder).await
                        {
                            error!("Could not release lease {JOB_ARCHIVE_EX_PARTNERS}: {err}");
                        }
                    }
                    Ok(false) => debug!("Lease {JOB_ARCHIVE_EX_PARTNERS} is held, skipping tick"),
                    Err(err) => error!("Could not acquire lease {JOB_ARCHIVE_EX_PARTNERS}: {err}"),
                }
            }
        });
    }

    {
        let db = db.clone();
        let mut interval = time::interval(StdDuration::from_secs(config.audit_purge_interval));
        tokio::spawn(async move {
            loop {
                interval.tick().await;

                match acquire_lease(&db, JOB_PURGE_AUDIT_LOG, holder).await {
                    Ok(true) => {
                        match purge_audit_log(&db, &audit_config).await {
                            Ok(0) => {}
                            Ok(count) => info!("Purged {count} expired audit entries"),
                            Err(err) => error!("Audit log purge failed: {err}"),
                        }

                        if let Err(err) = release_lease(&db, JOB_PURGE_AUDIT_LOG, holder).await {
                            error!("Could not release lease {JOB_PURGE_AUDIT_LOG}: {err}");
                        }
                    }
                    Ok(false) => debug!("Lease {JOB_PURGE_AUDIT_LOG} is held, skipping tick"),
                    Err(err) => error!("Could not acquire lease {JOB_PURGE_AUDIT_LOG}: {err}"),
                }
            }
        });
    }

    {
        let mut interval = time::interval(StdDuration::from_secs(config.heartbeat_interval));
        tokio::spawn(async move {
            loop {
                interval.tick().await;

                if let Err(err) = heartbeat(&db).await {
                    error!("Sweep heartbeat failed, store may be unreachable: {err}");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn missing_lease_is_free() {
        assert!(lease_is_free(None, Uuid::new_v4(), at(12)));
    }

    #[test]
    fn own_lease_can_be_renewed() {
        let holder = Uuid::new_v4();
        assert!(lease_is_free(Some((holder, at(13))), holder, at(12)));
    }

    #[test]
    fn foreign_unexpired_lease_blocks() {
        assert!(!lease_is_free(
            Some((Uuid::new_v4(), at(13))),
            Uuid::new_v4(),
            at(12)
        ));
    }

    #[test]
    fn foreign_expired_lease_is_free() {
        assert!(lease_is_free(
            Some((Uuid::new_v4(), at(11))),
            Uuid::new_v4(),
            at(12)
        ));
    }
}
