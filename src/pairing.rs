//! The pairing rules: the assignment check and the restoration window.
//!
//! Both checks run *inside* the transaction that performs the write they
//! guard, immediately before the commit. Of two concurrent acceptances racing
//! for the same user, at most one transaction can see a free slot and commit.

use chrono::NaiveDateTime;
use rorm::db::transaction::Transaction;
use rorm::{and, insert, or, query, Model};
use rorm::FieldAccess;
use uuid::Uuid;

use crate::audit;
use crate::models::{
    ActivityLogInsert, AuditAction, ExPartnerEntry, PartnerEntry, PartnerEntryStatus,
};

/// Days after a breakup during which re-pairing restores the original
/// relationship start date.
pub const RESTORATION_WINDOW_DAYS: i64 = 30;

/// Result of [check_assignment]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AssignmentCheck {
    /// Neither user has an active partner
    Free,
    /// The requesting user already has an active partner
    CallerPartnered,
    /// The target user already has an active partner
    TargetPartnered,
}

/// Check that neither user holds an active partner slot.
///
/// Must be re-evaluated in the committing transaction, the result of an
/// earlier check outside of it may be stale.
pub async fn check_assignment(
    tx: &mut Transaction,
    from: Uuid,
    to: Uuid,
) -> Result<AssignmentCheck, rorm::Error> {
    for (account, taken) in [
        (from, AssignmentCheck::CallerPartnered),
        (to, AssignmentCheck::TargetPartnered),
    ] {
        if query!(&mut *tx, (PartnerEntry::F.id,))
            .condition(and!(
                PartnerEntry::F.account.equals(account.as_ref()),
                PartnerEntry::F.status.equals(PartnerEntryStatus::Active)
            ))
            .optional()
            .await?
            .is_some()
        {
            return Ok(taken);
        }
    }

    Ok(AssignmentCheck::Free)
}

/// The pure restoration decision for a single prior breakup.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RestorationDecision {
    /// Re-pairing within the window, keep the original start date
    Restore {
        /// Start date of the original relationship
        original_started_at: NaiveDateTime,
    },
    /// The window has elapsed, start fresh and archive the old entries
    Archive,
    /// No prior breakup between the pair, start fresh
    FreshStart,
}

/// Decide whether a prior breakup is still within the restoration window.
///
/// `days = floor((now - breakup_date) / 1 day)`; the window is inclusive,
/// day 30 still restores.
pub fn decide(
    breakup: Option<(NaiveDateTime, NaiveDateTime)>,
    now: NaiveDateTime,
) -> RestorationDecision {
    let Some((breakup_date, original_started_at)) = breakup else {
        return RestorationDecision::FreshStart;
    };

    if (now - breakup_date).num_days() <= RESTORATION_WINDOW_DAYS {
        RestorationDecision::Restore {
            original_started_at,
        }
    } else {
        RestorationDecision::Archive
    }
}

/// What [check_restoration] resolved for an acceptance.
#[derive(Copy, Clone, Debug)]
pub struct Restoration {
    /// The start date the new relationship record must carry
    pub started_at: NaiveDateTime,
    /// Whether the start date was taken from a restored prior relationship
    pub restored: bool,
}

/// Resolve the start date for a new pairing of `from` and `to`.
///
/// Looks up the pair's most recent ex-partner entry on either side. Within
/// the restoration window the original start date is reused and a
/// `data_restored` event is logged. Past the window both sides' entries are
/// archived in this same transaction and a `data_archived` event is logged.
/// The archival update is a no-op on already archived rows, so re-running it
/// has no effect.
pub async fn check_restoration(
    tx: &mut Transaction,
    from: Uuid,
    to: Uuid,
    now: NaiveDateTime,
) -> Result<Restoration, rorm::Error> {
    let entries = query!(&mut *tx, ExPartnerEntry)
        .condition(or!(
            and!(
                ExPartnerEntry::F.account.equals(from.as_ref()),
                ExPartnerEntry::F.ex_partner.equals(to)
            ),
            and!(
                ExPartnerEntry::F.account.equals(to.as_ref()),
                ExPartnerEntry::F.ex_partner.equals(from)
            )
        ))
        .all()
        .await?;

    let latest = entries.iter().max_by_key(|e| e.breakup_date);

    match decide(latest.map(|e| (e.breakup_date, e.started_at)), now) {
        RestorationDecision::FreshStart => Ok(Restoration {
            started_at: now,
            restored: false,
        }),
        RestorationDecision::Restore {
            original_started_at,
        } => {
            insert!(&mut *tx, ActivityLogInsert)
                .single(&audit::entry(
                    from,
                    Some(to),
                    AuditAction::DataRestored,
                    "Re-paired within the restoration window, start date restored",
                ))
                .await?;

            Ok(Restoration {
                started_at: original_started_at,
                restored: true,
            })
        }
        RestorationDecision::Archive => {
            let archived = rorm::update!(&mut *tx, ExPartnerEntry)
                .condition(and!(
                    or!(
                        and!(
                            ExPartnerEntry::F.account.equals(from.as_ref()),
                            ExPartnerEntry::F.ex_partner.equals(to)
                        ),
                        and!(
                            ExPartnerEntry::F.account.equals(to.as_ref()),
                            ExPartnerEntry::F.ex_partner.equals(from)
                        )
                    ),
                    ExPartnerEntry::F.data_archived.equals(false)
                ))
                .set(ExPartnerEntry::F.data_archived, true)
                .exec()
                .await?;

            if archived > 0 {
                insert!(&mut *tx, ActivityLogInsert)
                    .single(&audit::entry(
                        from,
                        Some(to),
                        AuditAction::DataArchived,
                        format!("Restoration window elapsed, archived {archived} entries"),
                    ))
                    .await?;
            }

            Ok(Restoration {
                started_at: now,
                restored: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn no_prior_breakup_starts_fresh() {
        assert_eq!(decide(None, at(2024, 6, 1)), RestorationDecision::FreshStart);
    }

    #[test]
    fn within_window_restores_original_start() {
        let started = at(2023, 11, 20);
        let breakup = at(2024, 5, 1);

        let decision = decide(Some((breakup, started)), breakup + Duration::days(10));
        assert_eq!(
            decision,
            RestorationDecision::Restore {
                original_started_at: started
            }
        );
    }

    #[test]
    fn window_is_inclusive_on_day_30() {
        let started = at(2024, 1, 1);
        let breakup = at(2024, 5, 1);

        let decision = decide(Some((breakup, started)), breakup + Duration::days(30));
        assert_eq!(
            decision,
            RestorationDecision::Restore {
                original_started_at: started
            }
        );
    }

    #[test]
    fn day_31_archives() {
        let breakup = at(2024, 5, 1);

        let decision = decide(Some((breakup, at(2024, 1, 1))), breakup + Duration::days(31));
        assert_eq!(decision, RestorationDecision::Archive);
    }

    #[test]
    fn partial_days_are_floored() {
        let started = at(2024, 1, 1);
        let breakup = at(2024, 5, 1);

        // 30 days and 11 hours is still day 30
        let now = breakup + Duration::days(30) + Duration::hours(11);
        assert_eq!(
            decide(Some((breakup, started)), now),
            RestorationDecision::Restore {
                original_started_at: started
            }
        );
    }

    #[test]
    fn forty_days_later_starts_fresh() {
        let breakup = at(2024, 3, 1);

        let decision = decide(Some((breakup, at(2023, 7, 15))), breakup + Duration::days(40));
        assert_eq!(decision, RestorationDecision::Archive);
    }
}
