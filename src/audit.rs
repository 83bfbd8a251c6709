//! Severity classification and helpers for the security audit log.
//!
//! Call sites build an insert via [entry] and write it with `insert!`, inside
//! the transaction of the mutation they describe. Post-commit paths (e.g. the
//! push dispatcher) insert directly on the database handle.

use uuid::Uuid;

use crate::models::{ActivityLogInsert, AuditAction, Severity};

/// Classify the severity of an action.
///
/// The mapping is fixed: security relevant failures are critical,
/// delivery/authorization failures are high, relationship lifecycle events
/// are medium, everything else is low.
pub fn classify(action: AuditAction) -> Severity {
    match action {
        AuditAction::AuthenticationFailed => Severity::Critical,
        AuditAction::AuthorizationFailed | AuditAction::NotificationFailed => Severity::High,
        AuditAction::PartnerRequestSent
        | AuditAction::PartnerRequestAccepted
        | AuditAction::PartnerRequestRejected
        | AuditAction::PartnerRequestCancelled
        | AuditAction::PartnerRequestExpired
        | AuditAction::RelationshipStarted
        | AuditAction::RelationshipEnded
        | AuditAction::BreakupRequested
        | AuditAction::BreakupRejected
        | AuditAction::DataRestored
        | AuditAction::DataArchived => Severity::Medium,
        AuditAction::AuditLogPurged => Severity::Low,
    }
}

/// Build an audit log insert with its severity classified from the action.
pub(crate) fn entry(
    account: Uuid,
    target: Option<Uuid>,
    action: AuditAction,
    details: impl Into<String>,
) -> ActivityLogInsert {
    ActivityLogInsert {
        account,
        target,
        action,
        severity: classify(action),
        details: details.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_are_critical() {
        assert_eq!(classify(AuditAction::AuthenticationFailed), Severity::Critical);
    }

    #[test]
    fn delivery_and_authorization_failures_are_high() {
        assert_eq!(classify(AuditAction::NotificationFailed), Severity::High);
        assert_eq!(classify(AuditAction::AuthorizationFailed), Severity::High);
    }

    #[test]
    fn lifecycle_events_are_medium() {
        for action in [
            AuditAction::PartnerRequestSent,
            AuditAction::PartnerRequestAccepted,
            AuditAction::PartnerRequestRejected,
            AuditAction::PartnerRequestCancelled,
            AuditAction::PartnerRequestExpired,
            AuditAction::RelationshipStarted,
            AuditAction::RelationshipEnded,
            AuditAction::BreakupRequested,
            AuditAction::BreakupRejected,
            AuditAction::DataRestored,
            AuditAction::DataArchived,
        ] {
            assert_eq!(classify(action), Severity::Medium);
        }
    }

    #[test]
    fn maintenance_is_low() {
        assert_eq!(classify(AuditAction::AuditLogPurged), Severity::Low);
    }

    #[test]
    fn entry_carries_classified_severity() {
        let account = Uuid::new_v4();
        let e = entry(account, None, AuditAction::NotificationFailed, "push exhausted");
        assert_eq!(e.severity, Severity::High);
        assert_eq!(e.account, account);
        assert!(e.target.is_none());
    }
}
