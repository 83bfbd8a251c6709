use std::cmp::min;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, error, warn};
use rorm::fields::types::ForeignModelByField;
use rorm::{insert, query, Database, Model};
use rorm::FieldAccess;
use tokio::sync::mpsc::Sender;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::audit;
use crate::config::NotificationConfig;
use crate::models::{Account, ActivityLogInsert, AuditAction, NotificationInsert};

/// The payload of a push notification
#[derive(Clone, Debug)]
pub struct PushPayload {
    /// The title shown to the user
    pub title: String,
    /// The body shown to the user
    pub body: String,
    /// JSON encoded data for the client
    pub data: String,
}

/// A classified push delivery failure
#[derive(Debug)]
pub enum PushError {
    /// The provider does not know the token
    InvalidToken,
    /// The provider could not be reached
    Network(String),
    /// The provider is temporarily unavailable
    Unavailable,
    /// The provider failed internally
    Internal(String),
    /// The provider rejected the notification for good
    Rejected(String),
}

impl PushError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PushError::Rejected(_))
    }
}

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushError::InvalidToken => write!(f, "invalid push token"),
            PushError::Network(err) => write!(f, "network error: {err}"),
            PushError::Unavailable => write!(f, "push provider unavailable"),
            PushError::Internal(err) => write!(f, "push provider error: {err}"),
            PushError::Rejected(err) => write!(f, "notification rejected: {err}"),
        }
    }
}

/// The push transport.
///
/// Implementations take a device token and a payload and return the
/// provider's delivery id. The provider wire format is not this server's
/// concern.
pub trait PushGateway: Send + Sync + 'static {
    /// Deliver one notification to one device
    fn push<'a>(
        &'a self,
        token: &'a str,
        payload: &'a PushPayload,
    ) -> BoxFuture<'a, Result<String, PushError>>;
}

/// Gateway used when no provider is configured.
///
/// Logs the delivery and reports success, so the rest of the pipeline
/// behaves as in production.
pub struct LogPushGateway;

impl PushGateway for LogPushGateway {
    fn push<'a>(
        &'a self,
        _token: &'a str,
        payload: &'a PushPayload,
    ) -> BoxFuture<'a, Result<String, PushError>> {
        Box::pin(async move {
            debug!("Push (log gateway): {}", payload.title);
            Ok(Uuid::new_v4().to_string())
        })
    }
}

/// Backoff settings for push retries
#[derive(Copy, Clone, Debug)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Factor the delay grows by per attempt
    pub multiplier: u32,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// How many retries are attempted after the initial try
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Build the policy from the parsed configuration
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_retries: config.max_retries,
        }
    }

    /// The delay before retry number `attempt` (counting from 0)
    pub fn delay(&self, attempt: u32) -> Duration {
        min(
            self.max_delay,
            self.base_delay
                .saturating_mul(self.multiplier.saturating_pow(attempt)),
        )
    }
}

/// Attempt a delivery, retrying retryable failures with exponential backoff.
///
/// Gives up when a failure is terminal, the retries are exhausted or the
/// shutdown signal fires. The total wall clock is bounded by the policy's
/// retry count and delay cap.
pub(crate) async fn deliver(
    gateway: &dyn PushGateway,
    token: &str,
    payload: &PushPayload,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> Result<String, PushError> {
    let mut attempt = 0;

    loop {
        match gateway.push(token, payload).await {
            Ok(delivery_id) => return Ok(delivery_id),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                attempt += 1;
                debug!("Push attempt {attempt} failed ({err}), retrying in {delay:?}");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// This type is a sender to the push dispatcher
pub type PushDispatcherChan = Sender<PushDispatcherMessage>;

/// Messages to the push dispatcher
pub enum PushDispatcherMessage {
    /// Notify the given account
    Dispatch {
        /// The account to notify
        account: Uuid,
        /// The notification to deliver
        payload: PushPayload,
    },
}

/// Start the push dispatcher.
///
/// Every dispatch writes a durable in-app notification first. Push delivery
/// runs on a detached task afterwards; its failures are audited and
/// swallowed, they never reach the caller and never touch relationship
/// state.
pub async fn start_push_dispatcher(
    db: Database,
    gateway: Arc<dyn PushGateway>,
    policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
) -> Result<PushDispatcherChan, String> {
    let (tx, mut rx) = mpsc::channel(64);

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                PushDispatcherMessage::Dispatch { account, payload } => {
                    let account_model = match query!(&db, Account)
                        .condition(Account::F.uuid.equals(account))
                        .optional()
                        .await
                    {
                        Ok(Some(v)) => v,
                        Ok(None) => {
                            warn!("Dropping notification for unknown account {account}");
                            continue;
                        }
                        Err(err) => {
                            error!("Database error while resolving {account}: {err}");
                            continue;
                        }
                    };

                    // The in-app record is written regardless of push success
                    if let Err(err) = insert!(&db, NotificationInsert)
                        .single(&NotificationInsert {
                            account: ForeignModelByField::Key(account),
                            title: payload.title.clone(),
                            body: payload.body.clone(),
                            data: payload.data.clone(),
                            read: false,
                        })
                        .await
                    {
                        error!("Could not persist in-app notification: {err}");
                    }

                    let token = match account_model.push_token {
                        Some(token) if !token.is_empty() => token,
                        _ => {
                            // No registered device is terminal, there is
                            // nothing to retry against
                            audit_failure(&db, account, "account has no push token").await;
                            continue;
                        }
                    };

                    let db = db.clone();
                    let gateway = gateway.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        match deliver(gateway.as_ref(), &token, &payload, policy, shutdown).await {
                            Ok(delivery_id) => {
                                debug!("Push delivered to {account}: {delivery_id}");
                            }
                            Err(err) => {
                                audit_failure(&db, account, &format!("push failed: {err}")).await;
                            }
                        }
                    });
                }
            }
        }
    });

    Ok(tx)
}

async fn audit_failure(db: &Database, account: Uuid, details: &str) {
    if let Err(err) = insert!(db, ActivityLogInsert)
        .single(&audit::entry(
            account,
            None,
            AuditAction::NotificationFailed,
            details,
        ))
        .await
    {
        error!("Could not write audit entry: {err}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn test_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            multiplier: 2,
            max_delay: Duration::from_millis(10),
            max_retries: 3,
        }
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(10),
            max_retries: 3,
        };

        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(4), Duration::from_secs(10));
        assert_eq!(policy.delay(31), Duration::from_secs(10));
    }

    #[test]
    fn only_provider_rejections_are_terminal() {
        assert!(PushError::InvalidToken.is_retryable());
        assert!(PushError::Network("reset".into()).is_retryable());
        assert!(PushError::Unavailable.is_retryable());
        assert!(PushError::Internal("oops".into()).is_retryable());
        assert!(!PushError::Rejected("bad payload".into()).is_retryable());
    }

    struct FlakyGateway {
        failures: AtomicU32,
        calls: AtomicU32,
    }

    impl PushGateway for FlakyGateway {
        fn push<'a>(
            &'a self,
            _token: &'a str,
            _payload: &'a PushPayload,
        ) -> BoxFuture<'a, Result<String, PushError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.failures.load(Ordering::SeqCst) > 0 {
                    self.failures.fetch_sub(1, Ordering::SeqCst);
                    Err(PushError::Unavailable)
                } else {
                    Ok("delivery-1".to_string())
                }
            })
        }
    }

    fn payload() -> PushPayload {
        PushPayload {
            title: "New partner request".to_string(),
            body: "Somebody wants to pair up".to_string(),
            data: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let gateway = FlakyGateway {
            failures: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        };
        let (_tx, rx) = watch::channel(false);

        let res = deliver(&gateway, "token", &payload(), test_policy(), rx).await;

        assert_eq!(res.unwrap(), "delivery-1");
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_exhausted_after_max_retries() {
        let gateway = FlakyGateway {
            failures: AtomicU32::new(u32::MAX),
            calls: AtomicU32::new(0),
        };
        let (_tx, rx) = watch::channel(false);

        let res = deliver(&gateway, "token", &payload(), test_policy(), rx).await;

        assert!(res.is_err());
        // initial attempt + 3 retries
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 4);
    }

    struct RejectingGateway {
        calls: AtomicU32,
    }

    impl PushGateway for RejectingGateway {
        fn push<'a>(
            &'a self,
            _token: &'a str,
            _payload: &'a PushPayload,
        ) -> BoxFuture<'a, Result<String, PushError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(PushError::Rejected("malformed".into()))
            })
        }
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let gateway = RejectingGateway {
            calls: AtomicU32::new(0),
        };
        let (_tx, rx) = watch::channel(false);

        let res = deliver(&gateway, "token", &payload(), test_policy(), rx).await;

        assert!(res.is_err());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }
}
