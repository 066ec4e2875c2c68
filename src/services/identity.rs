use crate::adapters::transport::{MessagingTransport, TransportError};
use crate::domain::identity::{AuthorizationStatus, IdentitySource, MessagingIdentity};
use crate::domain::platform::Platform;
use crate::error::{AppError, Result};
use backon::{ConstantBuilder, Retryable};
use futures::StreamExt;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Invoked with the new token every time the transport refreshes it.
pub type TokenCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Error, Debug)]
enum FetchError {
    #[error("transport returned an empty token")]
    Empty,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Clone, Debug)]
struct Metrics {
    acquisitions_total: Counter<u64>,
    refreshes_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("push-lifecycle");
        Self {
            acquisitions_total: meter
                .u64_counter("identity_acquisitions_total")
                .with_description("Messaging identity acquisitions, by status")
                .build(),
            refreshes_total: meter
                .u64_counter("identity_refreshes_total")
                .with_description("Token refresh events applied")
                .build(),
        }
    }
}

/// Owns the device's [`MessagingIdentity`]: initial fetch with a single retry, refresh events,
/// and the permission request.
pub struct IdentityAcquirer {
    identity: watch::Sender<MessagingIdentity>,
    on_token_changed: Mutex<Option<TokenCallback>>,
    retry_delay: Duration,
    metrics: Metrics,
}

impl std::fmt::Debug for IdentityAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityAcquirer")
            .field("identity", &*self.identity.borrow())
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl IdentityAcquirer {
    #[must_use]
    pub fn new(retry_delay: Duration) -> Self {
        let (identity, _rx) = watch::channel(MessagingIdentity::default());
        Self { identity, on_token_changed: Mutex::new(None), retry_delay, metrics: Metrics::new() }
    }

    #[must_use]
    pub fn current(&self) -> MessagingIdentity {
        self.identity.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MessagingIdentity> {
        self.identity.subscribe()
    }

    /// Replaces (or clears) the single token-changed callback.
    pub fn set_on_token_changed(&self, callback: Option<TokenCallback>) {
        *self.on_token_changed.lock().unwrap_or_else(PoisonError::into_inner) = callback;
    }

    fn token_callback(&self) -> Option<TokenCallback> {
        self.on_token_changed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Fetches the messaging identity, retrying once after the configured delay if the
    /// transport has no token yet.
    ///
    /// # Errors
    /// Returns `AppError::IdentityUnavailable` if the token is still missing after the retry.
    /// The stored identity keeps its previous (possibly empty) token in that case.
    #[tracing::instrument(skip(self, transport), fields(platform = platform.as_str()))]
    pub async fn acquire(&self, transport: &dyn MessagingTransport, platform: Platform) -> Result<MessagingIdentity> {
        let started_at = OffsetDateTime::now_utc();

        if platform.uses_secondary_token() {
            match transport.secondary_token().await {
                Ok(Some(token)) if !token.is_empty() => {
                    self.identity.send_modify(|identity| identity.secondary_token = Some(token));
                }
                Ok(_) => tracing::info!("Secondary platform token not available yet"),
                Err(e) => tracing::info!(error = %e, "Secondary platform token could not be fetched"),
            }
        }

        let fetch = || async move {
            match transport.token().await? {
                Some(token) if !token.is_empty() => Ok::<String, FetchError>(token),
                _ => Err(FetchError::Empty),
            }
        };

        let result = fetch
            .retry(ConstantBuilder::default().with_delay(self.retry_delay).with_max_times(1))
            .notify(|e: &FetchError, delay: Duration| {
                tracing::info!(error = %e, retry_in = ?delay, "Messaging token not available, retrying");
            })
            .await;

        match result {
            Ok(token) => {
                let stored = self.identity.send_if_modified(|identity| {
                    if identity.refreshed_since(started_at) {
                        return false;
                    }
                    identity.token = token;
                    identity.last_refreshed_at = Some(OffsetDateTime::now_utc());
                    identity.source = IdentitySource::Fetched;
                    true
                });
                if !stored {
                    tracing::debug!("Token refreshed during acquisition, keeping refreshed value");
                }
                self.metrics.acquisitions_total.add(1, &[KeyValue::new("status", "acquired")]);
                tracing::info!("Messaging identity acquired");
                Ok(self.current())
            }
            Err(e) => {
                self.metrics.acquisitions_total.add(1, &[KeyValue::new("status", "unavailable")]);
                tracing::error!(error = %e, "Messaging token unavailable after retry, continuing with empty identity");
                Err(AppError::IdentityUnavailable)
            }
        }
    }

    /// Applies one refresh event. Refreshes always win over an in-flight acquisition.
    pub fn apply_refresh(&self, token: &str) {
        if token.is_empty() {
            tracing::debug!("Ignoring empty token refresh");
            return;
        }

        self.identity.send_modify(|identity| {
            token.clone_into(&mut identity.token);
            identity.last_refreshed_at = Some(OffsetDateTime::now_utc());
            identity.source = IdentitySource::Refreshed;
        });
        self.metrics.refreshes_total.add(1, &[]);
        tracing::info!("Messaging token refreshed");

        if let Some(callback) = self.token_callback() {
            callback(token);
        }
    }

    /// Spawns the standing refresh subscription. It stops when `shutdown` flips to `true`
    /// or the transport ends the stream.
    pub fn watch_refreshes(
        self: &Arc<Self>,
        transport: &dyn MessagingTransport,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let mut refreshes = transport.token_refreshes();
        let acquirer = Arc::clone(self);

        tokio::spawn(
            async move {
                while !*shutdown.borrow() {
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        next = refreshes.next() => match next {
                            Some(token) => acquirer.apply_refresh(&token),
                            None => break,
                        },
                    }
                }
                tracing::debug!("Token refresh listener stopped");
            }
            .instrument(tracing::info_span!("token_refresh_listener")),
        )
    }

    /// Asks the transport for notification permission.
    ///
    /// Without a connected transport this is a misuse; it is logged and reported as
    /// `NotDetermined` rather than failing.
    pub async fn request_permission(&self, transport: Option<&dyn MessagingTransport>) -> AuthorizationStatus {
        let Some(transport) = transport else {
            tracing::error!(error = %AppError::PermissionQueryMisuse, "Permission requested too early");
            return AuthorizationStatus::NotDetermined;
        };

        match transport.request_permission().await {
            Ok(status) => {
                tracing::info!(status = ?status, "Notification permission resolved");
                status
            }
            Err(e) => {
                tracing::error!(error = %e, "Permission request failed");
                AuthorizationStatus::NotDetermined
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DELAY: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_acquire_first_try() {
        let transport = MemoryTransport::new();
        transport.push_token(Some("T1"));
        let acquirer = IdentityAcquirer::new(DELAY);

        let identity = acquirer.acquire(transport.as_ref(), Platform::Android).await.unwrap();

        assert_eq!(identity.token, "T1");
        assert_eq!(identity.source, IdentitySource::Fetched);
        assert!(identity.last_refreshed_at.is_some());
        assert_eq!(transport.token_calls(), 1);
    }

    #[tokio::test]
    async fn test_acquire_succeeds_on_retry() {
        let transport = MemoryTransport::new();
        transport.push_token(Some(""));
        transport.push_token(Some("T2"));
        let acquirer = IdentityAcquirer::new(DELAY);

        let identity = acquirer.acquire(transport.as_ref(), Platform::Android).await.unwrap();

        assert_eq!(identity.token, "T2");
        assert_eq!(transport.token_calls(), 2);
    }

    #[tokio::test]
    async fn test_acquire_gives_up_after_one_retry() {
        let transport = MemoryTransport::new();
        transport.push_token(Some(""));
        transport.push_token(None);
        transport.push_token(Some("never-reached"));
        let acquirer = IdentityAcquirer::new(DELAY);

        let result = acquirer.acquire(transport.as_ref(), Platform::Android).await;

        assert!(matches!(result, Err(AppError::IdentityUnavailable)));
        assert_eq!(transport.token_calls(), 2);
        assert!(acquirer.current().token.is_empty());
    }

    #[tokio::test]
    async fn test_secondary_token_only_on_apple() {
        let transport = MemoryTransport::new();
        transport.set_secondary_token(Some("apns-1"));
        transport.push_token(Some("T1"));
        transport.push_token(Some("T1"));

        let android = IdentityAcquirer::new(DELAY);
        let identity = android.acquire(transport.as_ref(), Platform::Android).await.unwrap();
        assert_eq!(identity.secondary_token, None);

        let apple = IdentityAcquirer::new(DELAY);
        let identity = apple.acquire(transport.as_ref(), Platform::Apple).await.unwrap();
        assert_eq!(identity.secondary_token.as_deref(), Some("apns-1"));
    }

    #[tokio::test]
    async fn test_missing_secondary_token_is_not_an_error() {
        let transport = MemoryTransport::new();
        transport.push_token(Some("T1"));
        let acquirer = IdentityAcquirer::new(DELAY);

        let identity = acquirer.acquire(transport.as_ref(), Platform::Apple).await.unwrap();
        assert_eq!(identity.token, "T1");
        assert_eq!(identity.secondary_token, None);
    }

    #[tokio::test]
    async fn test_refresh_replaces_token_and_invokes_callback() {
        let acquirer = IdentityAcquirer::new(DELAY);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        acquirer.set_on_token_changed(Some(Arc::new(move |token: &str| {
            assert_eq!(token, "R1");
            seen.fetch_add(1, Ordering::SeqCst);
        })));

        acquirer.apply_refresh("R1");
        acquirer.apply_refresh("");

        let identity = acquirer.current();
        assert_eq!(identity.token, "R1");
        assert_eq!(identity.source, IdentitySource::Refreshed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_wins_over_slower_acquisition() {
        let acquirer = IdentityAcquirer::new(DELAY);
        let transport = MemoryTransport::new();
        transport.push_token(None);
        transport.push_token(Some("stale"));

        let acquire = acquirer.acquire(transport.as_ref(), Platform::Android);
        let refresh = async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            acquirer.apply_refresh("fresh");
        };
        let (result, ()) = tokio::join!(acquire, refresh);

        assert_eq!(result.unwrap().token, "fresh");
        assert_eq!(acquirer.current().token, "fresh");
    }

    #[tokio::test]
    async fn test_permission_without_transport_is_not_determined() {
        let acquirer = IdentityAcquirer::new(DELAY);
        assert_eq!(acquirer.request_permission(None).await, AuthorizationStatus::NotDetermined);

        let transport = MemoryTransport::new();
        transport.set_permission(AuthorizationStatus::Provisional);
        assert_eq!(acquirer.request_permission(Some(transport.as_ref())).await, AuthorizationStatus::Provisional);
    }

    #[tokio::test]
    async fn test_watch_refreshes_stops_on_shutdown() {
        let acquirer = Arc::new(IdentityAcquirer::new(DELAY));
        let transport = MemoryTransport::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut identity_rx = acquirer.subscribe();

        let handle = acquirer.watch_refreshes(transport.as_ref(), shutdown_rx);
        transport.emit_refresh("R9");
        identity_rx.wait_for(|identity| identity.token == "R9").await.unwrap();

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
