use crate::adapters::transport::{LocalRenderer, MessagingTransport, SelectionHandler, TransportProvider};
use crate::config::CoordinatorConfig;
use crate::domain::identity::{AuthorizationStatus, MessagingIdentity};
use crate::domain::notification::{ArrivalState, RawMessage};
use crate::domain::platform::Platform;
use crate::error::{AppError, Result};
use crate::services::identity::{IdentityAcquirer, TokenCallback};
use crate::services::push_stream::{PushStream, PushSubscription};
use crate::services::router::StateRouter;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{OnceCell, watch};
use tracing::Instrument;

/// Top-level owner of the push pipeline.
///
/// Construct one per process, call [`prepare`](Self::prepare) once the app is ready, hand
/// out [`subscribe`](Self::subscribe) to consumers, and [`dispose`](Self::dispose) on exit.
#[derive(Debug)]
pub struct LifecycleCoordinator {
    provider: Arc<dyn TransportProvider>,
    renderer: Arc<dyn LocalRenderer>,
    platform: Platform,
    transport: OnceCell<Arc<dyn MessagingTransport>>,
    acquirer: Arc<IdentityAcquirer>,
    router: Arc<StateRouter>,
    stream: Arc<PushStream>,
    platform_ready: AtomicBool,
    paths_attached: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl LifecycleCoordinator {
    #[must_use]
    pub fn new(
        config: &CoordinatorConfig,
        provider: Arc<dyn TransportProvider>,
        renderer: Arc<dyn LocalRenderer>,
        platform: Platform,
    ) -> Self {
        let stream = Arc::new(PushStream::new(config.stream_capacity));
        let router = Arc::new(StateRouter::new(Arc::clone(&stream), Arc::clone(&renderer), platform));
        let (shutdown, _rx) = watch::channel(false);

        Self {
            provider,
            renderer,
            platform,
            transport: OnceCell::new(),
            acquirer: Arc::new(IdentityAcquirer::new(config.retry_delay())),
            router,
            stream,
            platform_ready: AtomicBool::new(false),
            paths_attached: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Connects the transport, applies platform setup, acquires the messaging identity and
    /// attaches the delivery paths.
    ///
    /// Returns `false` only if connecting or platform setup fails (or the coordinator was
    /// disposed); the caller may retry. Platform setup runs until it first succeeds. Identity acquisition and the delivery paths are
    /// best-effort and never fail this call.
    #[tracing::instrument(skip(self), fields(platform = self.platform.as_str()))]
    pub async fn prepare(&self, app_name: &str) -> bool {
        if self.is_disposed() {
            tracing::error!("Prepare called on a disposed push coordinator");
            return false;
        }

        let transport = match self.initialize(app_name).await {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!(error = %e, "Push coordinator initialization failed");
                return false;
            }
        };

        let first_attach = !self.paths_attached.swap(true, Ordering::SeqCst);
        if first_attach && self.platform.routes_foreground() {
            self.spawn_path(transport.messages(), ArrivalState::Foreground);
        }

        if let Err(e) = self.acquirer.acquire(transport.as_ref(), self.platform).await {
            tracing::debug!(error = %e, "Continuing without a messaging identity");
        }

        if first_attach {
            let _refresh_listener = self.acquirer.watch_refreshes(transport.as_ref(), self.shutdown.subscribe());
            self.spawn_initial_message_check(Arc::clone(&transport));
            self.spawn_path(transport.opened_app_messages(), ArrivalState::Background);
        } else {
            tracing::debug!("Delivery paths already attached");
        }

        tracing::info!(app_name = %app_name, "Push coordinator prepared");
        true
    }

    async fn initialize(&self, app_name: &str) -> Result<Arc<dyn MessagingTransport>> {
        let transport = self
            .transport
            .get_or_try_init(|| self.provider.connect(app_name))
            .await
            .map_err(|e| AppError::Initialization(e.into()))?;
        let transport = Arc::clone(transport);

        if self.platform_ready.load(Ordering::SeqCst) {
            return Ok(transport);
        }

        if let Some(options) = self.platform.presentation_options() {
            transport
                .set_foreground_presentation_options(options)
                .await
                .map_err(|e| AppError::Initialization(e.into()))?;
            tracing::debug!(options = ?options, "Foreground presentation options applied");
        }

        if self.platform.renders_foreground_locally() {
            let router = Arc::clone(&self.router);
            let on_select: SelectionHandler = Arc::new(move |payload: Option<String>| {
                router.receive_serialized(payload.as_deref());
            });
            self.renderer.prepare(app_name, on_select).await.map_err(|e| AppError::Initialization(e.into()))?;
            tracing::debug!("Local renderer prepared");
        }

        self.platform_ready.store(true, Ordering::SeqCst);
        Ok(transport)
    }

    /// Routes every message of one delivery path, in arrival order, until shutdown.
    fn spawn_path(&self, mut messages: BoxStream<'static, RawMessage>, arrival_state: ArrivalState) {
        let router = Arc::clone(&self.router);
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(
            async move {
                while !*shutdown.borrow() {
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        next = messages.next() => match next {
                            Some(raw) => {
                                router.receive(raw, arrival_state).await;
                            }
                            None => break,
                        },
                    }
                }
                tracing::debug!("Delivery path detached");
            }
            .instrument(tracing::info_span!("delivery_path", arrival_state = %arrival_state)),
        );
    }

    /// Fire-and-forget check for the push that launched the app from a terminated state.
    /// Nothing waits on it; failures are only logged.
    fn spawn_initial_message_check(&self, transport: Arc<dyn MessagingTransport>) {
        let router = Arc::clone(&self.router);

        tokio::spawn(
            async move {
                match transport.initial_message().await {
                    Ok(Some(raw)) => {
                        tracing::info!("App opened from a terminated state by a push");
                        router.receive(raw, ArrivalState::Terminated).await;
                    }
                    Ok(None) => tracing::debug!("No initial message"),
                    Err(e) => tracing::error!(error = %e, "Initial message check failed"),
                }
            }
            .instrument(tracing::info_span!("initial_message_check")),
        );
    }

    /// Stops every delivery path and closes the push stream. Closing is final.
    pub fn dispose(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        self.stream.close();
        tracing::info!("Push coordinator disposed");
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        *self.shutdown.borrow()
    }

    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// Current messaging token; empty while unresolved.
    #[must_use]
    pub fn token(&self) -> String {
        self.acquirer.current().token
    }

    #[must_use]
    pub fn secondary_token(&self) -> Option<String> {
        self.acquirer.current().secondary_token
    }

    /// Read-only view of the identity that updates on every refresh.
    #[must_use]
    pub fn identity(&self) -> watch::Receiver<MessagingIdentity> {
        self.acquirer.subscribe()
    }

    pub fn set_on_token_changed(&self, callback: Option<TokenCallback>) {
        self.acquirer.set_on_token_changed(callback);
    }

    /// Subscribes to the push stream. The last published payload, if any, is delivered first.
    #[must_use]
    pub fn subscribe(&self) -> PushSubscription {
        self.stream.subscribe()
    }

    pub async fn request_permission(&self) -> AuthorizationStatus {
        let transport: Option<&dyn MessagingTransport> = self.transport.get().map(|t| &**t);
        self.acquirer.request_permission(transport).await
    }
}
