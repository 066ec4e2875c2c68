use crate::adapters::transport::{
    LocalRenderer, MessagingTransport, SelectionHandler, TransportError, TransportProvider,
};
use crate::domain::identity::{AuthorizationStatus, PresentationOptions};
use crate::domain::notification::{LocalNotification, RawMessage};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-consumer event feed. Events sent before the consumer attaches are buffered.
#[derive(Debug)]
struct Feed<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<T>>>,
}

impl<T: Send + 'static> Feed<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Mutex::new(Some(rx)) }
    }

    fn send(&self, value: T) {
        let _ = self.tx.send(value);
    }

    fn take_stream(&self) -> BoxStream<'static, T> {
        lock(&self.rx).take().map_or_else(
            || {
                tracing::warn!("Feed already consumed, returning empty stream");
                stream::empty().boxed()
            },
            |rx| UnboundedReceiverStream::new(rx).boxed(),
        )
    }
}

/// In-process transport driven by explicit calls. Backs the demo binary and the tests.
#[derive(Debug)]
pub struct MemoryTransport {
    tokens: Mutex<VecDeque<Option<String>>>,
    secondary_token: Mutex<Option<String>>,
    token_calls: AtomicUsize,
    refreshes: Feed<String>,
    foreground: Feed<RawMessage>,
    opened: Feed<RawMessage>,
    initial_message: Mutex<Option<RawMessage>>,
    permission: Mutex<AuthorizationStatus>,
    presentation: Mutex<Option<PresentationOptions>>,
    presentation_calls: AtomicUsize,
    fail_presentation: AtomicBool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self {
            tokens: Mutex::new(VecDeque::new()),
            secondary_token: Mutex::new(None),
            token_calls: AtomicUsize::new(0),
            refreshes: Feed::new(),
            foreground: Feed::new(),
            opened: Feed::new(),
            initial_message: Mutex::new(None),
            permission: Mutex::new(AuthorizationStatus::Granted),
            presentation: Mutex::new(None),
            presentation_calls: AtomicUsize::new(0),
            fail_presentation: AtomicBool::new(false),
        }
    }
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the answer for the next token fetch. Once the queue is empty, fetches return `None`.
    pub fn push_token(&self, token: Option<&str>) {
        lock(&self.tokens).push_back(token.map(str::to_owned));
    }

    pub fn set_secondary_token(&self, token: Option<&str>) {
        *lock(&self.secondary_token) = token.map(str::to_owned);
    }

    pub fn set_initial_message(&self, message: RawMessage) {
        *lock(&self.initial_message) = Some(message);
    }

    pub fn set_permission(&self, status: AuthorizationStatus) {
        *lock(&self.permission) = status;
    }

    pub fn fail_presentation_options(&self, fail: bool) {
        self.fail_presentation.store(fail, Ordering::SeqCst);
    }

    pub fn emit_refresh(&self, token: &str) {
        self.refreshes.send(token.to_owned());
    }

    pub fn deliver_foreground(&self, message: RawMessage) {
        self.foreground.send(message);
    }

    pub fn deliver_opened(&self, message: RawMessage) {
        self.opened.send(message);
    }

    #[must_use]
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn presentation_options(&self) -> Option<PresentationOptions> {
        *lock(&self.presentation)
    }

    #[must_use]
    pub fn presentation_calls(&self) -> usize {
        self.presentation_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingTransport for MemoryTransport {
    async fn token(&self) -> Result<Option<String>, TransportError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.tokens).pop_front().flatten())
    }

    async fn secondary_token(&self) -> Result<Option<String>, TransportError> {
        Ok(lock(&self.secondary_token).clone())
    }

    fn token_refreshes(&self) -> BoxStream<'static, String> {
        self.refreshes.take_stream()
    }

    async fn initial_message(&self) -> Result<Option<RawMessage>, TransportError> {
        Ok(lock(&self.initial_message).take())
    }

    fn messages(&self) -> BoxStream<'static, RawMessage> {
        self.foreground.take_stream()
    }

    fn opened_app_messages(&self) -> BoxStream<'static, RawMessage> {
        self.opened.take_stream()
    }

    async fn request_permission(&self) -> Result<AuthorizationStatus, TransportError> {
        Ok(*lock(&self.permission))
    }

    async fn set_foreground_presentation_options(&self, options: PresentationOptions) -> Result<(), TransportError> {
        self.presentation_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_presentation.load(Ordering::SeqCst) {
            return Err(TransportError::Other(anyhow::anyhow!("presentation options rejected")));
        }
        *lock(&self.presentation) = Some(options);
        Ok(())
    }
}

/// Hands out a shared [`MemoryTransport`]; can be told to fail to simulate a broken SDK.
#[derive(Debug)]
pub struct MemoryTransportProvider {
    transport: Arc<MemoryTransport>,
    fail: AtomicBool,
    connects: AtomicUsize,
}

impl MemoryTransportProvider {
    #[must_use]
    pub fn new(transport: Arc<MemoryTransport>) -> Arc<Self> {
        Arc::new(Self { transport, fail: AtomicBool::new(false), connects: AtomicUsize::new(0) })
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportProvider for MemoryTransportProvider {
    async fn connect(&self, app_name: &str) -> Result<Arc<dyn MessagingTransport>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable);
        }
        tracing::debug!(app_name = %app_name, "Memory transport connected");
        Ok(Arc::clone(&self.transport) as Arc<dyn MessagingTransport>)
    }
}

/// Renderer that records what it was asked to show and lets callers simulate a selection.
#[derive(Default)]
pub struct MemoryRenderer {
    channel: Mutex<Option<String>>,
    handler: Mutex<Option<SelectionHandler>>,
    shown: Mutex<Vec<LocalNotification>>,
    prepares: AtomicUsize,
    fail_prepare: AtomicBool,
}

impl std::fmt::Debug for MemoryRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRenderer")
            .field("channel", &*lock(&self.channel))
            .field("shown", &lock(&self.shown).len())
            .finish_non_exhaustive()
    }
}

impl MemoryRenderer {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_prepare(&self, fail: bool) {
        self.fail_prepare.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn channel(&self) -> Option<String> {
        lock(&self.channel).clone()
    }

    #[must_use]
    pub fn shown(&self) -> Vec<LocalNotification> {
        lock(&self.shown).clone()
    }

    /// Simulates the user tapping a local notification carrying `payload`.
    ///
    /// Returns `false` if no handler has been registered yet.
    pub fn select(&self, payload: Option<&str>) -> bool {
        let handler = lock(&self.handler).clone();
        handler.is_some_and(|handler| {
            handler(payload.map(str::to_owned));
            true
        })
    }
}

#[async_trait]
impl LocalRenderer for MemoryRenderer {
    async fn prepare(&self, channel_name: &str, on_select: SelectionHandler) -> Result<(), TransportError> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        if self.fail_prepare.load(Ordering::SeqCst) {
            return Err(TransportError::Other(anyhow::anyhow!("renderer channel could not be created")));
        }
        *lock(&self.channel) = Some(channel_name.to_owned());
        *lock(&self.handler) = Some(on_select);
        Ok(())
    }

    async fn show(&self, notification: LocalNotification) -> Result<(), TransportError> {
        lock(&self.shown).push(notification);
        Ok(())
    }
}
