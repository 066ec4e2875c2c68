use push_lifecycle::LifecycleCoordinator;
use push_lifecycle::adapters::memory::{MemoryRenderer, MemoryTransport, MemoryTransportProvider};
use push_lifecycle::config::CoordinatorConfig;
use push_lifecycle::domain::notification::{Payload, RawMessage, RawNotification};
use push_lifecycle::domain::platform::Platform;
use push_lifecycle::services::PushSubscription;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

static INIT: Once = Once::new();

pub const APP_NAME: &str = "demo-app";

#[allow(dead_code)]
pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("push_lifecycle=debug".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().init();
    });
}

#[allow(dead_code)]
pub struct Harness {
    pub transport: Arc<MemoryTransport>,
    pub provider: Arc<MemoryTransportProvider>,
    pub renderer: Arc<MemoryRenderer>,
    pub coordinator: LifecycleCoordinator,
}

#[allow(dead_code)]
pub fn harness(platform: Platform) -> Harness {
    let config = CoordinatorConfig { retry_delay_ms: 10, stream_capacity: 64, ..CoordinatorConfig::default() };
    let transport = MemoryTransport::new();
    let provider = MemoryTransportProvider::new(Arc::clone(&transport));
    let renderer = MemoryRenderer::new();
    let coordinator =
        LifecycleCoordinator::new(&config, Arc::clone(&provider) as _, Arc::clone(&renderer) as _, platform);
    Harness { transport, provider, renderer, coordinator }
}

#[allow(dead_code)]
pub fn data(value: serde_json::Value) -> Payload {
    value.as_object().cloned().expect("test payload must be a JSON object")
}

#[allow(dead_code)]
pub fn message(value: serde_json::Value) -> RawMessage {
    RawMessage {
        message_id: None,
        notification: Some(RawNotification {
            title: Some("Title".to_string()),
            body: Some("Body".to_string()),
            image_url: None,
        }),
        data: data(value),
    }
}

/// Next payload, or `None` if nothing arrives within two seconds.
#[allow(dead_code)]
pub async fn next_payload(sub: &mut PushSubscription) -> Option<Payload> {
    tokio::time::timeout(Duration::from_secs(2), sub.recv()).await.ok().flatten()
}

/// Asserts that the subscription stays silent for a short window.
#[allow(dead_code)]
pub async fn assert_silent(sub: &mut PushSubscription) {
    let result = tokio::time::timeout(Duration::from_millis(150), sub.recv()).await;
    assert!(result.is_err(), "expected no payload, got {result:?}");
}

/// Records the level and message of every event, for asserting on log output.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct CapturedLogs(Arc<Mutex<Vec<(Level, String)>>>);

#[allow(dead_code)]
impl CapturedLogs {
    pub fn entries(&self) -> Vec<(Level, String)> {
        self.0.lock().unwrap().clone()
    }

    pub fn matching(&self, needle: &str) -> Vec<(Level, String)> {
        self.entries().into_iter().filter(|(_, message)| message.contains(needle)).collect()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.0.lock().unwrap().push((*event.metadata().level(), visitor.0));
    }
}
