use crate::adapters::transport::LocalRenderer;
use crate::domain::notification::{ArrivalState, CanonicalNotification, RawMessage};
use crate::domain::platform::Platform;
use crate::error::Result;
use crate::services::normalizer::MessageNormalizer;
use crate::services::push_stream::PushStream;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;

#[derive(Clone, Debug)]
struct Metrics {
    routed_total: Counter<u64>,
    malformed_total: Counter<u64>,
    rendered_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("push-lifecycle");
        Self {
            routed_total: meter
                .u64_counter("push_routed_total")
                .with_description("Inbound pushes routed, by outcome and arrival state")
                .build(),
            malformed_total: meter
                .u64_counter("push_malformed_total")
                .with_description("Serialized payloads that could not be parsed")
                .build(),
            rendered_total: meter
                .u64_counter("push_rendered_total")
                .with_description("Foreground pushes handed to the local renderer")
                .build(),
        }
    }
}

/// Terminal result of routing one canonical notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Dropped,
    Published,
}

impl RouteOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Dropped => "dropped",
            Self::Published => "published",
        }
    }
}

/// Progress of a single message along its arrival path.
///
/// `Idle -> Receiving -> Normalized -> {Dropped | Published}`. A message that fails to
/// normalize or publish leaves its path back at `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Idle,
    Receiving,
    Normalized,
    Dropped,
    Published,
}

impl From<RouteOutcome> for PathState {
    fn from(outcome: RouteOutcome) -> Self {
        match outcome {
            RouteOutcome::Dropped => Self::Dropped,
            RouteOutcome::Published => Self::Published,
        }
    }
}

/// Dispatches canonical notifications onto the shared push stream.
#[derive(Debug)]
pub struct StateRouter {
    normalizer: MessageNormalizer,
    stream: Arc<PushStream>,
    renderer: Arc<dyn LocalRenderer>,
    platform: Platform,
    metrics: Metrics,
}

impl StateRouter {
    #[must_use]
    pub fn new(stream: Arc<PushStream>, renderer: Arc<dyn LocalRenderer>, platform: Platform) -> Self {
        Self { normalizer: MessageNormalizer::new(), stream, renderer, platform, metrics: Metrics::new() }
    }

    /// Publishes the notification's payload, or drops it if the payload is empty.
    ///
    /// # Errors
    /// Returns `AppError::StreamClosed` if the push stream has been closed.
    pub fn route(&self, notification: CanonicalNotification) -> Result<RouteOutcome> {
        let arrival_state = notification.arrival_state;
        let outcome = if notification.has_payload() {
            self.stream.publish(notification.payload)?;
            tracing::debug!(arrival_state = %arrival_state, message_id = ?notification.message_id, "Push published");
            RouteOutcome::Published
        } else {
            tracing::info!(arrival_state = %arrival_state, message_id = ?notification.message_id, "Push has no data payload, dropping");
            RouteOutcome::Dropped
        };

        self.metrics.routed_total.add(
            1,
            &[KeyValue::new("outcome", outcome.as_str()), KeyValue::new("arrival_state", arrival_state.as_str())],
        );
        Ok(outcome)
    }

    /// Handles one raw message from the given arrival path.
    #[tracing::instrument(level = "debug", skip(self, raw), fields(message_id = ?raw.message_id))]
    pub async fn receive(&self, raw: RawMessage, arrival_state: ArrivalState) -> PathState {
        tracing::trace!(state = ?PathState::Receiving, "Push received");

        if arrival_state == ArrivalState::Foreground && self.platform.renders_foreground_locally() {
            self.render(&raw).await;
        }

        let notification = self.normalizer.normalize(&raw, arrival_state);
        tracing::trace!(state = ?PathState::Normalized, "Push normalized");
        self.finish(notification)
    }

    /// Handles the serialized payload of a local notification the user selected.
    #[tracing::instrument(level = "debug", skip(self, serialized))]
    pub fn receive_serialized(&self, serialized: Option<&str>) -> PathState {
        tracing::trace!(state = ?PathState::Receiving, "Selection received");

        match self.normalizer.normalize_serialized(serialized, ArrivalState::Foreground) {
            Ok(Some(notification)) => self.finish(notification),
            Ok(None) => PathState::Idle,
            Err(e) => {
                tracing::error!(error = %e, "Failed to normalize selected notification payload");
                self.metrics.malformed_total.add(1, &[]);
                PathState::Idle
            }
        }
    }

    fn finish(&self, notification: CanonicalNotification) -> PathState {
        match self.route(notification) {
            Ok(outcome) => outcome.into(),
            Err(e) => {
                tracing::warn!(error = %e, "Push could not be routed");
                PathState::Idle
            }
        }
    }

    async fn render(&self, raw: &RawMessage) {
        let local = self.normalizer.local_notification(raw);
        if local.title.is_none() && local.body.is_none() {
            tracing::debug!("Foreground push has nothing visible to render");
            return;
        }
        if let Err(e) = self.renderer.show(local).await {
            tracing::warn!(error = %e, "Local renderer failed to show foreground push");
        } else {
            self.metrics.rendered_total.add(1, &[]);
        }
    }
}
