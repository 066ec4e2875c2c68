use crate::domain::notification::Payload;
use crate::error::{AppError, Result};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

#[derive(Debug)]
struct State {
    sender: Option<broadcast::Sender<Payload>>,
    last: Option<Payload>,
}

/// Multicast stream of published payloads that replays the most recent one to new subscribers.
///
/// The cache and the broadcast send are updated under one lock, so a subscriber never misses
/// or double-sees the event published while it attaches. Closing drops the sender; it cannot be
/// reopened.
#[derive(Debug)]
pub struct PushStream {
    state: Mutex<State>,
}

impl PushStream {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _rx) = broadcast::channel(capacity.max(1));
        Self { state: Mutex::new(State { sender: Some(sender), last: None }) }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes a payload to every current subscriber and caches it for late ones.
    ///
    /// # Errors
    /// Returns `AppError::StreamClosed` once the stream has been closed.
    pub fn publish(&self, payload: Payload) -> Result<()> {
        let mut state = self.state();
        let Some(sender) = state.sender.as_ref() else {
            return Err(AppError::StreamClosed);
        };
        // No receivers is fine; the cache still serves the next subscriber.
        let _ = sender.send(payload.clone());
        state.last = Some(payload);
        Ok(())
    }

    #[must_use]
    pub fn subscribe(&self) -> PushSubscription {
        let state = self.state();
        let Some(sender) = state.sender.as_ref() else {
            return PushSubscription { replay: None, live: None };
        };
        PushSubscription { replay: state.last.clone(), live: Some(sender.subscribe()) }
    }

    #[must_use]
    pub fn latest(&self) -> Option<Payload> {
        self.state().last.clone()
    }

    /// Closes the stream and forgets the cached payload, so later subscribers see nothing.
    pub fn close(&self) {
        let mut state = self.state();
        state.last = None;
        if state.sender.take().is_some() {
            tracing::debug!("Push stream closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().sender.is_none()
    }
}

/// One consumer's view of the [`PushStream`]: the cached payload first, then live events.
#[derive(Debug)]
pub struct PushSubscription {
    replay: Option<Payload>,
    live: Option<broadcast::Receiver<Payload>>,
}

impl PushSubscription {
    /// Waits for the next payload. Returns `None` once the stream is closed and drained.
    pub async fn recv(&mut self) -> Option<Payload> {
        if let Some(payload) = self.replay.take() {
            return Some(payload);
        }
        let live = self.live.as_mut()?;
        loop {
            match live.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "Push stream subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.live = None;
                    return None;
                }
            }
        }
    }

    /// Converts the subscription into a `Stream`, skipping over lag gaps.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, Payload> {
        let replay = stream::iter(self.replay);
        let Some(live) = self.live else {
            return replay.boxed();
        };
        let live = BroadcastStream::new(live).filter_map(|item| async move {
            match item {
                Ok(payload) => Some(payload),
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "Push stream subscriber lagged");
                    None
                }
            }
        });
        replay.chain(live).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(route: &str) -> Payload {
        let mut map = Payload::new();
        map.insert("route".to_string(), json!(route));
        map
    }

    #[tokio::test]
    async fn test_subscriber_receives_live_events_in_order() {
        let stream = PushStream::new(8);
        let mut sub = stream.subscribe();

        stream.publish(payload("/a")).unwrap();
        stream.publish(payload("/b")).unwrap();

        assert_eq!(sub.recv().await, Some(payload("/a")));
        assert_eq!(sub.recv().await, Some(payload("/b")));
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_only_latest() {
        let stream = PushStream::new(8);
        stream.publish(payload("/a")).unwrap();
        stream.publish(payload("/b")).unwrap();

        let mut late = stream.subscribe();
        assert_eq!(late.recv().await, Some(payload("/b")));

        stream.publish(payload("/c")).unwrap();
        assert_eq!(late.recv().await, Some(payload("/c")));
    }

    #[tokio::test]
    async fn test_fresh_subscriber_has_nothing_to_replay() {
        let stream = PushStream::new(8);
        let mut sub = stream.subscribe();
        stream.close();
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        let stream = PushStream::new(8);
        let mut sub = stream.subscribe();
        stream.close();

        let result = stream.publish(payload("/late"));
        assert!(matches!(result, Err(AppError::StreamClosed)));
        assert!(stream.is_closed());
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_subscriber_after_close_gets_nothing() {
        let stream = PushStream::new(8);
        stream.publish(payload("/old")).unwrap();
        stream.close();

        let mut late = stream.subscribe();
        assert_eq!(late.recv().await, None);
        assert!(stream.latest().is_none());
    }

    #[tokio::test]
    async fn test_close_still_delivers_buffered_events() {
        let stream = PushStream::new(8);
        let mut sub = stream.subscribe();
        stream.publish(payload("/a")).unwrap();
        stream.close();

        assert_eq!(sub.recv().await, Some(payload("/a")));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_into_stream_replays_then_streams() {
        let stream = PushStream::new(8);
        stream.publish(payload("/a")).unwrap();
        let sub = stream.subscribe().into_stream();
        stream.publish(payload("/b")).unwrap();
        stream.close();

        let collected: Vec<Payload> = sub.collect().await;
        assert_eq!(collected, vec![payload("/a"), payload("/b")]);
    }
}
