use crate::domain::notification::{ArrivalState, CanonicalNotification, LocalNotification, Payload, RawMessage};
use crate::error::{AppError, Result};
use serde_json::Value;

/// Turns raw transport messages into [`CanonicalNotification`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageNormalizer;

impl MessageNormalizer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn normalize(&self, raw: &RawMessage, arrival_state: ArrivalState) -> CanonicalNotification {
        CanonicalNotification {
            message_id: raw.message_id.clone(),
            title: raw.notification.as_ref().and_then(|n| n.title.clone()),
            payload: raw.data.clone(),
            arrival_state,
        }
    }

    /// Normalizes a JSON-serialized data mapping, as handed back by the local renderer.
    ///
    /// Returns `Ok(None)` for an empty or missing string.
    ///
    /// # Errors
    /// Returns `AppError::MalformedPayload` if the string is not a JSON object.
    pub fn normalize_serialized(
        &self,
        serialized: Option<&str>,
        arrival_state: ArrivalState,
    ) -> Result<Option<CanonicalNotification>> {
        let Some(serialized) = serialized.map(str::trim).filter(|s| !s.is_empty()) else {
            tracing::info!(arrival_state = %arrival_state, "Serialized payload is empty, nothing to normalize");
            return Ok(None);
        };

        let payload = match serde_json::from_str::<Value>(serialized)? {
            Value::Object(map) => map,
            other => {
                return Err(AppError::MalformedPayload(format!("expected a JSON object, got {}", kind(&other))));
            }
        };

        Ok(Some(CanonicalNotification { message_id: None, title: None, payload, arrival_state }))
    }

    /// Builds what the local renderer shows for a foreground message.
    #[must_use]
    pub fn local_notification(&self, raw: &RawMessage) -> LocalNotification {
        let visible = raw.notification.clone().unwrap_or_default();
        LocalNotification {
            title: visible.title,
            body: visible.body,
            image_url: visible.image_url.filter(|url| !url.is_empty()),
            payload: serialize_payload(&raw.data),
        }
    }
}

fn serialize_payload(payload: &Payload) -> Option<String> {
    if payload.is_empty() {
        return None;
    }
    match serde_json::to_string(payload) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize payload for local notification");
            None
        }
    }
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
