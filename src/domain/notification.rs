use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form data mapping carried by a push. Never null; an absent payload is an empty map.
pub type Payload = Map<String, Value>;

/// Application state in which a push reached the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalState {
    Foreground,
    Background,
    Terminated,
}

impl ArrivalState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
            Self::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for ArrivalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visible part of a push as the transport delivers it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNotification {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Inbound message in the shape the transport hands it over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub notification: Option<RawNotification>,
    #[serde(default)]
    pub data: Payload,
}

impl RawMessage {
    #[must_use]
    pub fn with_data(data: Payload) -> Self {
        Self { data, ..Self::default() }
    }
}

/// The unified record for one inbound push, whatever path delivered it.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalNotification {
    pub message_id: Option<String>,
    pub title: Option<String>,
    pub payload: Payload,
    pub arrival_state: ArrivalState,
}

impl CanonicalNotification {
    #[must_use]
    pub fn has_payload(&self) -> bool {
        !self.payload.is_empty()
    }
}

/// What the local renderer is asked to display for a foreground push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalNotification {
    pub title: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
    /// JSON-serialized data mapping, handed back on selection.
    pub payload: Option<String>,
}
