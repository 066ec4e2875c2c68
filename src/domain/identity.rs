use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    #[default]
    Unresolved,
    Fetched,
    Refreshed,
}

/// The device's current push-routing identity.
///
/// `token` is empty until the transport yields a value. Only the identity acquirer writes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingIdentity {
    pub token: String,
    pub secondary_token: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_refreshed_at: Option<OffsetDateTime>,
    pub source: IdentitySource,
}

impl MessagingIdentity {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !self.token.is_empty()
    }

    /// True when a refresh event was recorded at or after `instant`.
    #[must_use]
    pub fn refreshed_since(&self, instant: OffsetDateTime) -> bool {
        self.source == IdentitySource::Refreshed && self.last_refreshed_at.is_some_and(|at| at >= instant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Granted,
    Denied,
    Provisional,
    NotDetermined,
}

/// How the platform presents pushes received while the app is in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationOptions {
    pub alert: bool,
    pub badge: bool,
    pub sound: bool,
}

impl PresentationOptions {
    #[must_use]
    pub const fn all() -> Self {
        Self { alert: true, badge: true, sound: true }
    }
}
