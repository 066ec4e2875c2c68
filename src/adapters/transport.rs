use crate::domain::identity::{AuthorizationStatus, PresentationOptions};
use crate::domain::notification::{LocalNotification, RawMessage};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport is not available")]
    Unavailable,
    #[error("External service error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Connects to the messaging transport for a named application.
#[async_trait]
pub trait TransportProvider: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// Returns an error if the transport cannot be initialized.
    async fn connect(&self, app_name: &str) -> Result<Arc<dyn MessagingTransport>, TransportError>;
}

/// The push transport SDK as seen by the coordinator.
#[async_trait]
pub trait MessagingTransport: Send + Sync + std::fmt::Debug {
    /// Current identity token. `None` or an empty string means not yet issued.
    async fn token(&self) -> Result<Option<String>, TransportError>;

    /// Platform-assigned secondary token, only meaningful on the Apple family.
    async fn secondary_token(&self) -> Result<Option<String>, TransportError>;

    fn token_refreshes(&self) -> BoxStream<'static, String>;

    /// The message that launched the app from a terminated state, if any.
    async fn initial_message(&self) -> Result<Option<RawMessage>, TransportError>;

    /// Messages delivered while the app is in the foreground.
    fn messages(&self) -> BoxStream<'static, RawMessage>;

    /// Messages whose notification was tapped while the app was in the background.
    fn opened_app_messages(&self) -> BoxStream<'static, RawMessage>;

    async fn request_permission(&self) -> Result<AuthorizationStatus, TransportError>;

    async fn set_foreground_presentation_options(&self, options: PresentationOptions) -> Result<(), TransportError>;
}

/// Receives the serialized payload of a local notification the user selected.
pub type SelectionHandler = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// On-device renderer used to show foreground pushes.
#[async_trait]
pub trait LocalRenderer: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// Returns an error if the renderer cannot register its channel.
    async fn prepare(&self, channel_name: &str, on_select: SelectionHandler) -> Result<(), TransportError>;

    /// # Errors
    /// Returns an error if the notification could not be displayed.
    async fn show(&self, notification: LocalNotification) -> Result<(), TransportError>;
}
