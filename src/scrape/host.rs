//! Contract of the embedded browser the session drives

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::protocol::DEFAULT_MESSAGE_BRIDGE;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("page failed to load: {0}")]
    Load(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("browser instance is closed")]
    Closed,
}

/// Events the host reports asynchronously
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Raw text posted through the message bridge
    Message(String),
    /// Transport-level load failure, distinct from page content
    LoadError(String),
    /// HTTP error status of the main document
    HttpError(u16),
}

pub type HostEventSender = mpsc::UnboundedSender<HostEvent>;
pub type HostEventReceiver = mpsc::UnboundedReceiver<HostEvent>;

/// Everything needed to open the off-screen page
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub url: String,
    /// Installed before any page script runs
    pub before_content_script: String,
    /// Evaluated again once the document has loaded
    pub after_load_script: String,
    pub events: HostEventSender,
}

/// An off-screen browser engine able to run the real site
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// Expression of the object whose `postMessage` reaches [`HostEvent::Message`]
    fn message_bridge(&self) -> &str {
        DEFAULT_MESSAGE_BRIDGE
    }

    async fn load(&self, request: LoadRequest) -> Result<(), HostError>;

    async fn reload(&self) -> Result<(), HostError>;

    async fn current_url(&self) -> Result<String, HostError>;

    /// Rendered text content of the current document body
    async fn body_text(&self) -> Result<String, HostError>;

    /// Release the browser instance
    async fn close(&self);
}
