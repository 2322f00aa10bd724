//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide), plus the
//! `PageSignal` stream the artifact locator observes.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Which observation channel reported a network signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkChannel {
    /// Page-level response observer; carries the response MIME type.
    Response,
    /// Lower-level session request subscription; address only.
    Request,
}

/// An event observed on a page while an artifact is being located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSignal {
    /// A secondary window opened by the page settled on `url`.
    Popup { url: String },
    /// A network exchange was observed.
    Network {
        channel: NetworkChannel,
        url: String,
        mime_type: Option<String>,
    },
}

/// Stream of page signals; ends when the page goes away.
pub type SignalStream = BoxStream<'static, PageSignal>;

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
///
/// All methods take `&self` so the context can be shared between the
/// resolver and the observer tasks it spawns.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    ///
    /// Promise results are awaited.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Register a script evaluated in every new document before page scripts.
    async fn add_init_script(&self, script: &str) -> Result<()>;
    /// Subscribe to popup and network signals from this point on.
    async fn observe(&self, popup_wait_ms: u64) -> Result<SignalStream>;
    /// Whether the context was explicitly closed.
    fn is_closed(&self) -> bool;
    /// Close this context.
    async fn close(&self) -> Result<()>;
}
