//! Browser driver abstraction.
//!
//! The extractor only needs a handful of operations from a browser; keeping
//! them behind traits lets a scripted session stand in for Chromium.

use anyhow::Result;
use async_trait::async_trait;

/// A navigation control found on the current page, addressed by its
/// position in the most recent `find_controls` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control(pub usize);

/// Starts isolated browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// One isolated browser with a single open tab.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;
    /// Controls matching a CSS selector, in document order.
    async fn find_controls(&mut self, selector: &str) -> Result<Vec<Control>>;
    /// Visible text of a control, untrimmed.
    async fn label(&mut self, control: Control) -> Result<String>;
    async fn click(&mut self, control: Control) -> Result<()>;
    async fn current_url(&mut self) -> Result<String>;
    /// Tear the browser down.
    async fn quit(self: Box<Self>) -> Result<()>;
}
