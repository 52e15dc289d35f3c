//! Headless Chromium driver using chromiumoxide.

use super::browser::{BrowserLauncher, BrowserSession, Control};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use tokio::task::JoinHandle;

/// Locate a Chromium binary: explicit path first, then the usual names on
/// `PATH`. `None` leaves detection to chromiumoxide.
pub fn find_chromium(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.clone());
        }
        tracing::warn!("CHROMIUM_PATH {} does not exist, searching PATH", path.display());
    }

    ["google-chrome", "chromium", "chromium-browser"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
}

/// Launches a fresh headless Chromium for every session.
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new(chromium_path: Option<&PathBuf>) -> Self {
        Self {
            executable: find_chromium(chromium_path),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // The handler drives the CDP connection and must be polled for as
        // long as the browser is in use.
        let pump = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                pump.abort();
                return Err(anyhow!("failed to open a tab: {e}"));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            pump,
            controls: Vec::new(),
        }))
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    pump: JoinHandle<()>,
    controls: Vec<Element>,
}

impl ChromiumSession {
    fn control(&self, control: Control) -> Result<&Element> {
        self.controls
            .get(control.0)
            .ok_or_else(|| anyhow!("control #{} is no longer on the page", control.0))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        Ok(())
    }

    async fn find_controls(&mut self, selector: &str) -> Result<Vec<Control>> {
        // querySelectorAll yields an empty list when nothing matches, so any
        // error here is a CDP failure.
        self.controls = self
            .page
            .find_elements(selector)
            .await
            .with_context(|| format!("failed to query '{selector}'"))?;
        Ok((0..self.controls.len()).map(Control).collect())
    }

    async fn label(&mut self, control: Control) -> Result<String> {
        let text = self
            .control(control)?
            .inner_text()
            .await
            .context("failed to read control text")?;
        Ok(text.unwrap_or_default())
    }

    async fn click(&mut self, control: Control) -> Result<()> {
        self.control(control)?
            .click()
            .await
            .context("failed to click control")?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        self.page
            .url()
            .await
            .context("failed to read current URL")?
            .ok_or_else(|| anyhow!("page has no URL"))
    }

    async fn quit(self: Box<Self>) -> Result<()> {
        let ChromiumSession {
            mut browser, pump, ..
        } = *self;

        let closed = browser.close().await;
        let _ = browser.wait().await;
        pump.abort();
        closed.context("failed to close Chromium")?;
        Ok(())
    }
}
