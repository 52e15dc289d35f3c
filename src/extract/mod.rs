//! Page-link extraction from a rendered report.
//!
//! Opens the report in a throwaway browser, finds the report's page
//! navigation in one of two known layouts, clicks through every control in
//! order and records where each one leads. Any failure yields an empty
//! result; partial scrapes are never returned.

pub mod browser;
pub mod chromium;

use crate::{cache::LinkCache, models::ExtractedLink};
use browser::{BrowserLauncher, BrowserSession, Control};
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::{sleep, Instant};

// ── Layouts ────────────────────────────────────────────────────────────────

/// The two navigation layouts a report can render with. Tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavLayout {
    /// Buttons inside the primary navigation bar.
    ReportBar,
    /// Links inside the secondary navigation menu.
    NavMenu,
}

impl NavLayout {
    pub const ALL: [NavLayout; 2] = [NavLayout::ReportBar, NavLayout::NavMenu];

    pub fn selector(self) -> &'static str {
        match self {
            NavLayout::ReportBar => "report-navigation-bar button",
            NavLayout::NavMenu => "xap-nav-menu xap-nav-link",
        }
    }
}

impl fmt::Display for NavLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavLayout::ReportBar => f.write_str("navigation bar"),
            NavLayout::NavMenu => f.write_str("navigation menu"),
        }
    }
}

// ── Settle strategies ──────────────────────────────────────────────────────

/// How long to let the page render before reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settle {
    /// Blind delays after navigation and after each click.
    Fixed {
        after_load: Duration,
        after_click: Duration,
    },
    /// Poll until the page is observably ready, failing on expiry.
    Poll {
        interval: Duration,
        load_timeout: Duration,
        click_timeout: Duration,
    },
}

impl Settle {
    pub fn fixed() -> Self {
        Settle::Fixed {
            after_load: Duration::from_secs(5),
            after_click: Duration::from_secs(3),
        }
    }

    pub fn poll() -> Self {
        Settle::Poll {
            interval: Duration::from_millis(250),
            load_timeout: Duration::from_secs(15),
            click_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for Settle {
    fn default() -> Self {
        Settle::fixed()
    }
}

// ── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum ExtractError {
    #[error("navigation type not recognized")]
    NotRecognized,
    #[error("page did not change after clicking '{0}'")]
    ClickTimeout(String),
    #[error("'{0}' is not a valid URL")]
    BadUrl(String),
    #[error(transparent)]
    Browser(#[from] anyhow::Error),
}

// ── URL helpers ────────────────────────────────────────────────────────────

/// The report id in a `.../reporting/<id>/page...` URL.
pub fn report_id(url: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"reporting/([a-zA-Z0-9\-]+)/page").expect("report id regex is valid")
    });
    re.captures(url).map(|c| c[1].to_owned())
}

/// Final segment of the URL's path (empty when the path ends in `/`).
pub fn destination_id(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed.path().rsplit('/').next().map(str::to_owned)
}

// ── Extractor ──────────────────────────────────────────────────────────────

pub struct LinkExtractor {
    launcher: Arc<dyn BrowserLauncher>,
    settle: Settle,
    cache: LinkCache,
}

impl LinkExtractor {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, settle: Settle, cache: LinkCache) -> Self {
        Self {
            launcher,
            settle,
            cache,
        }
    }

    /// Extract, reusing a result scraped for the same URL within the cache
    /// window.
    pub async fn extract_cached(&self, report_url: &str) -> Vec<ExtractedLink> {
        let url = report_url.trim();
        if url.is_empty() {
            return Vec::new();
        }
        if let Some(links) = self.cache.get(url) {
            return links;
        }

        // Empty results are cached too; `forget` is the explicit retry.
        let links = self.extract(url).await;
        self.cache.set(url, links.clone());
        links
    }

    /// Drop any cached scrape of `report_url`.
    pub fn forget(&self, report_url: &str) {
        self.cache.remove(report_url.trim());
    }

    /// Scrape every page link of the report at `report_url`.
    ///
    /// Blank input returns immediately without starting a browser.
    pub async fn extract(&self, report_url: &str) -> Vec<ExtractedLink> {
        let url = report_url.trim();
        if url.is_empty() {
            return Vec::new();
        }

        let mut session = match self.launcher.launch().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Could not start browser for {}: {:?}", url, e);
                return Vec::new();
            }
        };

        let outcome = self.scrape(session.as_mut(), url).await;

        if let Err(e) = session.quit().await {
            tracing::warn!("Browser did not shut down cleanly: {:?}", e);
        }

        match outcome {
            Ok(links) => {
                tracing::info!("Extracted {} page link(s) from {}", links.len(), url);
                links
            }
            Err(ExtractError::NotRecognized) => {
                tracing::warn!("Navigation type not recognized on {}", url);
                Vec::new()
            }
            Err(e) => {
                tracing::error!("Link extraction from {} failed: {}", url, e);
                Vec::new()
            }
        }
    }

    async fn scrape(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
    ) -> Result<Vec<ExtractedLink>, ExtractError> {
        session.navigate(url).await?;
        let (layout, controls) = self.wait_for_controls(session).await?;
        tracing::debug!("Found {} control(s) in the {}", controls.len(), layout);

        let mut links: Vec<ExtractedLink> = Vec::with_capacity(controls.len());
        for (ordinal, control) in (1u32..).zip(controls) {
            let label = session.label(control).await?.trim().to_owned();
            let before = session.current_url().await?;

            session.click(control).await?;
            let after = self.wait_after_click(session, &label, &before, &links).await?;

            let destination_id =
                destination_id(&after).ok_or_else(|| ExtractError::BadUrl(after.clone()))?;
            tracing::debug!("#{} '{}' -> {}", ordinal, label, destination_id);

            links.push(ExtractedLink {
                ordinal,
                label,
                destination_id,
            });
        }

        Ok(links)
    }

    async fn wait_for_controls(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<(NavLayout, Vec<Control>), ExtractError> {
        match &self.settle {
            Settle::Fixed { after_load, .. } => {
                sleep(*after_load).await;
                detect_layout(session).await?.ok_or(ExtractError::NotRecognized)
            }
            Settle::Poll {
                interval,
                load_timeout,
                ..
            } => {
                let deadline = Instant::now() + *load_timeout;
                loop {
                    if let Some(found) = detect_layout(session).await? {
                        return Ok(found);
                    }
                    if Instant::now() >= deadline {
                        return Err(ExtractError::NotRecognized);
                    }
                    sleep(*interval).await;
                }
            }
        }
    }

    /// Wait for a click to take effect and return the URL it led to.
    ///
    /// Under polling, a URL that never changes is accepted only when its
    /// page has not been recorded yet, i.e. the control pointed at the page
    /// already open.
    async fn wait_after_click(
        &self,
        session: &mut dyn BrowserSession,
        label: &str,
        before: &str,
        seen: &[ExtractedLink],
    ) -> Result<String, ExtractError> {
        match &self.settle {
            Settle::Fixed { after_click, .. } => {
                sleep(*after_click).await;
                Ok(session.current_url().await?)
            }
            Settle::Poll {
                interval,
                click_timeout,
                ..
            } => {
                let deadline = Instant::now() + *click_timeout;
                loop {
                    let now_at = session.current_url().await?;
                    if now_at != before {
                        return Ok(now_at);
                    }
                    if Instant::now() >= deadline {
                        let current = destination_id(&now_at);
                        let already_seen = seen
                            .iter()
                            .any(|l| Some(&l.destination_id) == current.as_ref());
                        if already_seen {
                            return Err(ExtractError::ClickTimeout(label.to_owned()));
                        }
                        return Ok(now_at);
                    }
                    sleep(*interval).await;
                }
            }
        }
    }
}

async fn detect_layout(
    session: &mut dyn BrowserSession,
) -> anyhow::Result<Option<(NavLayout, Vec<Control>)>> {
    for layout in NavLayout::ALL {
        let controls = session.find_controls(layout.selector()).await?;
        if !controls.is_empty() {
            return Ok(Some((layout, controls)));
        }
    }
    Ok(None)
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted browser for exercising the extractor without Chromium.

    use super::browser::{BrowserLauncher, BrowserSession, Control};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct FakeSite {
        /// selector -> (label, url reached by clicking)
        pub controls: HashMap<&'static str, Vec<(String, String)>>,
        /// Clicking the control at this index raises an error.
        pub broken_click: Option<usize>,
        /// Clicking leaves the URL where it was.
        pub inert_clicks: bool,
        /// Selector queries fail as if the browser had crashed.
        pub broken_queries: bool,
    }

    impl FakeSite {
        pub fn with(selector: &'static str, controls: &[(&str, &str)]) -> Self {
            let mut site = FakeSite::default();
            site.controls.insert(
                selector,
                controls
                    .iter()
                    .map(|(l, u)| (l.to_string(), u.to_string()))
                    .collect(),
            );
            site
        }
    }

    #[derive(Clone, Default)]
    pub struct FakeLauncher {
        pub site: FakeSite,
        pub launches: Arc<AtomicUsize>,
        pub quits: Arc<AtomicUsize>,
    }

    impl FakeLauncher {
        pub fn new(site: FakeSite) -> Self {
            Self {
                site,
                ..Default::default()
            }
        }

        pub fn launches(&self) -> usize {
            self.launches.load(Ordering::SeqCst)
        }

        pub fn quits(&self) -> usize {
            self.quits.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                site: self.site.clone(),
                url: String::new(),
                active: Vec::new(),
                quits: Arc::clone(&self.quits),
            }))
        }
    }

    struct FakeSession {
        site: FakeSite,
        url: String,
        active: Vec<(String, String)>,
        quits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn navigate(&mut self, url: &str) -> Result<()> {
            if url.starts_with("bad:") {
                bail!("net::ERR_NAME_NOT_RESOLVED");
            }
            self.url = url.to_owned();
            Ok(())
        }

        async fn find_controls(&mut self, selector: &str) -> Result<Vec<Control>> {
            if self.site.broken_queries {
                bail!("Target closed");
            }
            self.active = self.site.controls.get(selector).cloned().unwrap_or_default();
            Ok((0..self.active.len()).map(Control).collect())
        }

        async fn label(&mut self, control: Control) -> Result<String> {
            Ok(self.active[control.0].0.clone())
        }

        async fn click(&mut self, control: Control) -> Result<()> {
            if self.site.broken_click == Some(control.0) {
                bail!("stale element reference");
            }
            if !self.site.inert_clicks {
                self.url = self.active[control.0].1.clone();
            }
            Ok(())
        }

        async fn current_url(&mut self) -> Result<String> {
            Ok(self.url.clone())
        }

        async fn quit(self: Box<Self>) -> Result<()> {
            self.quits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeLauncher, FakeSite};
    use super::*;

    const REPORT: &str = "https://lookerstudio.google.com/reporting/abc123/page/xyz";
    const BAR: &str = "report-navigation-bar button";
    const MENU: &str = "xap-nav-menu xap-nav-link";

    fn page(id: &str) -> String {
        format!("https://lookerstudio.google.com/reporting/abc123/page/{id}")
    }

    fn extractor(launcher: &FakeLauncher, settle: Settle) -> LinkExtractor {
        LinkExtractor::new(
            Arc::new(launcher.clone()),
            settle,
            LinkCache::new(Duration::from_secs(3600)),
        )
    }

    fn link(ordinal: u32, label: &str, destination_id: &str) -> ExtractedLink {
        ExtractedLink {
            ordinal,
            label: label.into(),
            destination_id: destination_id.into(),
        }
    }

    #[tokio::test]
    async fn blank_url_never_launches_a_browser() {
        let launcher = FakeLauncher::default();
        let ex = extractor(&launcher, Settle::fixed());

        assert!(ex.extract("").await.is_empty());
        assert!(ex.extract("   ").await.is_empty());
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn report_bar_controls_in_click_order() {
        let (p1, p2) = (page("p1"), page("p2"));
        let site = FakeSite::with(BAR, &[("  Home ", &p1), ("Sales\n", &p2)]);
        let launcher = FakeLauncher::new(site);

        let links = extractor(&launcher, Settle::fixed()).extract(REPORT).await;

        assert_eq!(links, vec![link(1, "Home", "p1"), link(2, "Sales", "p2")]);
        assert_eq!(launcher.quits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_nav_menu_without_mixing() {
        let mut site = FakeSite::with(MENU, &[("Overview", &page("m1"))]);
        site.controls.insert(BAR, Vec::new());
        let launcher = FakeLauncher::new(site);

        let links = extractor(&launcher, Settle::fixed()).extract(REPORT).await;

        assert_eq!(links, vec![link(1, "Overview", "m1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn report_bar_wins_when_both_layouts_are_present() {
        let mut site = FakeSite::with(BAR, &[("A", &page("a"))]);
        site.controls
            .insert(MENU, vec![("M".to_owned(), page("m"))]);
        let launcher = FakeLauncher::new(site);

        let links = extractor(&launcher, Settle::fixed()).extract(REPORT).await;

        assert_eq!(links, vec![link(1, "A", "a")]);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_gives_up_when_no_layout_appears() {
        let launcher = FakeLauncher::new(FakeSite::default());
        let start = Instant::now();

        let links = extractor(&launcher, Settle::poll()).extract(REPORT).await;

        assert!(links.is_empty());
        assert!(start.elapsed() >= Duration::from_secs(15));
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.quits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn browser_failure_is_not_mistaken_for_a_missing_layout() {
        let mut site = FakeSite::with(BAR, &[("A", &page("a"))]);
        site.broken_queries = true;
        let launcher = FakeLauncher::new(site);
        let start = Instant::now();

        let links = extractor(&launcher, Settle::poll()).extract(REPORT).await;

        // A missing layout would be polled until the load timeout.
        assert!(links.is_empty());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(launcher.quits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unrecognized_layout_is_empty_and_cleans_up() {
        let launcher = FakeLauncher::new(FakeSite::default());

        let links = extractor(&launcher, Settle::fixed()).extract(REPORT).await;

        assert!(links.is_empty());
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.quits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mid_scrape_failure_discards_partial_results() {
        let mut site = FakeSite::with(BAR, &[("A", &page("a")), ("B", &page("b"))]);
        site.broken_click = Some(1);
        let launcher = FakeLauncher::new(site);

        assert!(extractor(&launcher, Settle::fixed()).extract(REPORT).await.is_empty());
        assert_eq!(launcher.quits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_failure_is_empty() {
        let launcher = FakeLauncher::new(FakeSite::with(BAR, &[("A", &page("a"))]));
        let ex = extractor(&launcher, Settle::fixed());

        assert!(ex.extract("bad://nowhere").await.is_empty());
        assert_eq!(launcher.quits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_settle_waits_the_full_intervals() {
        let launcher = FakeLauncher::new(FakeSite::with(
            BAR,
            &[("A", &page("a")), ("B", &page("b"))],
        ));
        let start = Instant::now();

        extractor(&launcher, Settle::fixed()).extract(REPORT).await;

        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(5 + 3 + 3));
        assert!(waited < Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_accepts_control_for_the_open_page() {
        // The first control points at the page the report opened on, so
        // the URL never changes; the second navigates normally.
        let site = FakeSite::with(BAR, &[("Home", REPORT), ("Next", &page("p2"))]);
        let launcher = FakeLauncher::new(site);

        let links = extractor(&launcher, Settle::poll()).extract(REPORT).await;

        assert_eq!(links, vec![link(1, "Home", "xyz"), link(2, "Next", "p2")]);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_fails_when_a_click_goes_nowhere() {
        let mut site = FakeSite::with(BAR, &[("A", &page("a")), ("B", &page("b"))]);
        site.inert_clicks = true;
        let launcher = FakeLauncher::new(site);

        // "A" is accepted as the open page, "B" then times out on the same URL.
        assert!(extractor(&launcher, Settle::poll()).extract(REPORT).await.is_empty());
        assert_eq!(launcher.quits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_results_skip_the_browser() {
        let launcher = FakeLauncher::new(FakeSite::with(BAR, &[("A", &page("a"))]));
        let ex = extractor(&launcher, Settle::fixed());

        let first = ex.extract_cached(REPORT).await;
        let second = ex.extract_cached(REPORT).await;

        assert_eq!(first, second);
        assert_eq!(launcher.launches(), 1);

        ex.forget(REPORT);
        ex.extract_cached(REPORT).await;
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_results_are_cached_until_forgotten() {
        let launcher = FakeLauncher::new(FakeSite::default());
        let ex = extractor(&launcher, Settle::fixed());

        assert!(ex.extract_cached(REPORT).await.is_empty());
        assert!(ex.extract_cached(REPORT).await.is_empty());
        assert_eq!(launcher.launches(), 1);

        ex.forget(REPORT);
        ex.extract_cached(REPORT).await;
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn blank_url_is_not_cached() {
        let launcher = FakeLauncher::default();
        let ex = extractor(&launcher, Settle::fixed());

        assert!(ex.extract_cached("  ").await.is_empty());
        assert_eq!(launcher.launches(), 0);
    }

    #[test]
    fn report_ids() {
        assert_eq!(report_id(REPORT).as_deref(), Some("abc123"));
        assert_eq!(
            report_id("https://x/reporting/a-b-9/page/p/edit").as_deref(),
            Some("a-b-9")
        );
        assert_eq!(report_id("https://example.com/dashboards/1"), None);
    }

    #[test]
    fn destination_ids() {
        assert_eq!(destination_id(&page("p1")).as_deref(), Some("p1"));
        assert_eq!(destination_id("https://x/a/b/?q=1#f").as_deref(), Some(""));
        assert_eq!(destination_id("not a url"), None);
    }
}
