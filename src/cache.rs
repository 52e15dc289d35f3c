use crate::models::ExtractedLink;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Thread-safe in-memory cache mapping report URL -> scraped page links.
///
/// Report layouts change rarely, so a scrape is reused for `ttl` before the
/// browser is started again. Expired entries are evicted lazily on lookup.
#[derive(Clone, Debug)]
pub struct LinkCache {
    inner: Arc<DashMap<String, (Instant, Vec<ExtractedLink>)>>,
    ttl: Duration,
}

impl LinkCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Insert or refresh the links scraped from `report_url`.
    pub fn set(&self, report_url: impl Into<String>, links: Vec<ExtractedLink>) {
        self.inner.insert(report_url.into(), (Instant::now(), links));
    }

    /// Links for `report_url` if they were scraped within the window.
    pub fn get(&self, report_url: &str) -> Option<Vec<ExtractedLink>> {
        let fresh = self
            .inner
            .get(report_url)
            .filter(|entry| entry.0.elapsed() < self.ttl)
            .map(|entry| entry.1.clone());

        if fresh.is_none() {
            self.inner.remove(report_url);
        }
        fresh
    }

    /// Forget a URL so the next lookup scrapes again.
    pub fn remove(&self, report_url: &str) {
        self.inner.remove(report_url);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links() -> Vec<ExtractedLink> {
        vec![ExtractedLink {
            ordinal: 1,
            label: "Home".into(),
            destination_id: "p1".into(),
        }]
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = LinkCache::new(Duration::from_secs(3600));
        cache.set("https://r", links());

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert_eq!(cache.get("https://r"), Some(links()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("https://r"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn remove_forgets_the_url() {
        let cache = LinkCache::new(Duration::from_secs(60));
        cache.set("https://r", links());
        assert_eq!(cache.len(), 1);

        cache.remove("https://r");
        assert_eq!(cache.get("https://r"), None);
    }
}
