//! Per-site content counting.

use browser_security::{hostname_of_url, ContentCounts};
use common::{GuardError, GuardResult};
use tracing::debug;
use url::Url;

use crate::platform::Platform;

/// Counts what a site currently holds, as shown in the settings popup.
pub struct Inspector {
    platform: Platform,
}

impl Inspector {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// Count each content type for the URL's host.
    ///
    /// The first tab showing the host stands in for the whole site. With no
    /// such tab only cookies are counted. The HTTP cache is never counted.
    pub async fn inspect(&self, url: &str) -> GuardResult<ContentCounts> {
        let url = Url::parse(url).map_err(|_| GuardError::invalid_url(url))?;
        let hostname = hostname_of_url(&url)
            .ok_or_else(|| GuardError::invalid_url(format!("{} has no host", url)))?;

        let mut counts = ContentCounts {
            cookies: self.platform.cookies.get_all(&url).await?.len(),
            ..Default::default()
        };

        let tabs = self.platform.tabs_on(&hostname).await;
        let Some(tab) = tabs.first() else {
            debug!("No open tab on {}, counting cookies only", hostname);
            return Ok(counts);
        };

        let agent = self.platform.tabs.agent(tab.id);
        let snapshot = agent.snapshot().await?;
        counts.local_storage = snapshot.local_storage_keys;
        counts.session_storage = snapshot.session_storage_keys;
        counts.service_worker = snapshot.service_workers;
        counts.iframe = snapshot.iframes;
        counts.javascript = snapshot.scripts;
        counts.cache_storage = agent.list_cache_keys().await?.len();

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedBrowser;
    use browser_security::ContentType;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_counts_from_first_tab() {
        let host = SimulatedBrowser::new();
        host.open_tab(1, "https://example.com/");
        host.open_tab(2, "https://example.com/other");
        host.set_cookie("https://example.com/", "a=1; HttpOnly");
        host.set_local_storage("example.com", "k", "v");
        host.set_http_cache("example.com", 10);
        host.seed_page(1, |page| {
            page.scripts = 4;
            page.iframes = 1;
            page.caches = vec!["v1".into()];
            page.workers = vec!["sw.js".into()];
        });
        host.seed_page(2, |page| page.scripts = 99);

        let inspector = Inspector::new(Platform::from_host(Arc::new(host)));
        let counts = inspector.inspect("https://example.com/").await.unwrap();

        assert_eq!(counts.get(ContentType::Cookies), 1);
        assert_eq!(counts.local_storage, 1);
        assert_eq!(counts.javascript, 4);
        assert_eq!(counts.iframe, 1);
        assert_eq!(counts.cache_storage, 1);
        assert_eq!(counts.service_worker, 1);
        assert_eq!(counts.cache, 0);
    }

    #[tokio::test]
    async fn test_no_tab_counts_cookies_only() {
        let host = SimulatedBrowser::new();
        host.set_cookie("https://example.com/", "a=1");
        host.set_cookie("https://example.com/", "b=2");

        let inspector = Inspector::new(Platform::from_host(Arc::new(host)));
        let counts = inspector.inspect("https://example.com/").await.unwrap();
        assert_eq!(counts.cookies, 2);
        assert_eq!(counts.total(), 2);
    }

    #[tokio::test]
    async fn test_bad_url() {
        let inspector = Inspector::new(Platform::from_host(Arc::new(SimulatedBrowser::new())));
        assert!(inspector.inspect("nope").await.is_err());
    }
}
