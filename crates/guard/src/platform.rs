//! Host platform capabilities the engine drives.
//!
//! The engine never reaches into the browser directly. Tabs, cookies,
//! browsing data and in-page operations are all reached through these
//! traits, so the same engine runs against a real extension host or the
//! in-memory [`SimulatedBrowser`](crate::sim::SimulatedBrowser).

use async_trait::async_trait;
use browser_security::HostPattern;
use common::{GuardResult, TabId};
use networking::Cookie;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// A tab as reported by a platform query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: Option<Url>,
}

/// Browsing data the host can purge in bulk for a hostname.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DataKind {
    LocalStorage,
    Cache,
}

/// What a page currently holds, as seen from inside it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    pub scripts: usize,
    pub iframes: usize,
    pub local_storage_keys: usize,
    pub session_storage_keys: usize,
    pub service_workers: usize,
}

/// Operations executed inside one page's context.
#[async_trait]
pub trait PageAgent: Send + Sync {
    /// Empty the page's session storage.
    async fn clear_session_storage(&self) -> GuardResult<()>;

    /// Names of the page's Cache Storage caches.
    async fn list_cache_keys(&self) -> GuardResult<Vec<String>>;

    /// Delete one Cache Storage cache.
    async fn delete_cache_key(&self, key: &str) -> GuardResult<()>;

    /// Remove every frame element from the document. Returns how many went.
    async fn remove_frames(&self) -> GuardResult<usize>;

    /// Unregister every service worker registration. Returns how many went.
    async fn unregister_workers(&self) -> GuardResult<usize>;

    /// Pause script execution (a debugger statement); best effort only.
    async fn suspend_execution(&self) -> GuardResult<()>;

    /// Count what the page holds.
    async fn snapshot(&self) -> GuardResult<PageSnapshot>;
}

/// Tab enumeration and control.
#[async_trait]
pub trait TabPlatform: Send + Sync {
    /// Tabs whose URL matches the pattern.
    async fn query(&self, pattern: &HostPattern) -> GuardResult<Vec<TabInfo>>;

    /// Reload a tab.
    async fn reload(&self, tab_id: TabId) -> GuardResult<()>;

    /// In-page agent for a tab.
    fn agent(&self, tab_id: TabId) -> Arc<dyn PageAgent>;
}

/// Cookie enumeration and removal.
#[async_trait]
pub trait CookiePlatform: Send + Sync {
    /// Every cookie visible to the URL, http-only ones included.
    async fn get_all(&self, url: &Url) -> GuardResult<Vec<Cookie>>;

    /// Remove one cookie by URL and name.
    async fn remove(&self, url: &Url, name: &str) -> GuardResult<()>;
}

/// Bulk browsing-data removal.
#[async_trait]
pub trait BrowsingDataPlatform: Send + Sync {
    async fn remove(&self, hostname: &str, kind: DataKind) -> GuardResult<()>;
}

/// The set of platform handles the engine works with.
#[derive(Clone)]
pub struct Platform {
    pub tabs: Arc<dyn TabPlatform>,
    pub cookies: Arc<dyn CookiePlatform>,
    pub browsing_data: Arc<dyn BrowsingDataPlatform>,
}

impl Platform {
    /// Use one host object for every capability.
    pub fn from_host<H>(host: Arc<H>) -> Self
    where
        H: TabPlatform + CookiePlatform + BrowsingDataPlatform + 'static,
    {
        Self {
            tabs: host.clone(),
            cookies: host.clone(),
            browsing_data: host,
        }
    }

    /// Tabs currently showing the hostname or one of its subdomains.
    ///
    /// A failed query is logged and reads as "no tabs".
    pub async fn tabs_on(&self, hostname: &str) -> Vec<TabInfo> {
        let pattern = HostPattern::for_hostname(hostname);
        match self.tabs.query(&pattern).await {
            Ok(tabs) => tabs,
            Err(e) => {
                tracing::warn!("Tab query for {} failed: {}", pattern, e);
                Vec::new()
            }
        }
    }
}
