//! In-memory browser host.
//!
//! Implements every platform trait over plain data, records each host call
//! in order and can be told to fail specific operations. Tests and the CLI
//! replay sessions against it.

use async_trait::async_trait;
use browser_security::{hostname_of_url, HostPattern, HostnameSettings};
use common::{GuardError, GuardResult, TabId};
use networking::{Cookie, CookieJar};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::platform::{
    BrowsingDataPlatform, CookiePlatform, DataKind, PageAgent, PageSnapshot, TabInfo, TabPlatform,
};
use crate::store::{MemorySettingsStore, SettingsStore};

/// One recorded host call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum HostCall {
    Query { pattern: String },
    Reload { tab_id: TabId },
    ClearSessionStorage { tab_id: TabId },
    ListCacheKeys { tab_id: TabId },
    DeleteCacheKey { tab_id: TabId, key: String },
    RemoveFrames { tab_id: TabId },
    UnregisterWorkers { tab_id: TabId },
    SuspendExecution { tab_id: TabId },
    Snapshot { tab_id: TabId },
    GetCookies { url: String },
    RemoveCookie { url: String, name: String },
    RemoveBrowsingData { hostname: String, kind: DataKind },
    SettingsSet { hostname: String },
}

impl HostCall {
    /// Tab the call targeted, if any.
    pub fn tab_id(&self) -> Option<TabId> {
        match self {
            HostCall::Reload { tab_id }
            | HostCall::ClearSessionStorage { tab_id }
            | HostCall::ListCacheKeys { tab_id }
            | HostCall::DeleteCacheKey { tab_id, .. }
            | HostCall::RemoveFrames { tab_id }
            | HostCall::UnregisterWorkers { tab_id }
            | HostCall::SuspendExecution { tab_id }
            | HostCall::Snapshot { tab_id } => Some(*tab_id),
            _ => None,
        }
    }

    /// Check if the call purges or reloads something.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            HostCall::Query { .. }
                | HostCall::ListCacheKeys { .. }
                | HostCall::Snapshot { .. }
                | HostCall::GetCookies { .. }
        )
    }
}

/// Operations the host can be told to fail.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// Every in-page operation and reload of one tab.
    Tab(TabId),
    /// Removing the cookie with this name.
    CookieRemoval(String),
    /// Tab queries.
    Query,
    /// Bulk browsing-data removal.
    BrowsingData,
}

/// One simulated tab's document and per-origin state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulatedPage {
    pub url: Url,
    pub session_storage: BTreeMap<String, String>,
    pub caches: Vec<String>,
    pub workers: Vec<String>,
    pub iframes: usize,
    pub scripts: usize,
    /// Times script execution was paused.
    pub pauses: usize,
    pub reloads: usize,
}

impl SimulatedPage {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            session_storage: BTreeMap::new(),
            caches: Vec::new(),
            workers: Vec::new(),
            iframes: 0,
            scripts: 0,
            pauses: 0,
            reloads: 0,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    tabs: BTreeMap<TabId, SimulatedPage>,
    cookies: CookieJar,
    local_storage: HashMap<String, BTreeMap<String, String>>,
    http_cache: HashMap<String, usize>,
    calls: Vec<HostCall>,
    failures: HashSet<FailPoint>,
}

impl SimState {
    fn check_tab(&self, tab_id: TabId) -> GuardResult<()> {
        if self.failures.contains(&FailPoint::Tab(tab_id)) {
            return Err(GuardError::platform(format!("injected failure in tab {}", tab_id)));
        }
        if !self.tabs.contains_key(&tab_id) {
            return Err(GuardError::TabGone(tab_id));
        }
        Ok(())
    }

    fn page_mut(&mut self, tab_id: TabId) -> GuardResult<&mut SimulatedPage> {
        self.check_tab(tab_id)?;
        self.tabs.get_mut(&tab_id).ok_or(GuardError::TabGone(tab_id))
    }
}

/// In-memory browser host.
#[derive(Clone, Debug, Default)]
pub struct SimulatedBrowser {
    state: Arc<Mutex<SimState>>,
    latency: Option<Duration>,
}

impl SimulatedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every in-page, reload and browsing-data operation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Open a tab showing `url`. Unparseable URLs open nothing.
    pub fn open_tab(&self, tab_id: TabId, url: &str) -> bool {
        let Ok(url) = Url::parse(url) else {
            return false;
        };
        self.state.lock().tabs.insert(tab_id, SimulatedPage::new(url));
        true
    }

    /// Point a tab at a new document.
    pub fn navigate(&self, tab_id: TabId, url: &str) -> bool {
        let Ok(url) = Url::parse(url) else {
            return false;
        };
        let mut state = self.state.lock();
        let reloads = state.tabs.get(&tab_id).map_or(0, |page| page.reloads);
        let mut page = SimulatedPage::new(url);
        page.reloads = reloads;
        state.tabs.insert(tab_id, page);
        true
    }

    pub fn close_tab(&self, tab_id: TabId) -> Option<SimulatedPage> {
        self.state.lock().tabs.remove(&tab_id)
    }

    /// Mutate a tab's page in place.
    pub fn seed_page<F>(&self, tab_id: TabId, f: F) -> bool
    where
        F: FnOnce(&mut SimulatedPage),
    {
        match self.state.lock().tabs.get_mut(&tab_id) {
            Some(page) => {
                f(page);
                true
            }
            None => false,
        }
    }

    pub fn page(&self, tab_id: TabId) -> Option<SimulatedPage> {
        self.state.lock().tabs.get(&tab_id).cloned()
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        self.state.lock().tabs.keys().copied().collect()
    }

    /// Store a cookie as if `url` had answered with this Set-Cookie header.
    pub fn set_cookie(&self, url: &str, header: &str) -> bool {
        match Url::parse(url) {
            Ok(url) => self.state.lock().cookies.add_from_response(&url, header),
            Err(_) => false,
        }
    }

    /// Cookies visible to `url`.
    pub fn cookie_count(&self, url: &str) -> usize {
        match Url::parse(url) {
            Ok(url) => self.state.lock().cookies.get_cookies(&url).len(),
            Err(_) => 0,
        }
    }

    pub fn set_local_storage(&self, hostname: &str, key: &str, value: &str) {
        self.state
            .lock()
            .local_storage
            .entry(hostname.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn local_storage_len(&self, hostname: &str) -> usize {
        self.state
            .lock()
            .local_storage
            .get(hostname)
            .map_or(0, BTreeMap::len)
    }

    pub fn set_http_cache(&self, hostname: &str, entries: usize) {
        self.state.lock().http_cache.insert(hostname.to_string(), entries);
    }

    pub fn http_cache_len(&self, hostname: &str) -> usize {
        self.state.lock().http_cache.get(hostname).copied().unwrap_or(0)
    }

    /// Make an operation fail until cleared.
    pub fn fail(&self, point: FailPoint) {
        self.state.lock().failures.insert(point);
    }

    pub fn heal(&self, point: &FailPoint) {
        self.state.lock().failures.remove(point);
    }

    /// Every host call so far, in order.
    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn record(&self, call: HostCall) {
        self.state.lock().calls.push(call);
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Settings store whose writes land in this host's call log.
    pub fn recording_store(&self) -> RecordingStore {
        RecordingStore {
            inner: MemorySettingsStore::new(),
            host: self.clone(),
        }
    }
}

#[async_trait]
impl TabPlatform for SimulatedBrowser {
    async fn query(&self, pattern: &HostPattern) -> GuardResult<Vec<TabInfo>> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::Query {
            pattern: pattern.to_string(),
        });
        if state.failures.contains(&FailPoint::Query) {
            return Err(GuardError::platform("injected tab query failure"));
        }
        Ok(state
            .tabs
            .iter()
            .filter(|(_, page)| pattern.matches(&page.url))
            .map(|(id, page)| TabInfo {
                id: *id,
                url: Some(page.url.clone()),
            })
            .collect())
    }

    async fn reload(&self, tab_id: TabId) -> GuardResult<()> {
        self.delay().await;
        let mut state = self.state.lock();
        state.calls.push(HostCall::Reload { tab_id });
        state.page_mut(tab_id)?.reloads += 1;
        Ok(())
    }

    fn agent(&self, tab_id: TabId) -> Arc<dyn PageAgent> {
        Arc::new(SimAgent {
            tab_id,
            host: self.clone(),
        })
    }
}

#[async_trait]
impl CookiePlatform for SimulatedBrowser {
    async fn get_all(&self, url: &Url) -> GuardResult<Vec<Cookie>> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::GetCookies {
            url: url.to_string(),
        });
        Ok(state.cookies.get_cookies(url).into_iter().cloned().collect())
    }

    async fn remove(&self, url: &Url, name: &str) -> GuardResult<()> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::RemoveCookie {
            url: url.to_string(),
            name: name.to_string(),
        });
        if state.failures.contains(&FailPoint::CookieRemoval(name.to_string())) {
            return Err(GuardError::platform(format!("injected failure removing {}", name)));
        }
        state.cookies.remove_for_url(url, name);
        Ok(())
    }
}

#[async_trait]
impl BrowsingDataPlatform for SimulatedBrowser {
    async fn remove(&self, hostname: &str, kind: DataKind) -> GuardResult<()> {
        self.delay().await;
        let mut state = self.state.lock();
        state.calls.push(HostCall::RemoveBrowsingData {
            hostname: hostname.to_string(),
            kind,
        });
        if state.failures.contains(&FailPoint::BrowsingData) {
            return Err(GuardError::platform("injected browsing data failure"));
        }
        match kind {
            DataKind::LocalStorage => {
                state.local_storage.remove(hostname);
            }
            DataKind::Cache => {
                state.http_cache.remove(hostname);
            }
        }
        Ok(())
    }
}

/// Page agent bound to one simulated tab.
struct SimAgent {
    tab_id: TabId,
    host: SimulatedBrowser,
}

impl SimAgent {
    /// Record `call`, then run `f` against the tab's page.
    async fn with_page<T, F>(&self, call: HostCall, f: F) -> GuardResult<T>
    where
        F: FnOnce(&mut SimulatedPage) -> T,
    {
        self.host.delay().await;
        let mut state = self.host.state.lock();
        state.calls.push(call);
        state.page_mut(self.tab_id).map(f)
    }
}

#[async_trait]
impl PageAgent for SimAgent {
    async fn clear_session_storage(&self) -> GuardResult<()> {
        let call = HostCall::ClearSessionStorage { tab_id: self.tab_id };
        self.with_page(call, |page| page.session_storage.clear()).await
    }

    async fn list_cache_keys(&self) -> GuardResult<Vec<String>> {
        let call = HostCall::ListCacheKeys { tab_id: self.tab_id };
        self.with_page(call, |page| page.caches.clone()).await
    }

    async fn delete_cache_key(&self, key: &str) -> GuardResult<()> {
        let call = HostCall::DeleteCacheKey {
            tab_id: self.tab_id,
            key: key.to_string(),
        };
        self.with_page(call, |page| page.caches.retain(|k| k != key)).await
    }

    async fn remove_frames(&self) -> GuardResult<usize> {
        let call = HostCall::RemoveFrames { tab_id: self.tab_id };
        self.with_page(call, |page| std::mem::take(&mut page.iframes)).await
    }

    async fn unregister_workers(&self) -> GuardResult<usize> {
        let call = HostCall::UnregisterWorkers { tab_id: self.tab_id };
        self.with_page(call, |page| std::mem::take(&mut page.workers).len())
            .await
    }

    async fn suspend_execution(&self) -> GuardResult<()> {
        let call = HostCall::SuspendExecution { tab_id: self.tab_id };
        self.with_page(call, |page| page.pauses += 1).await
    }

    async fn snapshot(&self) -> GuardResult<PageSnapshot> {
        self.host.delay().await;
        let mut state = self.host.state.lock();
        state.calls.push(HostCall::Snapshot { tab_id: self.tab_id });
        state.check_tab(self.tab_id)?;

        let page = state.tabs.get(&self.tab_id).ok_or(GuardError::TabGone(self.tab_id))?;
        let local_storage_keys = hostname_of_url(&page.url)
            .and_then(|host| state.local_storage.get(&host))
            .map_or(0, BTreeMap::len);

        Ok(PageSnapshot {
            scripts: page.scripts,
            iframes: page.iframes,
            local_storage_keys,
            session_storage_keys: page.session_storage.len(),
            service_workers: page.workers.len(),
        })
    }
}

/// Memory-backed settings store that logs each write as a host call.
pub struct RecordingStore {
    inner: MemorySettingsStore,
    host: SimulatedBrowser,
}

#[async_trait]
impl SettingsStore for RecordingStore {
    async fn get(&self, hostname: &str) -> GuardResult<Option<HostnameSettings>> {
        self.inner.get(hostname).await
    }

    async fn set(&self, hostname: &str, settings: HostnameSettings) -> GuardResult<()> {
        self.host.record(HostCall::SettingsSet {
            hostname: hostname.to_string(),
        });
        self.inner.set(hostname, settings).await
    }
}
