//! Clearing dispatcher: turns "purge this content type for this URL" into
//! platform operations against every tab showing the URL's host.

use browser_security::{hostname_of_url, ContentType};
use common::{GuardError, GuardResult};
use futures::future::join_all;
use serde::Serialize;
use std::fmt::Display;
use tracing::{debug, info, warn};
use url::Url;

use crate::platform::{DataKind, PageAgent, Platform, TabInfo};

/// An operation run inside each matching tab.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageAction {
    ClearSessionStorage,
    RemoveFrames,
    UnregisterWorkers,
    SuspendExecution,
}

impl PageAction {
    async fn run(self, agent: &dyn PageAgent) -> GuardResult<()> {
        match self {
            PageAction::ClearSessionStorage => agent.clear_session_storage().await,
            PageAction::RemoveFrames => agent.remove_frames().await.map(|_| ()),
            PageAction::UnregisterWorkers => agent.unregister_workers().await.map(|_| ()),
            PageAction::SuspendExecution => agent.suspend_execution().await,
        }
    }
}

/// How a content type is purged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Enumerate the URL's cookies and remove them one by one.
    Cookies,
    /// Host bulk removal by hostname.
    BrowsingData(DataKind),
    /// List cache keys in one representative tab, delete each.
    CacheStorage,
    /// Run an action in every matching tab.
    InPage(PageAction),
}

impl Strategy {
    /// The strategy table.
    pub fn for_content(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Cookies => Strategy::Cookies,
            ContentType::LocalStorage => Strategy::BrowsingData(DataKind::LocalStorage),
            ContentType::Cache => Strategy::BrowsingData(DataKind::Cache),
            ContentType::SessionStorage => Strategy::InPage(PageAction::ClearSessionStorage),
            ContentType::CacheStorage => Strategy::CacheStorage,
            ContentType::Iframe => Strategy::InPage(PageAction::RemoveFrames),
            ContentType::ServiceWorker => Strategy::InPage(PageAction::UnregisterWorkers),
            ContentType::Javascript => Strategy::InPage(PageAction::SuspendExecution),
        }
    }
}

/// Summary of one `clear` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub content_type: ContentType,
    pub hostname: String,
    /// Platform operations issued.
    pub attempted: usize,
    /// Operations that failed.
    pub failed: usize,
}

impl ClearReport {
    /// Check if every issued operation succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Default)]
struct Tally {
    attempted: usize,
    failed: usize,
}

impl Tally {
    fn single(failed: bool) -> Self {
        Self {
            attempted: 1,
            failed: usize::from(failed),
        }
    }

    /// Count settled results, logging each failure.
    fn settle<T, E: Display>(results: Vec<Result<T, E>>, what: &str) -> Self {
        let mut tally = Self::default();
        for result in results {
            tally.attempted += 1;
            if let Err(e) = result {
                tally.failed += 1;
                warn!("{} failed: {}", what, e);
            }
        }
        tally
    }

    fn merge(mut self, other: Tally) -> Self {
        self.attempted += other.attempted;
        self.failed += other.failed;
        self
    }
}

/// Clearing dispatcher.
pub struct Dispatcher {
    platform: Platform,
}

impl Dispatcher {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// Purge one content type for the URL's host.
    ///
    /// Resolves once every operation has settled. Individual failures are
    /// logged and counted in the report; only an unusable URL is an error.
    pub async fn clear(&self, url: &str, content_type: ContentType) -> GuardResult<ClearReport> {
        let url = Url::parse(url).map_err(|_| GuardError::invalid_url(url))?;
        let hostname = hostname_of_url(&url)
            .ok_or_else(|| GuardError::invalid_url(format!("{} has no host", url)))?;

        info!("Clearing {} from {}", content_type, hostname);

        let tally = match Strategy::for_content(content_type) {
            Strategy::Cookies => self.clear_cookies(&url).await,
            Strategy::BrowsingData(kind) => self.clear_browsing_data(&hostname, kind).await,
            Strategy::CacheStorage => {
                let tabs = self.platform.tabs_on(&hostname).await;
                self.clear_cache_storage(&tabs).await
            }
            Strategy::InPage(action) => {
                let tabs = self.platform.tabs_on(&hostname).await;
                self.run_in_tabs(&tabs, action).await
            }
        };

        Ok(ClearReport {
            content_type,
            hostname,
            attempted: tally.attempted,
            failed: tally.failed,
        })
    }

    async fn clear_cookies(&self, url: &Url) -> Tally {
        let cookies = match self.platform.cookies.get_all(url).await {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!("Listing cookies for {} failed: {}", url, e);
                return Tally::single(true);
            }
        };

        let removals = cookies
            .iter()
            .map(|cookie| self.platform.cookies.remove(url, &cookie.name));
        Tally::settle(join_all(removals).await, "Cookie removal")
    }

    async fn clear_browsing_data(&self, hostname: &str, kind: DataKind) -> Tally {
        match self.platform.browsing_data.remove(hostname, kind).await {
            Ok(()) => Tally::single(false),
            Err(e) => {
                warn!("Removing {:?} for {} failed: {}", kind, hostname, e);
                Tally::single(true)
            }
        }
    }

    async fn clear_cache_storage(&self, tabs: &[TabInfo]) -> Tally {
        // Cache Storage is per origin, so any one tab sees all of it.
        let Some(tab) = tabs.first() else {
            debug!("No open tab to clear cache storage through");
            return Tally::default();
        };

        let agent = self.platform.tabs.agent(tab.id);
        let keys = match agent.list_cache_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Listing cache keys in tab {} failed: {}", tab.id, e);
                return Tally::single(true);
            }
        };

        let listed = Tally::single(false);
        let deletions = keys.iter().map(|key| agent.delete_cache_key(key));
        listed.merge(Tally::settle(join_all(deletions).await, "Cache deletion"))
    }

    async fn run_in_tabs(&self, tabs: &[TabInfo], action: PageAction) -> Tally {
        if tabs.is_empty() {
            debug!("No open tab for {:?}", action);
            return Tally::default();
        }

        let runs = tabs.iter().map(|tab| {
            let agent = self.platform.tabs.agent(tab.id);
            async move { action.run(agent.as_ref()).await }
        });
        Tally::settle(join_all(runs).await, "In-page purge")
    }
}
