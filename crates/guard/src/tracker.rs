//! Tab lifecycle tracking.
//!
//! Remembers which URL each tab last showed so that, once a navigation has
//! already happened, the policy of the origin being left can still be
//! applied.

use browser_security::{hostname_of_url, Phase};
use common::TabId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::dispatcher::Dispatcher;
use crate::store::{settings_for, SettingsStore};

/// Tab lifecycle tracker.
///
/// Owns the tab → last URL map. The map is only touched through
/// [`on_navigate`](Self::on_navigate) and [`on_tab_closed`](Self::on_tab_closed),
/// and the lock is never held across an await.
pub struct TabTracker {
    store: Arc<dyn SettingsStore>,
    dispatcher: Arc<Dispatcher>,
    origins: Mutex<HashMap<TabId, Url>>,
}

impl TabTracker {
    pub fn new(store: Arc<dyn SettingsStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            origins: Mutex::new(HashMap::new()),
        }
    }

    /// A tab's URL changed.
    ///
    /// Runs the exit phase for the origin the tab was showing (if any),
    /// then the entry phase for the new one, and records the new URL.
    /// A missing or host-less URL leaves the tab untracked.
    pub async fn on_navigate(&self, tab_id: TabId, new_url: Option<&str>) {
        let previous = self.origins.lock().remove(&tab_id);
        if let Some(previous) = previous {
            self.run_phase(Phase::Exit, &previous).await;
        }

        let Some(url) = new_url.and_then(|u| Url::parse(u).ok()) else {
            debug!("Tab {} has no usable URL, not tracking", tab_id);
            return;
        };
        if hostname_of_url(&url).is_none() {
            debug!("Tab {} shows {} which has no host, not tracking", tab_id, url);
            return;
        }

        self.run_phase(Phase::Entry, &url).await;
        self.origins.lock().insert(tab_id, url);
    }

    /// A tab was closed. Runs the exit phase for its last origin.
    pub async fn on_tab_closed(&self, tab_id: TabId) {
        let previous = self.origins.lock().remove(&tab_id);
        match previous {
            Some(previous) => self.run_phase(Phase::Exit, &previous).await,
            None => debug!("Closed tab {} was not tracked", tab_id),
        }
    }

    /// URL last recorded for a tab.
    pub fn origin_of(&self, tab_id: TabId) -> Option<Url> {
        self.origins.lock().get(&tab_id).cloned()
    }

    /// Number of tabs with a recorded origin.
    pub fn tracked_tabs(&self) -> usize {
        self.origins.lock().len()
    }

    /// Purge every disabled content type of `phase` for the URL's host, one
    /// after another. Failures are logged and the next type still runs.
    async fn run_phase(&self, phase: Phase, url: &Url) {
        let Some(hostname) = hostname_of_url(url) else {
            return;
        };

        let settings = settings_for(self.store.as_ref(), &hostname).await;
        for content_type in settings.disabled_in(phase) {
            match self.dispatcher.clear(url.as_str(), content_type).await {
                Ok(report) if !report.is_clean() => warn!(
                    "{:?} purge of {} on {} had {} of {} operations fail",
                    phase, content_type, hostname, report.failed, report.attempted
                ),
                Ok(_) => {}
                Err(e) => warn!("{:?} purge of {} on {} failed: {}", phase, content_type, hostname, e),
            }
        }
    }
}
