//! Content categories a site policy can suppress, and the per-host
//! settings record built from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A category of persisted or live web content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentType {
    Cookies,
    LocalStorage,
    SessionStorage,
    CacheStorage,
    ServiceWorker,
    Iframe,
    Javascript,
    Cache,
}

/// When in a tab's visit a content type is purged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// As the tab starts showing the origin.
    Entry,
    /// As the tab leaves the origin, by navigating away or closing.
    Exit,
}

impl ContentType {
    /// Every content type, in declaration order. Phase purges run in this order.
    pub const ALL: [ContentType; 8] = [
        ContentType::Cookies,
        ContentType::LocalStorage,
        ContentType::SessionStorage,
        ContentType::CacheStorage,
        ContentType::ServiceWorker,
        ContentType::Iframe,
        ContentType::Javascript,
        ContentType::Cache,
    ];

    /// Wire name of the content type.
    pub fn name(&self) -> &'static str {
        match self {
            ContentType::Cookies => "cookies",
            ContentType::LocalStorage => "localStorage",
            ContentType::SessionStorage => "sessionStorage",
            ContentType::CacheStorage => "cacheStorage",
            ContentType::ServiceWorker => "serviceWorker",
            ContentType::Iframe => "iframe",
            ContentType::Javascript => "javascript",
            ContentType::Cache => "cache",
        }
    }

    /// Lifecycle phase the type is purged in. Scripts have none: they are
    /// suppressed at response time instead.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            ContentType::SessionStorage
            | ContentType::CacheStorage
            | ContentType::Iframe
            | ContentType::ServiceWorker => Some(Phase::Entry),
            ContentType::Cookies | ContentType::LocalStorage | ContentType::Cache => {
                Some(Phase::Exit)
            }
            ContentType::Javascript => None,
        }
    }
}

impl Phase {
    /// Content types purged in this phase, in declaration order.
    pub fn content_types(self) -> impl Iterator<Item = ContentType> {
        ContentType::ALL
            .into_iter()
            .filter(move |ct| ct.phase() == Some(self))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown content type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown content type: {0}")]
pub struct UnknownContentType(pub String);

impl FromStr for ContentType {
    type Err = UnknownContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .into_iter()
            .find(|ct| ct.name() == s)
            .ok_or_else(|| UnknownContentType(s.to_string()))
    }
}

/// Which content types are disabled for one hostname.
///
/// Missing keys deserialize as `false`, so a stored `{}` or a partial record
/// is a valid "nothing disabled" entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostnameSettings {
    pub cookies: bool,
    pub local_storage: bool,
    pub session_storage: bool,
    pub cache_storage: bool,
    pub service_worker: bool,
    pub iframe: bool,
    pub javascript: bool,
    pub cache: bool,
}

impl HostnameSettings {
    /// Settings with nothing disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: disable one more content type.
    pub fn with(mut self, content_type: ContentType) -> Self {
        self.set(content_type, true);
        self
    }

    /// Check if a content type is disabled.
    pub fn disables(&self, content_type: ContentType) -> bool {
        match content_type {
            ContentType::Cookies => self.cookies,
            ContentType::LocalStorage => self.local_storage,
            ContentType::SessionStorage => self.session_storage,
            ContentType::CacheStorage => self.cache_storage,
            ContentType::ServiceWorker => self.service_worker,
            ContentType::Iframe => self.iframe,
            ContentType::Javascript => self.javascript,
            ContentType::Cache => self.cache,
        }
    }

    /// Set whether a content type is disabled.
    pub fn set(&mut self, content_type: ContentType, disabled: bool) {
        let flag = match content_type {
            ContentType::Cookies => &mut self.cookies,
            ContentType::LocalStorage => &mut self.local_storage,
            ContentType::SessionStorage => &mut self.session_storage,
            ContentType::CacheStorage => &mut self.cache_storage,
            ContentType::ServiceWorker => &mut self.service_worker,
            ContentType::Iframe => &mut self.iframe,
            ContentType::Javascript => &mut self.javascript,
            ContentType::Cache => &mut self.cache,
        };
        *flag = disabled;
    }

    /// Disabled content types purged in `phase`, in declaration order.
    pub fn disabled_in(&self, phase: Phase) -> Vec<ContentType> {
        phase.content_types().filter(|ct| self.disables(*ct)).collect()
    }

    /// All disabled content types.
    pub fn disabled(&self) -> Vec<ContentType> {
        ContentType::ALL
            .into_iter()
            .filter(|ct| self.disables(*ct))
            .collect()
    }

    /// Check if nothing is disabled.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Number of items of each content type found on a page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentCounts {
    pub cookies: usize,
    pub local_storage: usize,
    pub session_storage: usize,
    pub cache_storage: usize,
    pub service_worker: usize,
    pub iframe: usize,
    pub javascript: usize,
    pub cache: usize,
}

impl ContentCounts {
    /// Count for one content type.
    pub fn get(&self, content_type: ContentType) -> usize {
        match content_type {
            ContentType::Cookies => self.cookies,
            ContentType::LocalStorage => self.local_storage,
            ContentType::SessionStorage => self.session_storage,
            ContentType::CacheStorage => self.cache_storage,
            ContentType::ServiceWorker => self.service_worker,
            ContentType::Iframe => self.iframe,
            ContentType::Javascript => self.javascript,
            ContentType::Cache => self.cache,
        }
    }

    /// Sum over every content type.
    pub fn total(&self) -> usize {
        ContentType::ALL.into_iter().map(|ct| self.get(ct)).sum()
    }
}
