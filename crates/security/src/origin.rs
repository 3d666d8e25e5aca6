//! Hostname resolution and tab match patterns.

use std::fmt;
use url::Url;

/// Schemes covered by the `*` scheme wildcard of a match pattern.
const WILDCARD_SCHEMES: [&str; 4] = ["http", "https", "ws", "wss"];

/// Extract the policy key (lowercased host) from a URL string.
///
/// Returns `None` for malformed URLs and for URLs without a host
/// (`about:blank`, `data:`, `file:///...`).
pub fn hostname_of(url_str: &str) -> Option<String> {
    let url = Url::parse(url_str).ok()?;
    hostname_of_url(&url)
}

/// Extract the policy key from an already parsed URL.
pub fn hostname_of_url(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if host.is_empty() {
        return None;
    }
    Some(host.to_lowercase())
}

/// A `*://*.<hostname>/*` match pattern.
///
/// Matches the hostname itself and every subdomain of it, over any of the
/// web schemes, on any path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HostPattern {
    hostname: String,
}

impl HostPattern {
    /// Create the pattern covering a hostname.
    pub fn for_hostname(hostname: &str) -> Self {
        Self {
            hostname: hostname.trim_start_matches("*.").to_lowercase(),
        }
    }

    /// The hostname this pattern is anchored on.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Check if a URL matches this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        if !WILDCARD_SCHEMES.contains(&url.scheme()) {
            return false;
        }

        match hostname_of_url(url) {
            Some(host) => self.matches_host(&host),
            None => false,
        }
    }

    /// Check if a bare hostname falls under this pattern.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        host == self.hostname
            || host
                .strip_suffix(self.hostname.as_str())
                .map_or(false, |prefix| prefix.ends_with('.'))
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*://*.{}/*", self.hostname)
    }
}
