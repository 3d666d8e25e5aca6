//! Cookies as the privacy engine sees them: parsed from `Set-Cookie`,
//! matched against page URLs and purged by URL and name.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// A stored cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Lowercased domain attribute, leading dot kept as sent.
    pub domain: Option<String>,
    pub path: Option<String>,
    /// Lifetime in seconds from `created`.
    pub max_age: Option<u64>,
    pub secure: bool,
    /// Hidden from page scripts but still visible to the cookie platform.
    pub http_only: bool,
    /// Unix seconds.
    pub created: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Domain-match a host against a cookie domain (leading dot ignored).
fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    host == domain
        || host
            .strip_suffix(domain)
            .map_or(false, |prefix| prefix.ends_with('.'))
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            max_age: None,
            secure: false,
            http_only: false,
            created: now_secs(),
        }
    }

    /// Parse a `Set-Cookie` header value. `None` without a `name=value`
    /// pair or with an empty name. Unknown attributes are ignored.
    pub fn parse(header: &str) -> Option<Self> {
        let mut segments = header.split(';');
        let (name, value) = segments.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim());
        for segment in segments {
            let (key, val) = match segment.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (segment.trim(), None),
            };

            match key.to_ascii_lowercase().as_str() {
                "domain" => cookie.domain = val.map(str::to_ascii_lowercase),
                "path" => cookie.path = val.map(str::to_string),
                "max-age" => cookie.max_age = val.and_then(|v| v.parse().ok()),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }

        Some(cookie)
    }

    /// Past its max-age. Session cookies never expire here.
    pub fn is_expired(&self) -> bool {
        self.max_age
            .map_or(false, |max_age| self.created + max_age < now_secs())
    }

    /// Whether a request to `url` would carry this cookie.
    pub fn matches_url(&self, url: &Url) -> bool {
        let scheme_ok = !self.secure || url.scheme() == "https";
        let domain_ok = match &self.domain {
            Some(domain) => url
                .host_str()
                .map_or(false, |host| domain_matches(&host.to_ascii_lowercase(), domain)),
            None => true,
        };
        let path_ok = self
            .path
            .as_deref()
            .map_or(true, |path| url.path().starts_with(path));

        scheme_ok && domain_ok && path_ok
    }
}

/// Cookie jar for storing cookies.
#[derive(Clone, Debug, Default)]
pub struct CookieJar {
    /// Cookies indexed by domain and name.
    cookies: HashMap<String, IndexMap<String, Cookie>>,
}

impl CookieJar {
    /// Create a new cookie jar.
    pub fn new() -> Self {
        Self {
            cookies: HashMap::new(),
        }
    }

    /// Add a cookie from a Set-Cookie response header.
    pub fn add_from_response(&mut self, url: &Url, header: &str) -> bool {
        let Some(mut cookie) = Cookie::parse(header) else {
            return false;
        };

        if cookie.domain.is_none() {
            cookie.domain = url.host_str().map(|s| s.to_lowercase());
        }

        if cookie.path.is_none() {
            cookie.path = Some("/".to_string());
        }

        self.add(cookie);
        true
    }

    /// Add a cookie.
    pub fn add(&mut self, cookie: Cookie) {
        let domain = cookie
            .domain
            .as_deref()
            .unwrap_or_default()
            .trim_start_matches('.')
            .to_string();
        let cookies = self.cookies.entry(domain).or_insert_with(IndexMap::new);
        cookies.insert(cookie.name.clone(), cookie);
    }

    /// Get cookies for a URL, http-only ones included.
    pub fn get_cookies(&self, url: &Url) -> Vec<&Cookie> {
        let host = url.host_str().unwrap_or("").to_lowercase();

        self.cookies
            .iter()
            .filter(|(domain, _)| domain_matches(&host, domain))
            .flat_map(|(_, cookies)| cookies.values())
            .filter(|cookie| !cookie.is_expired() && cookie.matches_url(url))
            .collect()
    }

    /// Remove the cookies named `name` that are visible to `url`.
    /// Returns how many were removed.
    pub fn remove_for_url(&mut self, url: &Url, name: &str) -> usize {
        let host = url.host_str().unwrap_or("").to_lowercase();
        let mut removed = 0;

        for (domain, cookies) in self.cookies.iter_mut() {
            if !domain_matches(&host, domain) {
                continue;
            }
            let visible = cookies
                .get(name)
                .map_or(false, |cookie| cookie.matches_url(url));
            if visible {
                cookies.shift_remove(name);
                removed += 1;
            }
        }

        self.cookies.retain(|_, cookies| !cookies.is_empty());
        removed
    }

    /// Clear all cookies.
    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Get total number of cookies.
    pub fn len(&self) -> usize {
        self.cookies.values().map(|c| c.len()).sum()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.cookies.values().all(|c| c.is_empty())
    }
}
