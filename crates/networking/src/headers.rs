//! HTTP response header handling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single header line, name casing preserved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Ordered list of response headers.
///
/// Unlike a map, repeated names are kept: appending a header never replaces
/// or reorders the ones already present.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderList {
    headers: Vec<Header>,
}

impl HeaderList {
    /// Create a new empty header list.
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Append a header after all existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header::new(name, value));
    }

    /// First value for a header name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.is(name))
            .map(|h| h.value.as_str())
    }

    /// Every value for a header name, in order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|h| h.is(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    /// Check if a header exists.
    pub fn contains(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h.is(name))
    }

    /// Get number of header lines.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Iterate over header lines.
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.headers.iter()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            headers: iter
                .into_iter()
                .map(|(name, value)| Header::new(name, value))
                .collect(),
        }
    }
}

impl fmt::Display for HeaderList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for header in &self.headers {
            writeln!(f, "{}: {}", header.name, header.value)?;
        }
        Ok(())
    }
}

/// Common HTTP headers.
pub mod names {
    pub const CACHE_CONTROL: &str = "cache-control";
    pub const CONTENT_SECURITY_POLICY: &str = "content-security-policy";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const SET_COOKIE: &str = "set-cookie";
    pub const X_FRAME_OPTIONS: &str = "x-frame-options";
}
