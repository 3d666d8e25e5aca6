//! Networking data types shared with the privacy engine.
//!
//! This crate handles:
//! - Response header lists as delivered by the interception hook
//! - Cookie parsing, matching and an in-memory cookie jar

pub mod headers;
pub mod cookies;

pub use headers::{Header, HeaderList};
pub use cookies::{Cookie, CookieJar};
