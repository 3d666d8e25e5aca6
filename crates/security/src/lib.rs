//! Browser security features.
//!
//! This crate implements the policy vocabulary of the privacy engine:
//! - Hostname resolution and tab match patterns
//! - Content Security Policy headers
//! - Content categories and per-host disablement settings

pub mod origin;
pub mod csp;
pub mod content;

pub use origin::{hostname_of, hostname_of_url, HostPattern};
pub use csp::{ContentSecurityPolicy, CspDirective, CspSource, CSP_HEADER};
pub use content::{ContentCounts, ContentType, HostnameSettings, Phase, UnknownContentType};
