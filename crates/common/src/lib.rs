//! Common types shared across the origin guard crates.

pub mod error;

pub use error::{GuardError, GuardResult};

/// Identifier the host platform assigns to a browser tab.
pub type TabId = i64;
