//! Origin Guard - per-site privacy policy engine.
//!
//! This crate ties the policy together:
//! - Tab lifecycle tracking with entry and exit purges
//! - The clearing dispatcher and its per-content-type strategies
//! - Response interception (script-blocking CSP, frame cancellation)
//! - The settings command surface
//! - An event loop with a bounded, per-tab ordered task pool

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod executor;
pub mod inspect;
pub mod interceptor;
pub mod platform;
pub mod scenario;
pub mod sim;
pub mod store;
pub mod tracker;

pub use commands::{Command, CommandFailure, CommandHandler, CommandReply, CommandResult};
pub use config::EngineConfig;
pub use dispatcher::{ClearReport, Dispatcher, PageAction, Strategy};
pub use engine::{BrowserEvent, EngineHandle, PrivacyEngine};
pub use executor::TaskPool;
pub use inspect::Inspector;
pub use interceptor::{FrameKind, InterceptDecision, ResponseDetails, ResponseInterceptor};
pub use platform::{
    BrowsingDataPlatform, CookiePlatform, DataKind, PageAgent, PageSnapshot, Platform, TabInfo, TabPlatform,
};
pub use scenario::{PageContent, Replay, Scenario, Step, StepOutcome};
pub use sim::{FailPoint, HostCall, SimulatedBrowser, SimulatedPage};
pub use store::{settings_for, JsonFileSettingsStore, MemorySettingsStore, SettingsStore};
pub use tracker::TabTracker;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
