//! UI command surface.

use browser_security::{ContentCounts, ContentType, HostnameSettings};
use common::{GuardError, GuardResult};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::dispatcher::{ClearReport, Dispatcher};
use crate::inspect::Inspector;
use crate::platform::Platform;
use crate::store::{settings_for, SettingsStore};

/// A message from the settings UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum Command {
    /// Purge one content type for a URL right now.
    Clear {
        url: String,
        #[serde(rename = "type")]
        content_type: ContentType,
    },
    /// Replace a hostname's settings and reload its tabs.
    UpdateDisablementSettings {
        hostname: String,
        settings: HostnameSettings,
    },
    GetDisablementSettings {
        hostname: String,
    },
    /// Count what a site currently holds.
    Inspect {
        url: String,
    },
}

impl Command {
    pub fn method(&self) -> &'static str {
        match self {
            Command::Clear { .. } => "clear",
            Command::UpdateDisablementSettings { .. } => "updateDisablementSettings",
            Command::GetDisablementSettings { .. } => "getDisablementSettings",
            Command::Inspect { .. } => "inspect",
        }
    }
}

/// Successful command outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CommandReply {
    Cleared(ClearReport),
    Applied { reloaded: usize },
    Settings(HostnameSettings),
    Counts(ContentCounts),
}

/// Failed command. Only a message crosses back to the UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct CommandFailure {
    pub message: String,
}

impl From<GuardError> for CommandFailure {
    fn from(e: GuardError) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

pub type CommandResult = Result<CommandReply, CommandFailure>;

/// Executes UI commands.
pub struct CommandHandler {
    store: Arc<dyn SettingsStore>,
    platform: Platform,
    dispatcher: Arc<Dispatcher>,
    inspector: Inspector,
}

impl CommandHandler {
    pub fn new(store: Arc<dyn SettingsStore>, platform: Platform, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            store,
            inspector: Inspector::new(platform.clone()),
            platform,
            dispatcher,
        }
    }

    pub async fn handle(&self, command: Command) -> CommandResult {
        let reply = match command {
            Command::Clear { url, content_type } => {
                CommandReply::Cleared(self.dispatcher.clear(&url, content_type).await?)
            }
            Command::UpdateDisablementSettings { hostname, settings } => CommandReply::Applied {
                reloaded: self.apply_settings(&hostname, settings).await?,
            },
            Command::GetDisablementSettings { hostname } => {
                CommandReply::Settings(settings_for(self.store.as_ref(), &normalize(&hostname)?).await)
            }
            Command::Inspect { url } => CommandReply::Counts(self.inspector.inspect(&url).await?),
        };
        Ok(reply)
    }

    /// Persist a hostname's settings, then reload every tab showing it.
    ///
    /// Reloads are only issued once the write succeeded, so each reloaded
    /// page is intercepted under the new settings. Returns the number of
    /// tabs reloaded.
    pub async fn apply_settings(&self, hostname: &str, settings: HostnameSettings) -> GuardResult<usize> {
        let hostname = normalize(hostname)?;
        self.store.set(&hostname, settings).await?;
        info!("Applied settings for {}: {:?}", hostname, settings.disabled());

        let tabs = self.platform.tabs_on(&hostname).await;
        let reloads = tabs.iter().map(|tab| self.platform.tabs.reload(tab.id));
        let results = join_all(reloads).await;

        let mut reloaded = 0;
        for (tab, result) in tabs.iter().zip(results) {
            match result {
                Ok(()) => reloaded += 1,
                Err(e) => warn!("Reloading tab {} failed: {}", tab.id, e),
            }
        }
        Ok(reloaded)
    }
}

/// Settings are keyed by the host exactly as URLs report it, so only
/// surrounding whitespace and case are folded.
fn normalize(hostname: &str) -> GuardResult<String> {
    let hostname = hostname.trim().to_ascii_lowercase();
    if hostname.is_empty() {
        return Err(GuardError::invalid_url("empty hostname"));
    }
    Ok(hostname)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::{ResponseDetails, ResponseInterceptor};
    use crate::sim::{FailPoint, HostCall, SimulatedBrowser};
    use crate::store::MemorySettingsStore;
    use async_trait::async_trait;
    use browser_security::{hostname_of, CSP_HEADER};
    use std::time::Duration;

    fn handler_with(store: Arc<dyn SettingsStore>, host: &SimulatedBrowser) -> CommandHandler {
        let platform = Platform::from_host(Arc::new(host.clone()));
        let dispatcher = Arc::new(Dispatcher::new(platform.clone()));
        CommandHandler::new(store, platform, dispatcher)
    }

    #[test]
    fn test_command_wire_format() {
        let command: Command =
            serde_json::from_str(r#"{"method":"clear","url":"https://example.com/","type":"cacheStorage"}"#)
                .unwrap();
        assert_eq!(
            command,
            Command::Clear {
                url: "https://example.com/".to_string(),
                content_type: ContentType::CacheStorage,
            }
        );
        assert_eq!(command.method(), "clear");

        let command: Command = serde_json::from_str(
            r#"{"method":"updateDisablementSettings","hostname":"example.com","settings":{"javascript":true}}"#,
        )
        .unwrap();
        assert_eq!(command.method(), "updateDisablementSettings");

        assert!(serde_json::from_str::<Command>(r#"{"method":"explode"}"#).is_err());
    }

    #[test]
    fn test_reply_wire_format() {
        let reply = CommandReply::Applied { reloaded: 2 };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["kind"], "applied");
        assert_eq!(json["reloaded"], 2);
    }

    #[tokio::test]
    async fn test_settings_persist_before_reload() {
        let host = SimulatedBrowser::new();
        host.open_tab(1, "https://example.com/");
        host.open_tab(2, "https://www.example.com/");
        host.open_tab(3, "https://elsewhere.example/");
        let store = Arc::new(host.recording_store());
        let handler = handler_with(store, &host);

        let reply = handler
            .handle(Command::UpdateDisablementSettings {
                hostname: "example.com".to_string(),
                settings: HostnameSettings::new().with(ContentType::Javascript),
            })
            .await
            .unwrap();
        assert_eq!(reply, CommandReply::Applied { reloaded: 2 });

        let calls = host.calls();
        let set_at = calls
            .iter()
            .position(|c| matches!(c, HostCall::SettingsSet { .. }))
            .unwrap();
        let reloads: Vec<_> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, HostCall::Reload { .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(reloads.len(), 2);
        assert!(reloads.iter().all(|i| *i > set_at));
        assert_eq!(host.page(3).unwrap().reloads, 0);
    }

    struct ReadOnlyStore;

    #[async_trait]
    impl SettingsStore for ReadOnlyStore {
        async fn get(&self, _hostname: &str) -> GuardResult<Option<HostnameSettings>> {
            Ok(None)
        }

        async fn set(&self, _hostname: &str, _settings: HostnameSettings) -> GuardResult<()> {
            Err(GuardError::storage("read-only"))
        }
    }

    #[tokio::test]
    async fn test_failed_persist_reloads_nothing() {
        let host = SimulatedBrowser::new();
        host.open_tab(1, "https://example.com/");
        let handler = handler_with(Arc::new(ReadOnlyStore), &host);

        let failure = handler
            .handle(Command::UpdateDisablementSettings {
                hostname: "example.com".to_string(),
                settings: HostnameSettings::new(),
            })
            .await
            .unwrap_err();

        assert!(failure.message.contains("read-only"));
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reload_failure_is_isolated() {
        let host = SimulatedBrowser::new();
        host.open_tab(1, "https://example.com/");
        host.open_tab(2, "https://example.com/");
        host.fail(FailPoint::Tab(1));
        let handler = handler_with(Arc::new(MemorySettingsStore::new()), &host);

        let reloaded = handler
            .apply_settings("example.com", HostnameSettings::new().with(ContentType::Iframe))
            .await
            .unwrap();
        assert_eq!(reloaded, 1);
        assert_eq!(host.page(2).unwrap().reloads, 1);
    }

    #[tokio::test]
    async fn test_applied_settings_reach_the_interceptor() {
        let host = SimulatedBrowser::new();
        host.open_tab(1, "https://example.com./");
        let store: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::new());
        let handler = handler_with(store.clone(), &host);
        let interceptor = ResponseInterceptor::new(store, Duration::from_millis(50));

        let hostname = hostname_of("https://example.com./").unwrap();
        let reloaded = handler
            .apply_settings(&hostname, HostnameSettings::new().with(ContentType::Javascript))
            .await
            .unwrap();
        assert_eq!(reloaded, 1);

        let decision = interceptor
            .decide(&ResponseDetails::main_frame("https://example.com./"))
            .await;
        assert_eq!(decision.response_headers.get(CSP_HEADER), Some("script-src 'none';"));

        // The dotted host is its own key.
        let decision = interceptor
            .decide(&ResponseDetails::main_frame("https://example.com/"))
            .await;
        assert!(decision.response_headers.is_empty());
    }

    #[tokio::test]
    async fn test_get_settings_defaults_when_absent() {
        let host = SimulatedBrowser::new();
        let store = Arc::new(MemorySettingsStore::with_entries([(
            "example.com",
            HostnameSettings::new().with(ContentType::Cookies),
        )]));
        let handler = handler_with(store, &host);

        let reply = handler
            .handle(Command::GetDisablementSettings {
                hostname: "Example.COM".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            reply,
            CommandReply::Settings(HostnameSettings::new().with(ContentType::Cookies))
        );

        let reply = handler
            .handle(Command::GetDisablementSettings {
                hostname: "other.example".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(reply, CommandReply::Settings(HostnameSettings::new()));
    }

    #[tokio::test]
    async fn test_clear_with_bad_url_is_a_failure() {
        let host = SimulatedBrowser::new();
        let handler = handler_with(Arc::new(MemorySettingsStore::new()), &host);

        let failure = handler
            .handle(Command::Clear {
                url: "not a url".to_string(),
                content_type: ContentType::Cookies,
            })
            .await
            .unwrap_err();
        assert!(failure.message.contains("not a url"));
    }
}
