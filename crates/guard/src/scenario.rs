//! Scripted browsing sessions replayed against the simulated host.

use browser_security::{ContentSecurityPolicy, HostnameSettings, CSP_HEADER};
use common::{GuardResult, TabId};
use networking::HeaderList;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::commands::{Command, CommandReply};
use crate::engine::EngineHandle;
use crate::interceptor::ResponseDetails;
use crate::sim::{SimulatedBrowser, SimulatedPage};
use crate::store::SettingsStore;

/// A recorded session.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Scenario {
    /// Settings stored before the first step.
    #[serde(default)]
    pub settings: BTreeMap<String, HostnameSettings>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub async fn load(path: impl AsRef<Path>) -> GuardResult<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Store the scenario's initial settings.
    pub async fn seed_settings(&self, store: &dyn SettingsStore) -> GuardResult<()> {
        for (hostname, settings) in &self.settings {
            store.set(hostname, *settings).await?;
        }
        Ok(())
    }
}

/// Content a page starts with.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageContent {
    pub iframes: usize,
    pub scripts: usize,
    pub caches: Vec<String>,
    pub workers: Vec<String>,
    pub session_storage: BTreeMap<String, String>,
}

impl PageContent {
    fn apply(&self, page: &mut SimulatedPage) {
        page.iframes = self.iframes;
        page.scripts = self.scripts;
        page.caches = self.caches.clone();
        page.workers = self.workers.clone();
        page.session_storage = self.session_storage.clone();
    }
}

/// One session step.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum Step {
    #[serde(rename_all = "camelCase")]
    Open {
        tab_id: TabId,
        url: String,
        #[serde(default)]
        content: PageContent,
    },
    /// Without a URL the tab reports no address and the host page is left alone.
    #[serde(rename_all = "camelCase")]
    Navigate {
        tab_id: TabId,
        url: Option<String>,
        #[serde(default)]
        content: PageContent,
    },
    #[serde(rename_all = "camelCase")]
    Close { tab_id: TabId },
    Response(ResponseDetails),
    Command { command: Command },
    SetCookie { url: String, header: String },
}

/// Observable result of a step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum StepOutcome {
    #[serde(rename_all = "camelCase")]
    Decision {
        url: String,
        cancel: bool,
        response_headers: HeaderList,
        scripts_blocked: bool,
    },
    Reply {
        method: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply: Option<CommandReply>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Drives a running engine and the host it is attached to, step by step.
pub struct Replay<'a> {
    host: &'a SimulatedBrowser,
    engine: &'a EngineHandle,
}

impl<'a> Replay<'a> {
    pub fn new(host: &'a SimulatedBrowser, engine: &'a EngineHandle) -> Self {
        Self { host, engine }
    }

    /// Run every step, waiting for the engine to settle after each one.
    pub async fn run(&self, scenario: &Scenario) -> GuardResult<Vec<StepOutcome>> {
        let mut outcomes = Vec::new();
        for (index, step) in scenario.steps.iter().enumerate() {
            debug!("Step {}: {:?}", index, step);
            if let Some(outcome) = self.step(step).await? {
                outcomes.push(outcome);
            }
            self.engine.flush().await?;
        }
        info!("Replayed {} steps", scenario.steps.len());
        Ok(outcomes)
    }

    async fn step(&self, step: &Step) -> GuardResult<Option<StepOutcome>> {
        match step {
            Step::Open {
                tab_id,
                url,
                content,
            } => {
                self.host.open_tab(*tab_id, url);
                self.host.seed_page(*tab_id, |page| content.apply(page));
                self.engine.tab_updated(*tab_id, Some(url)).await?;
            }
            Step::Navigate {
                tab_id,
                url,
                content,
            } => {
                if let Some(url) = url {
                    self.host.navigate(*tab_id, url);
                    self.host.seed_page(*tab_id, |page| content.apply(page));
                }
                self.engine.tab_updated(*tab_id, url.as_deref()).await?;
            }
            Step::Close { tab_id } => {
                self.host.close_tab(*tab_id);
                self.engine.tab_removed(*tab_id).await?;
            }
            Step::SetCookie { url, header } => {
                self.host.set_cookie(url, header);
            }
            Step::Response(details) => {
                let decision = self.engine.intercept(details.clone()).await?;
                let scripts_blocked = decision
                    .response_headers
                    .get_all(CSP_HEADER)
                    .into_iter()
                    .any(|value| ContentSecurityPolicy::parse(value).blocks_all_scripts());
                return Ok(Some(StepOutcome::Decision {
                    url: details.url.clone(),
                    cancel: decision.cancel,
                    response_headers: decision.response_headers,
                    scripts_blocked,
                }));
            }
            Step::Command { command } => {
                let method = command.method();
                let outcome = match self.engine.command(command.clone()).await? {
                    Ok(reply) => StepOutcome::Reply {
                        method,
                        reply: Some(reply),
                        error: None,
                    },
                    Err(failure) => StepOutcome::Reply {
                        method,
                        reply: None,
                        error: Some(failure.message),
                    },
                };
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::PrivacyEngine;
    use crate::platform::Platform;
    use crate::store::MemorySettingsStore;
    use std::sync::Arc;

    const SESSION: &str = r#"{
        "settings": {
            "a.example": { "cookies": true, "javascript": true },
            "news.example": { "iframe": true }
        },
        "steps": [
            { "step": "setCookie", "url": "https://a.example/", "header": "id=42" },
            { "step": "open", "tabId": 1, "url": "https://a.example/" },
            { "step": "response", "url": "https://a.example/", "frame": "main_frame",
              "responseHeaders": [{ "name": "Content-Type", "value": "text/html" }] },
            { "step": "navigate", "tabId": 1, "url": "https://news.example/", "content": { "iframes": 3 } },
            { "step": "response", "url": "https://ads.example/", "frame": "sub_frame",
              "frameAncestors": ["https://news.example/"] },
            { "step": "command", "command": { "method": "inspect", "url": "https://news.example/" } },
            { "step": "command", "command": { "method": "clear", "url": "nope", "type": "cookies" } },
            { "step": "close", "tabId": 1 }
        ]
    }"#;

    #[tokio::test]
    async fn test_replay_session() {
        let scenario: Scenario = serde_json::from_str(SESSION).unwrap();
        let store = Arc::new(MemorySettingsStore::new());
        scenario.seed_settings(store.as_ref()).await.unwrap();

        let host = SimulatedBrowser::new();
        let engine = PrivacyEngine::new(EngineConfig::default(), store, Platform::from_host(Arc::new(host.clone())));
        let (handle, _task) = engine.spawn();

        let outcomes = Replay::new(&host, &handle).run(&scenario).await.unwrap();
        assert_eq!(outcomes.len(), 4);

        match &outcomes[0] {
            StepOutcome::Decision {
                scripts_blocked,
                cancel,
                response_headers,
                ..
            } => {
                assert!(scripts_blocked);
                assert!(!cancel);
                assert_eq!(response_headers.len(), 2);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(outcomes[1], StepOutcome::Decision { cancel: true, .. }));
        match &outcomes[2] {
            StepOutcome::Reply {
                reply: Some(CommandReply::Counts(counts)),
                ..
            } => assert_eq!(counts.iframe, 0),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(outcomes[3], StepOutcome::Reply { error: Some(_), .. }));

        // Leaving a.example purged its cookie.
        assert_eq!(host.cookie_count("https://a.example/"), 0);
        assert!(host.tab_ids().is_empty());
    }

    #[test]
    fn test_outcome_wire_format() {
        let outcome = StepOutcome::Reply {
            method: "inspect",
            reply: None,
            error: Some("boom".to_string()),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "reply");
        assert_eq!(json["error"], "boom");
        assert!(json.get("reply").is_none());
    }
}
