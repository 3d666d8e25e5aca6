//! Response interception policy.

use browser_security::{hostname_of, ContentSecurityPolicy, ContentType, HostnameSettings, CSP_HEADER};
use networking::HeaderList;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::store::SettingsStore;

/// Kind of frame a response loads into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    MainFrame,
    SubFrame,
}

/// A main- or sub-frame response whose headers have arrived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDetails {
    pub url: String,
    pub frame: FrameKind,
    /// Enclosing frame URLs, nearest first. The last one is the top-level page.
    #[serde(default)]
    pub frame_ancestors: Vec<String>,
    #[serde(default)]
    pub response_headers: HeaderList,
}

impl ResponseDetails {
    pub fn main_frame(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            frame: FrameKind::MainFrame,
            frame_ancestors: Vec::new(),
            response_headers: HeaderList::new(),
        }
    }

    pub fn sub_frame(url: impl Into<String>, ancestors: Vec<String>) -> Self {
        Self {
            url: url.into(),
            frame: FrameKind::SubFrame,
            frame_ancestors: ancestors,
            response_headers: HeaderList::new(),
        }
    }

    /// Builder: set the received headers.
    pub fn with_headers(mut self, headers: HeaderList) -> Self {
        self.response_headers = headers;
        self
    }

    pub fn is_sub_frame(&self) -> bool {
        self.frame == FrameKind::SubFrame
    }

    /// URL of the page the user is actually visiting.
    pub fn top_level_url(&self) -> &str {
        match self.frame {
            FrameKind::SubFrame => self.frame_ancestors.last().unwrap_or(&self.url),
            FrameKind::MainFrame => &self.url,
        }
    }
}

/// What to do with an intercepted response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptDecision {
    pub response_headers: HeaderList,
    pub cancel: bool,
}

impl InterceptDecision {
    /// Let the response through untouched.
    pub fn pass(details: &ResponseDetails) -> Self {
        Self {
            response_headers: details.response_headers.clone(),
            cancel: false,
        }
    }
}

/// Response interceptor.
pub struct ResponseInterceptor {
    store: Arc<dyn SettingsStore>,
    deadline: Duration,
}

impl ResponseInterceptor {
    pub fn new(store: Arc<dyn SettingsStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    /// Decide how to rewrite a response, based on the top-level origin's
    /// settings.
    ///
    /// Fails open: a late, failed or impossible settings read lets the
    /// response through unchanged.
    pub async fn decide(&self, details: &ResponseDetails) -> InterceptDecision {
        let top_level = details.top_level_url();
        let Some(hostname) = hostname_of(top_level) else {
            debug!("No hostname in {}, passing response through", top_level);
            return InterceptDecision::pass(details);
        };

        let Some(settings) = self.read_settings(&hostname).await else {
            return InterceptDecision::pass(details);
        };

        let mut response_headers = details.response_headers.clone();
        if settings.disables(ContentType::Javascript) {
            debug!("Blocking scripts for {} under {}", details.url, hostname);
            response_headers.append(CSP_HEADER, ContentSecurityPolicy::script_blocking().to_string());
        }

        let cancel = settings.disables(ContentType::Iframe) && details.is_sub_frame();
        if cancel {
            debug!("Cancelling frame {} under {}", details.url, hostname);
        }

        InterceptDecision {
            response_headers,
            cancel,
        }
    }

    async fn read_settings(&self, hostname: &str) -> Option<HostnameSettings> {
        match tokio::time::timeout(self.deadline, self.store.get(hostname)).await {
            Ok(Ok(settings)) => Some(settings.unwrap_or_default()),
            Ok(Err(e)) => {
                warn!("Settings read for {} failed, allowing response: {}", hostname, e);
                None
            }
            Err(_) => {
                warn!(
                    "Settings read for {} exceeded {:?}, allowing response",
                    hostname, self.deadline
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySettingsStore;
    use async_trait::async_trait;
    use common::{GuardError, GuardResult};

    fn interceptor(entries: Vec<(&str, HostnameSettings)>) -> ResponseInterceptor {
        ResponseInterceptor::new(
            Arc::new(MemorySettingsStore::with_entries(entries)),
            Duration::from_millis(50),
        )
    }

    fn headers() -> HeaderList {
        [("Content-Type", "text/html"), (CSP_HEADER, "default-src 'self'")]
            .into_iter()
            .collect()
    }

    struct SlowStore(Duration);

    #[async_trait]
    impl SettingsStore for SlowStore {
        async fn get(&self, _hostname: &str) -> GuardResult<Option<HostnameSettings>> {
            tokio::time::sleep(self.0).await;
            Ok(Some(HostnameSettings::new().with(ContentType::Javascript)))
        }

        async fn set(&self, _hostname: &str, _settings: HostnameSettings) -> GuardResult<()> {
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl SettingsStore for BrokenStore {
        async fn get(&self, _hostname: &str) -> GuardResult<Option<HostnameSettings>> {
            Err(GuardError::storage("disk on fire"))
        }

        async fn set(&self, _hostname: &str, _settings: HostnameSettings) -> GuardResult<()> {
            Err(GuardError::storage("disk on fire"))
        }
    }

    #[test]
    fn test_top_level_url() {
        let main = ResponseDetails::main_frame("https://example.com/");
        assert_eq!(main.top_level_url(), "https://example.com/");

        let nested = ResponseDetails::sub_frame(
            "https://ads.example/frame",
            vec!["https://widget.example/".into(), "https://news.example/".into()],
        );
        assert_eq!(nested.top_level_url(), "https://news.example/");

        let orphan = ResponseDetails::sub_frame("https://ads.example/frame", vec![]);
        assert_eq!(orphan.top_level_url(), "https://ads.example/frame");
    }

    #[tokio::test]
    async fn test_no_settings_passes_response_through() {
        let interceptor = interceptor(vec![]);
        let details = ResponseDetails::main_frame("https://example.com/").with_headers(headers());

        let decision = interceptor.decide(&details).await;
        assert_eq!(decision.response_headers, headers());
        assert!(!decision.cancel);

        let frame = ResponseDetails::sub_frame("https://x.example/", vec!["https://example.com/".into()]);
        assert!(!interceptor.decide(&frame).await.cancel);
    }

    #[tokio::test]
    async fn test_javascript_disabled_appends_csp() {
        let interceptor = interceptor(vec![(
            "example.com",
            HostnameSettings::new().with(ContentType::Javascript),
        )]);
        let details = ResponseDetails::main_frame("https://example.com/").with_headers(headers());

        let decision = interceptor.decide(&details).await;

        assert!(!decision.cancel);
        assert_eq!(decision.response_headers.len(), 3);
        assert_eq!(
            decision.response_headers.get_all(CSP_HEADER),
            vec!["default-src 'self'", "script-src 'none';"]
        );
    }

    #[tokio::test]
    async fn test_iframe_disabled_cancels_sub_frames_only() {
        let interceptor = interceptor(vec![(
            "example.com",
            HostnameSettings::new().with(ContentType::Iframe),
        )]);

        let frame = ResponseDetails::sub_frame("https://embed.other/", vec!["https://example.com/".into()])
            .with_headers(headers());
        let decision = interceptor.decide(&frame).await;
        assert!(decision.cancel);
        assert_eq!(decision.response_headers, headers());

        let main = ResponseDetails::main_frame("https://example.com/");
        assert!(!interceptor.decide(&main).await.cancel);
    }

    #[tokio::test]
    async fn test_frame_policy_follows_top_level_origin() {
        let interceptor = interceptor(vec![(
            "embed.other",
            HostnameSettings::new().with(ContentType::Iframe).with(ContentType::Javascript),
        )]);

        let frame = ResponseDetails::sub_frame("https://embed.other/", vec!["https://example.com/".into()]);
        let decision = interceptor.decide(&frame).await;
        assert!(!decision.cancel);
        assert!(decision.response_headers.is_empty());
    }

    #[tokio::test]
    async fn test_slow_store_fails_open() {
        let interceptor =
            ResponseInterceptor::new(Arc::new(SlowStore(Duration::from_millis(200))), Duration::from_millis(10));
        let details = ResponseDetails::main_frame("https://example.com/").with_headers(headers());

        let decision = interceptor.decide(&details).await;
        assert_eq!(decision, InterceptDecision::pass(&details));
    }

    #[tokio::test]
    async fn test_store_error_fails_open() {
        let interceptor = ResponseInterceptor::new(Arc::new(BrokenStore), Duration::from_millis(50));
        let details = ResponseDetails::sub_frame("https://x.example/", vec!["https://example.com/".into()]);

        let decision = interceptor.decide(&details).await;
        assert!(!decision.cancel);
        assert!(decision.response_headers.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_url_fails_open() {
        let interceptor = interceptor(vec![]);
        let details = ResponseDetails::main_frame("not a url");
        assert_eq!(interceptor.decide(&details).await, InterceptDecision::pass(&details));
    }

    #[test]
    fn test_details_wire_format() {
        let details: ResponseDetails = serde_json::from_str(
            r#"{"url":"https://x.example/","frame":"sub_frame","frameAncestors":["https://example.com/"]}"#,
        )
        .unwrap();
        assert!(details.is_sub_frame());
        assert!(details.response_headers.is_empty());
    }
}
