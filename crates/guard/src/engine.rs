//! Privacy engine: routes browser events to the tracker, the interceptor
//! and the command handler.

use common::{GuardError, GuardResult, TabId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::commands::{Command, CommandHandler, CommandResult};
use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::executor::TaskPool;
use crate::interceptor::{InterceptDecision, ResponseDetails, ResponseInterceptor};
use crate::platform::Platform;
use crate::store::SettingsStore;
use crate::tracker::TabTracker;

/// Depth of the event queue between handles and the engine loop.
const EVENT_QUEUE_DEPTH: usize = 256;

/// An event delivered by the browser host.
#[derive(Debug)]
pub enum BrowserEvent {
    /// A tab's URL changed, or it stopped having one.
    TabUpdated { tab_id: TabId, url: Option<String> },
    TabRemoved { tab_id: TabId },
    /// Response headers arrived for a main or sub frame.
    HeadersReceived {
        details: ResponseDetails,
        respond: oneshot::Sender<InterceptDecision>,
    },
    Command {
        command: Command,
        respond: oneshot::Sender<CommandResult>,
    },
    /// Reply once every earlier lifecycle event and command has finished.
    Flush { respond: oneshot::Sender<()> },
}

/// The privacy engine.
pub struct PrivacyEngine {
    config: EngineConfig,
    tracker: Arc<TabTracker>,
    interceptor: Arc<ResponseInterceptor>,
    commands: Arc<CommandHandler>,
    pool: Arc<TaskPool>,
}

impl PrivacyEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn SettingsStore>, platform: Platform) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(platform.clone()));
        Self {
            tracker: Arc::new(TabTracker::new(store.clone(), dispatcher.clone())),
            interceptor: Arc::new(ResponseInterceptor::new(store.clone(), config.response_deadline)),
            commands: Arc::new(CommandHandler::new(store, platform, dispatcher)),
            pool: Arc::new(TaskPool::new(config.max_concurrent_tasks)),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &TabTracker {
        &self.tracker
    }

    /// Route one event. Never blocks on the work it starts.
    pub fn handle_event(&self, event: BrowserEvent) {
        match event {
            BrowserEvent::TabUpdated { tab_id, url } => {
                let tracker = self.tracker.clone();
                self.pool.enqueue(tab_id, async move {
                    tracker.on_navigate(tab_id, url.as_deref()).await;
                });
            }
            BrowserEvent::TabRemoved { tab_id } => {
                let tracker = self.tracker.clone();
                self.pool.enqueue(tab_id, async move {
                    tracker.on_tab_closed(tab_id).await;
                });
                self.pool.retire_lane(tab_id);
            }
            BrowserEvent::HeadersReceived { details, respond } => {
                // Bypasses the pool: decisions have their own deadline.
                let interceptor = self.interceptor.clone();
                tokio::spawn(async move {
                    let decision = interceptor.decide(&details).await;
                    if respond.send(decision).is_err() {
                        debug!("Nobody waiting for decision on {}", details.url);
                    }
                });
            }
            BrowserEvent::Command { command, respond } => {
                let commands = self.commands.clone();
                self.pool.spawn(async move {
                    let method = command.method();
                    let result = commands.handle(command).await;
                    if let Err(e) = &result {
                        warn!("Command {} failed: {}", method, e);
                    }
                    let _ = respond.send(result);
                });
            }
            BrowserEvent::Flush { respond } => {
                let pool = self.pool.clone();
                let mark = pool.mark();
                tokio::spawn(async move {
                    pool.wait_for(mark).await;
                    let _ = respond.send(());
                });
            }
        }
    }

    /// Consume events until every sender is gone, then wait for queued work.
    pub async fn run(self, mut events: mpsc::Receiver<BrowserEvent>) {
        info!("Privacy engine started");
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        self.pool.wait_idle().await;
        info!("Privacy engine stopped");
    }

    /// Run the engine on its own task.
    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let (events, receiver) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let task = tokio::spawn(self.run(receiver));
        (EngineHandle { events }, task)
    }
}

/// Cloneable handle for feeding a running engine.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    events: mpsc::Sender<BrowserEvent>,
}

impl EngineHandle {
    async fn send(&self, event: BrowserEvent) -> GuardResult<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| GuardError::channel_closed("privacy engine stopped"))
    }

    pub async fn tab_updated(&self, tab_id: TabId, url: Option<&str>) -> GuardResult<()> {
        self.send(BrowserEvent::TabUpdated {
            tab_id,
            url: url.map(str::to_string),
        })
        .await
    }

    pub async fn tab_removed(&self, tab_id: TabId) -> GuardResult<()> {
        self.send(BrowserEvent::TabRemoved { tab_id }).await
    }

    /// Ask how to rewrite a response.
    pub async fn intercept(&self, details: ResponseDetails) -> GuardResult<InterceptDecision> {
        let (respond, decision) = oneshot::channel();
        self.send(BrowserEvent::HeadersReceived { details, respond }).await?;
        decision
            .await
            .map_err(|_| GuardError::channel_closed("decision dropped"))
    }

    pub async fn command(&self, command: Command) -> GuardResult<CommandResult> {
        let (respond, reply) = oneshot::channel();
        self.send(BrowserEvent::Command { command, respond }).await?;
        reply
            .await
            .map_err(|_| GuardError::channel_closed("command reply dropped"))
    }

    /// Wait for every event sent so far to be fully handled.
    pub async fn flush(&self) -> GuardResult<()> {
        let (respond, done) = oneshot::channel();
        self.send(BrowserEvent::Flush { respond }).await?;
        done.await
            .map_err(|_| GuardError::channel_closed("flush dropped"))
    }
}
