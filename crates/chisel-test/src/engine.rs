//! Scripted engine for supervisor tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chisel_core::{ChiselError, Engine, Result, ShutdownContext};
use parking_lot::Mutex;

/// What `start` does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartBehavior {
    /// Runs until closed.
    BlockUntilClosed,
    /// Fails after the delay.
    FailAfter(Duration, String),
    /// Returns `Ok` at once.
    ReturnImmediately,
}

/// What `close` does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseBehavior {
    /// Stops start and returns.
    Prompt,
    /// Waits the delay, then stops start and returns.
    Delay(Duration),
    /// Never returns.
    Hang,
    /// Stops start and returns an error.
    Fail(String),
}

/// A call observed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// `start` was entered.
    StartEntered,
    /// `start` returned.
    StartReturned,
    /// `close` was entered.
    CloseEntered,
    /// `close` returned.
    CloseReturned,
}

#[derive(Debug, Default)]
struct CallLog {
    events: Mutex<Vec<EngineEvent>>,
    stopped: ShutdownContext,
}

/// Engine whose behavior is fixed up front.
#[derive(Debug)]
pub struct ScriptedEngine {
    name: String,
    start: StartBehavior,
    close: CloseBehavior,
    log: Arc<CallLog>,
}

impl ScriptedEngine {
    /// Creates an engine that blocks in start and closes promptly.
    #[must_use]
    pub fn new() -> Self {
        Self::named("scripted")
    }

    /// Creates an engine with a custom name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: StartBehavior::BlockUntilClosed,
            close: CloseBehavior::Prompt,
            log: Arc::new(CallLog::default()),
        }
    }

    /// Sets the start behavior.
    #[must_use]
    pub fn with_start(mut self, start: StartBehavior) -> Self {
        self.start = start;
        self
    }

    /// Sets the close behavior.
    #[must_use]
    pub fn with_close(mut self, close: CloseBehavior) -> Self {
        self.close = close;
        self
    }

    /// Returns a handle that observes this engine after it is moved.
    #[must_use]
    pub fn calls(&self) -> EngineCalls {
        EngineCalls {
            log: Arc::clone(&self.log),
        }
    }

    fn record(&self, event: EngineEvent) {
        self.log.events.lock().push(event);
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        self.record(EngineEvent::StartEntered);
        let result = match &self.start {
            StartBehavior::BlockUntilClosed => {
                self.log.stopped.cancelled().await;
                Ok(())
            }
            StartBehavior::FailAfter(delay, msg) => {
                tokio::time::sleep(*delay).await;
                Err(ChiselError::network(msg.clone()))
            }
            StartBehavior::ReturnImmediately => Ok(()),
        };
        self.record(EngineEvent::StartReturned);
        result
    }

    async fn close(&self) -> Result<()> {
        self.record(EngineEvent::CloseEntered);
        let result = match &self.close {
            CloseBehavior::Prompt => Ok(()),
            CloseBehavior::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            CloseBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            CloseBehavior::Fail(msg) => Err(ChiselError::engine_close(msg.clone())),
        };
        self.log.stopped.trigger();
        self.record(EngineEvent::CloseReturned);
        result
    }
}

/// Read-only view of a [`ScriptedEngine`]'s call log.
#[derive(Debug, Clone)]
pub struct EngineCalls {
    log: Arc<CallLog>,
}

impl EngineCalls {
    /// Returns every event so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<EngineEvent> {
        self.log.events.lock().clone()
    }

    /// Counts occurrences of one event.
    #[must_use]
    pub fn count(&self, event: EngineEvent) -> usize {
        self.log
            .events
            .lock()
            .iter()
            .filter(|e| **e == event)
            .count()
    }

    /// Returns true once close has been entered.
    #[must_use]
    pub fn close_called(&self) -> bool {
        self.count(EngineEvent::CloseEntered) > 0
    }
}
