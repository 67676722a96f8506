// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # chisel-test
//!
//! Testing infrastructure for the chisel supervisor.
//!
//! This crate provides:
//! - **Scripted engine**: an [`Engine`](chisel_core::Engine) whose start and
//!   close behavior is chosen per test, with a call log
//! - **Supervisor harness**: runs an orchestrator against injected signals
//!   and exposes its lifecycle state
//!
//! ## Example
//!
//! ```rust,ignore
//! use chisel_test::{CloseBehavior, ScriptedEngine, SupervisorHarness};
//!
//! let engine = ScriptedEngine::new().with_close(CloseBehavior::Hang);
//! let running = SupervisorHarness::server(engine).launch();
//! running.interrupt().await?;
//! assert_eq!(running.finish().await?, ShutdownOutcome::TimedOut);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod harness;

pub use engine::{CloseBehavior, EngineCalls, EngineEvent, ScriptedEngine, StartBehavior};
pub use error::{Result, TestError};
pub use harness::{RunningSupervisor, SupervisorHarness};
