//! Lifecycle contract for tunnel engines.

use async_trait::async_trait;

use crate::error::Result;

/// A tunnel engine driven by the supervisor.
///
/// The orchestrator shares one engine between two tasks through an `Arc`,
/// so both methods take `&self`.
///
/// # Implementation Guidelines
///
/// 1. **construct**: validate configuration in the engine's own constructor.
///    Misconfiguration must fail there, before any task is spawned.
///
/// 2. **start**: run until the engine is closed or fails. Returning `Ok`
///    means the engine wound down on its own; returning `Err` ends the
///    process.
///
/// 3. **close**: stop the engine and return once it has released its
///    resources. Must be safe to call before `start` has made progress and
///    must not wait on a start that never ran. Called at most once.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use chisel_core::{Engine, Result, ShutdownContext};
///
/// struct IdleEngine {
///     stop: ShutdownContext,
/// }
///
/// #[async_trait]
/// impl Engine for IdleEngine {
///     fn name(&self) -> &str { "idle" }
///
///     async fn start(&self) -> Result<()> {
///         self.stop.cancelled().await;
///         Ok(())
///     }
///
///     async fn close(&self) -> Result<()> {
///         self.stop.trigger();
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Human-readable engine name.
    fn name(&self) -> &str;

    /// Runs the engine.
    ///
    /// # Errors
    /// Returns an error if the engine cannot run; the supervisor treats it as
    /// fatal.
    async fn start(&self) -> Result<()>;

    /// Stops the engine.
    ///
    /// # Errors
    /// Returns an error if resources could not be released cleanly; the
    /// supervisor logs it and proceeds with exit.
    async fn close(&self) -> Result<()>;
}
