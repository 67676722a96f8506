//! Shared test infrastructure for chisel-core.
//!
//! | Module | Covers |
//! |--------|--------|
//! | `mocks` | Scriptable engine for orchestrator tests |
//! | `lifecycle` | Start, shutdown and close ordering |
//! | `signal` | Signal delivery into the shutdown context |


pub use mocks::MockEngine;
