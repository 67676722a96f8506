// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # chisel-tunnel
//!
//! Engines behind the [`chisel_core::Engine`] contract.
//!
//! - [`TunnelServer`] serves HTTP on `host:port`: tunnel websockets, the
//!   reverse proxy, health checks
//! - [`TunnelClient`] keeps a websocket to the server open with backoff
//! - [`generate_key_file`] backs `chisel server --keygen`
//!
//! The SSH session carried inside the websocket (remote routing, SOCKS5,
//! user authentication) is not implemented here; the engines provide the
//! connection lifecycle the supervisor drives.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod client;
pub mod keygen;
mod run_state;
pub mod server;

pub use backoff::BackoffConfig;
pub use client::TunnelClient;
pub use keygen::{KEY_PEM_LABEL, fingerprint, generate_key_file, key_material};
pub use server::TunnelServer;

/// Websocket subprotocol spoken between client and server.
pub const PROTOCOL_VERSION: &str = "chisel-v3";

/// Version reported by the server's `/version` endpoint.
pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");
