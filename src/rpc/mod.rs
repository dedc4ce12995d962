//! Loopback RPC between the running vault host and the CLI.
//!
//! This module provides:
//! - The line-delimited JSON wire format and the closed `Request` enum (`protocol`)
//! - The tokio TCP server and its request handler (`server`)
//! - The client the CLI uses (`client`)

pub mod client;
pub mod protocol;
pub mod server;

pub use client::RpcClient;
pub use protocol::{EnvVariables, Request, Response};
pub use server::{RpcHandler, RpcServer};
