//! TCP front end for the AT command server.
//!
//! Each TCP connection is served as one device session. A small demonstration
//! command set ([`demo`]) is registered by the `atserver` binary; embedders can
//! register their own commands through [`TcpAtServer::server_mut`] instead.

pub mod config;
pub mod demo;
pub mod error;
pub mod tcp_server;

pub use config::RunnerConfig;
pub use demo::{register_demo_commands, DemoSettings};
pub use error::{RunnerError, RunnerResult};
pub use tcp_server::{TcpAtServer, TcpDevice, SERVER_CLIENT};
