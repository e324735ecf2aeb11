//! Tunnel client implementation.
//!
//! This module provides the core tunnel functionality:
//! - [`TunnelManager`] - Opens and closes the tunnel through the ngrok agent
//! - [`TunnelSession`] - State of one exposed port
//! - Agent process supervision and the agent's HTTP API
//! - Console banner and the Enter-to-close gate

mod agent;
mod api;
pub mod console;
mod manager;
mod session;

pub use api::AgentApi;
pub use manager::TunnelManager;
