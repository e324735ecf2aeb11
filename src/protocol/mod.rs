//! Wire types for the ngrok agent API.
//!
//! Defines the JSON bodies exchanged with the agent's `/api/tunnels`
//! endpoints:
//! - [`CreateTunnel`] - Request to open a tunnel
//! - [`TunnelResource`] - A tunnel as reported by the agent
//! - [`AgentErrorBody`] - Error payload for non-2xx responses
//!
//! and [`AgentLogLine`], one line of the agent's JSON log output.
//!
//! Also provides the [`TunnelName`] wrapper.

mod ids;
mod messages;

pub use ids::*;
pub use messages::*;
