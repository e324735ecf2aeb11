//! Type-safe name wrapper for agent-side tunnels.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Protocol;

/// Name the agent knows a tunnel by; used to destroy it again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TunnelName(pub String);

impl TunnelName {
    /// Build a name unique to this process: `<proto>-<port>-<pid>-<millis>`.
    pub fn generate(protocol: Protocol, local_port: u16) -> Self {
        TunnelName(format!(
            "{}-{}-{}-{}",
            protocol,
            local_port,
            std::process::id(),
            chrono::Local::now().timestamp_millis()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TunnelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TunnelName {
    fn from(s: String) -> Self {
        TunnelName(s)
    }
}
