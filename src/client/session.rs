use chrono::{DateTime, Local};
use std::fmt;

use crate::protocol::{Protocol, TunnelName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Active,
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Closed => write!(f, "closed"),
        }
    }
}

/// One exposure of a local port through the relay
#[derive(Debug, Clone)]
pub struct TunnelSession {
    name: TunnelName,
    local_port: u16,
    protocol: Protocol,
    public_url: String,
    status: SessionStatus,
    opened_at: Option<DateTime<Local>>,
    closed_at: Option<DateTime<Local>>,
}

impl TunnelSession {
    pub(crate) fn pending(name: TunnelName, local_port: u16, protocol: Protocol) -> Self {
        Self {
            name,
            local_port,
            protocol,
            public_url: String::new(),
            status: SessionStatus::Pending,
            opened_at: None,
            closed_at: None,
        }
    }

    pub(crate) fn activate(&mut self, public_url: String) {
        self.public_url = public_url;
        self.status = SessionStatus::Active;
        self.opened_at = Some(Local::now());
    }

    pub(crate) fn mark_closed(&mut self) {
        self.status = SessionStatus::Closed;
        self.closed_at = Some(Local::now());
    }

    pub fn name(&self) -> &TunnelName {
        &self.name
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Empty until the session is active
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// How long the tunnel was (or has been) public
    pub fn uptime(&self) -> Option<chrono::Duration> {
        let opened = self.opened_at?;
        Some(self.closed_at.unwrap_or_else(Local::now) - opened)
    }
}
