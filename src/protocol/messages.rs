use serde::{Deserialize, Serialize};
use std::fmt;

use super::TunnelName;

/// Tunnel protocol. The relay is only ever asked for HTTP tunnels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
        }
    }
}

/// Body of `POST /api/tunnels`
#[derive(Debug, Clone, Serialize)]
pub struct CreateTunnel {
    pub name: TunnelName,
    pub addr: String,
    pub proto: Protocol,
}

impl CreateTunnel {
    pub fn new(name: TunnelName, local_port: u16, proto: Protocol) -> Self {
        CreateTunnel {
            name,
            addr: local_port.to_string(),
            proto,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A tunnel as reported by the agent
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelResource {
    pub name: TunnelName,
    pub public_url: String,
    /// The agent reports `https` for HTTP tunnels with TLS termination
    pub proto: String,
    #[serde(default)]
    pub config: TunnelConfigInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TunnelConfigInfo {
    #[serde(default)]
    pub addr: String,
}

/// Body of `GET /api/tunnels`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TunnelList {
    #[serde(default)]
    pub tunnels: Vec<TunnelResource>,
}

/// Error payload returned by the agent with non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct AgentErrorBody {
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub details: Option<AgentErrorDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentErrorDetails {
    #[serde(default)]
    pub err: Option<String>,
}

/// One line of the agent's `--log-format=json` output
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentLogLine {
    #[serde(default)]
    pub lvl: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub addr: Option<String>,
    #[serde(default)]
    pub err: Option<String>,
}

impl AgentLogLine {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.lvl.as_str(), "eror" | "crit")
    }

    /// `err` when it carries something, else `msg`
    pub fn reason(&self) -> &str {
        self.err
            .as_deref()
            .filter(|e| !e.is_empty() && *e != "<nil>")
            .unwrap_or(self.msg.as_str())
    }
}

impl TunnelResource {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl AgentErrorBody {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Most specific reason available: `details.err`, then `msg`.
    pub fn reason(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.err.as_deref())
            .filter(|s| !s.is_empty())
            .or_else(|| Some(self.msg.as_str()).filter(|s| !s.is_empty()))
    }
}

/// Turn an error response body into a readable message, falling back to the
/// raw text when it isn't the agent's JSON shape.
pub fn error_message(body: &str) -> String {
    match AgentErrorBody::from_json(body) {
        Ok(parsed) => parsed
            .reason()
            .map(str::to_string)
            .unwrap_or_else(|| body.trim().to_string()),
        Err(_) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tunnel_body() {
        let req = CreateTunnel::new(TunnelName("http-8000-1".to_string()), 8000, Protocol::Http);
        let json: serde_json::Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();

        assert_eq!(json["name"], "http-8000-1");
        assert_eq!(json["addr"], "8000");
        assert_eq!(json["proto"], "http");
    }

    #[test]
    fn test_parse_tunnel_resource() {
        let json = r#"{
            "name": "http-8000-1",
            "ID": "2b4e1c",
            "uri": "/api/tunnels/http-8000-1",
            "public_url": "https://abcd1234.ngrok-free.app",
            "proto": "https",
            "config": {"addr": "http://localhost:8000", "inspect": true},
            "metrics": {}
        }"#;

        let tunnel = TunnelResource::from_json(json).unwrap();
        assert_eq!(tunnel.name.as_str(), "http-8000-1");
        assert_eq!(tunnel.public_url, "https://abcd1234.ngrok-free.app");
        assert_eq!(tunnel.config.addr, "http://localhost:8000");
    }

    #[test]
    fn test_error_message_prefers_details() {
        let body = r#"{"error_code":102,"status_code":400,"msg":"invalid tunnel configuration","details":{"err":"addr is required"}}"#;
        assert_eq!(error_message(body), "addr is required");

        let body = r#"{"error_code":100,"status_code":404,"msg":"tunnel not found","details":{}}"#;
        assert_eq!(error_message(body), "tunnel not found");
    }

    #[test]
    fn test_parse_agent_log_line() {
        let line = AgentLogLine::from_json(
            r#"{"addr":"127.0.0.1:4040","allow_hosts":[],"lvl":"info","msg":"starting web service","obj":"web","t":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(line.msg, "starting web service");
        assert_eq!(line.addr.as_deref(), Some("127.0.0.1:4040"));
        assert!(!line.is_fatal());
        assert_eq!(line.reason(), "starting web service");
    }

    #[test]
    fn test_agent_log_line_reason() {
        let line = AgentLogLine::from_json(
            r#"{"lvl":"eror","msg":"session closing","err":"authentication failed"}"#,
        )
        .unwrap();
        assert!(line.is_fatal());
        assert_eq!(line.reason(), "authentication failed");

        let line = AgentLogLine::from_json(r#"{"lvl":"crit","msg":"boom","err":"<nil>"}"#).unwrap();
        assert_eq!(line.reason(), "boom");

        assert!(AgentLogLine::from_json("t=1 lvl=info msg=plain").is_err());
    }

    #[test]
    fn test_error_message_raw_fallback() {
        assert_eq!(error_message("bad gateway\n"), "bad gateway");
    }
}
