use thiserror::Error;

/// Every failure to establish or maintain a tunnel.
///
/// The variants only exist to produce a useful message; callers treat them
/// all the same way.
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("invalid local port: {0}")]
    InvalidPort(u16),

    #[error("a tunnel is already active: {0}")]
    SessionActive(String),

    #[error("nothing is listening on localhost:{port}: {source}")]
    UpstreamUnavailable {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start ngrok agent: {0}")]
    AgentSpawn(#[source] std::io::Error),

    #[error("ngrok agent failed to start: {0}")]
    AgentStartup(String),

    #[error("ngrok agent did not start within {timeout:?}")]
    AgentTimeout { timeout: std::time::Duration },

    #[error("no ngrok agent API available: {0}")]
    NoAgent(String),

    #[error("relay rejected the request ({status}): {message}")]
    Relay { status: u16, message: String },

    #[error("relay returned an invalid public URL: {0}")]
    InvalidPublicUrl(String),

    #[error("invalid agent API URL: {0}")]
    InvalidApiUrl(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TunnelError>;
