use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AgentConfig;
use crate::error::{Result, TunnelError};
use crate::protocol::{CreateTunnel, Protocol, TunnelName};

use super::agent::AgentProcess;
use super::api::{is_not_found, AgentApi};
use super::session::TunnelSession;

/// Opens and closes the single tunnel this process exposes.
///
/// Holds the agent it spawned, if any. The agent is killed when the manager
/// is dropped, so an early return or panic never leaves a public tunnel
/// behind.
pub struct TunnelManager {
    api: AgentApi,
    agent: Option<AgentProcess>,
    check_upstream: bool,
    active: Option<TunnelName>,
}

impl TunnelManager {
    /// Attach to the configured agent API, or spawn an agent when none is set
    pub async fn launch(config: &AgentConfig) -> Result<Self> {
        if let Some(api_url) = &config.api_url {
            info!("Using running ngrok agent at {}", api_url);
            return Ok(Self::attach(AgentApi::new(api_url)?));
        }

        Self::with_agent(AgentProcess::spawn(config).await?)
    }

    /// Take ownership of a started agent
    pub(crate) fn with_agent(agent: AgentProcess) -> Result<Self> {
        let api = AgentApi::new(agent.api_url())?;

        Ok(Self {
            api,
            agent: Some(agent),
            check_upstream: false,
            active: None,
        })
    }

    /// Use an agent this manager does not own
    pub fn attach(api: AgentApi) -> Self {
        Self {
            api,
            agent: None,
            check_upstream: false,
            active: None,
        }
    }

    /// Require a listener on the local port before opening a tunnel
    pub fn with_upstream_check(mut self, enabled: bool) -> Self {
        self.check_upstream = enabled;
        self
    }

    pub async fn open(&mut self, local_port: u16, protocol: Protocol) -> Result<TunnelSession> {
        if local_port == 0 {
            return Err(TunnelError::InvalidPort(local_port));
        }
        if let Some(name) = &self.active {
            return Err(TunnelError::SessionActive(name.to_string()));
        }

        if self.check_upstream {
            TcpStream::connect(("localhost", local_port))
                .await
                .map_err(|source| TunnelError::UpstreamUnavailable {
                    port: local_port,
                    source,
                })?;
            debug!("Found listener on localhost:{}", local_port);
        }

        let mut session =
            TunnelSession::pending(TunnelName::generate(protocol, local_port), local_port, protocol);
        let request = CreateTunnel::new(session.name().clone(), local_port, protocol);

        info!("Opening {} tunnel to localhost:{}", protocol, local_port);
        let tunnel = self.api.start_tunnel(&request).await?;
        let public_url = validate_public_url(&tunnel.public_url)?;

        session.activate(public_url);
        self.active = Some(session.name().clone());
        info!(
            "Tunnel {} active: {} -> localhost:{}",
            session.name(),
            session.public_url(),
            local_port
        );

        Ok(session)
    }

    pub async fn close(&mut self, session: &mut TunnelSession) -> Result<()> {
        if !session.is_active() {
            debug!("Tunnel {} is {}, nothing to close", session.name(), session.status());
            return Ok(());
        }

        let agent_exited = self.agent.as_mut().is_some_and(AgentProcess::has_exited);
        if agent_exited {
            warn!(
                "ngrok agent has exited, tunnel {} went down with it",
                session.name()
            );
        } else {
            match self.api.stop_tunnel(session.name()).await {
                Ok(()) => info!("Closed tunnel {}", session.name()),
                Err(e) if is_not_found(&e) => {
                    warn!("Tunnel {} was already gone on the relay", session.name())
                }
                Err(e) => return Err(e),
            }
        }

        session.mark_closed();
        if self.active.as_ref() == Some(session.name()) {
            self.active = None;
        }

        Ok(())
    }

    /// Stop the agent if this manager started it
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(agent) = self.agent.as_mut() {
            agent.stop().await?;
        }
        Ok(())
    }
}

fn validate_public_url(raw: &str) -> Result<String> {
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
            Ok(raw.to_string())
        }
        _ => Err(TunnelError::InvalidPublicUrl(raw.to_string())),
    }
}
