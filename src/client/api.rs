use reqwest::{Client, Response, StatusCode};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{Result, TunnelError};
use crate::protocol::{error_message, CreateTunnel, TunnelList, TunnelName, TunnelResource};

/// Shared HTTP client for connection pooling and reuse
static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

/// Get or create the shared HTTP client
fn get_client() -> &'static Client {
    HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to create HTTP client")
    })
}

/// Client for the ngrok agent's local tunnel API
#[derive(Debug, Clone)]
pub struct AgentApi {
    base_url: Url,
}

impl AgentApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn tunnels_url(&self) -> Result<Url> {
        Ok(self.base_url.join("/api/tunnels")?)
    }

    fn tunnel_url(&self, name: &TunnelName) -> Result<Url> {
        let mut url = self.tunnels_url()?;
        url.path_segments_mut()
            .map_err(|_| TunnelError::NoAgent(format!("{} cannot be a base", self.base_url)))?
            .push(name.as_str());
        Ok(url)
    }

    /// Ask the agent to open a tunnel
    pub async fn start_tunnel(&self, request: &CreateTunnel) -> Result<TunnelResource> {
        let url = self.tunnels_url()?;
        debug!("POST {} {}", url, request.to_json()?);

        let response = get_client().post(url).json(request).send().await?;
        let response = check_status(response).await?;

        Ok(TunnelResource::from_json(&response.text().await?)?)
    }

    /// List tunnels the agent currently holds
    pub async fn list_tunnels(&self) -> Result<Vec<TunnelResource>> {
        let url = self.tunnels_url()?;
        debug!("GET {}", url);

        let response = get_client().get(url).send().await?;
        let response = check_status(response).await?;
        let list: TunnelList = serde_json::from_str(&response.text().await?)?;

        Ok(list.tunnels)
    }

    /// Destroy a tunnel by name
    pub async fn stop_tunnel(&self, name: &TunnelName) -> Result<()> {
        let url = self.tunnel_url(name)?;
        debug!("DELETE {}", url);

        let response = get_client().delete(url).send().await?;
        check_status(response).await?;

        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    Err(TunnelError::Relay {
        status: status.as_u16(),
        message: if message.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        } else {
            message
        },
    })
}

/// Whether an error means the relay no longer knows the tunnel
pub fn is_not_found(err: &TunnelError) -> bool {
    matches!(err, TunnelError::Relay { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Protocol;
    use tokio_test::assert_ok;

    #[test]
    fn test_invalid_base_url() {
        assert!(AgentApi::new("not a url").is_err());
        assert_ok!(AgentApi::new("http://127.0.0.1:4040"));
    }

    #[test]
    fn test_tunnel_url_escapes_name() {
        let api = AgentApi::new("http://127.0.0.1:4040").unwrap();
        let url = api
            .tunnel_url(&TunnelName("http-8000-1".to_string()))
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:4040/api/tunnels/http-8000-1");
    }

    #[tokio::test]
    async fn test_start_tunnel() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/api/tunnels")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "name": "http-8000-1",
                "addr": "8000",
                "proto": "http"
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"name":"http-8000-1","uri":"/api/tunnels/http-8000-1","public_url":"https://abcd1234.ngrok-free.app","proto":"https","config":{"addr":"http://localhost:8000","inspect":true}}"#,
            )
            .create_async()
            .await;

        let api = AgentApi::new(&server.url()).unwrap();
        let request = CreateTunnel::new(TunnelName("http-8000-1".to_string()), 8000, Protocol::Http);
        let tunnel = api.start_tunnel(&request).await.unwrap();

        assert_eq!(tunnel.public_url, "https://abcd1234.ngrok-free.app");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_start_tunnel_rejected() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/api/tunnels")
            .with_status(502)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error_code":103,"status_code":502,"msg":"failed to start tunnel","details":{"err":"Your account is limited to 1 simultaneous ngrok agent session."}}"#,
            )
            .create_async()
            .await;

        let api = AgentApi::new(&server.url()).unwrap();
        let request = CreateTunnel::new(TunnelName("http-8000-1".to_string()), 8000, Protocol::Http);
        let err = api.start_tunnel(&request).await.unwrap_err();

        match err {
            TunnelError::Relay { status, message } => {
                assert_eq!(status, 502);
                assert!(message.contains("limited to 1 simultaneous"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_list_tunnels() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("GET", "/api/tunnels")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"tunnels":[{"name":"a","public_url":"https://a.ngrok-free.app","proto":"https"},{"name":"b","public_url":"https://b.ngrok-free.app","proto":"https"}],"uri":"/api/tunnels"}"#,
            )
            .create_async()
            .await;

        let api = AgentApi::new(&server.url()).unwrap();
        let tunnels = api.list_tunnels().await.unwrap();

        assert_eq!(tunnels.len(), 2);
        assert_eq!(tunnels[1].name.as_str(), "b");
    }

    #[tokio::test]
    async fn test_stop_missing_tunnel() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("DELETE", "/api/tunnels/gone")
            .with_status(404)
            .with_body(r#"{"error_code":100,"status_code":404,"msg":"tunnel not found"}"#)
            .create_async()
            .await;

        let api = AgentApi::new(&server.url()).unwrap();
        let err = api
            .stop_tunnel(&TunnelName("gone".to_string()))
            .await
            .unwrap_err();

        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn test_agent_not_running() {
        // Nothing listens on this port
        let api = AgentApi::new("http://127.0.0.1:1").unwrap();
        let result = api.list_tunnels().await;

        assert!(matches!(result, Err(TunnelError::Http(_))));
    }
}
