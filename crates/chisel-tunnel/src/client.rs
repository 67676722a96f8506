//! Client engine.
//!
//! Keeps one websocket to the server open, reconnecting with exponential
//! backoff whenever it drops, until closed or out of retries. An attempt
//! only counts as successful once the websocket handshake completes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chisel_core::{ChiselError, ClientConfig, Engine, HeaderMap, Result};
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{self, HeaderName, HeaderValue, header};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use crate::PROTOCOL_VERSION;
use crate::backoff::BackoffConfig;
use crate::run_state::RunState;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tunnel client engine.
#[derive(Debug)]
pub struct TunnelClient {
    url: Url,
    connect_addr: String,
    headers: http::HeaderMap,
    backoff: BackoffConfig,
    connections: AtomicU32,
    state: Arc<RunState>,
}

impl TunnelClient {
    /// Normalizes the server address and validates remotes and headers.
    ///
    /// # Errors
    /// Returns [`ChiselError::Config`] when no remote is given, the server
    /// address cannot be parsed, or a header is not valid HTTP.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.remotes.is_empty() {
            return Err(ChiselError::config(
                "A server and at least one remote is required",
            ));
        }
        if let Some(empty) = config.remotes.iter().position(String::is_empty) {
            return Err(ChiselError::config(format!("remote #{} is empty", empty + 1)));
        }

        let (url, connect_addr) = normalize_server(&config.server)?;
        let headers = request_headers(&config.headers)?;
        let backoff = BackoffConfig::new()
            .with_max_delay(config.max_retry_interval)
            .with_max_retries(config.retry_limit());

        if config.fingerprint.is_empty() {
            warn!("No fingerprint given, the server's host key will not be verified");
        } else {
            warn!("Host key verification is not supported by this client, --fingerprint ignored");
        }
        if !config.proxy.is_empty() {
            warn!("Upstream proxies are not supported by this client, --proxy ignored");
        }
        if url.scheme() == "wss" {
            warn!("TLS is not supported by this client, connections to {url} will fail");
        }

        Ok(Self {
            url,
            connect_addr,
            headers,
            backoff,
            connections: AtomicU32::new(0),
            state: Arc::new(RunState::default()),
        })
    }

    /// Returns the reconnect policy in effect.
    #[must_use]
    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    /// Returns how many websocket handshakes have completed so far.
    #[must_use]
    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::Acquire)
    }

    /// Builds the upgrade request: tungstenite's handshake headers, then the
    /// configured headers (a configured `Host` replaces the default), then
    /// the chisel subprotocol.
    fn request(&self) -> tokio_tungstenite::tungstenite::Result<Request> {
        let mut request = self.url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.extend(self.headers.clone());
        headers.insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(PROTOCOL_VERSION),
        );
        Ok(request)
    }

    async fn connect(&self) -> tokio_tungstenite::tungstenite::Result<Socket> {
        let (socket, response) = connect_async(self.request()?).await?;
        debug!(status = %response.status(), "websocket handshake complete");
        Ok(socket)
    }

    /// Holds one connection until the peer drops it. Returns false if close
    /// ended it instead.
    async fn hold(&self, mut socket: Socket) -> bool {
        loop {
            tokio::select! {
                () = self.state.closing() => {
                    let _ = socket.close(None).await;
                    return false;
                }
                message = socket.next() => match message {
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        info!(error = %e, "Disconnected");
                        return true;
                    }
                    None => {
                        info!("Disconnected");
                        return true;
                    }
                },
            }
        }
    }

    /// Sleeps out the backoff delay. Returns false if close interrupted it.
    async fn pause(&self, retry: u32) -> bool {
        let delay = self.backoff.delay_for(retry);
        info!("Retrying in {}...", format_delay(delay));
        tokio::select! {
            () = self.state.closing() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

#[async_trait]
impl Engine for TunnelClient {
    fn name(&self) -> &str {
        "client"
    }

    async fn start(&self) -> Result<()> {
        let Some(_guard) = self.state.begin() else {
            debug!("client closed before start");
            return Ok(());
        };

        info!("Connecting to {}", self.url);
        let mut retries = 0u32;

        while !self.state.is_closing() {
            let attempt = tokio::select! {
                () = self.state.closing() => break,
                attempt = self.connect() => attempt,
            };

            match attempt {
                Ok(socket) => {
                    retries = 0;
                    self.connections.fetch_add(1, Ordering::AcqRel);
                    info!("Connected");
                    if !self.hold(socket).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Connection error: {e}");
                    if self.backoff.exhausted(retries) {
                        return Err(ChiselError::network(format!(
                            "connection to {} failed after {} attempts: {e}",
                            self.connect_addr,
                            retries + 1
                        )));
                    }
                }
            }

            if !self.pause(retries).await {
                break;
            }
            retries = retries.saturating_add(1);
        }

        debug!("client connection loop ended");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.close().await;
        Ok(())
    }
}

/// Converts configured headers into request headers. Names keep their
/// values in arrival order.
fn request_headers(configured: &HeaderMap) -> Result<http::HeaderMap> {
    let mut headers = http::HeaderMap::new();
    for (name, values) in configured.iter() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ChiselError::config(format!("invalid header name {name:?}: {e}")))?;
        for value in values {
            let value = HeaderValue::from_str(value).map_err(|e| {
                ChiselError::config(format!("invalid value for header {name}: {e}"))
            })?;
            headers.append(name.clone(), value);
        }
    }
    Ok(headers)
}

/// Adds a scheme and explicit port to the server address.
///
/// Returns the websocket URL and the `host:port` it dials.
fn normalize_server(server: &str) -> Result<(Url, String)> {
    let with_scheme = if server.contains("://") {
        server.to_string()
    } else {
        format!("http://{server}")
    };
    let mut url = Url::parse(&with_scheme)
        .map_err(|e| ChiselError::config(format!("invalid server address {server:?}: {e}")))?;

    let host = url
        .host_str()
        .ok_or_else(|| ChiselError::config(format!("server address {server:?} has no host")))?
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ChiselError::config(format!("server address {server:?} has no port")))?;

    let ws_scheme = match url.scheme() {
        "http" => Some("ws"),
        "https" => Some("wss"),
        _ => None,
    };
    if let Some(scheme) = ws_scheme {
        url.set_scheme(scheme)
            .map_err(|()| ChiselError::config(format!("cannot use {scheme} for {server:?}")))?;
    }

    Ok((url, format!("{host}:{port}")))
}

/// Formats a delay at millisecond precision.
fn format_delay(delay: std::time::Duration) -> String {
    let rounded = std::time::Duration::from_millis(delay.as_millis() as u64);
    humantime::format_duration(rounded).to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chisel_core::ServerConfig;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request as Incoming, Response as Outgoing,
    };

    use super::*;
    use crate::TunnelServer;

    fn config(server: &str) -> ClientConfig {
        ClientConfig::new(server, vec!["3000".to_string()])
    }

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Completes a websocket handshake the way the server engine does.
    async fn accept_tunnel(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let callback = |request: &Incoming, mut response: Outgoing| -> std::result::Result<Outgoing, ErrorResponse> {
            assert_eq!(
                request.headers().get(header::SEC_WEBSOCKET_PROTOCOL).unwrap(),
                PROTOCOL_VERSION
            );
            response.headers_mut().insert(
                header::SEC_WEBSOCKET_PROTOCOL,
                HeaderValue::from_static(PROTOCOL_VERSION),
            );
            Ok(response)
        };
        tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap()
    }

    #[test]
    fn test_normalize_adds_scheme_and_port() {
        let (url, addr) = normalize_server("example.com").unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(addr, "example.com:80");

        let (url, addr) = normalize_server("https://example.com").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(addr, "example.com:443");

        let (_, addr) = normalize_server("localhost:9312").unwrap();
        assert_eq!(addr, "localhost:9312");
    }

    #[test]
    fn test_format_delay() {
        assert_eq!(format_delay(Duration::from_millis(100)), "100ms");
        assert_eq!(format_delay(Duration::from_secs_f64(1.6)), "1s 600ms");
    }

    #[test]
    fn test_invalid_server_rejected() {
        let err = TunnelClient::new(config("http://")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_remotes_required() {
        let err = TunnelClient::new(ClientConfig::new("localhost:8080", Vec::new())).unwrap_err();
        assert!(err.to_string().contains("at least one remote"));

        let empty = ClientConfig::new("localhost:8080", vec![String::new()]);
        assert!(TunnelClient::new(empty).is_err());
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut cfg = config("localhost:8080");
        cfg.headers.append("X-Bad", "line\nbreak");
        let err = TunnelClient::new(cfg).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_backoff_from_config() {
        let mut cfg = config("localhost:8080");
        cfg.max_retry_count = 3;
        cfg.max_retry_interval = Duration::from_secs(2);
        let client = TunnelClient::new(cfg).unwrap();
        assert_eq!(client.backoff().max_retries, Some(3));
        assert_eq!(client.backoff().max_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_request_carries_configured_headers() {
        let mut cfg = config("localhost:8080");
        cfg.headers.set("Host", "tunnel.example.com");
        cfg.headers.append("X-Trace", "1");
        cfg.headers.append("X-Trace", "2");
        let request = TunnelClient::new(cfg).unwrap().request().unwrap();

        assert_eq!(request.uri().to_string(), "ws://localhost:8080/");
        let headers = request.headers();
        assert_eq!(headers.get(header::HOST).unwrap(), "tunnel.example.com");
        assert_eq!(headers.get_all("x-trace").iter().count(), 2);
        assert_eq!(headers.get(header::SEC_WEBSOCKET_PROTOCOL).unwrap(), PROTOCOL_VERSION);
        assert!(headers.contains_key(header::SEC_WEBSOCKET_KEY));
        assert_eq!(headers.get(header::SEC_WEBSOCKET_VERSION).unwrap(), "13");
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_limit() {
        let mut cfg = config(&format!("127.0.0.1:{}", free_port().await));
        cfg.max_retry_count = 1;
        let client = TunnelClient::new(cfg).unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), client.start())
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ChiselError::Network(_)));
        assert!(err.to_string().contains("after 2 attempts"));
    }

    #[tokio::test]
    async fn test_failed_handshake_counts_against_retry_limit() {
        // Accepts TCP but hangs up before answering the upgrade.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                drop(stream);
            }
        });

        let mut cfg = config(&addr.to_string());
        cfg.max_retry_count = 1;
        let client = TunnelClient::new(cfg).unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), client.start())
            .await
            .expect("a server that drops every handshake must exhaust the retries")
            .unwrap_err();
        assert!(matches!(err, ChiselError::Network(_)));
        assert!(err.to_string().contains("after 2 attempts"));
        assert_eq!(client.connections(), 0);
    }

    #[tokio::test]
    async fn test_connects_to_server_engine() {
        let server = Arc::new(
            TunnelServer::new(ServerConfig {
                host: "127.0.0.1".to_string(),
                port: "0".to_string(),
                ..Default::default()
            })
            .unwrap(),
        );
        let server_runner = Arc::clone(&server);
        let server_task = tokio::spawn(async move { server_runner.start().await });
        let mut addr = None;
        for _ in 0..200 {
            addr = server.local_addr();
            if addr.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut cfg = config(&addr.unwrap().to_string());
        cfg.max_retry_count = 1;
        let client = Arc::new(TunnelClient::new(cfg).unwrap());
        let client_runner = Arc::clone(&client);
        let client_task = tokio::spawn(async move { client_runner.start().await });

        for _ in 0..200 {
            if client.connections() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(client.connections(), 1);
        assert!(!client_task.is_finished());

        tokio::time::timeout(Duration::from_secs(1), client.close())
            .await
            .unwrap()
            .unwrap();
        client_task.await.unwrap().unwrap();

        tokio::time::timeout(Duration::from_secs(1), server.close())
            .await
            .unwrap()
            .unwrap();
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = Arc::new(TunnelClient::new(config(&addr.to_string())).unwrap());

        let runner = Arc::clone(&client);
        let start = tokio::spawn(async move { runner.start().await });

        let first = accept_tunnel(&listener).await;
        drop(first);

        // The client comes back after the initial backoff delay.
        let _second = accept_tunnel(&listener).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(client.connections(), 2);

        tokio::time::timeout(Duration::from_secs(1), client.close())
            .await
            .unwrap()
            .unwrap();
        start.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_interrupts_backoff() {
        let mut cfg = config(&format!("127.0.0.1:{}", free_port().await));
        cfg.max_retry_interval = Duration::from_secs(60);
        let client = Arc::new(TunnelClient::new(cfg).unwrap());

        let runner = Arc::clone(&client);
        let start = tokio::spawn(async move { runner.start().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(1), client.close())
            .await
            .unwrap()
            .unwrap();
        start.await.unwrap().unwrap();
    }
}
