//! Server engine.
//!
//! Validates the server configuration, derives the key fingerprint, then
//! serves HTTP on `host:port`. Websocket upgrades offering the chisel
//! subprotocol are held open as tunnel connections; other requests go to the
//! `--proxy` target when one is set, else to the health and version
//! endpoints, else 404.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::uri::InvalidUri;
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use chisel_core::{ChiselError, Engine, KeySource, Result, ServerConfig};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use url::Url;

use crate::keygen::{decode_pem, fingerprint, key_material};
use crate::run_state::RunState;
use crate::{BUILD_VERSION, PROTOCOL_VERSION};

/// Tunnel server engine.
pub struct TunnelServer {
    config: ServerConfig,
    fingerprint: String,
    upstream: Option<Arc<Upstream>>,
    local_addr: OnceLock<SocketAddr>,
    state: Arc<RunState>,
}

impl std::fmt::Debug for TunnelServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelServer")
            .field("listen", &self.config.listen_addr())
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl TunnelServer {
    /// Validates the configuration and loads key material.
    ///
    /// # Errors
    /// Returns [`ChiselError::Config`] when the port is invalid, the TLS
    /// options conflict, the proxy target is unusable, or the key file
    /// cannot be read or is malformed.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config
            .port
            .parse::<u16>()
            .map_err(|_| ChiselError::config(format!("invalid port: {:?}", config.port)))?;

        let tls = &config.tls;
        if tls.cert.is_empty() != tls.key.is_empty() {
            return Err(ChiselError::config(
                "--tls-cert and --tls-key must be set together",
            ));
        }
        if !tls.domains.is_empty() && !tls.cert.is_empty() {
            return Err(ChiselError::config(
                "--tls-domain cannot be combined with --tls-cert/--tls-key",
            ));
        }

        let material = match config.key_source() {
            KeySource::File(path) => {
                let content = std::fs::read(path).map_err(|e| {
                    ChiselError::config(format!("failed to read key file {path}: {e}"))
                })?;
                decode_pem(&content)
                    .map_err(|e| ChiselError::config(format!("key file {path}: {e}")))?
            }
            KeySource::Seed(seed) => key_material(seed),
            KeySource::Ephemeral => key_material(""),
        };
        let fingerprint = fingerprint(&material);
        info!("Fingerprint {fingerprint}");

        let upstream = if config.proxy.is_empty() {
            None
        } else {
            let upstream = Upstream::new(&config.proxy)?;
            info!(proxy = %upstream.target, "Reverse proxy enabled");
            Some(Arc::new(upstream))
        };

        warn_unsupported(&config);

        Ok(Self {
            config,
            fingerprint,
            upstream,
            local_addr: OnceLock::new(),
            state: Arc::new(RunState::default()),
        })
    }

    /// Returns the key fingerprint clients should pin.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Returns the bound address once `start` is listening.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Returns the configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn router(&self) -> Router {
        let shared = Shared {
            upstream: self.upstream.clone(),
            state: Arc::clone(&self.state),
        };
        Router::new().fallback(route).with_state(shared)
    }
}

/// Options this engine parses but does not act on.
fn warn_unsupported(config: &ServerConfig) {
    if !config.auth.is_empty() || !config.auth_file.is_empty() {
        warn!("User authentication is not supported by this server, --auth/--authfile ignored");
    }
    if config.reverse {
        warn!("Reverse tunnelling is not supported by this server, --reverse ignored");
    }
    if config.socks5 {
        warn!("SOCKS5 is not supported by this server, --socks5 ignored");
    }
    if !config.tls.cert.is_empty() || !config.tls.domains.is_empty() {
        warn!("TLS is not supported by this server, serving plain HTTP");
    }
}

#[async_trait]
impl Engine for TunnelServer {
    fn name(&self) -> &str {
        "server"
    }

    async fn start(&self) -> Result<()> {
        let Some(_guard) = self.state.begin() else {
            debug!("server closed before start");
            return Ok(());
        };

        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ChiselError::network(format!("failed to listen on {addr}: {e}")))?;
        let bound = listener.local_addr()?;
        let _ = self.local_addr.set(bound);
        info!("Listening on http://{bound}");

        let state = Arc::clone(&self.state);
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { state.closing().await })
        .await
        .map_err(|e| ChiselError::network(format!("server on {bound} failed: {e}")))?;

        debug!("server listener closed");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.close().await;
        Ok(())
    }
}

#[derive(Clone)]
struct Shared {
    upstream: Option<Arc<Upstream>>,
    state: Arc<RunState>,
}

async fn route(
    State(shared): State<Shared>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request,
) -> Response {
    if let Ok(upgrade) = upgrade {
        if offers_protocol(&request) {
            debug!(%peer, "tunnel connection upgrading");
            let state = Arc::clone(&shared.state);
            return upgrade
                .protocols([PROTOCOL_VERSION])
                .on_upgrade(move |socket| hold(socket, peer, state));
        }
        debug!(%peer, "ignored websocket without the {PROTOCOL_VERSION} protocol");
    }

    if let Some(upstream) = &shared.upstream {
        return upstream.forward(request).await;
    }
    match request.uri().path() {
        "/health" => (StatusCode::OK, "OK\n").into_response(),
        "/version" => BUILD_VERSION.into_response(),
        _ => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

fn offers_protocol(request: &Request) -> bool {
    request
        .headers()
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|offered| offered.trim() == PROTOCOL_VERSION)
}

/// Keeps a tunnel connection open until the peer leaves or the server closes.
async fn hold(mut socket: WebSocket, peer: SocketAddr, state: Arc<RunState>) {
    info!(%peer, "Client connected");
    loop {
        tokio::select! {
            () = state.closing() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            message = socket.recv() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%peer, error = %e, "tunnel connection error");
                    break;
                }
            },
        }
    }
    info!(%peer, "Client disconnected");
}

/// Reverse proxy target for plain HTTP requests.
struct Upstream {
    target: Url,
    client: Client<HttpConnector, Body>,
}

impl Upstream {
    fn new(proxy: &str) -> Result<Self> {
        let target = Url::parse(proxy)
            .map_err(|e| ChiselError::config(format!("invalid proxy target {proxy:?}: {e}")))?;
        if target.scheme() != "http" {
            return Err(ChiselError::config(format!(
                "proxy target {proxy:?} must use http://"
            )));
        }
        if target.host_str().is_none_or(str::is_empty) {
            return Err(ChiselError::config(format!(
                "proxy target {proxy:?} has no host"
            )));
        }
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self { target, client })
    }

    /// Maps a request URI onto the target, joining the paths.
    fn uri_for(&self, original: &Uri) -> std::result::Result<Uri, InvalidUri> {
        let mut target = self.target.clone();
        let path = format!(
            "{}/{}",
            target.path().trim_end_matches('/'),
            original.path().trim_start_matches('/')
        );
        target.set_path(&path);
        target.set_query(original.query());
        target.as_str().parse()
    }

    async fn forward(&self, request: Request) -> Response {
        let (mut parts, body) = request.into_parts();
        let uri = match self.uri_for(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                warn!(uri = %parts.uri, error = %e, "cannot map request onto proxy target");
                return (StatusCode::BAD_GATEWAY, "Bad proxy target").into_response();
            }
        };
        if let Some(host) = uri
            .authority()
            .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
        {
            parts.headers.insert(header::HOST, host);
        }
        debug!(method = %parts.method, %uri, "proxying request");
        parts.uri = uri;

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                warn!(error = %e, "proxy request failed");
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }
}
