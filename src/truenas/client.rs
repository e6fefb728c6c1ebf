//! TrueNAS WebSocket Session Client
//!
//! Implements [`SessionClient`] for the TrueNAS Scale WebSocket API, which speaks
//! JSON-RPC over a DDP-style WebSocket connection.
//!
//! # Session Lifecycle
//!
//! - **login**: open `ws://` or `wss://<host>/websocket`, send the DDP connect
//!   handshake, then `auth.login_with_api_key`
//! - **fetch**: one JSON-RPC call per [`RpcCall`]
//! - **logout**: `auth.logout`, then close the socket
//!
//! Every scrape gets its own connection. A WebSocket carries one request at a
//! time, so `fetch` serializes callers on a per-session mutex; sub-collectors
//! sharing a session wait for each other but never interleave frames.
//!
//! # Example
//!
//! ```no_run
//! use scrape_exporter::config::TrueNasConfig;
//! use scrape_exporter::scrape::SessionClient;
//! use scrape_exporter::truenas::{RpcCall, TrueNasClient};
//! use secrecy::SecretString;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = TrueNasClient::new(TrueNasConfig {
//!     host: "truenas.local:443".to_string(),
//!     api_key: SecretString::new("your-api-key".into()),
//!     use_tls: true,
//!     verify_ssl: false,
//! });
//!
//! let session = client.login("").await?;
//! let pools = client.fetch(&session, &RpcCall::new("pool.query")).await?;
//! client.logout(&session).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::TrueNasConfig;
use crate::error::{ExporterError, Result};
use crate::scrape::{Session, SessionClient};
use crate::truenas::types::{DdpConnect, JsonRpcRequest, JsonRpcResponse, RpcCall};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Session client for TrueNAS Scale
///
/// Holds only configuration and the request id counter; connections live in
/// [`TrueNasSession`] and are owned by a single scrape.
pub struct TrueNasClient {
    config: Arc<TrueNasConfig>,
    request_id: AtomicU64,
}

/// An authenticated WebSocket connection to one TrueNAS host
pub struct TrueNasSession {
    host: String,
    stream: Mutex<Option<WsStream>>,
}

impl Session for TrueNasSession {
    fn target(&self) -> &str {
        &self.host
    }
}

impl TrueNasClient {
    pub fn new(config: TrueNasConfig) -> Self {
        Self {
            config: Arc::new(config),
            request_id: AtomicU64::new(0),
        }
    }

    /// Host a scrape connects to; an empty target falls back to the configured host
    pub fn resolve_target(&self, target: &str) -> Result<String> {
        let host = if target.is_empty() {
            self.config.host.as_str()
        } else {
            target
        };
        if host.is_empty() {
            return Err(ExporterError::Config(
                "no target requested and no default TrueNAS host configured".to_string(),
            ));
        }
        Ok(host.to_string())
    }

    pub fn websocket_url(&self, host: &str) -> String {
        let protocol = if self.config.use_tls { "wss" } else { "ws" };
        format!("{}://{}/websocket", protocol, host)
    }

    /// Fetch and deserialize in one step
    pub async fn query<T>(&self, session: &TrueNasSession, call: &RpcCall) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let value = self.fetch(session, call).await?;
        serde_json::from_value(value).map_err(ExporterError::Json)
    }

    fn next_id(&self) -> String {
        self.request_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    async fn connect_websocket(&self, host: &str) -> Result<WsStream> {
        let url = self.websocket_url(host);
        debug!("Connecting to {}", url);

        let (ws_stream, _) = if self.config.use_tls && !self.config.verify_ssl {
            // Custom TLS connector for self-signed certs
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| ExporterError::Config(e.to_string()))?;

            let connector = tokio_tungstenite::Connector::NativeTls(connector);
            tokio_tungstenite::connect_async_tls_with_config(&url, None, false, Some(connector))
                .await
                .map_err(|e| ExporterError::Config(format!("TLS connection failed: {}", e)))?
        } else {
            connect_async(&url).await.map_err(ExporterError::WebSocket)?
        };

        Ok(ws_stream)
    }

    async fn authenticate(&self, stream: &mut WsStream) -> Result<()> {
        let connect_msg = serde_json::to_string(&DdpConnect::default())?;
        stream.send(Message::Text(connect_msg.into())).await?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => debug!("DDP connect response: {}", text),
            Some(Ok(other)) => debug!("Unexpected DDP connect response: {:?}", other),
            Some(Err(e)) => return Err(ExporterError::WebSocket(e)),
            None => {
                return Err(ExporterError::Auth(
                    "connection closed during handshake".to_string(),
                ))
            }
        }

        let params = serde_json::json!([self.config.api_key.expose_secret().trim()]);
        let accepted: serde_json::Value = self
            .call(stream, "auth.login_with_api_key", Some(&params))
            .await
            .map_err(|e| match e {
                ExporterError::TrueNasApi(reason) => ExporterError::Auth(reason),
                other => other,
            })?;

        if accepted == serde_json::Value::Bool(false) {
            return Err(ExporterError::Auth(
                "API key rejected by TrueNAS".to_string(),
            ));
        }
        Ok(())
    }

    /// Send one request and wait for the response carrying its id
    async fn call<T>(
        &self,
        stream: &mut WsStream,
        method: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request = JsonRpcRequest::method(self.next_id(), method, params);

        let request_json = serde_json::to_string(&request)?;
        debug!("Sending request: {}", method);
        stream.send(Message::Text(request_json.into())).await?;

        loop {
            let text = match stream.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ExporterError::TrueNasApi(
                        "Connection closed by server".to_string(),
                    ))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ExporterError::WebSocket(e)),
            };

            let response: JsonRpcResponse = serde_json::from_str(&text)?;
            if response.id.as_deref() != Some(request.id.as_str()) {
                debug!("Skipping unrelated message: {:?}", response.msg);
                continue;
            }

            debug!("{} response received", method);
            if let Some(error) = response.error {
                return Err(ExporterError::TrueNasApi(error.into_message()));
            }

            let result = response.result.unwrap_or(serde_json::Value::Null);
            return serde_json::from_value(result).map_err(ExporterError::Json);
        }
    }
}

#[async_trait]
impl SessionClient for TrueNasClient {
    type Session = TrueNasSession;
    type Query = RpcCall;
    type Payload = serde_json::Value;

    async fn login(&self, target: &str) -> Result<TrueNasSession> {
        let host = self.resolve_target(target)?;
        let mut stream = self.connect_websocket(&host).await?;

        if let Err(e) = self.authenticate(&mut stream).await {
            if let Err(close) = stream.close(None).await {
                debug!("Error closing WebSocket: {}", close);
            }
            return Err(e);
        }
        debug!(target = %host, "Authenticated to TrueNAS");

        Ok(TrueNasSession {
            host,
            stream: Mutex::new(Some(stream)),
        })
    }

    async fn fetch(&self, session: &TrueNasSession, query: &RpcCall) -> Result<serde_json::Value> {
        let mut guard = session.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| ExporterError::TrueNasApi("Session is closed".to_string()))?;

        let result = self.call(stream, &query.method, query.params.as_ref()).await;
        if let Err(ExporterError::WebSocket(_)) = &result {
            // The socket is unusable; later fetches in this scrape fail fast
            *guard = None;
        }
        result
    }

    async fn logout(&self, session: &TrueNasSession) -> Result<()> {
        let mut guard = session.stream.lock().await;
        let Some(mut stream) = guard.take() else {
            return Ok(());
        };

        let result: Result<serde_json::Value> = self.call(&mut stream, "auth.logout", None).await;
        if let Err(e) = stream.close(None).await {
            debug!("Error closing WebSocket: {}", e);
        }
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn client(host: &str, use_tls: bool) -> TrueNasClient {
        TrueNasClient::new(TrueNasConfig {
            host: host.to_string(),
            api_key: SecretString::new("key".into()),
            use_tls,
            verify_ssl: true,
        })
    }

    #[test]
    fn websocket_url_follows_tls_setting() {
        assert_eq!(
            client("", false).websocket_url("nas:80"),
            "ws://nas:80/websocket"
        );
        assert_eq!(
            client("", true).websocket_url("nas:443"),
            "wss://nas:443/websocket"
        );
    }

    #[test]
    fn empty_target_uses_default_host() {
        let client = client("default.local", false);
        assert_eq!(client.resolve_target("").unwrap(), "default.local");
        assert_eq!(client.resolve_target("other.local").unwrap(), "other.local");
    }

    #[tokio::test]
    async fn login_fails_cleanly_when_server_hangs_up_during_handshake() {
        // Given: A WebSocket server that drops the connection after the DDP connect
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _ = ws.next().await;
        });

        // When: Logging in
        let err = client(&addr.to_string(), false)
            .login("")
            .await
            .err()
            .expect("login should fail");

        // Then: The handshake failure is reported and no session is left behind
        assert!(matches!(err, ExporterError::Auth(_) | ExporterError::WebSocket(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn login_without_any_host_fails() {
        let client = client("", false);
        let err = client.login("").await.err().expect("login should fail");
        assert!(matches!(err, ExporterError::Config(_)));
    }
}
