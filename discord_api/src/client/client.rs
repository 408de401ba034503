//! Discord HTTP-and-gateway client.
//!
//! An optional HTTP proxy is used for all REST requests and for the gateway
//! socket. Accepted formats:
//! * `http://USERNAME:PASSWORD@IP:PORT`
//! * `http://IP:PORT`

use std::fmt::{self, Debug, Formatter};
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use futures::stream::SplitSink;
use reqwest::{multipart, Client, ClientBuilder, Method, Proxy, Response};
use tokio::{net::TcpStream, sync::Mutex, task::JoinHandle};
use tokio_tungstenite::{
    tungstenite::protocol::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use crate::error::{handle_api_error, DiscordError};
use crate::gateway::{ConnectionState, EventHandler, GatewayIntents};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/discord/discord-api-docs, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

pub type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Main client to interact with the Discord API.
#[derive(Clone)]
pub struct DiscordClient {
    /* ───────────────────────── Public configuration ───────────────────────── */
    pub base_url: String,
    pub gateway_url: String,
    /// Optional HTTP proxy; must start with `http://` or `https://`.
    pub proxy: Option<String>,
    pub intents: GatewayIntents,

    /* ───────────────────────── Internal plumbing ──────────────────────────── */
    pub http: Client,
    pub token: Arc<Mutex<Option<String>>>,
    pub ws_tx: Arc<Mutex<Option<WsSink>>>,
    pub event_handler: Arc<Mutex<Option<Arc<dyn EventHandler>>>>,
    pub connection_state: Arc<Mutex<ConnectionState>>,
    /// Filled from the READY payload.
    pub application_id: Arc<Mutex<Option<String>>>,
    pub bot_user_id: Arc<Mutex<Option<String>>>,
    pub last_sequence: Arc<Mutex<Option<u64>>>,
    pub heartbeat: Arc<Mutex<Option<JoinHandle<()>>>>,
    pub heartbeat_acked: Arc<AtomicBool>,
}

impl Debug for DiscordClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordClient")
            .field("base_url", &self.base_url)
            .field("gateway_url", &self.gateway_url)
            .field("proxy", &self.proxy)
            .field("intents", &self.intents)
            .field("http", &"reqwest::Client")
            .field("event_handler", &"Arc<Mutex<Option<Arc<dyn EventHandler>>>>")
            .field("connection_state", &self.connection_state)
            .finish()
    }
}

impl DiscordClient {
    /// Construct a new [`DiscordClient`].
    ///
    /// # Parameters
    /// * `base_url` – REST endpoint; `None` means [`DEFAULT_API_BASE`].
    /// * `proxy`    – optional proxy URL in the formats listed above.
    pub fn new(base_url: Option<String>, proxy: Option<String>) -> Result<Self, DiscordError> {
        let mut builder = ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .use_rustls_tls();

        if let Some(ref p) = proxy {
            let full = normalize_proxy(p);
            let req_proxy = Proxy::all(&full)
                .map_err(|e| DiscordError::Other(format!("Invalid proxy URL `{full}`: {e}")))?;
            builder = builder.proxy(req_proxy);
        }

        let http = builder.build()?;

        Ok(Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            proxy,
            intents: GatewayIntents::default(),
            http,
            token: Arc::new(Mutex::new(None)),
            ws_tx: Arc::new(Mutex::new(None)),
            event_handler: Arc::new(Mutex::new(None)),
            connection_state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            application_id: Arc::new(Mutex::new(None)),
            bot_user_id: Arc::new(Mutex::new(None)),
            last_sequence: Arc::new(Mutex::new(None)),
            heartbeat: Arc::new(Mutex::new(None)),
            heartbeat_acked: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn with_intents(mut self, intents: GatewayIntents) -> Self {
        self.intents = intents;
        self
    }

    /* ─────────────────────────── Runtime helpers ─────────────────────────── */

    /// Set or clear the bot token.
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.lock().await = token;
    }

    /// Application id learned from READY.
    pub async fn application_id(&self) -> Option<String> {
        self.application_id.lock().await.clone()
    }

    pub async fn bot_user_id(&self) -> Option<String> {
        self.bot_user_id.lock().await.clone()
    }

    /// Build an authenticated `reqwest::RequestBuilder`.
    async fn authed_request(
        &self,
        method: Method,
        url: &str,
        extra_headers: Option<&[(&str, &str)]>,
    ) -> reqwest::RequestBuilder {
        let token_opt = self.token.lock().await.clone();

        let mut req = self
            .http
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json");

        if let Some(t) = token_opt {
            req = req.header("Authorization", format!("Bot {t}"));
        }

        if let Some(hdrs) = extra_headers {
            for (k, v) in hdrs {
                req = req.header(*k, *v);
            }
        }

        req
    }

    /* ───────────── Convenience wrappers around HTTP verbs ───────────── */

    pub async fn authed_get(&self, url: &str) -> Result<Response, DiscordError> {
        self.authed_request(Method::GET, url, None)
            .await
            .send()
            .await
            .map_err(DiscordError::ReqwestError)
    }

    pub async fn authed_get_with_query<Q: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        query: &Q,
    ) -> Result<Response, DiscordError> {
        self.authed_request(Method::GET, url, None)
            .await
            .query(query)
            .send()
            .await
            .map_err(DiscordError::ReqwestError)
    }

    pub async fn authed_post<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        extra_headers: Option<&[(&str, &str)]>,
    ) -> Result<Response, DiscordError> {
        self.authed_request(Method::POST, url, extra_headers)
            .await
            .json(body)
            .send()
            .await
            .map_err(DiscordError::ReqwestError)
    }

    pub async fn authed_post_multipart(
        &self,
        url: &str,
        form: multipart::Form,
    ) -> Result<Response, DiscordError> {
        self.authed_request(Method::POST, url, None)
            .await
            .multipart(form)
            .send()
            .await
            .map_err(DiscordError::ReqwestError)
    }

    pub async fn authed_put<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        extra_headers: Option<&[(&str, &str)]>,
    ) -> Result<Response, DiscordError> {
        self.authed_request(Method::PUT, url, extra_headers)
            .await
            .json(body)
            .send()
            .await
            .map_err(DiscordError::ReqwestError)
    }

    /// PUT with no body (reactions).
    pub async fn authed_put_empty(&self, url: &str) -> Result<Response, DiscordError> {
        self.authed_request(Method::PUT, url, None)
            .await
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(DiscordError::ReqwestError)
    }

    pub async fn authed_patch<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        extra_headers: Option<&[(&str, &str)]>,
    ) -> Result<Response, DiscordError> {
        self.authed_request(Method::PATCH, url, extra_headers)
            .await
            .json(body)
            .send()
            .await
            .map_err(DiscordError::ReqwestError)
    }

    pub async fn authed_delete(
        &self,
        url: &str,
        extra_headers: Option<&[(&str, &str)]>,
    ) -> Result<Response, DiscordError> {
        self.authed_request(Method::DELETE, url, extra_headers)
            .await
            .send()
            .await
            .map_err(DiscordError::ReqwestError)
    }
}

pub(crate) fn normalize_proxy(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    }
}

/// Header value for `X-Audit-Log-Reason`, which must be URL-encoded.
pub fn audit_reason(reason: &str) -> String {
    crate::util::encode_segment(reason)
}

fn error_from_response(status: reqwest::StatusCode, bytes: &[u8]) -> DiscordError {
    if let Ok(api_err) = serde_json::from_slice::<crate::types::error_types::Error>(bytes) {
        if api_err.code != 0 || !api_err.message.is_empty() {
            return handle_api_error(status.as_u16(), api_err);
        }
    }
    DiscordError::HttpStatus {
        code: status.as_u16(),
        body: String::from_utf8_lossy(bytes).to_string(),
    }
}

/// Parse the body as JSON **iff** the response status is success.
pub async fn parse_json_if_ok<T: serde::de::DeserializeOwned>(
    resp: Response,
) -> Result<T, DiscordError> {
    let status = resp.status();
    let bytes = resp.bytes().await.map_err(DiscordError::ReqwestError)?;

    if !status.is_success() {
        return Err(error_from_response(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(DiscordError::SerdeError)
}

/// Discard the body, failing on a non-success status.
pub async fn expect_success(resp: Response) -> Result<(), DiscordError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let bytes = resp.bytes().await.map_err(DiscordError::ReqwestError)?;
    Err(error_from_response(status, &bytes))
}
