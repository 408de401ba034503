//! Gateway connection. When a proxy is configured in
//! [`DiscordClient::proxy`], the socket is established through an HTTP
//! `CONNECT` tunnel before the TLS upgrade and WebSocket handshake.
//!
//! Sessions are never resumed: every (re)connect waits for HELLO, starts
//! heartbeating and identifies from scratch.

use std::{
    ops::BitOr,
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    time::{interval_at, sleep, Instant},
};
use tokio_rustls::{
    rustls::{pki_types::ServerName, ClientConfig, RootCertStore},
    TlsConnector,
};
use tokio_tungstenite::{
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    client::{normalize_proxy, DiscordClient},
    error::DiscordError,
    gateway::event_handler::EventHandler,
    types::{
        gateway::{
            opcode, ChannelDeleteEvent, GatewayPayload, Hello, Identify, MessageDeleteEvent,
            MessageUpdateEvent, ReactionAddEvent, ReadyEvent,
        },
        interaction::Interaction,
        message::Message,
    },
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state for the gateway socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Reconnecting,
}

/// Gateway intent bit set sent with IDENTIFY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayIntents(pub u64);

impl GatewayIntents {
    pub const GUILDS: Self = Self(1 << 0);
    pub const GUILD_MEMBERS: Self = Self(1 << 1);
    pub const GUILD_MESSAGES: Self = Self(1 << 9);
    pub const GUILD_MESSAGE_REACTIONS: Self = Self(1 << 10);
    pub const DIRECT_MESSAGES: Self = Self(1 << 12);
    pub const MESSAGE_CONTENT: Self = Self(1 << 15);
}

impl Default for GatewayIntents {
    fn default() -> Self {
        Self::GUILDS
            | Self::GUILD_MEMBERS
            | Self::GUILD_MESSAGES
            | Self::GUILD_MESSAGE_REACTIONS
            | Self::MESSAGE_CONTENT
    }
}

impl BitOr for GatewayIntents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

const MAX_RETRY_COUNT: u32 = 10;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

impl DiscordClient {
    pub async fn event_handler<E: EventHandler>(&self, handler: E) -> Result<(), DiscordError> {
        *self.event_handler.lock().await = Some(Arc::new(handler));
        Ok(())
    }

    /// Open the gateway and spawn the read loop. Returns once the socket is
    /// up; READY arrives later through [`EventHandler::on_ready`].
    pub async fn start(&self) -> Result<(), DiscordError> {
        if self.ws_tx.lock().await.is_some() {
            return Err(DiscordError::Other(
                "Gateway is already running on this client!".into(),
            ));
        }
        if self.token.lock().await.is_none() {
            return Err(DiscordError::Other("No token set".into()));
        }

        *self.connection_state.lock().await = ConnectionState::Connecting;

        match self.connect_ws(&self.gateway_url).await {
            Ok((write, read)) => {
                *self.ws_tx.lock().await = Some(write);
                tokio::spawn({
                    let client = self.clone();
                    async move { client.read_loop_with_reconnect(read).await }
                });
                Ok(())
            }
            Err(e) => {
                *self.connection_state.lock().await = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Get the current gateway connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.lock().await
    }

    /* ────────────────────────── Socket setup ────────────────────────── */

    /// Establish the TCP/TLS stream, perform the WebSocket handshake and
    /// split it into writer / reader halves.
    async fn connect_ws(
        &self,
        ws_url: &str,
    ) -> Result<(SplitSink<WsStream, WsMessage>, SplitStream<WsStream>), DiscordError> {
        let url = Url::parse(ws_url)
            .map_err(|e| DiscordError::Gateway(format!("Invalid gateway URL: {e}")))?;
        let scheme = url.scheme().to_string();
        let host = url
            .host_str()
            .ok_or_else(|| DiscordError::Gateway("Gateway URL missing host".into()))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| DiscordError::Gateway(format!("Unsupported scheme: {scheme}")))?;

        let tcp_stream = match &self.proxy {
            Some(proxy_raw) => tunnel_through_proxy(proxy_raw, &host, port).await?,
            None => {
                let direct_addr = format!("{host}:{port}");
                TcpStream::connect(&direct_addr).await.map_err(|e| {
                    DiscordError::Gateway(format!("Failed to connect TCP to {direct_addr}: {e}"))
                })?
            }
        };

        let stream = match scheme.as_str() {
            "ws" => MaybeTlsStream::Plain(tcp_stream),
            "wss" => {
                let mut root_cert_store = RootCertStore::empty();
                root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

                let config = ClientConfig::builder()
                    .with_root_certificates(root_cert_store)
                    .with_no_client_auth();
                let connector = TlsConnector::from(Arc::new(config));

                let server_name = ServerName::try_from(host.clone()).map_err(|e| {
                    DiscordError::Gateway(format!("Invalid DNS name '{host}': {e}"))
                })?;

                let tls = connector.connect(server_name, tcp_stream).await.map_err(|e| {
                    DiscordError::Gateway(format!("TLS handshake to {host} failed: {e}"))
                })?;
                MaybeTlsStream::Rustls(tls)
            }
            other => {
                return Err(DiscordError::Gateway(format!(
                    "Unsupported WebSocket scheme: {other}"
                )))
            }
        };

        let (ws_stream, _resp) = tokio_tungstenite::client_async(ws_url, stream)
            .await
            .map_err(|e| DiscordError::Gateway(format!("WebSocket handshake failed: {e}")))?;

        debug!(%host, "gateway socket open");
        Ok(ws_stream.split())
    }

    /* ─────────────────────────── Read loop ──────────────────────────── */

    /// Run the read loop, reconnecting with exponential backoff whenever the
    /// socket drops, until [`close_ws`](Self::close_ws) is called or retries
    /// run out.
    async fn read_loop_with_reconnect(&self, read: SplitStream<WsStream>) {
        self.read_loop(read).await;

        let mut retry_count = 0;
        let mut retry_delay = Duration::from_secs(1);

        loop {
            if *self.connection_state.lock().await == ConnectionState::Closing {
                info!("gateway closing, not reconnecting");
                *self.connection_state.lock().await = ConnectionState::Disconnected;
                break;
            }

            *self.connection_state.lock().await = ConnectionState::Reconnecting;
            warn!(
                attempt = retry_count + 1,
                max = MAX_RETRY_COUNT,
                delay = ?retry_delay,
                "gateway connection lost, reconnecting"
            );

            sleep(retry_delay).await;

            match self.connect_ws(&self.gateway_url).await {
                Ok((write, read)) => {
                    *self.ws_tx.lock().await = Some(write);
                    info!("gateway reconnected");

                    retry_count = 0;
                    retry_delay = Duration::from_secs(1);

                    self.read_loop(read).await;
                }
                Err(e) => {
                    warn!(error = %e, "gateway reconnection attempt failed");

                    retry_count += 1;
                    if retry_count >= MAX_RETRY_COUNT {
                        error!("maximum gateway reconnection attempts reached, giving up");
                        *self.connection_state.lock().await = ConnectionState::Disconnected;
                        break;
                    }

                    retry_delay = std::cmp::min(retry_delay * 2, MAX_RETRY_DELAY);
                }
            }
        }
    }

    /// Receive frames until the socket closes or errors.
    async fn read_loop(&self, mut read: SplitStream<WsStream>) {
        while let Some(msg) = read.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "gateway read error, terminating read loop");
                    break;
                }
            };

            match msg {
                WsMessage::Text(txt) => match serde_json::from_str::<GatewayPayload>(&txt) {
                    Ok(frame) => self.handle_frame(frame).await,
                    Err(err) => warn!(error = %err, "failed to deserialize gateway frame"),
                },
                WsMessage::Close(cf) => {
                    info!(frame = ?cf, "gateway close frame received");
                    break;
                }
                WsMessage::Binary(_) | WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }

        if let Some(handle) = self.heartbeat.lock().await.take() {
            handle.abort();
        }
        *self.ws_tx.lock().await = None;
    }

    async fn handle_frame(&self, frame: GatewayPayload) {
        if let Some(seq) = frame.s {
            *self.last_sequence.lock().await = Some(seq);
        }

        match frame.op {
            opcode::HELLO => {
                let hello: Hello = match serde_json::from_value(frame.d) {
                    Ok(h) => h,
                    Err(e) => {
                        error!(error = %e, "malformed HELLO");
                        self.drop_connection().await;
                        return;
                    }
                };
                self.start_heartbeat(Duration::from_millis(hello.heartbeat_interval))
                    .await;
                if let Err(e) = self.identify().await {
                    error!(error = %e, "failed to identify");
                    self.drop_connection().await;
                }
            }
            opcode::HEARTBEAT => {
                if let Err(e) = self.send_heartbeat().await {
                    warn!(error = %e, "failed to answer heartbeat request");
                }
            }
            opcode::HEARTBEAT_ACK => self.heartbeat_acked.store(true, Ordering::SeqCst),
            opcode::RECONNECT => {
                info!("gateway requested reconnect");
                self.drop_connection().await;
            }
            opcode::INVALID_SESSION => {
                warn!("gateway invalidated the session");
                if let Some(handler) = self.current_handler().await {
                    handler.on_session_invalidated(self).await;
                }
                self.drop_connection().await;
            }
            opcode::DISPATCH => {
                if let Some(name) = frame.t {
                    self.handle_dispatch(&name, frame.d).await;
                }
            }
            other => debug!(op = other, "ignoring gateway opcode"),
        }
    }

    async fn current_handler(&self) -> Option<Arc<dyn EventHandler>> {
        self.event_handler.lock().await.clone()
    }

    async fn handle_dispatch(&self, name: &str, data: Value) {
        if name == "READY" {
            match serde_json::from_value::<ReadyEvent>(data.clone()) {
                Ok(ready) => {
                    *self.application_id.lock().await = Some(ready.application.id.clone());
                    *self.bot_user_id.lock().await = Some(ready.user.id.clone());
                    *self.connection_state.lock().await = ConnectionState::Connected;
                    info!(user = %ready.user.username, guilds = ready.guilds.len(), "gateway ready");
                    if let Some(handler) = self.current_handler().await {
                        handler.on_event(self, name, &data).await;
                        handler.on_ready(self, &ready).await;
                    }
                }
                Err(e) => error!(error = %e, "could not parse READY"),
            }
            return;
        }

        let Some(handler) = self.current_handler().await else {
            return;
        };

        handler.on_event(self, name, &data).await;

        match name {
            "MESSAGE_CREATE" => match serde_json::from_value::<Message>(data) {
                Ok(mut message) => {
                    message.client = Some(self.clone());
                    handler.on_message(self, &message).await;
                }
                Err(e) => warn!(error = %e, "could not parse MESSAGE_CREATE"),
            },
            "MESSAGE_UPDATE" => match serde_json::from_value::<MessageUpdateEvent>(data) {
                Ok(evt) => handler.on_message_update(self, &evt).await,
                Err(e) => warn!(error = %e, "could not parse MESSAGE_UPDATE"),
            },
            "MESSAGE_DELETE" => match serde_json::from_value::<MessageDeleteEvent>(data) {
                Ok(evt) => handler.on_message_delete(self, &evt).await,
                Err(e) => warn!(error = %e, "could not parse MESSAGE_DELETE"),
            },
            "MESSAGE_REACTION_ADD" => match serde_json::from_value::<ReactionAddEvent>(data) {
                Ok(evt) => handler.on_reaction_add(self, &evt).await,
                Err(e) => warn!(error = %e, "could not parse MESSAGE_REACTION_ADD"),
            },
            "INTERACTION_CREATE" => match serde_json::from_value::<Interaction>(data) {
                Ok(mut interaction) => {
                    interaction.client = Some(self.clone());
                    handler.on_interaction(self, &interaction).await;
                }
                Err(e) => warn!(error = %e, "could not parse INTERACTION_CREATE"),
            },
            "CHANNEL_DELETE" => match serde_json::from_value::<ChannelDeleteEvent>(data) {
                Ok(evt) => handler.on_channel_delete(self, &evt).await,
                Err(e) => warn!(error = %e, "could not parse CHANNEL_DELETE"),
            },
            _ => {}
        }
    }

    /* ─────────────────────────── Outgoing ───────────────────────────── */

    /// Replace any running heartbeat task with one ticking at `period`.
    /// A missing ACK between two beats drops the connection.
    async fn start_heartbeat(&self, period: Duration) {
        self.heartbeat_acked.store(true, Ordering::SeqCst);

        let client = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !client.heartbeat_acked.swap(false, Ordering::SeqCst) {
                    warn!("heartbeat not acknowledged, dropping connection");
                    client.drop_connection().await;
                    break;
                }
                if let Err(e) = client.send_heartbeat().await {
                    warn!(error = %e, "heartbeat failed, terminating heartbeat");
                    break;
                }
            }
        });

        if let Some(previous) = self.heartbeat.lock().await.replace(handle) {
            previous.abort();
        }
    }

    async fn send_heartbeat(&self) -> Result<(), DiscordError> {
        let seq = *self.last_sequence.lock().await;
        self.send_payload(GatewayPayload::new(
            opcode::HEARTBEAT,
            seq.map(Value::from).unwrap_or(Value::Null),
        ))
        .await
    }

    async fn identify(&self) -> Result<(), DiscordError> {
        let token = self
            .token
            .lock()
            .await
            .clone()
            .ok_or_else(|| DiscordError::Other("No token set".into()))?;
        let identify = Identify::new(&token, self.intents.0);
        self.send_payload(GatewayPayload::new(
            opcode::IDENTIFY,
            serde_json::to_value(identify)?,
        ))
        .await
    }

    async fn send_payload(&self, payload: GatewayPayload) -> Result<(), DiscordError> {
        let mut guard = self.ws_tx.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(DiscordError::Gateway("Gateway not connected!".into()));
        };

        let text = serde_json::to_string(&payload)?;
        writer
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| DiscordError::Gateway(format!("Failed to send gateway frame: {e}")))
    }

    /// Close the socket without entering `Closing`, so the read loop
    /// reconnects.
    async fn drop_connection(&self) {
        let mut guard = self.ws_tx.lock().await;
        if let Some(writer) = guard.as_mut() {
            let frame = CloseFrame {
                code: CloseCode::Away,
                reason: "reconnecting".into(),
            };
            if let Err(e) = writer.send(WsMessage::Close(Some(frame))).await {
                debug!(error = %e, "close frame not sent");
            }
        }
    }

    /// Close the gateway for good.
    pub async fn close_ws(&self, reason: Option<&str>) -> Result<(), DiscordError> {
        *self.connection_state.lock().await = ConnectionState::Closing;

        if let Some(handle) = self.heartbeat.lock().await.take() {
            handle.abort();
        }

        let mut guard = self.ws_tx.lock().await;
        if let Some(writer) = guard.as_mut() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: reason.unwrap_or("Closing").into(),
            };
            writer
                .send(WsMessage::Close(Some(frame)))
                .await
                .map_err(|e| DiscordError::Gateway(format!("Error sending close frame: {e}")))?;
        }
        *guard = None;
        Ok(())
    }
}

/// Open a TCP stream to `host:port` through an HTTP `CONNECT` proxy.
async fn tunnel_through_proxy(
    proxy_raw: &str,
    host: &str,
    port: u16,
) -> Result<TcpStream, DiscordError> {
    let proxy_url = Url::parse(&normalize_proxy(proxy_raw))
        .map_err(|e| DiscordError::Gateway(format!("Invalid proxy URL: {e}")))?;

    let proxy_host = proxy_url
        .host_str()
        .ok_or_else(|| DiscordError::Gateway("Proxy URL missing host".into()))?;
    let proxy_port = proxy_url
        .port_or_known_default()
        .ok_or_else(|| DiscordError::Gateway("Proxy URL missing port".into()))?;

    let proxy_addr = format!("{proxy_host}:{proxy_port}");
    let mut stream = TcpStream::connect(&proxy_addr).await.map_err(|e| {
        DiscordError::Gateway(format!("Failed to connect to proxy {proxy_addr}: {e}"))
    })?;

    let connect_req = connect_request(&proxy_url, host, port);
    stream
        .write_all(connect_req.as_bytes())
        .await
        .map_err(|e| DiscordError::Gateway(format!("Failed to send CONNECT: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| DiscordError::Gateway(format!("Failed to flush CONNECT: {e}")))?;

    let mut rdr = BufReader::new(stream);
    let mut status_line = String::new();
    rdr.read_line(&mut status_line)
        .await
        .map_err(|e| DiscordError::Gateway(format!("Proxy response read error: {e}")))?;

    if !status_line.starts_with("HTTP/1.1 200") && !status_line.starts_with("HTTP/1.0 200") {
        return Err(DiscordError::Gateway(format!(
            "Proxy tunnel failed: {}",
            status_line.trim_end()
        )));
    }

    // Consume headers.
    loop {
        let mut line = String::new();
        let bytes = rdr
            .read_line(&mut line)
            .await
            .map_err(|e| DiscordError::Gateway(format!("Proxy header read error: {e}")))?;
        if bytes == 0 || line == "\r\n" {
            break;
        }
    }

    Ok(rdr.into_inner())
}

fn connect_request(proxy_url: &Url, host: &str, port: u16) -> String {
    let target = format!("{host}:{port}");
    let mut req = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");

    if !proxy_url.username().is_empty() {
        if let Some(pass) = proxy_url.password() {
            let creds = BASE64_STANDARD.encode(format!("{}:{}", proxy_url.username(), pass));
            req.push_str(&format!("Proxy-Authorization: Basic {creds}\r\n"));
        }
    }
    req.push_str("Proxy-Connection: Keep-Alive\r\n\r\n");
    req
}
