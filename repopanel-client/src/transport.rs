use std::{fmt, path::PathBuf, time::Duration};

use futures::{SinkExt, StreamExt};
use repopanel_core::{
    AgentLastRun, CoreError, HostMessage, MAX_MESSAGE_BYTES, Message, Protocol, Tab, UiMessage,
    decode, encode_text,
};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::timeout,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config,
    tungstenite::{Message as WsMessage, protocol::WebSocketConfig},
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::panel_state::{
    PanelStateSaveError, SavedPanelState, load_panel_state, save_panel_state_with_retry,
};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const MAX_CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(12);
const BACKOFF_BASE_MS: u64 = 200;
/// What the socket itself will read. Frames between `MAX_MESSAGE_BYTES` and
/// this are read whole and refused by the codec, which keeps the connection.
const SOCKET_MESSAGE_LIMIT: usize = 4 * MAX_MESSAGE_BYTES;

#[derive(Debug)]
pub enum TransportError {
    InvalidUrl(url::ParseError),
    Connect { attempts: u32, reason: String },
    Encode(CoreError),
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::InvalidUrl(e) => write!(f, "invalid server URL: {e}"),
            TransportError::Connect { attempts, reason } => {
                write!(f, "connect failed after {attempts} attempts: {reason}")
            }
            TransportError::Encode(e) => write!(f, "encode failed: {e}"),
            TransportError::Closed => write!(f, "transport closed"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::InvalidUrl(e) => Some(e),
            TransportError::Encode(e) => Some(e),
            TransportError::Connect { .. } | TransportError::Closed => None,
        }
    }
}

/// The panel's handle on the host: outbound queue plus the persisted state
/// file. One instance is created per panel and passed to whatever needs it.
#[derive(Debug)]
pub struct Transport {
    outbound: mpsc::UnboundedSender<Message>,
    state_path: PathBuf,
    restored: SavedPanelState,
    saved: SavedPanelState,
}

impl Transport {
    /// Restores the saved state and queues the `webviewLoaded` handshake
    /// ahead of anything else.
    pub fn new(
        outbound: mpsc::UnboundedSender<Message>,
        state_path: PathBuf,
    ) -> Result<Self, TransportError> {
        let restored = load_panel_state(&state_path);
        let transport = Self {
            outbound,
            state_path,
            saved: restored.clone(),
            restored,
        };
        transport.send_ui(&UiMessage::WebviewLoaded)?;
        Ok(transport)
    }

    /// Queues `message` for the host. Never waits for the network.
    pub fn send(&self, message: Message) -> Result<(), TransportError> {
        self.outbound
            .send(message)
            .map_err(|_| TransportError::Closed)
    }

    pub fn send_ui(&self, message: &UiMessage) -> Result<(), TransportError> {
        let message = message.to_message().map_err(TransportError::Encode)?;
        self.send(message)
    }

    /// The state read from disk at construction. Later saves do not change it.
    pub fn restored_state(&self) -> &SavedPanelState {
        &self.restored
    }

    pub fn persist_state(&mut self, selected_tab: Tab) -> Result<(), PanelStateSaveError> {
        self.saved.selected_tab = Some(selected_tab.wire_name().to_owned());
        save_panel_state_with_retry(&self.state_path, &self.saved)
    }

    pub fn persist_agent_run(&mut self, run: AgentLastRun) -> Result<(), PanelStateSaveError> {
        self.saved.agent_last_run = Some(run);
        save_panel_state_with_retry(&self.state_path, &self.saved)
    }
}

/// The single inbound dispatch point: waits for the next message and hands it
/// to `handler`. Returns false once the channel has closed. Messages reach the
/// handler in arrival order, and cancelling the wait loses nothing.
pub async fn on_receive<F>(inbound: &mut mpsc::UnboundedReceiver<Message>, handler: F) -> bool
where
    F: FnOnce(&Message),
{
    match inbound.recv().await {
        Some(message) => {
            handler(&message);
            true
        }
        None => false,
    }
}

/// Opens the WebSocket, retrying with exponential back-off.
pub async fn connect(server_url: &str) -> Result<WsStream, TransportError> {
    Url::parse(server_url).map_err(TransportError::InvalidUrl)?;

    let config = WebSocketConfig::default()
        .max_message_size(Some(SOCKET_MESSAGE_LIMIT))
        .max_frame_size(Some(SOCKET_MESSAGE_LIMIT));

    let mut attempt: u32 = 1;
    loop {
        info!(
            attempt,
            max_attempts = MAX_CONNECT_ATTEMPTS,
            server_url,
            "connecting"
        );

        let reason = match timeout(
            CONNECT_TIMEOUT,
            connect_async_with_config(server_url, Some(config), false),
        )
        .await
        {
            Ok(Ok((stream, _))) => {
                info!(server_url, "connected");
                return Ok(stream);
            }
            Ok(Err(err)) => format!("connect failed: {err}"),
            Err(_) => format!("connect timed out after {CONNECT_TIMEOUT:?}"),
        };
        error!(attempt, server_url, "{reason}");
        if attempt >= MAX_CONNECT_ATTEMPTS {
            return Err(TransportError::Connect {
                attempts: attempt,
                reason,
            });
        }

        let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        attempt += 1;
    }
}

/// Moves messages between the socket and the channels until either side
/// closes.
pub async fn run_bridge(
    stream: WsStream,
    outbound_rx: mpsc::UnboundedReceiver<Message>,
    inbound_tx: mpsc::UnboundedSender<Message>,
) {
    let (write_half, read_half) = stream.split();
    let send_task = tokio::spawn(network_send_task(write_half, outbound_rx));
    let receive_task = tokio::spawn(network_receive_task(read_half, inbound_tx));

    tokio::select! {
        _ = send_task => {}
        _ = receive_task => {}
    }
    info!("transport bridge stopped");
}

async fn network_send_task(
    mut ws_write: futures::stream::SplitSink<WsStream, WsMessage>,
    mut outgoing_rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outgoing_rx.recv().await {
        match encode_text(&message) {
            Ok(text) => {
                debug!(command = message.command(), "sending");
                if ws_write.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Err(err) => warn!("failed to encode outgoing message: {err}"),
        }
    }
}

async fn network_receive_task(
    mut ws_read: futures::stream::SplitStream<WsStream>,
    inbound_tx: mpsc::UnboundedSender<Message>,
) {
    while let Some(next) = ws_read.next().await {
        let frame = match next {
            Ok(frame) => frame,
            Err(err) => {
                warn!("read failed: {err}");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => {
                let Some(message) = inbound_message(text.as_str()) else {
                    continue;
                };
                if inbound_tx.send(message).is_err() {
                    break;
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
}

/// Decodes one text frame. An oversized frame becomes a local `hostError` so
/// the user sees that something was dropped; other decode failures are only
/// logged.
fn inbound_message(text: &str) -> Option<Message> {
    match decode(text) {
        Ok(message) => Some(message),
        Err(CoreError::MessageTooLarge { size, max }) => {
            warn!(size, max, "dropping oversized message");
            HostMessage::error(format!(
                "A {size} byte message from the host was dropped (limit {max} bytes)"
            ))
            .to_message()
            .ok()
        }
        Err(err) => {
            warn!("decode message failed: {err}");
            None
        }
    }
}
