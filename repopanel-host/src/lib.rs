use std::{
    collections::BTreeMap,
    path::{Component, Path},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade, ws::Message},
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use repopanel_core::{
    AgentRunRecord, Bundle, CopyMode, CopyTarget, DebugRun, DebugRunId, DefaultRunInfo,
    ExecutionState, GOOGLE_API_KEY, HostMessage, MAX_CLIPBOARD_BYTES, MAX_MESSAGE_BYTES,
    PINECONE_API_KEY, PineconeIndex, Protocol, UiMessage, decode, encode_text,
};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{RwLock, mpsc},
};
use tracing::{debug, info, warn};

/// Everything the host knows, loaded from JSON. Mutated by requests such as
/// `saveSecret` and `deleteDebugRun` for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostFixture {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub bundles: Vec<Bundle>,
    #[serde(default)]
    pub debug_runs: Vec<DebugRun>,
    /// Stored secret values by key. Only existence is ever sent to a panel.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
    #[serde(default)]
    pub pinecone_indexes: Vec<PineconeIndex>,
    #[serde(default)]
    pub selected_index: Option<String>,
    #[serde(default = "default_copy_mode")]
    pub copy_mode: CopyMode,
    /// Output content by bundle id.
    #[serde(default)]
    pub bundle_outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub debug_outputs: BTreeMap<DebugRunId, String>,
    #[serde(default)]
    pub default_run: DefaultRunInfo,
    /// Content of the whole-repository output file.
    #[serde(default)]
    pub default_output: Option<String>,
    /// Files the Smart Agent picks for any query. Empty means every run
    /// finds nothing.
    #[serde(default)]
    pub agent_files: Vec<String>,
    /// Newest first.
    #[serde(default)]
    pub agent_history: Vec<AgentRunRecord>,
    /// Agent output content by output path.
    #[serde(default)]
    pub agent_outputs: BTreeMap<String, String>,
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}

fn default_copy_mode() -> CopyMode {
    CopyMode::File
}

impl Default for HostFixture {
    fn default() -> Self {
        Self {
            version: default_version(),
            bundles: Vec::new(),
            debug_runs: Vec::new(),
            secrets: BTreeMap::new(),
            pinecone_indexes: Vec::new(),
            selected_index: None,
            copy_mode: default_copy_mode(),
            bundle_outputs: BTreeMap::new(),
            debug_outputs: BTreeMap::new(),
            default_run: DefaultRunInfo::default(),
            default_output: None,
            agent_files: Vec::new(),
            agent_history: Vec::new(),
            agent_outputs: BTreeMap::new(),
        }
    }
}

impl HostFixture {
    pub fn from_json(data: &str) -> Result<Self, String> {
        serde_json::from_str(data).map_err(|err| format!("invalid fixture: {err}"))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let data = std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
        Self::from_json(&data)
    }

    fn has_secret(&self, key: &str) -> bool {
        self.secrets
            .get(key)
            .is_some_and(|value| !value.trim().is_empty())
    }

    fn bundle_output(&self, bundle_id: &str) -> Result<String, String> {
        let bundle = self
            .bundles
            .iter()
            .find(|bundle| bundle.id == bundle_id)
            .ok_or_else(|| format!("Unknown bundle: {bundle_id}"))?;
        if !bundle.output_file_exists {
            return Err(format!("Bundle {} has no output file", bundle.name));
        }
        self.bundle_outputs
            .get(bundle_id)
            .cloned()
            .ok_or_else(|| format!("Output file for {} could not be read", bundle.name))
    }

    fn debug_output(&self, run_id: DebugRunId) -> Result<String, String> {
        if !self.debug_runs.iter().any(|run| run.id == run_id) {
            return Err(format!("Unknown debug run: {run_id}"));
        }
        self.debug_outputs
            .get(&run_id)
            .cloned()
            .ok_or_else(|| format!("Debug run {run_id} has no output"))
    }

    fn default_output(&self) -> Result<String, String> {
        if !self.default_run.output_file_exists {
            return Err("The whole-repository run has no output file".to_owned());
        }
        self.default_output
            .clone()
            .ok_or_else(|| format!("{} could not be read", self.default_run.output_file_path))
    }

    fn agent_output(&self, output_path: &str) -> Result<String, String> {
        self.agent_outputs
            .get(output_path)
            .cloned()
            .ok_or_else(|| format!("Agent output not found: {output_path}"))
    }

    /// Records a Smart Agent run over `agent_files` and returns its replies.
    fn run_agent(&mut self, query: String) -> Vec<HostMessage> {
        if !self.has_secret(GOOGLE_API_KEY) {
            return vec![
                HostMessage::error("Google API key not set"),
                HostMessage::AgentRunFailed,
            ];
        }

        let running = HostMessage::AgentStateChange {
            status: ExecutionState::Running,
        };
        let idle = HostMessage::AgentStateChange {
            status: ExecutionState::Idle,
        };
        let sequence = self.agent_history.len() + 1;
        let timestamp = now_millis();

        if self.agent_files.is_empty() {
            self.agent_history.insert(
                0,
                AgentRunRecord {
                    id: format!("agent-{sequence}"),
                    timestamp,
                    query,
                    file_count: 0,
                    files: Vec::new(),
                    success: false,
                    error: Some("No relevant files found".to_owned()),
                    duration: None,
                    output_path: None,
                },
            );
            return vec![running, HostMessage::AgentRunFailed, idle];
        }

        let output_path = format!(".repopanel/agent/run-{sequence}.txt");
        let content: String = self
            .agent_files
            .iter()
            .map(|file| format!("// {file}\n"))
            .collect();
        let tokens = (content.len() / 4) as u64;
        let file_count = self.agent_files.len() as u64;
        self.agent_outputs.insert(output_path.clone(), content);
        self.agent_history.insert(
            0,
            AgentRunRecord {
                id: format!("agent-{sequence}"),
                timestamp,
                query: query.clone(),
                file_count,
                files: self.agent_files.clone(),
                success: true,
                error: None,
                duration: None,
                output_path: Some(output_path.clone()),
            },
        );
        vec![
            running,
            HostMessage::AgentRunComplete {
                output_path,
                file_count,
                query,
                tokens: Some(tokens),
            },
            idle,
        ]
    }

    /// Adds a debug run over the workspace-relative `files`.
    fn rerun_debug(&mut self, files: Vec<String>) -> Vec<HostMessage> {
        let files: Vec<String> = files
            .into_iter()
            .filter(|file| is_workspace_relative(file))
            .collect();
        if files.is_empty() {
            return vec![HostMessage::error("No files to run again")];
        }

        let id = self.debug_runs.iter().map(|run| run.id).max().unwrap_or(0) + 1;
        let content: String = files.iter().map(|file| format!("// {file}\n")).collect();
        self.debug_outputs.insert(id, content);
        self.debug_runs.insert(
            0,
            DebugRun {
                id,
                timestamp: now_millis(),
                files,
            },
        );
        vec![HostMessage::UpdateDebugRuns {
            runs: self.debug_runs.clone(),
        }]
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

fn is_workspace_relative(file: &str) -> bool {
    let path = Path::new(file);
    !file.trim().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// `outputContent` for `target`, or a `hostError` naming it when the content
/// cannot be read or is over the clipboard limit.
fn output_reply(target: CopyTarget, content: Result<String, String>) -> HostMessage {
    match content {
        Ok(content) if content.len() > MAX_CLIPBOARD_BYTES => HostMessage::HostError {
            message: format!(
                "Output is {} bytes; the clipboard limit is {MAX_CLIPBOARD_BYTES} bytes",
                content.len()
            ),
            target: Some(target),
            index: None,
        },
        Ok(content) => HostMessage::OutputContent { target, content },
        Err(message) => HostMessage::HostError {
            message,
            target: Some(target),
            index: None,
        },
    }
}

/// Answers one panel request. Pure apart from the fixture mutation.
pub fn reply(fixture: &mut HostFixture, request: UiMessage) -> Vec<HostMessage> {
    match request {
        UiMessage::WebviewLoaded => vec![
            HostMessage::UpdateVersion {
                version: fixture.version.clone(),
            },
            HostMessage::UpdateBundles {
                bundles: fixture.bundles.clone(),
            },
            HostMessage::UpdateDefaultRun {
                data: fixture.default_run.clone(),
            },
            HostMessage::UpdateDebugRuns {
                runs: fixture.debug_runs.clone(),
            },
            HostMessage::UpdateCopyMode {
                mode: fixture.copy_mode,
            },
        ],
        UiMessage::CheckSecret { key } => {
            let exists = fixture.has_secret(&key);
            vec![HostMessage::SecretStatus { key, exists }]
        }
        UiMessage::SaveSecret { key, value } => {
            let exists = !value.trim().is_empty();
            if exists {
                fixture.secrets.insert(key.clone(), value.trim().to_owned());
            } else {
                fixture.secrets.remove(&key);
            }
            vec![HostMessage::SecretStatus { key, exists }]
        }
        UiMessage::FetchPineconeIndexes => {
            if fixture.has_secret(PINECONE_API_KEY) {
                vec![HostMessage::UpdatePineconeIndexes {
                    indexes: fixture.pinecone_indexes.clone(),
                    error: None,
                }]
            } else {
                vec![HostMessage::UpdatePineconeIndexes {
                    indexes: Vec::new(),
                    error: Some("Pinecone API key not set".to_owned()),
                }]
            }
        }
        UiMessage::GetPineconeIndex => fixture
            .selected_index
            .clone()
            .map(|index| HostMessage::UpdateSelectedIndex { index })
            .into_iter()
            .collect(),
        UiMessage::SavePineconeIndex { index } => {
            if fixture.pinecone_indexes.iter().any(|i| i.name == index) {
                fixture.selected_index = Some(index.clone());
                vec![HostMessage::UpdateSelectedIndex { index }]
            } else {
                vec![HostMessage::HostError {
                    message: format!("Unknown Pinecone index: {index}"),
                    target: None,
                    index: Some(index),
                }]
            }
        }
        UiMessage::SetCopyMode { mode } => {
            fixture.copy_mode = mode;
            vec![HostMessage::UpdateCopyMode { mode }]
        }
        UiMessage::GetDebugRuns => vec![HostMessage::UpdateDebugRuns {
            runs: fixture.debug_runs.clone(),
        }],
        UiMessage::DeleteDebugRun { id } => {
            fixture.debug_runs.retain(|run| run.id != id);
            fixture.debug_outputs.remove(&id);
            vec![HostMessage::UpdateDebugRuns {
                runs: fixture.debug_runs.clone(),
            }]
        }
        UiMessage::RunBundle { bundle_id, .. } => vec![HostMessage::ExecutionStateChange {
            bundle_id,
            status: ExecutionState::Running,
        }],
        UiMessage::CancelBundle { bundle_id } => vec![HostMessage::ExecutionStateChange {
            bundle_id,
            status: ExecutionState::Idle,
        }],
        UiMessage::ReRunDebug { files } => fixture.rerun_debug(files),
        UiMessage::CopyBundleOutput { bundle_id } => {
            let content = fixture.bundle_output(&bundle_id);
            vec![output_reply(CopyTarget::Bundle(bundle_id), content)]
        }
        UiMessage::CopyDebugOutput { run_id } => vec![output_reply(
            CopyTarget::DebugRun(run_id),
            fixture.debug_output(run_id),
        )],
        UiMessage::CopyDefaultOutput => {
            vec![output_reply(CopyTarget::DefaultRun, fixture.default_output())]
        }
        UiMessage::RunSmartAgent { query } => fixture.run_agent(query),
        UiMessage::GetAgentHistory => vec![HostMessage::AgentHistory {
            history: fixture.agent_history.clone(),
        }],
        UiMessage::CopyLastAgentOutput { output_path } => {
            let content = fixture.agent_output(&output_path);
            vec![output_reply(CopyTarget::AgentOutput(output_path), content)]
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostState {
    fixture: Arc<RwLock<HostFixture>>,
}

impl HostState {
    #[must_use]
    pub fn new(fixture: HostFixture) -> Self {
        Self {
            fixture: Arc::new(RwLock::new(fixture)),
        }
    }

    pub async fn snapshot(&self) -> HostFixture {
        self.fixture.read().await.clone()
    }
}

impl Default for HostState {
    fn default() -> Self {
        Self::new(HostFixture::default())
    }
}

pub fn build_router(state: HostState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: HostState) -> Result<(), String> {
    info!(
        "host listening on {}",
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_owned())
    );
    axum::serve(listener, build_router(state))
        .await
        .map_err(|err| err.to_string())
}

async fn healthz_handler() -> impl IntoResponse {
    Json(serde_json::json!({"ok": true}))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<HostState>) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| async move {
            handle_socket(state, socket).await;
        })
}

async fn handle_socket(state: HostState, socket: axum::extract::ws::WebSocket) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Pongs queued by the read half only flush when the write half sends.
    const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

    let send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(KEEPALIVE_INTERVAL);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    match msg {
                        Some(message) => {
                            if ws_sender.send(message).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    info!("panel connected");

    while let Some(next_message) = ws_receiver.next().await {
        let message = match next_message {
            Ok(message) => message,
            Err(err) => {
                warn!("websocket receive error: {err}");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                for frame in handle_text(&state, text.as_str()).await {
                    if outbound_tx.send(frame).is_err() {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    send_task.abort();
    info!("panel disconnected");
}

async fn handle_text(state: &HostState, text: &str) -> Vec<Message> {
    let envelope = match decode(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!("failed to decode message: {err}");
            return Vec::new();
        }
    };

    let request = match UiMessage::from_message(&envelope) {
        Ok(Some(request)) => request,
        Ok(None) => {
            debug!(command = envelope.command(), "ignoring unknown command");
            return Vec::new();
        }
        Err(err) => {
            warn!(command = envelope.command(), "invalid request: {err}");
            return Vec::new();
        }
    };

    debug!(request = ?request, "handling request");
    let replies = {
        let mut fixture = state.fixture.write().await;
        reply(&mut fixture, request)
    };

    replies
        .iter()
        .filter_map(encode_reply)
        .map(|text| Message::Text(text.into()))
        .collect()
}

/// Encodes one reply. An `outputContent` whose escaped frame would exceed
/// `MAX_MESSAGE_BYTES` is replaced by a `hostError` naming its target.
fn encode_reply(outgoing: &HostMessage) -> Option<String> {
    let text = match outgoing.to_message().and_then(|message| encode_text(&message)) {
        Ok(text) => text,
        Err(err) => {
            warn!(command = outgoing.command(), "failed to encode reply: {err}");
            return None;
        }
    };
    if text.len() <= MAX_MESSAGE_BYTES {
        return Some(text);
    }

    let HostMessage::OutputContent { target, .. } = outgoing else {
        warn!(command = outgoing.command(), bytes = text.len(), "reply over the frame limit");
        return None;
    };
    warn!(copy_target = %target, bytes = text.len(), "output frame over the limit");
    let refusal = HostMessage::HostError {
        message: format!(
            "Output frame is {} bytes; the message limit is {MAX_MESSAGE_BYTES} bytes",
            text.len()
        ),
        target: Some(target.clone()),
        index: None,
    };
    refusal
        .to_message()
        .and_then(|message| encode_text(&message))
        .map_err(|err| warn!("failed to encode refusal: {err}"))
        .ok()
}
