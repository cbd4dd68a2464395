use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    AgentRunRecord, Bundle, CopyMode, CoreError, DebugRun, DebugRunId, DefaultRunInfo,
    ExecutionState, Message, PineconeIndex, decode_value,
};

pub const GOOGLE_API_KEY: &str = "googleApiKey";
pub const PINECONE_API_KEY: &str = "pineconeApiKey";
/// Secrets the settings tab asks about, with their display labels.
pub const KNOWN_SECRETS: [(&str, &str); 2] = [
    (GOOGLE_API_KEY, "Google API key"),
    (PINECONE_API_KEY, "Pinecone API key"),
];
/// Execution-state id the host uses for the whole-repository run.
pub const DEFAULT_BUNDLE_ID: &str = "__default__";

/// Messages the panel sends to the host.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum UiMessage {
    WebviewLoaded,
    CheckSecret {
        key: String,
    },
    SaveSecret {
        key: String,
        value: String,
    },
    FetchPineconeIndexes,
    GetPineconeIndex,
    SavePineconeIndex {
        index: String,
    },
    SetCopyMode {
        mode: CopyMode,
    },
    GetDebugRuns,
    DeleteDebugRun {
        id: DebugRunId,
    },
    #[serde(rename_all = "camelCase")]
    RunBundle {
        bundle_id: String,
        #[serde(default)]
        compress: bool,
    },
    #[serde(rename_all = "camelCase")]
    CancelBundle {
        bundle_id: String,
    },
    #[serde(rename_all = "camelCase")]
    CopyBundleOutput {
        bundle_id: String,
    },
    #[serde(rename_all = "camelCase")]
    CopyDebugOutput {
        run_id: DebugRunId,
    },
    #[serde(rename = "copyDefaultRepomixOutput")]
    CopyDefaultOutput,
    /// Runs the whole-repository pass again over a debug run's files.
    ReRunDebug {
        files: Vec<String>,
    },
    RunSmartAgent {
        query: String,
    },
    GetAgentHistory,
    #[serde(rename_all = "camelCase")]
    CopyLastAgentOutput {
        output_path: String,
    },
}

// Secret values must never reach a log line.
impl fmt::Debug for UiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiMessage::SaveSecret { key, .. } => f
                .debug_struct("SaveSecret")
                .field("key", key)
                .field("value", &"<redacted>")
                .finish(),
            other => write!(f, "{}", other.command()),
        }
    }
}

/// Messages the host pushes to the panel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum HostMessage {
    UpdateBundles {
        bundles: Vec<Bundle>,
    },
    UpdateDebugRuns {
        runs: Vec<DebugRun>,
    },
    UpdateVersion {
        version: String,
    },
    SecretStatus {
        key: String,
        exists: bool,
    },
    UpdatePineconeIndexes {
        #[serde(default)]
        indexes: Vec<PineconeIndex>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    UpdateSelectedIndex {
        index: String,
    },
    UpdateCopyMode {
        mode: CopyMode,
    },
    #[serde(rename_all = "camelCase")]
    ExecutionStateChange {
        bundle_id: String,
        status: ExecutionState,
    },
    #[serde(rename = "updateDefaultRepomix")]
    UpdateDefaultRun {
        data: DefaultRunInfo,
    },
    OutputContent {
        target: CopyTarget,
        content: String,
    },
    AgentStateChange {
        status: ExecutionState,
    },
    #[serde(rename_all = "camelCase")]
    AgentRunComplete {
        output_path: String,
        file_count: u64,
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens: Option<u64>,
    },
    AgentRunFailed,
    AgentHistory {
        #[serde(default)]
        history: Vec<AgentRunRecord>,
    },
    /// A refused request. `target` or `index` names the request it answers,
    /// when there is one.
    HostError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<CopyTarget>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<String>,
    },
}

impl HostMessage {
    /// A refusal that answers no particular request.
    pub fn error(message: impl Into<String>) -> Self {
        HostMessage::HostError {
            message: message.into(),
            target: None,
            index: None,
        }
    }
}

/// A typed view over the envelope. `from_message` returns `Ok(None)` for
/// commands outside `COMMANDS` so callers can ignore them.
pub trait Protocol: Serialize + DeserializeOwned {
    const COMMANDS: &'static [&'static str];

    fn command(&self) -> &'static str;

    fn to_message(&self) -> Result<Message, CoreError> {
        let value =
            serde_json::to_value(self).map_err(|err| CoreError::Serialization(err.to_string()))?;
        decode_value(value)
    }

    fn from_message(message: &Message) -> Result<Option<Self>, CoreError> {
        if !Self::COMMANDS.contains(&message.command()) {
            return Ok(None);
        }
        serde_json::from_value(message.clone().into_value())
            .map(Some)
            .map_err(|err| CoreError::InvalidPayload {
                command: message.command().to_owned(),
                reason: err.to_string(),
            })
    }
}

impl Protocol for UiMessage {
    const COMMANDS: &'static [&'static str] = &[
        "webviewLoaded",
        "checkSecret",
        "saveSecret",
        "fetchPineconeIndexes",
        "getPineconeIndex",
        "savePineconeIndex",
        "setCopyMode",
        "getDebugRuns",
        "deleteDebugRun",
        "runBundle",
        "cancelBundle",
        "copyBundleOutput",
        "copyDebugOutput",
        "copyDefaultRepomixOutput",
        "reRunDebug",
        "runSmartAgent",
        "getAgentHistory",
        "copyLastAgentOutput",
    ];

    fn command(&self) -> &'static str {
        match self {
            UiMessage::WebviewLoaded => "webviewLoaded",
            UiMessage::CheckSecret { .. } => "checkSecret",
            UiMessage::SaveSecret { .. } => "saveSecret",
            UiMessage::FetchPineconeIndexes => "fetchPineconeIndexes",
            UiMessage::GetPineconeIndex => "getPineconeIndex",
            UiMessage::SavePineconeIndex { .. } => "savePineconeIndex",
            UiMessage::SetCopyMode { .. } => "setCopyMode",
            UiMessage::GetDebugRuns => "getDebugRuns",
            UiMessage::DeleteDebugRun { .. } => "deleteDebugRun",
            UiMessage::RunBundle { .. } => "runBundle",
            UiMessage::CancelBundle { .. } => "cancelBundle",
            UiMessage::CopyBundleOutput { .. } => "copyBundleOutput",
            UiMessage::CopyDebugOutput { .. } => "copyDebugOutput",
            UiMessage::CopyDefaultOutput => "copyDefaultRepomixOutput",
            UiMessage::ReRunDebug { .. } => "reRunDebug",
            UiMessage::RunSmartAgent { .. } => "runSmartAgent",
            UiMessage::GetAgentHistory => "getAgentHistory",
            UiMessage::CopyLastAgentOutput { .. } => "copyLastAgentOutput",
        }
    }
}

impl Protocol for HostMessage {
    const COMMANDS: &'static [&'static str] = &[
        "updateBundles",
        "updateDebugRuns",
        "updateVersion",
        "secretStatus",
        "updatePineconeIndexes",
        "updateSelectedIndex",
        "updateCopyMode",
        "executionStateChange",
        "updateDefaultRepomix",
        "outputContent",
        "agentStateChange",
        "agentRunComplete",
        "agentRunFailed",
        "agentHistory",
        "hostError",
    ];

    fn command(&self) -> &'static str {
        match self {
            HostMessage::UpdateBundles { .. } => "updateBundles",
            HostMessage::UpdateDebugRuns { .. } => "updateDebugRuns",
            HostMessage::UpdateVersion { .. } => "updateVersion",
            HostMessage::SecretStatus { .. } => "secretStatus",
            HostMessage::UpdatePineconeIndexes { .. } => "updatePineconeIndexes",
            HostMessage::UpdateSelectedIndex { .. } => "updateSelectedIndex",
            HostMessage::UpdateCopyMode { .. } => "updateCopyMode",
            HostMessage::ExecutionStateChange { .. } => "executionStateChange",
            HostMessage::UpdateDefaultRun { .. } => "updateDefaultRepomix",
            HostMessage::OutputContent { .. } => "outputContent",
            HostMessage::AgentStateChange { .. } => "agentStateChange",
            HostMessage::AgentRunComplete { .. } => "agentRunComplete",
            HostMessage::AgentRunFailed => "agentRunFailed",
            HostMessage::AgentHistory { .. } => "agentHistory",
            HostMessage::HostError { .. } => "hostError",
        }
    }
}

/// What an `outputContent` reply belongs to. On the wire: `bundle:<id>`,
/// `debug:<run id>`, `default` or `agent:<output path>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CopyTarget {
    Bundle(String),
    DebugRun(DebugRunId),
    DefaultRun,
    AgentOutput(String),
}

impl fmt::Display for CopyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyTarget::Bundle(id) => write!(f, "bundle:{id}"),
            CopyTarget::DebugRun(id) => write!(f, "debug:{id}"),
            CopyTarget::DefaultRun => f.write_str("default"),
            CopyTarget::AgentOutput(path) => write!(f, "agent:{path}"),
        }
    }
}

impl From<CopyTarget> for String {
    fn from(target: CopyTarget) -> Self {
        target.to_string()
    }
}

impl TryFrom<String> for CopyTarget {
    type Error = CoreError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        if raw == "default" {
            return Ok(CopyTarget::DefaultRun);
        }
        match raw.split_once(':') {
            Some(("bundle", id)) if !id.is_empty() => Ok(CopyTarget::Bundle(id.to_owned())),
            Some(("agent", path)) if !path.is_empty() => {
                Ok(CopyTarget::AgentOutput(path.to_owned()))
            }
            Some(("debug", id)) => id
                .parse()
                .map(CopyTarget::DebugRun)
                .map_err(|_| CoreError::InvalidCopyTarget(raw.clone())),
            _ => Err(CoreError::InvalidCopyTarget(raw)),
        }
    }
}

impl CopyTarget {
    /// The request that asks the host to materialize this target's output.
    pub fn request(&self) -> UiMessage {
        match self {
            CopyTarget::Bundle(id) => UiMessage::CopyBundleOutput {
                bundle_id: id.clone(),
            },
            CopyTarget::DebugRun(id) => UiMessage::CopyDebugOutput { run_id: *id },
            CopyTarget::DefaultRun => UiMessage::CopyDefaultOutput,
            CopyTarget::AgentOutput(path) => UiMessage::CopyLastAgentOutput {
                output_path: path.clone(),
            },
        }
    }
}
