use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::{Map, Value};
use thiserror::Error;

mod correlate;
mod dispatch;
mod model;
mod panel;
mod present;
mod protocol;
mod store;
mod view;

pub use correlate::Correlator;
pub use dispatch::{Dispatch, Dispatcher, Handler};
pub use model::{
    AgentLastRun, AgentRunRecord, Bundle, BundleStats, CopyMode, DebugRun, DebugRunId,
    DefaultRunInfo, ExecutionState, PineconeIndex, Tab,
};
pub use panel::Panel;
pub use present::{DEFAULT_VISIBLE_FILES, Presented, present};
pub use protocol::{
    CopyTarget, DEFAULT_BUNDLE_ID, GOOGLE_API_KEY, HostMessage, KNOWN_SECRETS, PINECONE_API_KEY,
    Protocol, UiMessage,
};
pub use store::{Effect, PanelState, Store};
pub use view::{
    AgentHistoryRow, AgentView, BundleRow, DebugRunRow, DefaultRunRow, IndexRow, LastAgentRunRow,
    PanelView, SecretRow, SecretView, SettingsView, TabView,
};

/// Upper bound for content handed to the clipboard.
pub const MAX_CLIPBOARD_BYTES: usize = 8 * 1024 * 1024;
/// Upper bound for a single frame. Output content travels as one JSON string,
/// and escaping newlines, quotes and tabs at most doubles ordinary text, so a
/// frame may be twice the clipboard limit. Hosts refuse replies that would
/// encode larger.
pub const MAX_MESSAGE_BYTES: usize = 2 * MAX_CLIPBOARD_BYTES;

const COMMAND_FIELD: &str = "command";

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has no string `command` field")]
    MissingCommand,
    #[error("message exceeds {max} bytes (got {size})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("invalid payload for `{command}`: {reason}")]
    InvalidPayload { command: String, reason: String },
    #[error("invalid copy target `{0}`")]
    InvalidCopyTarget(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// One protocol envelope: a command discriminator plus the command's payload
/// fields, flattened into a single JSON object on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    command: String,
    payload: Map<String, Value>,
}

impl Message {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    pub fn into_value(self) -> Value {
        let mut object = Map::with_capacity(self.payload.len() + 1);
        object.insert(COMMAND_FIELD.to_owned(), Value::String(self.command));
        object.extend(self.payload);
        Value::Object(object)
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.payload.len() + 1))?;
        map.serialize_entry(COMMAND_FIELD, &self.command)?;
        for (key, value) in &self.payload {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

pub fn encode(command: impl Into<String>, mut payload: Map<String, Value>) -> Message {
    payload.remove(COMMAND_FIELD);
    Message {
        command: command.into(),
        payload,
    }
}

pub fn decode(raw: &str) -> Result<Message, CoreError> {
    if raw.len() > MAX_MESSAGE_BYTES {
        return Err(CoreError::MessageTooLarge {
            size: raw.len(),
            max: MAX_MESSAGE_BYTES,
        });
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|err| CoreError::Serialization(err.to_string()))?;
    decode_value(value)
}

pub fn decode_value(value: Value) -> Result<Message, CoreError> {
    let Value::Object(mut payload) = value else {
        return Err(CoreError::NotAnObject);
    };
    match payload.remove(COMMAND_FIELD) {
        Some(Value::String(command)) => Ok(Message { command, payload }),
        _ => Err(CoreError::MissingCommand),
    }
}

pub fn encode_text(message: &Message) -> Result<String, CoreError> {
    serde_json::to_string(message).map_err(|err| CoreError::Serialization(err.to_string()))
}
