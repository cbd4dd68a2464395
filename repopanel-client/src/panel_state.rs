use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use repopanel_core::{AgentLastRun, Tab};
use serde::{Deserialize, Serialize};
use tokio::runtime::{Handle, RuntimeFlavor};

/// `panel_state.json` holds two small fields; anything bigger is treated as corrupt.
pub const MAX_PANEL_STATE_BYTES: u64 = 64 * 1024;

/// Overrides the directory the state file lives in.
pub const STATE_DIR_ENV: &str = "REPOPANEL_STATE_DIR";

/// State that survives a panel reload.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SavedPanelState {
    /// Wire name of the last selected tab (`"bundles"`, `"agent"`, ...).
    #[serde(rename = "selectedTab", default)]
    pub selected_tab: Option<String>,
    #[serde(
        rename = "agentLastRun",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub agent_last_run: Option<AgentLastRun>,
}

impl SavedPanelState {
    pub fn for_tab(tab: Tab) -> Self {
        Self {
            selected_tab: Some(tab.wire_name().to_owned()),
            agent_last_run: None,
        }
    }

    /// The restored tab, or Bundles when nothing usable was saved.
    pub fn tab(&self) -> Tab {
        self.selected_tab
            .as_deref()
            .and_then(Tab::from_wire)
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub enum PanelStateLoadError {
    Metadata(io::Error),
    TooLarge { size: u64, max: u64 },
    Read(io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for PanelStateLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PanelStateLoadError::Metadata(e) => write!(f, "metadata read failed: {e}"),
            PanelStateLoadError::TooLarge { size, max } => {
                write!(f, "file too large: {size} bytes (max {max})")
            }
            PanelStateLoadError::Read(e) => write!(f, "read failed: {e}"),
            PanelStateLoadError::Parse(e) => write!(f, "parse failed: {e}"),
        }
    }
}

impl std::error::Error for PanelStateLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PanelStateLoadError::Metadata(e) | PanelStateLoadError::Read(e) => Some(e),
            PanelStateLoadError::Parse(e) => Some(e),
            PanelStateLoadError::TooLarge { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum PanelStateSaveError {
    Serialize(serde_json::Error),
    CreateDir(io::Error),
    WriteTmp(io::Error),
    Rename(io::Error),
}

impl std::fmt::Display for PanelStateSaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PanelStateSaveError::Serialize(e) => write!(f, "serialize failed: {e}"),
            PanelStateSaveError::CreateDir(e) => write!(f, "create dir failed: {e}"),
            PanelStateSaveError::WriteTmp(e) => write!(f, "tmp write failed: {e}"),
            PanelStateSaveError::Rename(e) => write!(f, "rename failed: {e}"),
        }
    }
}

impl std::error::Error for PanelStateSaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PanelStateSaveError::Serialize(e) => Some(e),
            PanelStateSaveError::CreateDir(e)
            | PanelStateSaveError::WriteTmp(e)
            | PanelStateSaveError::Rename(e) => Some(e),
        }
    }
}

/// Default location of the state file: `$REPOPANEL_STATE_DIR`, then the
/// platform's per-user state directory, then the working directory.
pub fn default_state_path() -> PathBuf {
    let dir = std::env::var_os(STATE_DIR_ENV)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("LOCALAPPDATA").map(|base| PathBuf::from(base).join("Repopanel")))
        .or_else(|| {
            std::env::var_os("XDG_STATE_HOME").map(|base| PathBuf::from(base).join("repopanel"))
        })
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join("panel_state.json")
}

pub fn parse_panel_state_json(data: &str) -> Result<SavedPanelState, serde_json::Error> {
    serde_json::from_str::<SavedPanelState>(data)
}

pub fn load_panel_state_from_path(path: &Path) -> Result<SavedPanelState, PanelStateLoadError> {
    let meta = fs::metadata(path).map_err(PanelStateLoadError::Metadata)?;
    if meta.len() > MAX_PANEL_STATE_BYTES {
        return Err(PanelStateLoadError::TooLarge {
            size: meta.len(),
            max: MAX_PANEL_STATE_BYTES,
        });
    }

    let data = fs::read_to_string(path).map_err(PanelStateLoadError::Read)?;
    parse_panel_state_json(&data).map_err(PanelStateLoadError::Parse)
}

/// Loads the state at `path`, falling back to defaults on any failure.
pub fn load_panel_state(path: &Path) -> SavedPanelState {
    match load_panel_state_from_path(path) {
        Ok(state) => state,
        Err(PanelStateLoadError::Metadata(err)) if err.kind() == io::ErrorKind::NotFound => {
            SavedPanelState::default()
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), "ignoring saved panel state: {err}");
            SavedPanelState::default()
        }
    }
}

pub fn save_panel_state_to_path(
    path: &Path,
    state: &SavedPanelState,
) -> Result<(), PanelStateSaveError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(PanelStateSaveError::CreateDir)?;
    }

    let tmp = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(state).map_err(PanelStateSaveError::Serialize)?;
    fs::write(&tmp, payload.as_bytes()).map_err(PanelStateSaveError::WriteTmp)?;

    // `rename` replaces an existing file on every supported platform.
    fs::rename(&tmp, path).map_err(PanelStateSaveError::Rename)?;
    Ok(())
}

/// Sleeps between save attempts. Inside a multi-threaded runtime the worker
/// hands its other tasks off first.
fn backoff(duration: Duration) {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| std::thread::sleep(duration));
        }
        _ => std::thread::sleep(duration),
    }
}

pub fn save_panel_state_with_retry(
    path: &Path,
    state: &SavedPanelState,
) -> Result<(), PanelStateSaveError> {
    const MAX_ATTEMPTS: u32 = 3;
    const BACKOFF_BASE_MS: u64 = 50;

    let mut attempt: u32 = 1;
    loop {
        match save_panel_state_to_path(path, state) {
            Ok(()) => return Ok(()),
            Err(err) if attempt >= MAX_ATTEMPTS => return Err(err),
            Err(err) => {
                tracing::debug!(attempt, "panel state save failed, retrying: {err}");
                let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
                backoff(Duration::from_millis(backoff_ms));
                attempt += 1;
            }
        }
    }
}
