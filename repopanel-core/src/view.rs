use crate::{
    BundleStats, CopyMode, CopyTarget, Correlator, DEFAULT_VISIBLE_FILES, DebugRunId,
    ExecutionState, GOOGLE_API_KEY, KNOWN_SECRETS, PanelState, Presented, Store, Tab, present,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabView {
    pub tab: Tab,
    pub label: &'static str,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub file_count: usize,
    pub stats: BundleStats,
    pub execution: ExecutionState,
    /// Present only when the host reports an output file for this bundle.
    pub copy_action: Option<CopyTarget>,
    pub copy_pending: bool,
}

/// The whole-repository row above the bundle list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRunRow {
    pub execution: ExecutionState,
    pub output_file_path: Option<String>,
    pub copy_action: Option<CopyTarget>,
    pub copy_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugRunRow {
    pub id: DebugRunId,
    pub timestamp: u64,
    pub files: Presented,
    pub total_files: usize,
    /// Only the newest run offers a copy action.
    pub copy_action: Option<CopyTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretView {
    Unknown,
    Pending,
    Present,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRow {
    pub key: &'static str,
    pub label: &'static str,
    pub status: SecretView,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub name: String,
    pub host: String,
    pub dimension: Option<u32>,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsView {
    pub secrets: Vec<SecretRow>,
    pub indexes: Vec<IndexRow>,
    pub fetching_indexes: bool,
    pub index_error: Option<String>,
    pub selected_index: Option<String>,
    pub pending_index: Option<String>,
    /// Last host-confirmed mode; `None` until the host has reported one.
    pub copy_mode: Option<CopyMode>,
    pub copy_mode_pending: Option<CopyMode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastAgentRunRow {
    pub output_path: String,
    pub file_count: u64,
    pub query: Option<String>,
    pub tokens: Option<u64>,
    pub copy_action: CopyTarget,
    pub copy_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentHistoryRow {
    pub id: String,
    pub timestamp: u64,
    pub query: String,
    pub file_count: u64,
    pub files: Presented,
    pub success: bool,
    pub error: Option<String>,
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentView {
    pub running: bool,
    pub google_key: SecretView,
    /// Offered only while no run is in flight.
    pub last_run: Option<LastAgentRunRow>,
    pub last_query: Option<String>,
    pub run_failed: bool,
    pub history: Vec<AgentHistoryRow>,
    pub fetching_history: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelView {
    pub tabs: Vec<TabView>,
    pub selected_tab: Tab,
    pub bundles: Vec<BundleRow>,
    pub default_run: DefaultRunRow,
    pub agent: AgentView,
    pub debug_runs: Vec<DebugRunRow>,
    pub settings: SettingsView,
    pub version: Option<String>,
    pub notice: Option<String>,
}

impl PanelView {
    pub fn from_store(store: &Store, search_enabled: bool) -> Self {
        let state = store.state();
        let requests = store.requests();
        let selected_tab = state.selected_tab().available(search_enabled);

        let tabs = Tab::ordered(search_enabled)
            .into_iter()
            .map(|tab| TabView {
                tab,
                label: tab.label(),
                selected: tab == selected_tab,
            })
            .collect();

        let bundles = state
            .bundles()
            .iter()
            .map(|bundle| {
                let copy_action = bundle
                    .output_file_exists
                    .then(|| CopyTarget::Bundle(bundle.id.clone()));
                let copy_pending = copy_action
                    .as_ref()
                    .is_some_and(|target| requests.is_output_pending(target));
                BundleRow {
                    id: bundle.id.clone(),
                    name: bundle.name.clone(),
                    description: bundle.description.clone(),
                    file_count: bundle.files.len(),
                    stats: bundle.stats,
                    execution: state.execution_state(&bundle.id),
                    copy_action,
                    copy_pending,
                }
            })
            .collect();

        let debug_runs = state
            .debug_runs()
            .iter()
            .enumerate()
            .map(|(position, run)| DebugRunRow {
                id: run.id,
                timestamp: run.timestamp,
                files: present(&run.files, DEFAULT_VISIBLE_FILES),
                total_files: run.files.len(),
                copy_action: (position == 0).then_some(CopyTarget::DebugRun(run.id)),
            })
            .collect();

        let secrets = KNOWN_SECRETS
            .iter()
            .map(|&(key, label)| SecretRow {
                key,
                label,
                status: secret_view(state, requests, key),
            })
            .collect();

        let default_info = state.default_run();
        let default_copy = default_info
            .output_file_exists
            .then_some(CopyTarget::DefaultRun);
        let default_run = DefaultRunRow {
            execution: state.default_run_state(),
            output_file_path: Some(default_info.output_file_path.clone())
                .filter(|path| !path.is_empty()),
            copy_pending: default_copy
                .as_ref()
                .is_some_and(|target| requests.is_output_pending(target)),
            copy_action: default_copy,
        };

        let indexes = state
            .pinecone_indexes()
            .iter()
            .map(|index| IndexRow {
                name: index.name.clone(),
                host: index.host.clone(),
                dimension: index.dimension,
                selected: state.selected_index() == Some(index.name.as_str()),
            })
            .collect();

        Self {
            tabs,
            selected_tab,
            bundles,
            default_run,
            agent: agent_view(state, requests),
            debug_runs,
            settings: SettingsView {
                secrets,
                indexes,
                fetching_indexes: requests.is_fetching_indexes(),
                index_error: state.index_error().map(str::to_owned),
                selected_index: state.selected_index().map(str::to_owned),
                pending_index: requests.pending_index().map(str::to_owned),
                copy_mode: state.copy_mode(),
                copy_mode_pending: requests.pending_copy_mode(),
            },
            version: state.version().map(str::to_owned),
            notice: state.notice().map(str::to_owned),
        }
    }
}

fn secret_view(state: &PanelState, requests: &Correlator, key: &str) -> SecretView {
    match (state.secret(key), requests.is_secret_pending(key)) {
        (Some(true), _) => SecretView::Present,
        (Some(false), _) => SecretView::Missing,
        (None, true) => SecretView::Pending,
        (None, false) => SecretView::Unknown,
    }
}

fn agent_view(state: &PanelState, requests: &Correlator) -> AgentView {
    let running =
        state.agent_status() == ExecutionState::Running || requests.is_agent_run_pending();
    let last = state.agent_last_run();
    let last_run = last
        .last_output_path
        .as_ref()
        .filter(|_| !running)
        .map(|path| {
            let target = CopyTarget::AgentOutput(path.clone());
            LastAgentRunRow {
                output_path: path.clone(),
                file_count: last.last_file_count.unwrap_or_default(),
                query: last.last_query.clone(),
                tokens: last.last_tokens.filter(|tokens| *tokens > 0),
                copy_pending: requests.is_output_pending(&target),
                copy_action: target,
            }
        });
    let history = state
        .agent_history()
        .iter()
        .map(|run| AgentHistoryRow {
            id: run.id.clone(),
            timestamp: run.timestamp,
            query: run.query.clone(),
            file_count: run.file_count,
            files: present(&run.files, DEFAULT_VISIBLE_FILES),
            success: run.success,
            error: run.error.clone(),
            duration: run.duration,
        })
        .collect();

    AgentView {
        running,
        google_key: secret_view(state, requests, GOOGLE_API_KEY),
        last_run,
        last_query: last.last_query.clone(),
        run_failed: last.run_failed && !running,
        history,
        fetching_history: requests.is_fetching_agent_history(),
    }
}
