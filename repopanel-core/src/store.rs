use std::collections::BTreeMap;

use crate::{
    AgentLastRun, AgentRunRecord, Bundle, CopyMode, CopyTarget, Correlator, DEFAULT_BUNDLE_ID,
    DebugRun, DefaultRunInfo, ExecutionState, HostMessage, PINECONE_API_KEY, PineconeIndex, Tab,
    UiMessage,
};

/// I/O a transition asks for. Reducers only describe effects; the session
/// performs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(UiMessage),
    WriteClipboard { target: CopyTarget, content: String },
    PersistTab(Tab),
    PersistAgentRun(AgentLastRun),
}

/// Everything the panel shows. Lists are only ever replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelState {
    selected_tab: Tab,
    bundles: Vec<Bundle>,
    execution: BTreeMap<String, ExecutionState>,
    default_run: DefaultRunInfo,
    debug_runs: Vec<DebugRun>,
    secrets: BTreeMap<String, bool>,
    pinecone_indexes: Vec<PineconeIndex>,
    index_error: Option<String>,
    selected_index: Option<String>,
    copy_mode: Option<CopyMode>,
    version: Option<String>,
    notice: Option<String>,
    agent_status: ExecutionState,
    agent_last_run: AgentLastRun,
    agent_history: Vec<AgentRunRecord>,
}

impl PanelState {
    pub fn new(selected_tab: Tab) -> Self {
        Self {
            selected_tab,
            ..Self::default()
        }
    }

    pub fn reduce(&mut self, message: HostMessage) -> Vec<Effect> {
        match message {
            HostMessage::UpdateBundles { bundles } => {
                self.bundles = bundles;
                Vec::new()
            }
            HostMessage::UpdateDebugRuns { runs } => {
                self.debug_runs = runs;
                Vec::new()
            }
            HostMessage::UpdateVersion { version } => {
                self.version = Some(version);
                Vec::new()
            }
            HostMessage::SecretStatus { key, exists } => {
                let is_pinecone = key == PINECONE_API_KEY;
                self.secrets.insert(key, exists);
                if !is_pinecone {
                    Vec::new()
                } else if exists {
                    vec![Effect::Send(UiMessage::FetchPineconeIndexes)]
                } else {
                    self.replace_indexes(Vec::new());
                    self.index_error = None;
                    Vec::new()
                }
            }
            HostMessage::UpdatePineconeIndexes { indexes, error } => match error {
                Some(error) => {
                    self.replace_indexes(Vec::new());
                    self.index_error = Some(error);
                    Vec::new()
                }
                None => {
                    self.replace_indexes(indexes);
                    self.index_error = None;
                    // The stored selection can only be applied once its name is listed.
                    if self.selected_index.is_none() && !self.pinecone_indexes.is_empty() {
                        vec![Effect::Send(UiMessage::GetPineconeIndex)]
                    } else {
                        Vec::new()
                    }
                }
            },
            HostMessage::UpdateSelectedIndex { index } => {
                // A confirmation that lost a race with a list refresh is dropped.
                if self.pinecone_indexes.iter().any(|known| known.name == index) {
                    self.selected_index = Some(index);
                }
                Vec::new()
            }
            HostMessage::UpdateCopyMode { mode } => {
                self.copy_mode = Some(mode);
                Vec::new()
            }
            HostMessage::ExecutionStateChange { bundle_id, status } => {
                self.execution.insert(bundle_id, status);
                Vec::new()
            }
            HostMessage::UpdateDefaultRun { data } => {
                self.default_run = data;
                Vec::new()
            }
            HostMessage::OutputContent { target, content } => {
                vec![Effect::WriteClipboard { target, content }]
            }
            HostMessage::AgentStateChange { status } => {
                self.agent_status = status;
                Vec::new()
            }
            HostMessage::AgentRunComplete {
                output_path,
                file_count,
                query,
                tokens,
            } => {
                self.agent_status = ExecutionState::Idle;
                self.agent_last_run = AgentLastRun {
                    last_output_path: Some(output_path),
                    last_file_count: Some(file_count),
                    last_query: Some(query),
                    last_tokens: tokens,
                    run_failed: false,
                };
                vec![Effect::PersistAgentRun(self.agent_last_run.clone())]
            }
            HostMessage::AgentRunFailed => {
                self.agent_status = ExecutionState::Idle;
                self.agent_last_run.run_failed = true;
                self.agent_last_run.last_output_path = None;
                self.agent_last_run.last_file_count = Some(0);
                vec![Effect::PersistAgentRun(self.agent_last_run.clone())]
            }
            HostMessage::AgentHistory { history } => {
                self.agent_history = history;
                Vec::new()
            }
            HostMessage::HostError { message, .. } => {
                self.notice = Some(message);
                Vec::new()
            }
        }
    }

    /// Puts back the agent outcome saved before a reload.
    pub fn restore_agent_run(&mut self, run: AgentLastRun) {
        self.agent_last_run = run;
    }

    /// Local start of an agent run: the previous output is no longer offered
    /// and a previous failure is forgotten. Nothing is persisted until the host
    /// reports the outcome.
    pub fn begin_agent_run(&mut self) {
        self.agent_last_run.last_output_path = None;
        self.agent_last_run.run_failed = false;
    }

    /// Local tab change. Returns the write-through persist effect, or nothing
    /// when the tab is already selected.
    pub fn select_tab(&mut self, tab: Tab) -> Vec<Effect> {
        if self.selected_tab == tab {
            return Vec::new();
        }
        self.selected_tab = tab;
        vec![Effect::PersistTab(tab)]
    }

    pub fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
    }

    pub fn dismiss_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    fn replace_indexes(&mut self, indexes: Vec<PineconeIndex>) {
        self.pinecone_indexes = indexes;
        let still_listed = self.selected_index.as_ref().is_some_and(|selected| {
            self.pinecone_indexes
                .iter()
                .any(|index| &index.name == selected)
        });
        if !still_listed {
            self.selected_index = None;
        }
    }

    pub fn selected_tab(&self) -> Tab {
        self.selected_tab
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    pub fn bundle(&self, id: &str) -> Option<&Bundle> {
        self.bundles.iter().find(|bundle| bundle.id == id)
    }

    pub fn execution_state(&self, bundle_id: &str) -> ExecutionState {
        self.execution.get(bundle_id).copied().unwrap_or_default()
    }

    pub fn default_run_state(&self) -> ExecutionState {
        self.execution_state(DEFAULT_BUNDLE_ID)
    }

    pub fn default_run(&self) -> &DefaultRunInfo {
        &self.default_run
    }

    pub fn debug_runs(&self) -> &[DebugRun] {
        &self.debug_runs
    }

    pub fn debug_run(&self, id: crate::DebugRunId) -> Option<&DebugRun> {
        self.debug_runs.iter().find(|run| run.id == id)
    }

    pub fn agent_status(&self) -> ExecutionState {
        self.agent_status
    }

    pub fn agent_last_run(&self) -> &AgentLastRun {
        &self.agent_last_run
    }

    pub fn agent_history(&self) -> &[AgentRunRecord] {
        &self.agent_history
    }

    pub fn secret(&self, key: &str) -> Option<bool> {
        self.secrets.get(key).copied()
    }

    pub fn pinecone_indexes(&self) -> &[PineconeIndex] {
        &self.pinecone_indexes
    }

    pub fn index_error(&self) -> Option<&str> {
        self.index_error.as_deref()
    }

    pub fn selected_index(&self) -> Option<&str> {
        self.selected_index.as_deref()
    }

    pub fn copy_mode(&self) -> Option<CopyMode> {
        self.copy_mode
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }
}

/// The panel state together with the requests still waiting for a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Store {
    state: PanelState,
    requests: Correlator,
}

impl Store {
    pub fn new(selected_tab: Tab) -> Self {
        Self {
            state: PanelState::new(selected_tab),
            requests: Correlator::new(),
        }
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }

    pub fn requests(&self) -> &Correlator {
        &self.requests
    }

    /// Applies one host message. Follow-up requests produced by the reducer
    /// are recorded before they are handed back.
    pub fn apply(&mut self, message: HostMessage) -> Vec<Effect> {
        self.requests.observe(&message);
        let effects = self.state.reduce(message);
        for effect in &effects {
            if let Effect::Send(request) = effect {
                self.requests.track(request);
            }
        }
        effects
    }

    /// Wraps an outbound request, recording it if it expects a reply.
    pub fn request(&mut self, request: UiMessage) -> Effect {
        self.requests.track(&request);
        Effect::Send(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BundleStats, GOOGLE_API_KEY};

    fn bundle(id: &str, output_file_exists: bool) -> Bundle {
        Bundle {
            id: id.to_owned(),
            name: format!("Bundle {id}"),
            description: None,
            files: vec![format!("src/{id}.rs")],
            output_file_exists,
            output_file_path: None,
            stats: BundleStats::default(),
        }
    }

    fn index(name: &str) -> PineconeIndex {
        PineconeIndex {
            name: name.to_owned(),
            host: format!("{name}.svc.pinecone.io"),
            dimension: Some(768),
        }
    }

    fn indexes(names: &[&str]) -> HostMessage {
        HostMessage::UpdatePineconeIndexes {
            indexes: names.iter().map(|name| index(name)).collect(),
            error: None,
        }
    }

    #[test]
    fn bundle_updates_replace_wholesale() {
        let mut state = PanelState::default();
        state.reduce(HostMessage::UpdateBundles {
            bundles: vec![bundle("a", true), bundle("b", false)],
        });
        state.reduce(HostMessage::UpdateBundles {
            bundles: vec![bundle("c", false)],
        });
        assert_eq!(state.bundles(), &[bundle("c", false)]);

        state.reduce(HostMessage::UpdateBundles {
            bundles: Vec::new(),
        });
        assert!(state.bundles().is_empty());
    }

    #[test]
    fn selected_index_requires_listed_name() {
        let mut state = PanelState::default();
        state.reduce(indexes(&["alpha", "beta"]));

        state.reduce(HostMessage::UpdateSelectedIndex {
            index: "x".to_owned(),
        });
        assert_eq!(state.selected_index(), None);

        state.reduce(HostMessage::UpdateSelectedIndex {
            index: "beta".to_owned(),
        });
        assert_eq!(state.selected_index(), Some("beta"));

        let before = state.clone();
        state.reduce(HostMessage::UpdateSelectedIndex {
            index: "x".to_owned(),
        });
        assert_eq!(state, before);
    }

    #[test]
    fn refreshed_list_without_selection_clears_it() {
        let mut state = PanelState::default();
        state.reduce(indexes(&["alpha", "beta"]));
        state.reduce(HostMessage::UpdateSelectedIndex {
            index: "alpha".to_owned(),
        });

        state.reduce(indexes(&["alpha", "gamma"]));
        assert_eq!(state.selected_index(), Some("alpha"));

        state.reduce(indexes(&["gamma"]));
        assert_eq!(state.selected_index(), None);
    }

    #[test]
    fn index_error_empties_the_list() {
        let mut state = PanelState::default();
        state.reduce(indexes(&["alpha"]));
        state.reduce(HostMessage::UpdatePineconeIndexes {
            indexes: vec![index("ignored")],
            error: Some("invalid api key".to_owned()),
        });
        assert!(state.pinecone_indexes().is_empty());
        assert_eq!(state.index_error(), Some("invalid api key"));

        state.reduce(indexes(&["alpha"]));
        assert_eq!(state.index_error(), None);
    }

    #[test]
    fn listed_indexes_without_selection_ask_for_stored_one() {
        let mut state = PanelState::default();
        assert_eq!(
            state.reduce(indexes(&["alpha"])),
            vec![Effect::Send(UiMessage::GetPineconeIndex)]
        );
        state.reduce(HostMessage::UpdateSelectedIndex {
            index: "alpha".to_owned(),
        });
        assert!(state.reduce(indexes(&["alpha", "beta"])).is_empty());
        assert!(state.reduce(indexes(&[])).is_empty());
    }

    #[test]
    fn pinecone_secret_drives_index_fetch() {
        let mut store = Store::default();
        let effects = store.apply(HostMessage::SecretStatus {
            key: PINECONE_API_KEY.to_owned(),
            exists: true,
        });
        assert_eq!(effects, vec![Effect::Send(UiMessage::FetchPineconeIndexes)]);
        assert!(store.requests().is_fetching_indexes());

        store.apply(indexes(&["alpha"]));
        store.apply(HostMessage::UpdateSelectedIndex {
            index: "alpha".to_owned(),
        });
        let effects = store.apply(HostMessage::SecretStatus {
            key: PINECONE_API_KEY.to_owned(),
            exists: false,
        });
        assert!(effects.is_empty());
        assert!(store.state().pinecone_indexes().is_empty());
        assert_eq!(store.state().selected_index(), None);
    }

    #[test]
    fn secret_replies_commute() {
        let google = HostMessage::SecretStatus {
            key: GOOGLE_API_KEY.to_owned(),
            exists: true,
        };
        let other = HostMessage::SecretStatus {
            key: "openAiKey".to_owned(),
            exists: false,
        };

        let mut first = PanelState::default();
        first.reduce(google.clone());
        first.reduce(other.clone());

        let mut second = PanelState::default();
        second.reduce(other);
        second.reduce(google);

        assert_eq!(first, second);
        assert_eq!(first.secret(GOOGLE_API_KEY), Some(true));
        assert_eq!(first.secret("openAiKey"), Some(false));
        assert_eq!(first.secret(PINECONE_API_KEY), None);
    }

    #[test]
    fn version_update_is_idempotent() {
        let mut state = PanelState::default();
        let message = HostMessage::UpdateVersion {
            version: "0.9.1".to_owned(),
        };
        state.reduce(message.clone());
        let once = state.clone();
        state.reduce(message);
        assert_eq!(state, once);
        assert_eq!(state.version(), Some("0.9.1"));
    }

    #[test]
    fn output_content_becomes_clipboard_effect() {
        let mut state = PanelState::default();
        let content = "line one\r\nline two\u{2014}ünïcode\n".to_owned();
        let effects = state.reduce(HostMessage::OutputContent {
            target: CopyTarget::Bundle("a".to_owned()),
            content: content.clone(),
        });
        assert_eq!(
            effects,
            vec![Effect::WriteClipboard {
                target: CopyTarget::Bundle("a".to_owned()),
                content,
            }]
        );
    }

    #[test]
    fn execution_state_defaults_to_idle() {
        let mut state = PanelState::default();
        assert_eq!(state.execution_state("a"), ExecutionState::Idle);
        state.reduce(HostMessage::ExecutionStateChange {
            bundle_id: DEFAULT_BUNDLE_ID.to_owned(),
            status: ExecutionState::Running,
        });
        assert_eq!(state.default_run_state(), ExecutionState::Running);
        assert_eq!(state.execution_state("a"), ExecutionState::Idle);
    }

    #[test]
    fn tab_change_persists_only_on_change() {
        let mut state = PanelState::new(Tab::Bundles);
        assert!(state.select_tab(Tab::Bundles).is_empty());
        assert_eq!(state.select_tab(Tab::Debug), vec![Effect::PersistTab(Tab::Debug)]);
        assert_eq!(state.selected_tab(), Tab::Debug);
    }

    #[test]
    fn host_error_is_dismissible() {
        let mut state = PanelState::default();
        state.reduce(HostMessage::error("bundle output missing"));
        assert_eq!(state.notice(), Some("bundle output missing"));
        assert_eq!(state.dismiss_notice().as_deref(), Some("bundle output missing"));
        assert_eq!(state.notice(), None);
    }

    #[test]
    fn agent_completion_replaces_last_run_and_persists_it() {
        let mut state = PanelState::default();
        state.reduce(HostMessage::AgentStateChange {
            status: ExecutionState::Running,
        });
        assert_eq!(state.agent_status(), ExecutionState::Running);

        let effects = state.reduce(HostMessage::AgentRunComplete {
            output_path: "out/agent.xml".to_owned(),
            file_count: 7,
            query: "session handling".to_owned(),
            tokens: Some(5400),
        });
        let expected = AgentLastRun {
            last_output_path: Some("out/agent.xml".to_owned()),
            last_file_count: Some(7),
            last_query: Some("session handling".to_owned()),
            last_tokens: Some(5400),
            run_failed: false,
        };
        assert_eq!(effects, vec![Effect::PersistAgentRun(expected.clone())]);
        assert_eq!(state.agent_last_run(), &expected);
        assert_eq!(state.agent_status(), ExecutionState::Idle);
    }

    #[test]
    fn agent_failure_keeps_query_and_drops_output() {
        let mut state = PanelState::default();
        state.restore_agent_run(AgentLastRun {
            last_output_path: Some("out/old.xml".to_owned()),
            last_file_count: Some(2),
            last_query: Some("old query".to_owned()),
            last_tokens: Some(10),
            run_failed: false,
        });
        let effects = state.reduce(HostMessage::AgentRunFailed);

        let last = state.agent_last_run();
        assert!(last.run_failed);
        assert_eq!(last.last_output_path, None);
        assert_eq!(last.last_file_count, Some(0));
        assert_eq!(last.last_query.as_deref(), Some("old query"));
        assert_eq!(effects, vec![Effect::PersistAgentRun(last.clone())]);
    }

    #[test]
    fn agent_history_and_default_run_replace_wholesale() {
        let mut state = PanelState::default();
        let record = |id: &str| AgentRunRecord {
            id: id.to_owned(),
            timestamp: 1,
            query: "q".to_owned(),
            file_count: 0,
            files: Vec::new(),
            success: true,
            error: None,
            duration: None,
            output_path: None,
        };
        state.reduce(HostMessage::AgentHistory {
            history: vec![record("a"), record("b")],
        });
        state.reduce(HostMessage::AgentHistory {
            history: vec![record("c")],
        });
        assert_eq!(state.agent_history(), &[record("c")]);

        state.reduce(HostMessage::UpdateDefaultRun {
            data: DefaultRunInfo {
                output_file_exists: true,
                output_file_path: "repomix-output.xml".to_owned(),
            },
        });
        assert!(state.default_run().output_file_exists);
    }
}
