use crate::{
    AgentLastRun, CopyMode, CopyTarget, DebugRunId, Dispatch, Dispatcher, Effect, ExecutionState,
    GOOGLE_API_KEY, KNOWN_SECRETS, Message, PINECONE_API_KEY, PanelState, PanelView, Store, Tab,
    UiMessage,
};

/// The panel side of the protocol: store, outstanding requests and the
/// dispatcher that feeds host messages into them.
///
/// Host messages arrive through [`Panel::receive`]; user actions go through the
/// other methods. Both return effects for the caller to perform.
#[derive(Debug)]
pub struct Panel {
    store: Store,
    dispatcher: Dispatcher<Store>,
    search_enabled: bool,
}

impl Panel {
    pub fn new(restored_tab: Tab, search_enabled: bool) -> Self {
        Self {
            store: Store::new(restored_tab.available(search_enabled)),
            dispatcher: Dispatcher::for_panel(),
            search_enabled,
        }
    }

    pub fn restore_agent_run(&mut self, run: AgentLastRun) {
        self.store.state_mut().restore_agent_run(run);
    }

    pub fn receive(&mut self, message: &Message) -> Dispatch {
        self.dispatcher.dispatch(&mut self.store, message)
    }

    pub fn view(&self) -> PanelView {
        PanelView::from_store(&self.store, self.search_enabled)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn state(&self) -> &PanelState {
        self.store.state()
    }

    pub fn search_enabled(&self) -> bool {
        self.search_enabled
    }

    pub fn select_tab(&mut self, tab: Tab) -> Vec<Effect> {
        if tab.available(self.search_enabled) != tab {
            return Vec::new();
        }
        self.store.state_mut().select_tab(tab)
    }

    pub fn check_secret(&mut self, key: &str) -> Vec<Effect> {
        vec![self.store.request(UiMessage::CheckSecret {
            key: key.to_owned(),
        })]
    }

    /// What the settings tab asks for when it opens. The stored index
    /// selection is requested once an index list has arrived.
    pub fn load_settings(&mut self) -> Vec<Effect> {
        KNOWN_SECRETS
            .iter()
            .map(|(key, _)| {
                self.store.request(UiMessage::CheckSecret {
                    key: (*key).to_owned(),
                })
            })
            .collect()
    }

    /// What the Smart Agent tab asks for when it opens.
    pub fn load_agent(&mut self) -> Vec<Effect> {
        vec![
            self.store.request(UiMessage::CheckSecret {
                key: GOOGLE_API_KEY.to_owned(),
            }),
            self.store.request(UiMessage::GetAgentHistory),
        ]
    }

    pub fn refresh_agent_history(&mut self) -> Vec<Effect> {
        vec![self.store.request(UiMessage::GetAgentHistory)]
    }

    /// Starts an agent run for `query`. Blank queries and a run already in
    /// flight send nothing.
    pub fn run_agent(&mut self, query: &str) -> Vec<Effect> {
        let query = query.trim();
        let busy = self.state().agent_status() == ExecutionState::Running
            || self.store.requests().is_agent_run_pending();
        if query.is_empty() || busy {
            return Vec::new();
        }
        self.store.state_mut().begin_agent_run();
        vec![self.store.request(UiMessage::RunSmartAgent {
            query: query.to_owned(),
        })]
    }

    pub fn save_secret(&mut self, key: &str, value: &str) -> Vec<Effect> {
        let value = value.trim();
        if value.is_empty() {
            return Vec::new();
        }
        vec![self.store.request(UiMessage::SaveSecret {
            key: key.to_owned(),
            value: value.to_owned(),
        })]
    }

    /// Index listing needs a stored Pinecone key; without one nothing is sent.
    pub fn fetch_indexes(&mut self) -> Vec<Effect> {
        if self.state().secret(PINECONE_API_KEY) != Some(true) {
            return Vec::new();
        }
        vec![self.store.request(UiMessage::FetchPineconeIndexes)]
    }

    /// Asks the host to persist `name` as the selected index. The selection
    /// itself changes only when the host confirms.
    pub fn save_index(&mut self, name: &str) -> Vec<Effect> {
        let listed = self
            .state()
            .pinecone_indexes()
            .iter()
            .any(|index| index.name == name);
        if !listed {
            return Vec::new();
        }
        vec![self.store.request(UiMessage::SavePineconeIndex {
            index: name.to_owned(),
        })]
    }

    pub fn set_copy_mode(&mut self, mode: CopyMode) -> Vec<Effect> {
        vec![self.store.request(UiMessage::SetCopyMode { mode })]
    }

    /// Requests the opposite of the last confirmed mode. The shown mode stays
    /// put until the host echoes it back.
    pub fn toggle_copy_mode(&mut self) -> Vec<Effect> {
        let current = self.state().copy_mode().unwrap_or(CopyMode::File);
        self.set_copy_mode(current.toggled())
    }

    /// Requests output content for `target` if its copy action is offered.
    pub fn copy_output(&mut self, target: CopyTarget) -> Vec<Effect> {
        let offered = match &target {
            CopyTarget::Bundle(id) => self
                .state()
                .bundle(id)
                .is_some_and(|bundle| bundle.output_file_exists),
            CopyTarget::DebugRun(id) => self
                .state()
                .debug_runs()
                .first()
                .is_some_and(|run| run.id == *id),
            CopyTarget::DefaultRun => self.state().default_run().output_file_exists,
            CopyTarget::AgentOutput(path) => {
                self.state().agent_status() != ExecutionState::Running
                    && self.state().agent_last_run().last_output_path.as_ref() == Some(path)
            }
        };
        if !offered {
            return Vec::new();
        }
        vec![self.store.request(target.request())]
    }

    pub fn refresh_debug_runs(&mut self) -> Vec<Effect> {
        vec![self.store.request(UiMessage::GetDebugRuns)]
    }

    /// Runs the whole-repository pass over the files of run `id`. Unknown runs
    /// send nothing.
    pub fn rerun_debug(&mut self, id: DebugRunId) -> Vec<Effect> {
        let Some(run) = self.state().debug_run(id) else {
            return Vec::new();
        };
        let files = run.files.clone();
        vec![self.store.request(UiMessage::ReRunDebug { files })]
    }

    pub fn delete_debug_run(&mut self, id: DebugRunId) -> Vec<Effect> {
        vec![self.store.request(UiMessage::DeleteDebugRun { id })]
    }

    pub fn run_bundle(&mut self, bundle_id: &str, compress: bool) -> Vec<Effect> {
        vec![self.store.request(UiMessage::RunBundle {
            bundle_id: bundle_id.to_owned(),
            compress,
        })]
    }

    pub fn cancel_bundle(&mut self, bundle_id: &str) -> Vec<Effect> {
        vec![self.store.request(UiMessage::CancelBundle {
            bundle_id: bundle_id.to_owned(),
        })]
    }

    pub fn clipboard_failed(&mut self, reason: &str) {
        self.store
            .state_mut()
            .set_notice(format!("Copy failed: {reason}"));
    }

    pub fn dismiss_notice(&mut self) {
        self.store.state_mut().dismiss_notice();
    }
}
