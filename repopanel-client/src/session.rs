use repopanel_core::{
    CopyMode, CopyTarget, DebugRunId, Dispatch, Effect, Message, Panel, PanelView, Protocol, Tab,
};
use tracing::{debug, info, warn};

use crate::{
    clipboard::Clipboard,
    command::Command,
    transport::Transport,
};

/// What the caller should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Help,
    Quit,
}

/// Owns the panel and performs the effects it asks for.
#[derive(Debug)]
pub struct Session {
    transport: Transport,
    panel: Panel,
    clipboard: Clipboard,
    dirty: bool,
}

impl Session {
    pub fn new(transport: Transport, clipboard: Clipboard, search_enabled: bool) -> Self {
        let restored = transport.restored_state().clone();
        let mut panel = Panel::new(restored.tab(), search_enabled);
        if let Some(run) = restored.agent_last_run {
            panel.restore_agent_run(run);
        }
        let mut session = Self {
            transport,
            panel,
            clipboard,
            dirty: true,
        };
        let tab = session.panel.state().selected_tab();
        let effects = session.open_tab(tab);
        session.execute(effects);
        session
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn view(&self) -> PanelView {
        self.panel.view()
    }

    /// Returns whether anything changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn handle_inbound(&mut self, message: &Message) {
        match self.panel.receive(message) {
            Dispatch::Applied(effects) => {
                debug!(command = message.command(), "applied");
                self.dirty = true;
                self.execute(effects);
            }
            Dispatch::Ignored => debug!(command = message.command(), "ignored unknown command"),
            Dispatch::Rejected(err) => warn!(command = message.command(), "dropped message: {err}"),
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Tab(tab) => self.select_tab(tab),
            Command::CheckSecret(key) => self.check_secret(key),
            Command::SaveSecret { key, value } => self.save_secret(key, &value),
            Command::FetchIndexes => self.fetch_indexes(),
            Command::SaveIndex(name) => self.save_index(&name),
            Command::CopyMode(Some(mode)) => self.set_copy_mode(mode),
            Command::CopyMode(None) => {
                let effects = self.panel.toggle_copy_mode();
                self.run(effects);
            }
            Command::CopyBundle(id) => self.copy_bundle_output(&id),
            Command::CopyDefault => self.copy_default_output(),
            Command::CopyRun(id) => self.copy_debug_output(id),
            Command::CopyAgent => self.copy_agent_output(),
            Command::RunAgent(query) => self.run_agent(&query),
            Command::AgentHistory => self.refresh_agent_history(),
            Command::RefreshRuns => self.refresh_debug_runs(),
            Command::ReRun(id) => self.rerun_debug(id),
            Command::DeleteRun(id) => self.delete_debug_run(id),
            Command::Run {
                bundle_id,
                compress,
            } => self.run_bundle(&bundle_id, compress),
            Command::Cancel(bundle_id) => self.cancel_bundle(&bundle_id),
            Command::Dismiss => self.dismiss_notice(),
            Command::Help => return Flow::Help,
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    pub fn select_tab(&mut self, tab: Tab) {
        let effects = self.panel.select_tab(tab);
        let changed = !effects.is_empty();
        self.run(effects);
        if changed {
            let effects = self.open_tab(tab);
            self.run(effects);
        }
    }

    /// Requests a tab needs each time it is shown.
    fn open_tab(&mut self, tab: Tab) -> Vec<Effect> {
        match tab {
            Tab::Settings => self.panel.load_settings(),
            Tab::SmartAgent => self.panel.load_agent(),
            Tab::Bundles | Tab::Debug | Tab::Search => Vec::new(),
        }
    }

    pub fn check_secret(&mut self, key: &str) {
        let effects = self.panel.check_secret(key);
        self.run(effects);
    }

    pub fn save_secret(&mut self, key: &str, value: &str) {
        let effects = self.panel.save_secret(key, value);
        self.run(effects);
    }

    pub fn fetch_indexes(&mut self) {
        let effects = self.panel.fetch_indexes();
        if effects.is_empty() {
            info!("no Pinecone key stored; index list not requested");
        }
        self.run(effects);
    }

    pub fn save_index(&mut self, name: &str) {
        let effects = self.panel.save_index(name);
        if effects.is_empty() {
            info!(index = name, "index not in the current list");
        }
        self.run(effects);
    }

    pub fn set_copy_mode(&mut self, mode: CopyMode) {
        let effects = self.panel.set_copy_mode(mode);
        self.run(effects);
    }

    pub fn copy_bundle_output(&mut self, bundle_id: &str) {
        let effects = self
            .panel
            .copy_output(CopyTarget::Bundle(bundle_id.to_owned()));
        if effects.is_empty() {
            info!(bundle_id, "bundle has no output to copy");
        }
        self.run(effects);
    }

    pub fn copy_default_output(&mut self) {
        let effects = self.panel.copy_output(CopyTarget::DefaultRun);
        if effects.is_empty() {
            info!("whole-repository run has no output to copy");
        }
        self.run(effects);
    }

    pub fn copy_agent_output(&mut self) {
        let last = self.panel.state().agent_last_run().last_output_path.clone();
        let effects = match last {
            Some(path) => self.panel.copy_output(CopyTarget::AgentOutput(path)),
            None => Vec::new(),
        };
        if effects.is_empty() {
            info!("no Smart Agent output to copy");
        }
        self.run(effects);
    }

    pub fn run_agent(&mut self, query: &str) {
        let effects = self.panel.run_agent(query);
        if effects.is_empty() {
            info!("Smart Agent run not started");
        }
        self.run(effects);
    }

    pub fn refresh_agent_history(&mut self) {
        let effects = self.panel.refresh_agent_history();
        self.run(effects);
    }

    pub fn rerun_debug(&mut self, id: DebugRunId) {
        let effects = self.panel.rerun_debug(id);
        if effects.is_empty() {
            info!(run_id = id, "unknown debug run");
        }
        self.run(effects);
    }

    pub fn copy_debug_output(&mut self, run_id: DebugRunId) {
        let effects = self.panel.copy_output(CopyTarget::DebugRun(run_id));
        if effects.is_empty() {
            info!(run_id, "only the newest debug run can be copied");
        }
        self.run(effects);
    }

    pub fn refresh_debug_runs(&mut self) {
        let effects = self.panel.refresh_debug_runs();
        self.run(effects);
    }

    pub fn delete_debug_run(&mut self, id: DebugRunId) {
        let effects = self.panel.delete_debug_run(id);
        self.run(effects);
    }

    pub fn run_bundle(&mut self, bundle_id: &str, compress: bool) {
        let effects = self.panel.run_bundle(bundle_id, compress);
        self.run(effects);
    }

    pub fn cancel_bundle(&mut self, bundle_id: &str) {
        let effects = self.panel.cancel_bundle(bundle_id);
        self.run(effects);
    }

    pub fn dismiss_notice(&mut self) {
        self.panel.dismiss_notice();
        self.dirty = true;
    }

    fn run(&mut self, effects: Vec<Effect>) {
        self.dirty = true;
        self.execute(effects);
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(request) => {
                    debug!(request = ?request, "queueing request");
                    if let Err(err) = self.transport.send_ui(&request) {
                        warn!(command = request.command(), "send failed: {err}");
                    }
                }
                Effect::WriteClipboard { target, content } => {
                    match self.clipboard.copy_with_fallback(&content) {
                        Ok(outcome) => {
                            info!(
                                copy_target = %target,
                                tier = outcome.tier,
                                bytes = outcome.bytes,
                                sha256 = %outcome.sha256,
                                "copied output"
                            );
                        }
                        Err(err) => {
                            warn!(copy_target = %target, "clipboard write failed: {err}");
                            self.panel.clipboard_failed(&err.to_string());
                        }
                    }
                    self.dirty = true;
                }
                Effect::PersistTab(tab) => {
                    if let Err(err) = self.transport.persist_state(tab) {
                        warn!(tab = tab.wire_name(), "failed to persist panel state: {err}");
                    }
                }
                Effect::PersistAgentRun(run) => {
                    if let Err(err) = self.transport.persist_agent_run(run) {
                        warn!("failed to persist agent run: {err}");
                    }
                }
            }
        }
    }
}
