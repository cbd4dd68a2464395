use std::collections::BTreeSet;

use crate::{CopyMode, CopyTarget, HostMessage, UiMessage};

/// Bookkeeping for requests that expect a reply.
///
/// Nothing here holds a continuation: a request is recorded when issued and
/// crossed off when a reply with the same command (and `key`, `index`, `mode`
/// or `target`) is observed. A `hostError` naming a `target` or `index` crosses
/// off the request it refuses. Replies are applied by the reducer whether or
/// not they match anything recorded here. There is no timeout; an unanswered
/// request stays pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlator {
    pending_secrets: BTreeSet<String>,
    index_fetches: usize,
    pending_index: Option<String>,
    pending_copy_mode: Option<CopyMode>,
    pending_outputs: BTreeSet<CopyTarget>,
    agent_history_fetches: usize,
    agent_run: bool,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `request` if it is one that expects a reply. Fire-and-forget
    /// commands are ignored.
    pub fn track(&mut self, request: &UiMessage) {
        match request {
            UiMessage::CheckSecret { key } | UiMessage::SaveSecret { key, .. } => {
                self.pending_secrets.insert(key.clone());
            }
            UiMessage::FetchPineconeIndexes => self.index_fetches += 1,
            UiMessage::SavePineconeIndex { index } => self.pending_index = Some(index.clone()),
            UiMessage::SetCopyMode { mode } => self.pending_copy_mode = Some(*mode),
            UiMessage::CopyBundleOutput { bundle_id } => {
                self.pending_outputs
                    .insert(CopyTarget::Bundle(bundle_id.clone()));
            }
            UiMessage::CopyDebugOutput { run_id } => {
                self.pending_outputs.insert(CopyTarget::DebugRun(*run_id));
            }
            UiMessage::CopyDefaultOutput => {
                self.pending_outputs.insert(CopyTarget::DefaultRun);
            }
            UiMessage::CopyLastAgentOutput { output_path } => {
                self.pending_outputs
                    .insert(CopyTarget::AgentOutput(output_path.clone()));
            }
            UiMessage::GetAgentHistory => self.agent_history_fetches += 1,
            UiMessage::RunSmartAgent { .. } => self.agent_run = true,
            UiMessage::WebviewLoaded
            | UiMessage::GetPineconeIndex
            | UiMessage::GetDebugRuns
            | UiMessage::DeleteDebugRun { .. }
            | UiMessage::ReRunDebug { .. }
            | UiMessage::RunBundle { .. }
            | UiMessage::CancelBundle { .. } => {}
        }
    }

    pub fn check_secret(&mut self, key: &str) -> UiMessage {
        self.issue(UiMessage::CheckSecret {
            key: key.to_owned(),
        })
    }

    /// Saving a secret is answered with the same `secretStatus` reply as a check.
    pub fn save_secret(&mut self, key: &str, value: &str) -> UiMessage {
        self.issue(UiMessage::SaveSecret {
            key: key.to_owned(),
            value: value.to_owned(),
        })
    }

    pub fn fetch_indexes(&mut self) -> UiMessage {
        self.issue(UiMessage::FetchPineconeIndexes)
    }

    pub fn save_index(&mut self, name: &str) -> UiMessage {
        self.issue(UiMessage::SavePineconeIndex {
            index: name.to_owned(),
        })
    }

    pub fn set_copy_mode(&mut self, mode: CopyMode) -> UiMessage {
        self.issue(UiMessage::SetCopyMode { mode })
    }

    pub fn request_output(&mut self, target: CopyTarget) -> UiMessage {
        self.issue(target.request())
    }

    fn issue(&mut self, request: UiMessage) -> UiMessage {
        self.track(&request);
        request
    }

    /// Crosses off whatever outstanding request `message` answers. Returns
    /// whether anything matched.
    pub fn observe(&mut self, message: &HostMessage) -> bool {
        match message {
            HostMessage::SecretStatus { key, .. } => self.pending_secrets.remove(key),
            HostMessage::UpdatePineconeIndexes { .. } => {
                let matched = self.index_fetches > 0;
                self.index_fetches = self.index_fetches.saturating_sub(1);
                matched
            }
            HostMessage::UpdateSelectedIndex { index } => {
                if self.pending_index.as_deref() == Some(index.as_str()) {
                    self.pending_index = None;
                    true
                } else {
                    false
                }
            }
            HostMessage::UpdateCopyMode { mode } => {
                if self.pending_copy_mode == Some(*mode) {
                    self.pending_copy_mode = None;
                    true
                } else {
                    false
                }
            }
            HostMessage::OutputContent { target, .. } => self.pending_outputs.remove(target),
            HostMessage::AgentHistory { .. } => {
                let matched = self.agent_history_fetches > 0;
                self.agent_history_fetches = self.agent_history_fetches.saturating_sub(1);
                matched
            }
            HostMessage::AgentRunComplete { .. } | HostMessage::AgentRunFailed => {
                std::mem::take(&mut self.agent_run)
            }
            HostMessage::HostError { target, index, .. } => {
                let output = target
                    .as_ref()
                    .is_some_and(|target| self.pending_outputs.remove(target));
                let selection = index.is_some() && self.pending_index == *index;
                if selection {
                    self.pending_index = None;
                }
                output || selection
            }
            HostMessage::UpdateBundles { .. }
            | HostMessage::UpdateDebugRuns { .. }
            | HostMessage::UpdateVersion { .. }
            | HostMessage::ExecutionStateChange { .. }
            | HostMessage::UpdateDefaultRun { .. }
            | HostMessage::AgentStateChange { .. } => false,
        }
    }

    pub fn is_secret_pending(&self, key: &str) -> bool {
        self.pending_secrets.contains(key)
    }

    pub fn is_fetching_indexes(&self) -> bool {
        self.index_fetches > 0
    }

    pub fn pending_index(&self) -> Option<&str> {
        self.pending_index.as_deref()
    }

    pub fn pending_copy_mode(&self) -> Option<CopyMode> {
        self.pending_copy_mode
    }

    pub fn is_output_pending(&self, target: &CopyTarget) -> bool {
        self.pending_outputs.contains(target)
    }

    pub fn is_fetching_agent_history(&self) -> bool {
        self.agent_history_fetches > 0
    }

    pub fn is_agent_run_pending(&self) -> bool {
        self.agent_run
    }

    pub fn outstanding(&self) -> usize {
        self.pending_secrets.len()
            + self.index_fetches
            + usize::from(self.pending_index.is_some())
            + usize::from(self.pending_copy_mode.is_some())
            + self.pending_outputs.len()
            + self.agent_history_fetches
            + usize::from(self.agent_run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GOOGLE_API_KEY, PINECONE_API_KEY};

    fn secret_status(key: &str, exists: bool) -> HostMessage {
        HostMessage::SecretStatus {
            key: key.to_owned(),
            exists,
        }
    }

    #[test]
    fn secret_replies_resolve_by_key_in_any_order() {
        let mut requests = Correlator::new();
        requests.check_secret(GOOGLE_API_KEY);
        requests.check_secret(PINECONE_API_KEY);
        assert_eq!(requests.outstanding(), 2);

        assert!(requests.observe(&secret_status(PINECONE_API_KEY, true)));
        assert!(requests.is_secret_pending(GOOGLE_API_KEY));
        assert!(!requests.is_secret_pending(PINECONE_API_KEY));

        assert!(requests.observe(&secret_status(GOOGLE_API_KEY, false)));
        assert_eq!(requests.outstanding(), 0);
    }

    #[test]
    fn unrelated_replies_do_not_resolve_requests() {
        let mut requests = Correlator::new();
        requests.check_secret(GOOGLE_API_KEY);
        requests.save_index("repo-main");

        assert!(!requests.observe(&HostMessage::UpdateBundles {
            bundles: Vec::new()
        }));
        assert!(!requests.observe(&HostMessage::UpdateSelectedIndex {
            index: "other".to_owned()
        }));
        assert_eq!(requests.pending_index(), Some("repo-main"));
        assert!(requests.is_secret_pending(GOOGLE_API_KEY));
    }

    #[test]
    fn unsolicited_reply_matches_nothing() {
        let mut requests = Correlator::new();
        assert!(!requests.observe(&secret_status(GOOGLE_API_KEY, true)));
        assert!(!requests.observe(&HostMessage::UpdatePineconeIndexes {
            indexes: Vec::new(),
            error: None,
        }));
        assert_eq!(requests.outstanding(), 0);
    }

    #[test]
    fn repeated_fetches_each_need_a_reply() {
        let mut requests = Correlator::new();
        requests.fetch_indexes();
        requests.fetch_indexes();
        let reply = HostMessage::UpdatePineconeIndexes {
            indexes: Vec::new(),
            error: None,
        };
        requests.observe(&reply);
        assert!(requests.is_fetching_indexes());
        requests.observe(&reply);
        assert!(!requests.is_fetching_indexes());
    }

    #[test]
    fn copy_mode_waits_for_matching_echo() {
        let mut requests = Correlator::new();
        let request = requests.set_copy_mode(CopyMode::Content);
        assert_eq!(
            request,
            UiMessage::SetCopyMode {
                mode: CopyMode::Content
            }
        );
        assert!(!requests.observe(&HostMessage::UpdateCopyMode {
            mode: CopyMode::File
        }));
        assert_eq!(requests.pending_copy_mode(), Some(CopyMode::Content));
        assert!(requests.observe(&HostMessage::UpdateCopyMode {
            mode: CopyMode::Content
        }));
        assert_eq!(requests.pending_copy_mode(), None);
    }

    #[test]
    fn output_requests_resolve_by_target() {
        let mut requests = Correlator::new();
        let bundle = CopyTarget::Bundle("b1".to_owned());
        let run = CopyTarget::DebugRun(4);
        assert_eq!(
            requests.request_output(bundle.clone()),
            UiMessage::CopyBundleOutput {
                bundle_id: "b1".to_owned()
            }
        );
        requests.request_output(run.clone());

        requests.observe(&HostMessage::OutputContent {
            target: run.clone(),
            content: "x".to_owned(),
        });
        assert!(requests.is_output_pending(&bundle));
        assert!(!requests.is_output_pending(&run));
    }

    #[test]
    fn refusal_clears_the_request_it_names() {
        let mut requests = Correlator::new();
        let docs = CopyTarget::Bundle("docs".to_owned());
        requests.request_output(docs.clone());
        requests.request_output(CopyTarget::DefaultRun);
        requests.save_index("ghost");

        assert!(!requests.observe(&HostMessage::error("unrelated")));
        assert_eq!(requests.outstanding(), 3);

        assert!(requests.observe(&HostMessage::HostError {
            message: "Bundle Documentation has no output file".to_owned(),
            target: Some(docs.clone()),
            index: None,
        }));
        assert!(!requests.is_output_pending(&docs));
        assert!(requests.is_output_pending(&CopyTarget::DefaultRun));

        assert!(!requests.observe(&HostMessage::HostError {
            message: "Unknown Pinecone index: other".to_owned(),
            target: None,
            index: Some("other".to_owned()),
        }));
        assert_eq!(requests.pending_index(), Some("ghost"));
        assert!(requests.observe(&HostMessage::HostError {
            message: "Unknown Pinecone index: ghost".to_owned(),
            target: None,
            index: Some("ghost".to_owned()),
        }));
        assert_eq!(requests.pending_index(), None);
    }

    #[test]
    fn agent_run_resolves_on_completion_or_failure() {
        let mut requests = Correlator::new();
        requests.track(&UiMessage::RunSmartAgent {
            query: "auth".to_owned(),
        });
        requests.track(&UiMessage::GetAgentHistory);
        assert!(requests.is_agent_run_pending());
        assert!(requests.is_fetching_agent_history());

        assert!(!requests.observe(&HostMessage::AgentStateChange {
            status: crate::ExecutionState::Running
        }));
        assert!(requests.is_agent_run_pending());
        assert!(requests.observe(&HostMessage::AgentRunFailed));
        assert!(!requests.is_agent_run_pending());
        assert!(!requests.observe(&HostMessage::AgentRunFailed));

        requests.observe(&HostMessage::AgentHistory {
            history: Vec::new(),
        });
        assert_eq!(requests.outstanding(), 0);
    }
}
