use serde::{Deserialize, Serialize};

pub type DebugRunId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BundleStats {
    pub files: u64,
    pub folders: u64,
    pub total_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub output_file_exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_path: Option<String>,
    #[serde(default)]
    pub stats: BundleStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebugRun {
    pub id: DebugRunId,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Output file of the whole-repository run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DefaultRunInfo {
    #[serde(default)]
    pub output_file_exists: bool,
    #[serde(default)]
    pub output_file_path: String,
}

/// One Smart Agent run as the host recorded it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunRecord {
    pub id: String,
    pub timestamp: u64,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

/// Outcome of the latest agent run. Kept in the saved panel state so it
/// survives a reload.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentLastRun {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_file_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tokens: Option<u64>,
    #[serde(default)]
    pub run_failed: bool,
}

/// Descriptor of an external vector index the host can search against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PineconeIndex {
    pub name: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    /// Copy the output file itself (file object on the clipboard).
    File,
    /// Copy the text content of the output file.
    Content,
}

impl CopyMode {
    pub fn toggled(self) -> Self {
        match self {
            CopyMode::File => CopyMode::Content,
            CopyMode::Content => CopyMode::File,
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            CopyMode::File => "file",
            CopyMode::Content => "content",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "file" => Some(CopyMode::File),
            "content" => Some(CopyMode::Content),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CopyMode::File => "Copy file to clipboard (File Object)",
            CopyMode::Content => "Copy content to clipboard (Text)",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    #[default]
    Idle,
    Queued,
    Running,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
pub enum Tab {
    #[default]
    #[serde(rename = "bundles")]
    Bundles,
    #[serde(rename = "agent")]
    SmartAgent,
    #[serde(rename = "settings")]
    Settings,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "search")]
    Search,
}

impl Tab {
    const DISPLAY_ORDER: [Tab; 5] = [
        Tab::Bundles,
        Tab::SmartAgent,
        Tab::Settings,
        Tab::Debug,
        Tab::Search,
    ];

    /// Tabs in display order. The order never depends on the selection.
    pub fn ordered(search_enabled: bool) -> Vec<Tab> {
        Self::DISPLAY_ORDER
            .into_iter()
            .filter(|tab| search_enabled || *tab != Tab::Search)
            .collect()
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Tab::Bundles => "bundles",
            Tab::SmartAgent => "agent",
            Tab::Settings => "settings",
            Tab::Debug => "debug",
            Tab::Search => "search",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::DISPLAY_ORDER
            .into_iter()
            .find(|tab| tab.wire_name() == name)
    }

    pub fn label(self) -> &'static str {
        match self {
            Tab::Bundles => "Bundles",
            Tab::SmartAgent => "Smart Agent",
            Tab::Settings => "Settings",
            Tab::Debug => "Debug",
            Tab::Search => "Search",
        }
    }

    /// Maps a restored selection onto the tabs that are actually shown.
    pub fn available(self, search_enabled: bool) -> Self {
        if self == Tab::Search && !search_enabled {
            Tab::Bundles
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bundle_accepts_minimal_host_payload() {
        let bundle: Bundle = serde_json::from_value(json!({
            "id": "b1",
            "name": "Auth",
            "files": ["src/auth.rs"],
            "outputFileExists": true,
            "stats": {"files": 1, "folders": 1, "totalSize": 2048},
            "tags": ["ignored"]
        }))
        .unwrap();
        assert!(bundle.output_file_exists);
        assert_eq!(bundle.stats.total_size, 2048);
        assert_eq!(bundle.description, None);

        let sparse: Bundle = serde_json::from_value(json!({"id": "b2", "name": "Docs"})).unwrap();
        assert!(!sparse.output_file_exists);
        assert_eq!(sparse.stats, BundleStats::default());
    }

    #[test]
    fn tab_order_is_fixed() {
        assert_eq!(
            Tab::ordered(true),
            vec![
                Tab::Bundles,
                Tab::SmartAgent,
                Tab::Settings,
                Tab::Debug,
                Tab::Search
            ]
        );
        assert_eq!(Tab::ordered(false).len(), 4);
        assert!(!Tab::ordered(false).contains(&Tab::Search));
    }

    #[test]
    fn tab_wire_names_match_serde() {
        for tab in Tab::ordered(true) {
            let value = serde_json::to_value(tab).unwrap();
            assert_eq!(value, json!(tab.wire_name()));
            assert_eq!(Tab::from_wire(tab.wire_name()), Some(tab));
        }
        assert_eq!(Tab::from_wire("apply"), None);
    }

    #[test]
    fn search_selection_falls_back_when_hidden() {
        assert_eq!(Tab::Search.available(false), Tab::Bundles);
        assert_eq!(Tab::Search.available(true), Tab::Search);
        assert_eq!(Tab::Debug.available(false), Tab::Debug);
    }

    #[test]
    fn agent_last_run_uses_saved_state_field_names() {
        let run = AgentLastRun {
            last_output_path: Some("out/agent.xml".to_owned()),
            last_file_count: Some(4),
            last_query: Some("auth flow".to_owned()),
            last_tokens: None,
            run_failed: false,
        };
        assert_eq!(
            serde_json::to_value(&run).unwrap(),
            json!({
                "lastOutputPath": "out/agent.xml",
                "lastFileCount": 4,
                "lastQuery": "auth flow",
                "runFailed": false
            })
        );
        let sparse: AgentLastRun = serde_json::from_value(json!({"runFailed": true})).unwrap();
        assert!(sparse.run_failed);
        assert_eq!(sparse.last_output_path, None);
    }

    #[test]
    fn index_descriptor_tolerates_extra_fields() {
        let index: PineconeIndex = serde_json::from_value(json!({
            "name": "repo-main",
            "host": "repo-main.svc.pinecone.io",
            "dimension": 768,
            "metric": "cosine"
        }))
        .unwrap();
        assert_eq!(index.dimension, Some(768));
    }
}
