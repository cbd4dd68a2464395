use std::fmt::Write as _;

use repopanel_core::{
    CopyMode, DEFAULT_BUNDLE_ID, ExecutionState, PanelView, SecretView, Tab,
};

pub const NO_BUNDLES: &str = "No bundles found.";
pub const NO_RUNS: &str = "No runs recorded yet.";

/// Renders the panel as plain text for a terminal.
pub fn render_text(view: &PanelView) -> String {
    let mut out = String::new();

    let strip: Vec<String> = view
        .tabs
        .iter()
        .map(|tab| {
            if tab.selected {
                format!("[{}]", tab.label)
            } else {
                format!(" {} ", tab.label)
            }
        })
        .collect();
    let _ = writeln!(out, "{}", strip.join(" "));
    let _ = writeln!(out, "{}", "-".repeat(60));

    match view.selected_tab {
        Tab::Bundles => render_bundles(&mut out, view),
        Tab::SmartAgent => render_agent(&mut out, view),
        Tab::Settings => render_settings(&mut out, view),
        Tab::Debug => render_debug(&mut out, view),
        Tab::Search => {
            let _ = writeln!(out, "Search runs on the host; results open in the editor.");
        }
    }

    if let Some(notice) = &view.notice {
        let _ = writeln!(out);
        let _ = writeln!(out, "! {notice}  (dismiss to clear)");
    }
    if let Some(version) = &view.version {
        let _ = writeln!(out);
        let _ = writeln!(out, "v{version}");
    }
    out
}

fn execution_label(state: ExecutionState) -> &'static str {
    match state {
        ExecutionState::Idle => "",
        ExecutionState::Queued => " (queued)",
        ExecutionState::Running => " (running)",
    }
}

fn copying(pending: bool) -> &'static str {
    if pending { " (copying...)" } else { "" }
}

fn secret_label(status: SecretView) -> &'static str {
    match status {
        SecretView::Unknown => "unknown",
        SecretView::Pending => "checking...",
        SecretView::Present => "stored",
        SecretView::Missing => "not set",
    }
}

fn render_bundles(out: &mut String, view: &PanelView) {
    let default_run = &view.default_run;
    let _ = writeln!(
        out,
        "Whole repository{}",
        execution_label(default_run.execution)
    );
    if let Some(path) = &default_run.output_file_path {
        let _ = writeln!(out, "    output: {path}");
    }
    if default_run.copy_action.is_some() {
        let _ = writeln!(
            out,
            "    copy: `copy-default`{}",
            copying(default_run.copy_pending)
        );
    }
    if view.bundles.is_empty() {
        let _ = writeln!(out, "{NO_BUNDLES}");
        return;
    }
    for row in &view.bundles {
        let _ = writeln!(
            out,
            "* {} [{}]{}",
            row.name,
            row.id,
            execution_label(row.execution)
        );
        if let Some(description) = &row.description {
            let _ = writeln!(out, "    {description}");
        }
        let _ = writeln!(
            out,
            "    {} files, {} folders, {} bytes",
            row.stats.files, row.stats.folders, row.stats.total_size
        );
        if row.copy_action.is_some() {
            let _ = writeln!(out, "    copy: `copy {}`{}", row.id, copying(row.copy_pending));
        }
    }
}

fn render_agent(out: &mut String, view: &PanelView) {
    let agent = &view.agent;
    let _ = writeln!(out, "Google API key: {}", secret_label(agent.google_key));
    if agent.running {
        let _ = writeln!(out, "Smart Agent (running)");
        if let Some(query) = &agent.last_query {
            let _ = writeln!(out, "    query: {query}");
        }
    } else {
        let _ = writeln!(out, "Smart Agent: `agent <query>` selects files for a question.");
    }

    if let Some(last) = &agent.last_run {
        let _ = writeln!(out);
        let _ = writeln!(out, "Last run: {} files -> {}", last.file_count, last.output_path);
        if let Some(query) = &last.query {
            let _ = writeln!(out, "    query: {query}");
        }
        if let Some(tokens) = last.tokens {
            let _ = writeln!(out, "    ~{tokens} tokens");
        }
        let _ = writeln!(out, "    copy: `copy-agent`{}", copying(last.copy_pending));
    } else if agent.run_failed && !agent.running {
        let _ = writeln!(out);
        let _ = writeln!(out, "Last run found no files.");
    }

    let _ = writeln!(out);
    if agent.fetching_history {
        let _ = writeln!(out, "History: loading...");
    } else if agent.history.is_empty() {
        let _ = writeln!(out, "History: none (`history` to refresh)");
    } else {
        let _ = writeln!(out, "History:");
    }
    for row in &agent.history {
        let outcome = if row.success { "ok" } else { "failed" };
        let _ = writeln!(
            out,
            "  {} [{outcome}] {} ({} files)",
            row.timestamp, row.query, row.file_count
        );
        for file in &row.files.visible {
            let _ = writeln!(out, "      {file}");
        }
        if let Some(label) = row.files.overflow_label() {
            let _ = writeln!(out, "      {label}");
        }
        if let Some(error) = &row.error {
            let _ = writeln!(out, "      error: {error}");
        }
    }
    let _ = writeln!(
        out,
        "`run {DEFAULT_BUNDLE_ID}` bundles the whole repository instead."
    );
}

fn render_debug(out: &mut String, view: &PanelView) {
    if view.debug_runs.is_empty() {
        let _ = writeln!(out, "{NO_RUNS}");
        return;
    }
    for row in &view.debug_runs {
        let _ = writeln!(
            out,
            "Run #{} at {} ({} files)",
            row.id, row.timestamp, row.total_files
        );
        for file in &row.files.visible {
            let _ = writeln!(out, "    {file}");
        }
        if let Some(label) = row.files.overflow_label() {
            let _ = writeln!(out, "    {label}");
        }
        if row.copy_action.is_some() {
            let _ = writeln!(out, "    copy: `copy-run {}`", row.id);
        }
        let _ = writeln!(out, "    again: `rerun {}`", row.id);
    }
}

fn render_settings(out: &mut String, view: &PanelView) {
    let settings = &view.settings;
    for secret in &settings.secrets {
        let _ = writeln!(out, "{}: {}", secret.label, secret_label(secret.status));
    }

    let _ = writeln!(out);
    if settings.fetching_indexes {
        let _ = writeln!(out, "Pinecone indexes: loading...");
    } else if let Some(error) = &settings.index_error {
        let _ = writeln!(out, "Pinecone indexes: {error}");
    } else if settings.indexes.is_empty() {
        let _ = writeln!(out, "Pinecone indexes: none");
    } else {
        let _ = writeln!(out, "Pinecone indexes:");
    }
    for index in &settings.indexes {
        let marker = if index.selected { "(x)" } else { "( )" };
        let dimension = index
            .dimension
            .map(|d| format!(", {d} dims"))
            .unwrap_or_default();
        let _ = writeln!(out, "  {marker} {} ({}{dimension})", index.name, index.host);
    }
    if let Some(pending) = &settings.pending_index {
        let _ = writeln!(out, "  saving selection: {pending}...");
    }

    let _ = writeln!(out);
    let mode = settings
        .copy_mode
        .map(CopyMode::label)
        .unwrap_or("Copy mode: unknown");
    let _ = writeln!(out, "{mode}");
    if let Some(pending) = settings.copy_mode_pending {
        let _ = writeln!(out, "  switching to {}...", pending.wire_name());
    }
}
