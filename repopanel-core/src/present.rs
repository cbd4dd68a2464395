pub const DEFAULT_VISIBLE_FILES: usize = 3;

/// A file selection cut down to a fixed visible prefix. Entries past the limit
/// are dropped, not carried along hidden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presented {
    pub visible: Vec<String>,
    pub overflow_count: usize,
}

impl Presented {
    pub fn overflow_label(&self) -> Option<String> {
        (self.overflow_count > 0).then(|| format!("+{} selection", self.overflow_count))
    }
}

pub fn present(files: &[String], visible_limit: usize) -> Presented {
    let shown = files.len().min(visible_limit);
    Presented {
        visible: files[..shown].to_vec(),
        overflow_count: files.len().saturating_sub(visible_limit),
    }
}
