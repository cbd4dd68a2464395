use std::{
    fmt,
    io::{self, Write},
};

use base64::Engine as _;
use repopanel_core::MAX_CLIPBOARD_BYTES;
use sha2::{Digest, Sha256};

/// One way of putting text on the user's clipboard.
pub trait ClipboardTier: Send {
    fn name(&self) -> &'static str;
    fn write_text(&mut self, content: &str) -> Result<(), String>;
}

/// The OS clipboard through `arboard`.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl ClipboardTier for SystemClipboard {
    fn name(&self) -> &'static str {
        "system"
    }

    fn write_text(&mut self, content: &str) -> Result<(), String> {
        let mut clipboard = arboard::Clipboard::new().map_err(|err| err.to_string())?;
        clipboard
            .set_text(content.to_owned())
            .map_err(|err| err.to_string())
    }
}

/// Writes an OSC 52 escape so the terminal emulator sets its clipboard.
#[derive(Debug)]
pub struct TerminalClipboard<W> {
    out: W,
}

impl TerminalClipboard<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> TerminalClipboard<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

pub fn osc52_sequence(content: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(content.as_bytes());
    format!("\x1b]52;c;{encoded}\x07")
}

impl<W: Write + Send> ClipboardTier for TerminalClipboard<W> {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn write_text(&mut self, content: &str) -> Result<(), String> {
        self.out
            .write_all(osc52_sequence(content).as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|err| err.to_string())
    }
}

/// Result of a successful copy. The digest lets logs identify content
/// without containing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub tier: &'static str,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyError {
    TooLarge { size: usize, max: usize },
    NoTiers,
    /// Every tier failed; one `(tier, reason)` entry per attempt.
    AllTiersFailed(Vec<(&'static str, String)>),
}

impl fmt::Display for CopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyError::TooLarge { size, max } => {
                write!(f, "content too large: {size} bytes (max {max})")
            }
            CopyError::NoTiers => write!(f, "no clipboard available"),
            CopyError::AllTiersFailed(failures) => {
                let reasons: Vec<String> = failures
                    .iter()
                    .map(|(tier, reason)| format!("{tier}: {reason}"))
                    .collect();
                write!(f, "{}", reasons.join("; "))
            }
        }
    }
}

impl std::error::Error for CopyError {}

/// Ordered clipboard tiers; the first one that accepts the write wins.
pub struct Clipboard {
    tiers: Vec<Box<dyn ClipboardTier>>,
}

impl fmt::Debug for Clipboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tiers.iter().map(|tier| tier.name()).collect();
        f.debug_struct("Clipboard").field("tiers", &names).finish()
    }
}

impl Default for Clipboard {
    /// System clipboard first, OSC 52 on stdout second.
    fn default() -> Self {
        Self::with_tiers(vec![
            Box::new(SystemClipboard),
            Box::new(TerminalClipboard::stdout()),
        ])
    }
}

impl Clipboard {
    pub fn with_tiers(tiers: Vec<Box<dyn ClipboardTier>>) -> Self {
        Self { tiers }
    }

    pub fn copy_with_fallback(&mut self, content: &str) -> Result<CopyOutcome, CopyError> {
        if content.len() > MAX_CLIPBOARD_BYTES {
            return Err(CopyError::TooLarge {
                size: content.len(),
                max: MAX_CLIPBOARD_BYTES,
            });
        }
        if self.tiers.is_empty() {
            return Err(CopyError::NoTiers);
        }

        let mut failures = Vec::new();
        for tier in &mut self.tiers {
            match tier.write_text(content) {
                Ok(()) => {
                    return Ok(CopyOutcome {
                        tier: tier.name(),
                        bytes: content.len(),
                        sha256: hex::encode(Sha256::digest(content.as_bytes())),
                    });
                }
                Err(reason) => {
                    tracing::debug!(tier = tier.name(), "clipboard tier failed: {reason}");
                    failures.push((tier.name(), reason));
                }
            }
        }
        Err(CopyError::AllTiersFailed(failures))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct Recording {
        name: &'static str,
        fail_with: Option<&'static str>,
        written: Arc<Mutex<Vec<String>>>,
    }

    impl ClipboardTier for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn write_text(&mut self, content: &str) -> Result<(), String> {
            self.written.lock().unwrap().push(content.to_owned());
            match self.fail_with {
                Some(reason) => Err(reason.to_owned()),
                None => Ok(()),
            }
        }
    }

    fn tier(
        name: &'static str,
        fail_with: Option<&'static str>,
    ) -> (Box<dyn ClipboardTier>, Arc<Mutex<Vec<String>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let tier = Recording {
            name,
            fail_with,
            written: Arc::clone(&written),
        };
        (Box::new(tier), written)
    }

    #[test]
    fn first_working_tier_wins() {
        let (system, system_seen) = tier("system", None);
        let (terminal, terminal_seen) = tier("terminal", None);
        let mut clipboard = Clipboard::with_tiers(vec![system, terminal]);

        let outcome = clipboard.copy_with_fallback("bundle text").unwrap();
        assert_eq!(outcome.tier, "system");
        assert_eq!(outcome.bytes, 11);
        assert_eq!(outcome.sha256.len(), 64);
        assert_eq!(*system_seen.lock().unwrap(), vec!["bundle text".to_owned()]);
        assert!(terminal_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn fallback_receives_identical_content() {
        let content = "línea 1\r\n\ttab\u{0}nul\n😀";
        let (system, system_seen) = tier("system", Some("no display"));
        let (terminal, terminal_seen) = tier("terminal", None);
        let mut clipboard = Clipboard::with_tiers(vec![system, terminal]);

        let outcome = clipboard.copy_with_fallback(content).unwrap();
        assert_eq!(outcome.tier, "terminal");
        assert_eq!(system_seen.lock().unwrap()[0], content);
        assert_eq!(terminal_seen.lock().unwrap()[0], content);
    }

    #[test]
    fn both_tiers_failing_reports_each_reason() {
        let (system, _) = tier("system", Some("no display"));
        let (terminal, _) = tier("terminal", Some("broken pipe"));
        let mut clipboard = Clipboard::with_tiers(vec![system, terminal]);

        let err = clipboard.copy_with_fallback("x").unwrap_err();
        assert_eq!(err.to_string(), "system: no display; terminal: broken pipe");
    }

    #[test]
    fn oversized_content_is_refused_before_writing() {
        let (system, seen) = tier("system", None);
        let mut clipboard = Clipboard::with_tiers(vec![system]);
        let content = "a".repeat(MAX_CLIPBOARD_BYTES + 1);

        assert!(matches!(
            clipboard.copy_with_fallback(&content),
            Err(CopyError::TooLarge { .. })
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn terminal_tier_writes_osc52() {
        let mut terminal = TerminalClipboard::new(Vec::new());
        terminal.write_text("hi").unwrap();
        assert_eq!(terminal.out, b"\x1b]52;c;aGk=\x07".to_vec());
    }
}
