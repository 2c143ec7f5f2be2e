use std::fmt::Display;

use hashbrown::HashMap;

/// Collapses repeated errors when `concise` is set: the first report of a key is logged in
/// full, later ones are only counted until [`ErrorReporter::flush_summary`].
#[derive(Debug, Default)]
pub struct ErrorReporter {
    concise: bool,
    seen: HashMap<&'static str, u64>,
    suppressed: HashMap<&'static str, u64>,
}

impl ErrorReporter {
    pub fn new(concise: bool) -> Self {
        Self {
            concise,
            ..Self::default()
        }
    }

    pub fn set_concise(&mut self, concise: bool) {
        self.concise = concise;
    }

    /// Returns true when the error was logged rather than counted.
    pub fn report(&mut self, key: &'static str, err: &dyn Display) -> bool {
        let count = self.seen.entry(key).or_insert(0);
        *count += 1;
        if self.concise && *count > 1 {
            *self.suppressed.entry(key).or_insert(0) += 1;
            return false;
        }
        log::error!(target: "gfx", "[{}] {}", key, err);
        true
    }

    pub fn total(&self, key: &str) -> u64 {
        self.seen.get(key).copied().unwrap_or(0)
    }

    /// Logs one line for everything suppressed since the last flush.
    pub fn flush_summary(&mut self) -> Option<String> {
        if self.suppressed.is_empty() {
            return None;
        }
        let mut parts: Vec<(&'static str, u64)> = self.suppressed.drain().collect();
        parts.sort_unstable();
        let line = parts
            .iter()
            .map(|(key, n)| format!("{} x{}", key, n))
            .collect::<Vec<_>>()
            .join(", ");
        log::warn!(target: "gfx", "suppressed repeated errors: {}", line);
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concise_mode_logs_each_key_once() {
        let mut r = ErrorReporter::new(true);
        assert!(r.report("gfx.upload", &"buffer 3 overflow"));
        assert!(!r.report("gfx.upload", &"buffer 4 overflow"));
        assert!(!r.report("gfx.upload", &"buffer 5 overflow"));
        assert!(r.report("task.mesher", &"bad block"));
        assert_eq!(r.total("gfx.upload"), 3);
        assert_eq!(r.flush_summary().as_deref(), Some("gfx.upload x2"));
        assert_eq!(r.flush_summary(), None);
    }

    #[test]
    fn verbose_mode_logs_everything() {
        let mut r = ErrorReporter::new(false);
        assert!(r.report("gfx.upload", &"a"));
        assert!(r.report("gfx.upload", &"b"));
        assert_eq!(r.flush_summary(), None);
    }
}
