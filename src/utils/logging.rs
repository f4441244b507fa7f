use log::{log_enabled, warn, Level};
use std::collections::HashSet;
use std::hash::Hash;
use std::time::Instant;

/// Scoped timer for the stages of the resolution pipeline; reports at trace level.
pub struct ScopedTimer {
    label: &'static str,
    start: Option<Instant>,
}

impl ScopedTimer {
    pub fn new(label: &'static str) -> Self {
        let start = if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
            Some(Instant::now())
        } else {
            None
        };
        Self { label, start }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if let Some(start) = self.start {
            log::trace!("end {} ({} µs)", self.label, start.elapsed().as_micros());
        }
    }
}

/// Emits a warning the first time a key is seen and stays quiet afterwards.
///
/// Used for diagnostics that would otherwise repeat every step, such as a
/// contact pair with no registered parameters.
#[derive(Debug)]
pub struct WarnOnce<K> {
    seen: HashSet<K>,
}

impl<K> Default for WarnOnce<K> {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash> WarnOnce<K> {
    /// Returns `true` if the warning was emitted.
    pub fn warn(&mut self, key: K, message: impl FnOnce() -> String) -> bool {
        if self.seen.insert(key) {
            warn!("{}", message());
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warns_once_per_key() {
        let mut once = WarnOnce::default();
        assert!(once.warn((1, 2), || "pair".to_string()));
        assert!(!once.warn((1, 2), || "pair".to_string()));
        assert!(once.warn((2, 1), || "other pair".to_string()));
        once.clear();
        assert!(once.warn((1, 2), || "pair".to_string()));
    }
}
