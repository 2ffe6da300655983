use super::ProcessingMode;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves P-Mode identifiers to the P-Modes governing message units
pub trait PModeLookup: Send + Sync + std::fmt::Debug {
    fn resolve(&self, pmode_id: &str) -> Option<Arc<ProcessingMode>>;
}

/// In-memory, reloadable set of P-Modes
#[derive(Debug, Default)]
pub struct PModeSet {
    pmodes: RwLock<HashMap<String, Arc<ProcessingMode>>>,
}

impl PModeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pmodes(pmodes: impl IntoIterator<Item = ProcessingMode>) -> Self {
        let set = Self::new();
        set.replace_all(pmodes);
        set
    }

    /// Add or replace a single P-Mode
    pub fn register(&self, pmode: ProcessingMode) {
        debug!(pmode_id = %pmode.id, "Registering P-Mode");
        self.pmodes.write().insert(pmode.id.clone(), Arc::new(pmode));
    }

    pub fn remove(&self, pmode_id: &str) -> Option<Arc<ProcessingMode>> {
        self.pmodes.write().remove(pmode_id)
    }

    /// Atomically swap in a new set of P-Modes. Readers see either the old or the new set.
    pub fn replace_all(&self, pmodes: impl IntoIterator<Item = ProcessingMode>) {
        let fresh: HashMap<_, _> = pmodes
            .into_iter()
            .map(|p| (p.id.clone(), Arc::new(p)))
            .collect();
        let count = fresh.len();
        *self.pmodes.write() = fresh;
        info!(count = count, "P-Mode set reloaded");
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.pmodes.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.pmodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pmodes.read().is_empty()
    }
}

impl PModeLookup for PModeSet {
    fn resolve(&self, pmode_id: &str) -> Option<Arc<ProcessingMode>> {
        self.pmodes.read().get(pmode_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let set = PModeSet::new();
        set.register(ProcessingMode::new("pm-a"));
        assert!(set.resolve("pm-a").is_some());
        assert!(set.resolve("pm-b").is_none());
    }

    #[test]
    fn test_reload_replaces_everything() {
        let set = PModeSet::with_pmodes([ProcessingMode::new("old")]);
        let held = set.resolve("old").unwrap();

        set.replace_all([ProcessingMode::new("new-1"), ProcessingMode::new("new-2")]);

        assert!(set.resolve("old").is_none());
        assert_eq!(set.ids(), vec!["new-1".to_string(), "new-2".to_string()]);
        // handles taken before the reload stay usable
        assert_eq!(held.id, "old");
    }
}
