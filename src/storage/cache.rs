//! Bounded in-memory model cache with LRU eviction

use parking_lot::Mutex;
use std::collections::HashMap;

use super::ModelStore;
use crate::learners::LearnerHandle;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelKey {
    pub symbol: String,
    pub model_type: String,
    pub version: String,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ModelKey, (LearnerHandle, u64)>,
    /// Monotonic use counter
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Maps `(symbol, model_type, version)` to a trained model
pub struct ModelCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl ModelCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<ModelKey> {
        let mut keys: Vec<ModelKey> = self.state.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop every version of `(model_type, symbol)`; returns how many went
    pub fn remove(&self, model_type: &str, symbol: &str) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|key, _| !(key.model_type == model_type && key.symbol == symbol));
        let removed = before - state.entries.len();
        if removed > 0 {
            tracing::debug!("Removed {} cached {} models for {}", removed, model_type, symbol);
        }
        removed
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
        tracing::info!("Model cache cleared");
    }
}

impl ModelStore for ModelCache {
    fn load(&self, model_type: &str, symbol: &str) -> Option<LearnerHandle> {
        let mut state = self.state.lock();
        let key = state
            .entries
            .keys()
            .filter(|k| k.model_type == model_type && k.symbol == symbol)
            .max_by(|a, b| a.version.cmp(&b.version))
            .cloned()?;

        let now = state.tick();
        let entry = state.entries.get_mut(&key)?;
        entry.1 = now;
        Some(entry.0.clone())
    }

    fn save(&self, handle: LearnerHandle, model_type: &str, symbol: &str, version: &str) {
        let key = ModelKey {
            symbol: symbol.to_string(),
            model_type: model_type.to_string(),
            version: version.to_string(),
        };

        let mut state = self.state.lock();
        let now = state.tick();
        state.entries.insert(key, (handle, now));

        while state.entries.len() > self.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    state.entries.remove(&k);
                    tracing::debug!(
                        "Evicted cached model {} {} {}",
                        k.symbol,
                        k.model_type,
                        k.version
                    );
                }
                None => break,
            }
        }
    }
}
