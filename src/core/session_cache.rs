//! Per-run memoization tier.
//!
//! One `SessionCache` is created per validation run and dropped (or
//! `clear`ed) when the run ends. Every map is guarded by its own mutex and
//! the lock is never held while a value is computed: lookups follow
//! check, compute, then insert-or-get, so concurrent workers computing the
//! same key converge on the first stored value.

use crate::core::error::ResolutionError;
use crate::core::resolver::FlattenedArchitecture;
use crate::core::semantic::SemanticModel;
use crate::core::tags::ExtractedTags;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub type ArchResolution = Result<Arc<FlattenedArchitecture>, ResolutionError>;

struct Memo<K, V> {
    map: Mutex<FxHashMap<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Eq + Hash, V: Clone> Memo<K, V> {
    fn new() -> Self {
        Self {
            map: Mutex::new(FxHashMap::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<K, V>> {
        // A poisoned memo map still holds complete entries.
        self.map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, key: &K) -> Option<V> {
        let found = self.lock().get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn insert_or_get(&self, key: K, value: V) -> V {
        self.lock().entry(key).or_insert(value).clone()
    }

    fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(hit) = self.get(&key) {
            return hit;
        }
        let value = compute();
        self.insert_or_get(key, value)
    }

    fn get_or_try_insert_with<E>(&self, key: K, compute: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = compute()?;
        Ok(self.insert_or_get(key, value))
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn counts(&self) -> MemoStats {
        MemoStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub content: MemoStats,
    pub tags: MemoStats,
    pub models: MemoStats,
    pub modules: MemoStats,
    pub architectures: MemoStats,
}

pub struct SessionCache {
    content: Memo<String, Arc<str>>,
    tags: Memo<String, Arc<ExtractedTags>>,
    models: Memo<String, Arc<SemanticModel>>,
    modules: Memo<(String, String), Option<String>>,
    architectures: Memo<String, ArchResolution>,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCache {
    pub fn new() -> Self {
        Self {
            content: Memo::new(),
            tags: Memo::new(),
            models: Memo::new(),
            modules: Memo::new(),
            architectures: Memo::new(),
        }
    }

    /// Raw file content keyed by relative path.
    pub fn content<E>(&self, path: &str, read: impl FnOnce() -> Result<String, E>) -> Result<Arc<str>, E> {
        self.content
            .get_or_try_insert_with(path.to_string(), || read().map(Arc::from))
    }

    /// Extracted tags (architecture id, overrides, intents) keyed by path.
    pub fn tags(&self, path: &str, extract: impl FnOnce() -> ExtractedTags) -> Arc<ExtractedTags> {
        self.tags
            .get_or_insert_with(path.to_string(), || Arc::new(extract()))
    }

    pub fn arch_id(&self, path: &str) -> Option<String> {
        self.tags
            .lock()
            .get(path)
            .and_then(|t| t.arch_id().map(str::to_string))
    }

    pub fn model<E>(
        &self,
        path: &str,
        parse: impl FnOnce() -> Result<SemanticModel, E>,
    ) -> Result<Arc<SemanticModel>, E> {
        self.models
            .get_or_try_insert_with(path.to_string(), || parse().map(Arc::new))
    }

    /// Module resolution keyed by `(importing file, specifier)`.
    pub fn module(
        &self,
        from: &str,
        specifier: &str,
        resolve: impl FnOnce() -> Option<String>,
    ) -> Option<String> {
        self.modules
            .get_or_insert_with((from.to_string(), specifier.to_string()), resolve)
    }

    /// Flattened architecture keyed by id. Failures are memoized too.
    pub fn architecture(&self, arch_id: &str, resolve: impl FnOnce() -> ArchResolution) -> ArchResolution {
        self.architectures
            .get_or_insert_with(arch_id.to_string(), resolve)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            content: self.content.counts(),
            tags: self.tags.counts(),
            models: self.models.counts(),
            modules: self.modules.counts(),
            architectures: self.architectures.counts(),
        }
    }

    pub fn clear(&self) {
        self.content.clear();
        self.tags.clear();
        self.models.clear();
        self.modules.clear();
        self.architectures.clear();
    }
}
