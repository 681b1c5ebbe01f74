//! Persistent, checksum-keyed result cache.
//!
//! One JSON document per project. It is loaded once at the start of a run,
//! consulted and updated in memory, and flushed once at the end through a
//! temp file and rename so a crash leaves the previous document intact.
//! A registry or config checksum change discards every entry.

use crate::core::error::ArchError;
use crate::core::time::now_rfc3339;
use crate::core::violation::{FileResult, FileStatus, Violation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFileResult {
    pub checksum: String,
    pub cached_at: String,
    pub arch_id: Option<String>,
    pub status: FileStatus,
    pub violations: Vec<Violation>,
    pub warnings: Vec<Violation>,
    pub imports: Vec<String>,
    pub overrides_count: usize,
}

impl CachedFileResult {
    pub fn from_result(result: &FileResult, checksum: &str) -> Self {
        Self {
            checksum: checksum.to_string(),
            cached_at: now_rfc3339(),
            arch_id: result.arch_id.clone(),
            status: result.status,
            violations: result.violations.clone(),
            warnings: result.warnings.clone(),
            imports: result.imports.clone(),
            overrides_count: result.overrides_count,
        }
    }

    pub fn to_result(&self, path: &str) -> FileResult {
        FileResult {
            path: path.to_string(),
            arch_id: self.arch_id.clone(),
            status: self.status,
            violations: self.violations.clone(),
            warnings: self.warnings.clone(),
            overridden: Vec::new(),
            overrides_count: self.overrides_count,
            imports: self.imports.clone(),
            from_cache: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    registry_checksum: String,
    config_checksum: String,
    created_at: String,
    updated_at: String,
    files: BTreeMap<String, CachedFileResult>,
}

impl CacheDocument {
    fn empty(registry_checksum: &str, config_checksum: &str) -> Self {
        let now = now_rfc3339();
        Self {
            version: CACHE_VERSION,
            registry_checksum: registry_checksum.to_string(),
            config_checksum: config_checksum.to_string(),
            created_at: now.clone(),
            updated_at: now,
            files: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    /// Lookups not served from the cache, stale entries included.
    pub misses: usize,
    /// Entries discarded: stale per-file entries, or all entries on full invalidation.
    pub invalidated: usize,
    pub full_invalidation: bool,
}

#[derive(Debug)]
pub struct ValidationCache {
    path: PathBuf,
    doc: CacheDocument,
    stats: CacheStats,
    dirty: bool,
}

impl ValidationCache {
    /// Never fails: a missing file starts empty, an unreadable or stale one
    /// starts empty with `full_invalidation` set.
    pub fn load(path: &Path, registry_checksum: &str, config_checksum: &str) -> Self {
        let mut stats = CacheStats::default();
        let fresh = || CacheDocument::empty(registry_checksum, config_checksum);

        let doc = match fs::read_to_string(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => fresh(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "validation cache unreadable, rebuilding");
                stats.full_invalidation = true;
                fresh()
            }
            Ok(raw) => match serde_json::from_str::<CacheDocument>(&raw) {
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "validation cache corrupt, rebuilding");
                    stats.full_invalidation = true;
                    fresh()
                }
                Ok(doc) => {
                    let reason = if doc.version != CACHE_VERSION {
                        Some("cache format version changed")
                    } else if doc.registry_checksum != registry_checksum {
                        Some("registry changed")
                    } else if doc.config_checksum != config_checksum {
                        Some("config changed")
                    } else {
                        None
                    };
                    match reason {
                        Some(reason) => {
                            debug!(reason, discarded = doc.files.len(), "full cache invalidation");
                            stats.full_invalidation = true;
                            stats.invalidated = doc.files.len();
                            fresh()
                        }
                        None => doc,
                    }
                }
            },
        };

        let dirty = stats.full_invalidation;
        Self {
            path: path.to_path_buf(),
            doc,
            stats,
            dirty,
        }
    }

    /// Cached result for `rel_path` if its content checksum still matches.
    pub fn get(&mut self, rel_path: &str, checksum: &str) -> Option<&CachedFileResult> {
        let stale = match self.doc.files.get(rel_path) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.checksum != checksum,
        };
        if stale {
            self.doc.files.remove(rel_path);
            self.stats.misses += 1;
            self.stats.invalidated += 1;
            self.dirty = true;
            return None;
        }
        self.stats.hits += 1;
        self.doc.files.get(rel_path)
    }

    /// Like [`get`](Self::get) but leaves stats and entries untouched; used
    /// for files indexed but not validated in this run.
    pub fn peek(&self, rel_path: &str, checksum: &str) -> Option<&CachedFileResult> {
        self.doc
            .files
            .get(rel_path)
            .filter(|entry| entry.checksum == checksum)
    }

    pub fn put(&mut self, rel_path: &str, entry: CachedFileResult) {
        self.doc.files.insert(rel_path.to_string(), entry);
        self.dirty = true;
    }

    /// Drops entries for files no longer in the project.
    pub fn retain_paths(&mut self, keep: impl Fn(&str) -> bool) {
        let before = self.doc.files.len();
        self.doc.files.retain(|path, _| keep(path));
        if self.doc.files.len() != before {
            self.dirty = true;
        }
    }

    /// Single batched write. No-op when nothing changed.
    pub fn flush(&mut self) -> Result<(), ArchError> {
        if !self.dirty {
            return Ok(());
        }
        self.doc.updated_at = now_rfc3339();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(&self.doc)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.doc.files.len(), "validation cache flushed");
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.doc.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.files.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Removes the cache file; returns whether one existed.
pub fn clear_cache(path: &Path) -> Result<bool, ArchError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn content_checksum(content: &str) -> String {
    input_checksum(content, None)
}

/// Checksum over the source text plus the external model it is parsed
/// from, if any. Editing either one misses the cache.
pub fn input_checksum(content: &str, model: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    if let Some(model) = model {
        hasher.update([0u8]);
        hasher.update(model.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constraint::Severity;

    fn entry(checksum: &str) -> CachedFileResult {
        let v = Violation::system("E010", "max_file_lines", Severity::Error, "too long", "split");
        let result = FileResult::from_diagnostics("a.ts", Some("svc".into()), vec![v]);
        CachedFileResult::from_result(&result, checksum)
    }

    #[test]
    fn round_trip_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache/validation.json");
        let mut cache = ValidationCache::load(&path, "r1", "c1");
        assert!(cache.get("a.ts", "x").is_none());
        cache.put("a.ts", entry("x"));
        cache.flush().unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let mut again = ValidationCache::load(&path, "r1", "c1");
        let hit = again.get("a.ts", "x").unwrap().to_result("a.ts");
        assert!(hit.from_cache);
        assert_eq!(hit.status, FileStatus::Fail);
        assert_eq!(hit.violations[0].code, "E010");
        assert_eq!(again.stats().hits, 1);
        assert!(!again.stats().full_invalidation);
    }

    #[test]
    fn stale_entry_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = ValidationCache::load(&tmp.path().join("c.json"), "r", "c");
        cache.put("a.ts", entry("old"));
        assert!(cache.get("a.ts", "new").is_none());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.invalidated), (0, 1, 1));
        assert!(cache.is_empty());
    }

    #[test]
    fn model_input_changes_the_checksum() {
        let plain = input_checksum("x", None);
        assert_eq!(plain, content_checksum("x"));
        let with_model = input_checksum("x", Some("{}"));
        assert_ne!(plain, with_model);
        assert_ne!(with_model, input_checksum("x", Some("{\"classes\":[]}")));
    }

    #[test]
    fn checksum_change_invalidates_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("c.json");
        let mut cache = ValidationCache::load(&path, "r1", "c1");
        cache.put("a.ts", entry("x"));
        cache.put("b.ts", entry("y"));
        cache.flush().unwrap();

        let mut reloaded = ValidationCache::load(&path, "r2", "c1");
        assert!(reloaded.stats().full_invalidation);
        assert_eq!(reloaded.stats().invalidated, 2);
        assert!(reloaded.get("a.ts", "x").is_none());

        let config_changed = ValidationCache::load(&path, "r1", "c2");
        assert!(config_changed.stats().full_invalidation);
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("c.json");
        fs::write(&path, "{ not json").unwrap();
        let mut cache = ValidationCache::load(&path, "r", "c");
        assert!(cache.stats().full_invalidation);
        assert!(cache.is_empty());
        cache.flush().unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"version\": 1"));
    }

    #[test]
    fn clear_reports_existence() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("c.json");
        assert!(!clear_cache(&path).unwrap());
        fs::write(&path, "{}").unwrap();
        assert!(clear_cache(&path).unwrap());
    }
}
