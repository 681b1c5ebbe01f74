//! Validation engine.
//!
//! A run works in phases so that shared state is built before any
//! validator executes and is read-only afterwards:
//!
//! 1. read every project file (parallel) and checksum it
//! 2. consult the persistent cache
//! 3. extract tags and parse the misses (parallel)
//! 4. build the [`ProjectIndex`] from fresh and cached import lists
//! 5. validate the requested files that missed the cache (parallel)
//! 6. store fresh results and flush the cache once

use crate::core::adapter::{LanguageAdapter, SidecarAdapter};
use crate::core::audit::OverrideRecord;
use crate::core::codes;
use crate::core::config::Config;
use crate::core::constraint::{Constraint, ConstraintValue, Rule, Severity};
use crate::core::error::{ArchError, ResolutionError};
use crate::core::overrides::{apply_overrides, tag_error_violation};
use crate::core::patterns::PatternMatcher;
use crate::core::project::{ProjectIndex, discover_files, normalize, resolve_module_in};
use crate::core::registry::Registry;
use crate::core::resolver::{FlattenedArchitecture, ResolveOptions, resolve};
use crate::core::semantic::SemanticModel;
use crate::core::session_cache::{SessionCache, SessionStats};
use crate::core::tags::{ExtractedTags, bind_function_intents, extract_tags};
use crate::core::time;
use crate::core::validation_cache::{CacheStats, CachedFileResult, ValidationCache, input_checksum};
use crate::core::violation::{FileResult, FileStatus, Violation};
use crate::validators::{ValidationContext, ValidatorRegistry, builtin_validators};
use chrono::NaiveDate;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub files: usize,
    pub passed: usize,
    pub warned: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub overridden: usize,
    pub cached: usize,
    pub duration_ms: u128,
}

impl RunSummary {
    fn tally(results: &[FileResult], duration_ms: u128) -> Self {
        let mut summary = Self {
            files: results.len(),
            duration_ms,
            ..Self::default()
        };
        for r in results {
            match r.status {
                FileStatus::Pass => summary.passed += 1,
                FileStatus::Warn => summary.warned += 1,
                FileStatus::Fail => summary.failed += 1,
            }
            summary.errors += r.violations.len();
            summary.warnings += r.warnings.len();
            summary.overridden += r.overrides_count;
            if r.from_cache {
                summary.cached += 1;
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    /// Sorted by path.
    pub results: Vec<FileResult>,
    pub summary: RunSummary,
    /// `None` when the persistent cache is disabled.
    pub cache: Option<CacheStats>,
    pub session: SessionStats,
}

impl RunReport {
    pub fn succeeded(&self, fail_on_warning: bool) -> bool {
        self.summary.failed == 0 && (!fail_on_warning || self.summary.warned == 0)
    }

    pub fn result(&self, path: &str) -> Option<&FileResult> {
        self.results.iter().find(|r| r.path == path)
    }
}

/// What `cache stats` reports without running validation.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub entries: usize,
    /// The stored document no longer matches the current registry or config.
    pub stale: bool,
}

struct Loaded {
    path: String,
    target: bool,
    content: Result<Arc<str>, String>,
    checksum: String,
}

struct Parsed<'a> {
    loaded: &'a Loaded,
    tags: Arc<ExtractedTags>,
    model: Result<Arc<SemanticModel>, ArchError>,
    imports: Vec<String>,
}

pub struct ValidationEngine {
    root: PathBuf,
    config: Config,
    registry: Registry,
    validators: &'static ValidatorRegistry,
    adapter: Box<dyn LanguageAdapter>,
    patterns: PatternMatcher,
    registry_checksum: String,
    config_checksum: String,
    today: NaiveDate,
}

impl ValidationEngine {
    /// Loads `.arch/config.toml` and the registry under `root`.
    pub fn open(root: &Path) -> Result<Self, ArchError> {
        let config = Config::load(root)?;
        let registry = Registry::load(root)?;
        Ok(Self::new(root, config, registry))
    }

    pub fn new(root: &Path, config: Config, registry: Registry) -> Self {
        Self {
            root: root.to_path_buf(),
            registry_checksum: registry.checksum(),
            config_checksum: config.checksum(),
            patterns: PatternMatcher::new(&config.patterns),
            adapter: Box::new(SidecarAdapter::new(root)),
            validators: builtin_validators(),
            today: time::today(),
            config,
            registry,
        }
    }

    pub fn with_adapter(mut self, adapter: Box<dyn LanguageAdapter>) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn with_validators(mut self, validators: &'static ValidatorRegistry) -> Self {
        self.validators = validators;
        self
    }

    /// Pins the date used for override expiry.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Turns the persistent cache on or off without touching the config
    /// checksum.
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn resolve(&self, arch_id: &str) -> Result<FlattenedArchitecture, ResolutionError> {
        resolve(&self.registry, arch_id, ResolveOptions::default())
    }

    pub fn discover(&self) -> Result<Vec<String>, ArchError> {
        discover_files(&self.root, &self.config.files)
    }

    /// Project-relative form of a path given on the command line, or
    /// `None` when it lies outside the project.
    pub fn relative_path(&self, raw: &Path) -> Option<String> {
        let rel = if raw.is_absolute() {
            raw.strip_prefix(&self.root).ok()?.to_path_buf()
        } else {
            raw.to_path_buf()
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        normalize(&rel).filter(|p| !p.is_empty())
    }

    fn cache_path(&self) -> PathBuf {
        self.config.cache_path(&self.root)
    }

    pub fn cache_info(&self) -> CacheInfo {
        let path = self.cache_path();
        let exists = path.exists();
        let cache = ValidationCache::load(&path, &self.registry_checksum, &self.config_checksum);
        let stats = cache.stats();
        CacheInfo {
            exists,
            entries: if stats.full_invalidation { stats.invalidated } else { cache.len() },
            stale: stats.full_invalidation,
            path,
        }
    }

    pub fn clear_cache(&self) -> Result<bool, ArchError> {
        crate::core::validation_cache::clear_cache(&self.cache_path())
    }

    pub fn validate_all(&self) -> Result<RunReport, ArchError> {
        let files = self.discover()?;
        self.validate_paths(&files)
    }

    /// Validates `targets` (project-relative) against the whole project.
    pub fn validate_paths(&self, targets: &[String]) -> Result<RunReport, ArchError> {
        let started = Instant::now();
        let run_id = time::new_run_id();
        let session = SessionCache::new();
        let mut cache = self
            .config
            .cache
            .enabled
            .then(|| ValidationCache::load(&self.cache_path(), &self.registry_checksum, &self.config_checksum));

        let mut all: BTreeSet<String> = self.discover()?.into_iter().collect();
        all.extend(targets.iter().cloned());
        let wanted: FxHashSet<&str> = targets.iter().map(String::as_str).collect();

        let loaded: Vec<Loaded> = all
            .par_iter()
            .map(|path| {
                let content = session
                    .content(path, || fs::read_to_string(self.root.join(path)))
                    .map_err(|e| e.to_string());
                let checksum = content
                    .as_deref()
                    .map(|text| input_checksum(text, self.adapter.model_input(path).as_deref()))
                    .unwrap_or_default();
                Loaded {
                    path: path.clone(),
                    target: wanted.contains(path.as_str()),
                    content,
                    checksum,
                }
            })
            .collect();

        let mut results: Vec<FileResult> = Vec::new();
        let mut known_imports: FxHashMap<&str, Vec<String>> = FxHashMap::default();
        let mut misses: Vec<&Loaded> = Vec::new();
        for file in &loaded {
            if let Err(e) = &file.content {
                if file.target {
                    results.push(read_failure(&file.path, e));
                }
                continue;
            }
            let hit = match cache.as_mut() {
                Some(c) if file.target => c.get(&file.path, &file.checksum).map(|e| e.to_result(&file.path)),
                Some(c) => c.peek(&file.path, &file.checksum).map(|e| e.to_result(&file.path)),
                None => None,
            };
            match hit {
                Some(result) => {
                    known_imports.insert(&file.path, result.imports.clone());
                    if file.target {
                        debug!(path = %file.path, "cache hit");
                        results.push(result);
                    }
                }
                None => misses.push(file),
            }
        }

        let parsed: Vec<Parsed<'_>> = misses
            .par_iter()
            .map(|file| self.parse_file(file, &all, &session))
            .collect();

        let mut project = ProjectIndex::new(&self.root);
        for file in &loaded {
            project.add_file(&file.path);
            if let Ok(content) = &file.content {
                project.set_content(&file.path, Arc::clone(content));
            }
        }
        for (path, imports) in known_imports {
            project.set_imports(path, imports);
        }
        for p in &parsed {
            project.set_imports(&p.loaded.path, p.imports.clone());
        }
        project.link();

        let fresh: Vec<(&Parsed<'_>, FileResult)> = parsed
            .par_iter()
            .filter(|p| p.loaded.target)
            .map(|p| (p, self.check_file(p, &project, &session)))
            .collect();

        if let Some(cache) = cache.as_mut() {
            for (p, result) in &fresh {
                if cacheable(result) {
                    cache.put(&p.loaded.path, CachedFileResult::from_result(result, &p.loaded.checksum));
                }
            }
            cache.retain_paths(|path| all.contains(path));
            if let Err(e) = cache.flush() {
                warn!(error = %e, "failed to write validation cache");
            }
        }
        results.extend(fresh.into_iter().map(|(_, r)| r));
        results.sort_by(|a, b| a.path.cmp(&b.path));

        let summary = RunSummary::tally(&results, started.elapsed().as_millis());
        let session_stats = session.stats();
        session.clear();
        info!(
            run_id = %run_id,
            files = summary.files,
            failed = summary.failed,
            cached = summary.cached,
            duration_ms = summary.duration_ms as u64,
            "validation run complete"
        );
        Ok(RunReport {
            run_id,
            results,
            summary,
            cache: cache.map(|c| c.stats()),
            session: session_stats,
        })
    }

    fn parse_file<'a>(&self, file: &'a Loaded, all: &BTreeSet<String>, session: &SessionCache) -> Parsed<'a> {
        let content: &str = match &file.content {
            Ok(c) => c,
            Err(_) => "",
        };
        let tags = session.tags(&file.path, || extract_tags(content));
        let model = session.model(&file.path, || self.adapter.parse(&file.path, content));
        let mut imports: Vec<String> = match &model {
            Ok(model) => model
                .imports
                .iter()
                .filter_map(|i| {
                    session.module(&file.path, &i.module_specifier, || {
                        resolve_module_in(all, &file.path, &i.module_specifier)
                    })
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        imports.sort();
        imports.dedup();
        Parsed {
            loaded: file,
            tags,
            model,
            imports,
        }
    }

    fn check_file(&self, parsed: &Parsed<'_>, project: &ProjectIndex, session: &SessionCache) -> FileResult {
        let path = parsed.loaded.path.as_str();
        let tags = &parsed.tags;
        let tag_errors: Vec<Violation> = tags.errors.iter().map(tag_error_violation).collect();

        let Some(arch_id) = tags.arch_id() else {
            let mut diagnostics = tag_errors;
            if self.config.validation.report_untagged {
                diagnostics.push(Violation::system(
                    codes::W002_UNTAGGED_FILE,
                    "arch",
                    Severity::Warning,
                    "File has no @arch tag",
                    "Add '// @arch <id>' to the file header",
                ));
            }
            let mut result = FileResult::from_diagnostics(path, None, diagnostics);
            result.imports = parsed.imports.clone();
            return result;
        };

        let flattened = match session.architecture(arch_id, || self.resolve(arch_id).map(Arc::new)) {
            Ok(flattened) => flattened,
            Err(err) => {
                let mut v = Violation::system(
                    codes::S005_INVALID_REGISTRY,
                    "arch",
                    Severity::Error,
                    format!("Cannot resolve @arch {}: {}", arch_id, err),
                    "Fix the registry or the @arch tag",
                )
                .with_value(ConstraintValue::Text(arch_id.to_string()));
                if let Some(line) = tags.arch.as_ref().map(|a| a.line) {
                    v = v.at(line);
                }
                if let ResolutionError::UnknownArch { id, .. } = &err
                    && let Some(candidate) = self.registry.closest_id(id)
                {
                    v = v.with_did_you_mean(candidate);
                }
                let mut diagnostics = vec![v];
                diagnostics.extend(tag_errors);
                return FileResult::from_diagnostics(path, Some(arch_id.to_string()), diagnostics);
            }
        };

        let model = match &parsed.model {
            Ok(model) => model,
            Err(e) => {
                let mut diagnostics = vec![Violation::system(
                    codes::S001_PARSE_ERROR,
                    "parse",
                    Severity::Error,
                    e.to_string(),
                    "Fix the syntax error or the model sidecar",
                )];
                diagnostics.extend(tag_errors);
                return FileResult::from_diagnostics(path, Some(arch_id.to_string()), diagnostics);
            }
        };
        let content: &str = match &parsed.loaded.content {
            Ok(c) => c,
            Err(_) => "",
        };

        let mut intents = tags.intents.clone();
        bind_function_intents(&mut intents, model);
        let ctx = ValidationContext {
            file_path: path,
            arch_id,
            model,
            content,
            intents: &intents,
            intent_registry: &self.registry.intents,
            project,
            patterns: &self.patterns,
            test_file_patterns: &self.config.validation.test_file_patterns,
        };

        let mut diagnostics = Vec::new();
        for constraint in &flattened.constraints {
            diagnostics.extend(self.validators.run(constraint, &ctx).violations);
        }
        if !intents.is_empty() && flattened.constraints_for(Rule::VerifyIntent).next().is_none() {
            let mut implicit = Constraint::new(Rule::VerifyIntent, ConstraintValue::List(Vec::new()));
            implicit.source = Some(arch_id.to_string());
            diagnostics.extend(self.validators.run(&implicit, &ctx).violations);
        }
        if let Some(dep) = &flattened.deprecation {
            let hint = dep
                .migration_guide
                .clone()
                .unwrap_or_else(|| "Move the file to a supported architecture".to_string());
            diagnostics.push(
                Violation::system(
                    codes::W001_DEPRECATED_ARCH,
                    "arch",
                    Severity::Warning,
                    format!("Architecture '{}' is deprecated since {}", arch_id, dep.since),
                    hint,
                )
                .with_value(ConstraintValue::Text(arch_id.to_string())),
            );
        }

        let outcome = apply_overrides(diagnostics, &tags.overrides, &self.config.overrides, self.today);
        let overrides_count = outcome.overrides_count();
        let mut kept = outcome.kept;
        kept.extend(outcome.issues);
        kept.extend(tag_errors);

        let mut result = FileResult::from_diagnostics(path, Some(arch_id.to_string()), kept);
        result.overridden = outcome.overridden;
        result.overrides_count = overrides_count;
        result.imports = parsed.imports.clone();
        result
    }

    /// Every `@override` in the project, for the audit.
    pub fn collect_overrides(&self) -> Result<Vec<OverrideRecord>, ArchError> {
        let files = self.discover()?;
        let per_file: Vec<Vec<OverrideRecord>> = files
            .par_iter()
            .map(|path| match fs::read_to_string(self.root.join(path)) {
                Ok(content) => extract_tags(&content)
                    .overrides
                    .into_iter()
                    .map(|tag| OverrideRecord {
                        path: path.clone(),
                        tag,
                    })
                    .collect(),
                Err(e) => {
                    debug!(path = %path, error = %e, "skipping unreadable file");
                    Vec::new()
                }
            })
            .collect();
        Ok(per_file.into_iter().flatten().collect())
    }
}

fn read_failure(path: &str, error: &str) -> FileResult {
    FileResult::from_diagnostics(
        path,
        None,
        vec![Violation::system(
            codes::S002_FILE_READ,
            "read",
            Severity::Error,
            format!("Cannot read {}: {}", path, error),
            "Check the path and file permissions",
        )],
    )
}

/// Parse failures depend on sidecar models outside the checksum.
fn cacheable(result: &FileResult) -> bool {
    !result
        .violations
        .iter()
        .any(|v| v.code == codes::S001_PARSE_ERROR || v.code == codes::S002_FILE_READ)
}
