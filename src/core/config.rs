//! Project configuration loaded from `.arch/config.toml`.

use crate::core::error::ArchError;
use crate::core::overrides::OverridePolicy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const ARCH_DIR: &str = ".arch";
pub const CONFIG_FILE: &str = "config.toml";
pub const REGISTRY_FILE: &str = "registry.toml";
pub const REGISTRY_DIR: &str = "registry";
pub const DEFAULT_CACHE_PATH: &str = ".arch/cache/validation.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*".to_string()],
            exclude: vec![
                "**/node_modules/**".to_string(),
                "**/target/**".to_string(),
                "**/.git/**".to_string(),
                ".arch/**".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Treat warnings as failures when computing the run outcome.
    pub fail_on_warning: bool,
    /// Emit W002 for files without an `@arch` tag.
    pub report_untagged: bool,
    /// Default templates for `require_test_file` when the constraint value is empty.
    pub test_file_patterns: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            fail_on_warning: false,
            report_untagged: true,
            test_file_patterns: vec![
                "{dir}/{name}.test.{ext}".to_string(),
                "{dir}/{name}.spec.{ext}".to_string(),
                "{dir}/{name}_test.{ext}".to_string(),
                "{dir}/test_{name}.{ext}".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: DEFAULT_CACHE_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Patterns longer than this are rejected before compilation.
    pub max_length: usize,
    /// Matches slower than this are logged.
    pub slow_match_ms: u64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            max_length: 500,
            slow_match_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub files: FilesConfig,
    pub validation: ValidationConfig,
    pub overrides: OverridePolicy,
    pub cache: CacheConfig,
    pub patterns: PatternConfig,
}

impl Config {
    /// Reads `.arch/config.toml`; a missing file means defaults.
    pub fn load(project_root: &Path) -> Result<Self, ArchError> {
        let path = config_path(project_root);
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| ArchError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn checksum(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        format!("{:x}", hasher.finalize())
    }

    pub fn cache_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.cache.path)
    }
}

pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(ARCH_DIR).join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.cache.enabled);
        assert_eq!(config.patterns.slow_match_ms, 100);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join(ARCH_DIR)).unwrap();
        fs::write(
            config_path(tmp.path()),
            "[overrides]\nfail_on_expired = false\n\n[cache]\nenabled = false\n",
        )
        .unwrap();
        let config = Config::load(tmp.path()).unwrap();
        assert!(!config.overrides.fail_on_expired);
        assert!(config.overrides.warn_no_expiry);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.path, DEFAULT_CACHE_PATH);
    }

    #[test]
    fn checksum_changes_with_policy() {
        let a = Config::default();
        let mut b = Config::default();
        b.overrides.max_expiry_days = 30;
        assert_ne!(a.checksum(), b.checksum());
        assert_eq!(a.checksum(), Config::default().checksum());
    }

    #[test]
    fn malformed_config_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join(ARCH_DIR)).unwrap();
        fs::write(config_path(tmp.path()), "[cache\n").unwrap();
        let err = Config::load(tmp.path()).unwrap_err();
        assert_eq!(err.code(), "S005");
    }
}
