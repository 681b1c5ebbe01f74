use crate::core::codes;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Registry error in {path}: {message}")]
    RegistryError { path: PathBuf, message: String },
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),
    #[error("Parse error in {path}: {message}")]
    ParseError { path: String, message: String },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Path escapes project root: {0}")]
    PathTraversal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl ArchError {
    /// Taxonomy code surfaced to callers for system-level failures.
    pub fn code(&self) -> &'static str {
        match self {
            Self::IoError(_) | Self::NotFound(_) | Self::Watch(_) => codes::S002_FILE_READ,
            Self::TomlError(_) | Self::JsonError(_) | Self::ParseError { .. } => {
                codes::S001_PARSE_ERROR
            }
            Self::RegistryError { .. } | Self::Resolution(_) | Self::ConfigError(_) => {
                codes::S005_INVALID_REGISTRY
            }
            Self::ValidationError(_) => codes::S003_INVALID_CONSTRAINT,
            Self::PathTraversal(_) => codes::SEC001_PATH_TRAVERSAL,
        }
    }
}

/// Failures while flattening an architecture. Fatal only for the files tagged
/// with an architecture that depends on the broken node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Unknown architecture '{id}' (chain: {})", chain.join(" -> "))]
    UnknownArch { id: String, chain: Vec<String> },
    #[error("Circular inheritance at '{id}' (chain: {})", chain.join(" -> "))]
    CircularInheritance { id: String, chain: Vec<String> },
    #[error("Architecture '{arch_id}' references undefined mixin '{mixin}'")]
    MissingMixin { arch_id: String, mixin: String },
}

impl ResolutionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownArch { .. } => "UNKNOWN_ARCH",
            Self::CircularInheritance { .. } => "CIRCULAR_INHERITANCE",
            Self::MissingMixin { .. } => "MISSING_MIXIN",
        }
    }

    /// The id the caller should look at to fix the registry.
    pub fn offending_id(&self) -> &str {
        match self {
            Self::UnknownArch { id, .. } | Self::CircularInheritance { id, .. } => id,
            Self::MissingMixin { mixin, .. } => mixin,
        }
    }
}
