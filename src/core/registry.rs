//! Registry store: architecture nodes, mixins and intents loaded from TOML.
//!
//! The registry may be a single `.arch/registry.toml` or split across
//! `.arch/registry/*.toml`. Files are read in path order so the merged
//! result (and its checksum) does not depend on directory iteration order.

use crate::core::config;
use crate::core::constraint::Constraint;
use crate::core::error::ArchError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reference to a mixin, optionally parameterized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MixinRef {
    Named(String),
    Parameterized {
        name: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
}

impl MixinRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) | Self::Parameterized { name, .. } => name,
        }
    }

    pub fn params(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Named(_) => None,
            Self::Parameterized { params, .. } => Some(params),
        }
    }
}

/// A named policy bundle. Immutable after load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitectureNode {
    #[serde(skip)]
    pub id: String,
    pub inherits: Option<String>,
    pub mixins: Vec<MixinRef>,
    pub constraints: Vec<Constraint>,
    pub hints: Vec<String>,
    pub description: Option<String>,
    pub rationale: Option<String>,
    pub deprecated_from: Option<String>,
    pub migration_guide: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mixin {
    #[serde(skip)]
    pub name: String,
    pub description: Option<String>,
    pub constraints: Vec<Constraint>,
    pub hints: Vec<String>,
}

/// Declared behavioural property of a file or function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentDefinition {
    #[serde(skip)]
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Regexes that must all match the file text.
    pub requires: Vec<String>,
    /// Regexes that must not match the file text.
    pub forbids: Vec<String>,
    pub conflicts_with: Vec<String>,
    pub requires_intent: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntentRegistry {
    intents: BTreeMap<String, IntentDefinition>,
}

impl IntentRegistry {
    pub fn new(intents: impl IntoIterator<Item = IntentDefinition>) -> Self {
        Self {
            intents: intents.into_iter().map(|i| (i.name.clone(), i)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&IntentDefinition> {
        self.intents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.intents.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.intents.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

/// On-disk shape of one registry file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegistryFile {
    architectures: BTreeMap<String, ArchitectureNode>,
    mixins: BTreeMap<String, Mixin>,
    intents: BTreeMap<String, IntentDefinition>,
}

/// Non-fatal problem found while loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryIssue {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Registry {
    pub nodes: BTreeMap<String, ArchitectureNode>,
    pub mixins: BTreeMap<String, Mixin>,
    pub intents: IntentRegistry,
    #[serde(skip)]
    pub issues: Vec<RegistryIssue>,
    #[serde(skip)]
    pub sources: Vec<PathBuf>,
}

impl Registry {
    /// Loads every registry file under `project_root`. A project without any
    /// registry file yields an empty registry.
    pub fn load(project_root: &Path) -> Result<Self, ArchError> {
        let mut registry = Registry::default();
        for path in registry_files(project_root)? {
            let content = fs::read_to_string(&path)?;
            registry.merge_str(&content, &path)?;
        }
        for issue in &registry.issues {
            warn!(path = %issue.path.display(), "{}", issue.message);
        }
        debug!(
            architectures = registry.nodes.len(),
            mixins = registry.mixins.len(),
            intents = registry.intents.len(),
            "registry loaded"
        );
        Ok(registry)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ArchError> {
        let mut registry = Registry::default();
        registry.merge_str(content, Path::new("<inline>"))?;
        Ok(registry)
    }

    /// Merges one file. Ids defined twice keep the first definition and
    /// record an issue.
    pub fn merge_str(&mut self, content: &str, path: &Path) -> Result<(), ArchError> {
        let file: RegistryFile = toml::from_str(content).map_err(|e| ArchError::RegistryError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.sources.push(path.to_path_buf());

        for (id, mut node) in file.architectures {
            if self.nodes.contains_key(&id) {
                self.issues.push(RegistryIssue {
                    path: path.to_path_buf(),
                    message: format!("architecture '{}' is defined more than once", id),
                });
                continue;
            }
            node.id = id.clone();
            self.nodes.insert(id, node);
        }
        for (name, mut mixin) in file.mixins {
            if self.mixins.contains_key(&name) {
                self.issues.push(RegistryIssue {
                    path: path.to_path_buf(),
                    message: format!("mixin '{}' is defined more than once", name),
                });
                continue;
            }
            mixin.name = name.clone();
            self.mixins.insert(name, mixin);
        }
        let mut intents = std::mem::take(&mut self.intents).intents;
        for (name, mut intent) in file.intents {
            if intents.contains_key(&name) {
                self.issues.push(RegistryIssue {
                    path: path.to_path_buf(),
                    message: format!("intent '{}' is defined more than once", name),
                });
                continue;
            }
            intent.name = name.clone();
            intents.insert(name, intent);
        }
        self.intents = IntentRegistry { intents };
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ArchitectureNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// SHA-256 of the canonical JSON form. Formatting-only edits to the
    /// TOML files leave it unchanged; any constraint change alters it.
    pub fn checksum(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        format!("{:x}", hasher.finalize())
    }

    /// Registered id closest to `id` by edit distance, if reasonably close.
    pub fn closest_id(&self, id: &str) -> Option<String> {
        closest(id, self.ids())
    }
}

/// Registry files in deterministic order.
pub fn registry_files(project_root: &Path) -> Result<Vec<PathBuf>, ArchError> {
    let arch_dir = project_root.join(config::ARCH_DIR);
    let mut files = Vec::new();
    let single = arch_dir.join(config::REGISTRY_FILE);
    if single.is_file() {
        files.push(single);
    }
    let dir = arch_dir.join(config::REGISTRY_DIR);
    if dir.is_dir() {
        let mut split = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                split.push(path);
            }
        }
        split.sort();
        files.extend(split);
    }
    Ok(files)
}

pub fn closest<'a>(needle: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    let threshold = (needle.len() / 3).max(2);
    candidates
        .map(|c| (edit_distance(needle, c), c))
        .filter(|(d, _)| *d <= threshold)
        .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
        .map(|(_, c)| c.to_string())
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut cur = vec![i + 1; b_chars.len() + 1];
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        prev = cur;
    }
    prev[b_chars.len()]
}
