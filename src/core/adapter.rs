//! Language adapters: the seam between source text and [`SemanticModel`].
//!
//! Full grammars live outside this crate. An external parser may drop one
//! JSON model per source file under `.arch/models/<path>.json`; the
//! [`SidecarAdapter`] reads those and falls back to the
//! [`PlainTextAdapter`], which derives line counts, imports and exports
//! from text alone.

use crate::core::config::ARCH_DIR;
use crate::core::error::ArchError;
use crate::core::semantic::{ExportInfo, ImportInfo, SemanticModel};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const MODELS_DIR: &str = "models";

pub trait LanguageAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Parses one file. Failures become an S001 diagnostic for that file only.
    fn parse(&self, path: &str, content: &str) -> Result<SemanticModel, ArchError>;

    /// Input besides the source text that the model is built from. It is
    /// folded into the file's cache checksum.
    fn model_input(&self, _path: &str) -> Option<String> {
        None
    }
}

/// Source file a sidecar model belongs to: `.arch/models/src/a.ts.json`
/// maps to `src/a.ts`.
pub fn model_owner(rel: &str) -> Option<&str> {
    rel.strip_prefix(ARCH_DIR)?
        .strip_prefix('/')?
        .strip_prefix(MODELS_DIR)?
        .strip_prefix('/')?
        .strip_suffix(".json")
        .filter(|owner| !owner.is_empty())
}

static ES_IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s+(type\s+)?([^'"]*?)\s*from\s*['"]([^'"]+)['"]"#).unwrap()
});
static ES_IMPORT_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#).unwrap());
static REQUIRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
static PY_FROM_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*from\s+([\w.]+)\s+import\s+(.+)$").unwrap());
static PY_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+([\w.]+)(?:\s+as\s+(\w+))?\s*$").unwrap());
static ES_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*export\s+(default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(function\*?|class|const|let|var|interface|type|enum)\s+(\w+)",
    )
    .unwrap()
});
static ES_EXPORT_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*export\s*\{([^}]*)\}").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextAdapter;

impl LanguageAdapter for PlainTextAdapter {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn parse(&self, path: &str, content: &str) -> Result<SemanticModel, ArchError> {
        let mut model = SemanticModel::from_text(path, content);
        let python = model.language == "python";
        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            if python {
                scan_python_line(line, line_no, &mut model);
            } else {
                scan_es_line(line, line_no, &mut model);
            }
        }
        Ok(model)
    }
}

fn scan_es_line(line: &str, line_no: usize, model: &mut SemanticModel) {
    if let Some(caps) = ES_IMPORT_FROM.captures(line) {
        let mut import = parse_import_clause(&caps[2]);
        import.module_specifier = caps[3].to_string();
        import.is_type_only = caps.get(1).is_some();
        import.line = line_no;
        model.imports.push(import);
    } else if let Some(caps) = ES_IMPORT_BARE.captures(line) {
        model.imports.push(ImportInfo {
            module_specifier: caps[1].to_string(),
            line: line_no,
            ..ImportInfo::default()
        });
    }
    for caps in REQUIRE.captures_iter(line) {
        model.imports.push(ImportInfo {
            module_specifier: caps[1].to_string(),
            line: line_no,
            ..ImportInfo::default()
        });
    }
    if let Some(caps) = ES_EXPORT.captures(line) {
        model.exports.push(ExportInfo {
            name: caps[3].to_string(),
            kind: caps[2].trim_end_matches('*').to_string(),
            is_default: caps.get(1).is_some(),
            line: line_no,
        });
    } else if let Some(caps) = ES_EXPORT_LIST.captures(line) {
        for item in caps[1].split(',') {
            let name = item.rsplit(" as ").next().unwrap_or("").trim();
            if !name.is_empty() {
                model.exports.push(ExportInfo {
                    name: name.to_string(),
                    kind: "binding".to_string(),
                    is_default: name == "default",
                    line: line_no,
                });
            }
        }
    }
}

fn scan_python_line(line: &str, line_no: usize, model: &mut SemanticModel) {
    if let Some(caps) = PY_FROM_IMPORT.captures(line) {
        let named = caps[2]
            .trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace())
            .split(',')
            .map(|n| n.split(" as ").next().unwrap_or("").trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        model.imports.push(ImportInfo {
            module_specifier: caps[1].to_string(),
            named_imports: named,
            line: line_no,
            ..ImportInfo::default()
        });
    } else if let Some(caps) = PY_IMPORT.captures(line) {
        model.imports.push(ImportInfo {
            module_specifier: caps[1].to_string(),
            namespace_import: caps.get(2).map(|m| m.as_str().to_string()),
            line: line_no,
            ..ImportInfo::default()
        });
    }
}

/// `Default, { a, b as c }` / `* as ns` -> binding names.
fn parse_import_clause(clause: &str) -> ImportInfo {
    let mut import = ImportInfo::default();
    let clause = clause.trim();
    let (head, braces) = match clause.find('{') {
        Some(open) => {
            let close = clause.rfind('}').unwrap_or(clause.len());
            (&clause[..open], Some(&clause[open + 1..close.max(open + 1)]))
        }
        None => (clause, None),
    };
    for part in head.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(ns) = part.strip_prefix('*') {
            import.namespace_import = ns.trim().strip_prefix("as").map(|n| n.trim().to_string());
        } else {
            import.default_import = Some(part.to_string());
        }
    }
    if let Some(inner) = braces {
        import.named_imports = inner
            .split(',')
            .map(|n| n.trim().trim_start_matches("type ").split(" as ").next().unwrap_or("").trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
    }
    import
}

/// Reads externally produced models, falling back to text facts.
#[derive(Debug, Clone)]
pub struct SidecarAdapter {
    models_dir: PathBuf,
    fallback: PlainTextAdapter,
}

impl SidecarAdapter {
    pub fn new(project_root: &Path) -> Self {
        Self {
            models_dir: project_root.join(ARCH_DIR).join(MODELS_DIR),
            fallback: PlainTextAdapter,
        }
    }

    fn sidecar_path(&self, path: &str) -> PathBuf {
        self.models_dir.join(format!("{}.json", path))
    }
}

impl LanguageAdapter for SidecarAdapter {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    fn model_input(&self, path: &str) -> Option<String> {
        fs::read_to_string(self.sidecar_path(path)).ok()
    }

    fn parse(&self, path: &str, content: &str) -> Result<SemanticModel, ArchError> {
        let sidecar = self.sidecar_path(path);
        if !sidecar.exists() {
            return self.fallback.parse(path, content);
        }
        let raw = fs::read_to_string(&sidecar)?;
        let mut model: SemanticModel = serde_json::from_str(&raw).map_err(|e| ArchError::ParseError {
            path: path.to_string(),
            message: format!("{}: {}", sidecar.display(), e),
        })?;
        // Line facts always come from the current text.
        let text = SemanticModel::from_text(path, content);
        model.file_path = text.file_path;
        model.line_count = text.line_count;
        model.loc_count = text.loc_count;
        if model.language.is_empty() {
            model.language = text.language;
        }
        Ok(model)
    }
}
