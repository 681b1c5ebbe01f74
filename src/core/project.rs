//! Project-wide facts the cross-file validators need: the file set, the
//! resolved internal import graph and file text. Built once per run before
//! any validator executes, then shared read-only.

use crate::core::config::FilesConfig;
use crate::core::error::ArchError;
use crate::core::patterns::glob_match;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extensions tried, in order, when an import omits one.
pub const RESOLVE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "rs", "go", "java", "kt",
];

#[derive(Debug, Default)]
pub struct ProjectIndex {
    root: PathBuf,
    files: BTreeSet<String>,
    imports: BTreeMap<String, Vec<String>>,
    importers: BTreeMap<String, Vec<String>>,
    contents: FxHashMap<String, Arc<str>>,
}

impl ProjectIndex {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registers a file before the import graph is linked.
    pub fn add_file(&mut self, path: &str) {
        self.files.insert(path.to_string());
    }

    pub fn set_content(&mut self, path: &str, content: Arc<str>) {
        self.contents.insert(path.to_string(), content);
    }

    /// Records `path`'s already-resolved internal imports.
    pub fn set_imports(&mut self, path: &str, resolved: Vec<String>) {
        self.imports.insert(path.to_string(), resolved);
    }

    /// Builds the reverse edges. Call once after every file's imports are set.
    pub fn link(&mut self) {
        self.importers.clear();
        for (from, targets) in &self.imports {
            for target in targets {
                self.importers
                    .entry(target.clone())
                    .or_default()
                    .push(from.clone());
            }
        }
        for list in self.importers.values_mut() {
            list.sort();
            list.dedup();
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn imports_of(&self, path: &str) -> &[String] {
        self.imports.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn importers_of(&self, path: &str) -> &[String] {
        self.importers.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn content(&self, path: &str) -> Option<&str> {
        self.contents.get(path).map(|c| &**c)
    }

    /// Resolves an import specifier written in `from` to a project file.
    /// Bare package names resolve to `None`.
    pub fn resolve_module(&self, from: &str, specifier: &str) -> Option<String> {
        resolve_module_in(&self.files, from, specifier)
    }

    /// Shortest import cycle through `start`, restricted to files accepted
    /// by `within`. The returned path begins and ends with `start`.
    pub fn cycle_through(&self, start: &str, within: impl Fn(&str) -> bool) -> Option<Vec<String>> {
        if !within(start) {
            return None;
        }
        let mut parent: FxHashMap<&str, &str> = FxHashMap::default();
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut frontier: Vec<&str> = vec![start];
        seen.insert(start);
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for node in frontier {
                for target in self.imports_of(node) {
                    let target = target.as_str();
                    if !within(target) {
                        continue;
                    }
                    if target == start {
                        let mut cycle = vec![start.to_string()];
                        let mut cur = node;
                        let mut back = vec![cur.to_string()];
                        while let Some(&p) = parent.get(cur) {
                            back.push(p.to_string());
                            cur = p;
                        }
                        back.reverse();
                        cycle.extend(back.into_iter().skip(1));
                        cycle.push(start.to_string());
                        return Some(cycle);
                    }
                    if seen.insert(target) {
                        parent.insert(target, node);
                        next.push(target);
                    }
                }
            }
            frontier = next;
        }
        None
    }

    /// Expands a companion-file template (`{dir}`, `{name}`, `{ext}`) for
    /// `path`. Results escaping the project root are rejected.
    pub fn expand_template(&self, path: &str, template: &str) -> Result<String, ArchError> {
        expand_template(path, template)
    }
}

pub fn expand_template(path: &str, template: &str) -> Result<String, ArchError> {
    let (dir, file) = match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    };
    let (name, ext) = match file.rfind('.') {
        Some(i) if i > 0 => (&file[..i], &file[i + 1..]),
        _ => (file, ""),
    };
    // Root-level files have no directory; drop the separator with it.
    let template_for_dir = if dir.is_empty() {
        template.replace("{dir}/", "")
    } else {
        template.to_string()
    };
    let expanded = template_for_dir
        .replace("{dir}", dir)
        .replace("{name}", name)
        .replace("{ext}", ext);
    let expanded = expanded.trim_start_matches("./");
    normalize(expanded).ok_or_else(|| {
        ArchError::PathTraversal(format!(
            "template '{}' for {} resolves outside the project root",
            template, path
        ))
    })
}

/// Collapses `.` and `..` segments. `None` when the path escapes the root
/// or is absolute.
pub fn normalize(path: &str) -> Option<String> {
    if path.starts_with('/') || path.contains('\\') {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

pub fn resolve_module_in(files: &BTreeSet<String>, from: &str, specifier: &str) -> Option<String> {
    let base = if specifier.starts_with("./") || specifier.starts_with("../") {
        let dir = from.rfind('/').map(|i| &from[..i]).unwrap_or("");
        normalize(&format!("{}/{}", dir, specifier))?
    } else if let Some(rooted) = specifier.strip_prefix("@/").or_else(|| specifier.strip_prefix("~/")) {
        normalize(&format!("src/{}", rooted))?
    } else if specifier.contains('/') {
        normalize(specifier)?
    } else if specifier.contains('.') && !specifier.starts_with('.') {
        // Dotted module path (`app.models.user`).
        specifier.replace('.', "/")
    } else {
        specifier.to_string()
    };

    if files.contains(&base) {
        return Some(base);
    }
    for ext in RESOLVE_EXTENSIONS {
        let candidate = format!("{}.{}", base, ext);
        if files.contains(&candidate) {
            return Some(candidate);
        }
    }
    for ext in RESOLVE_EXTENSIONS {
        let candidate = format!("{}/index.{}", base, ext);
        if files.contains(&candidate) {
            return Some(candidate);
        }
    }
    let package = format!("{}/__init__.py", base);
    files.contains(&package).then_some(package)
}

/// Walks `root` and returns project-relative paths accepted by the
/// include/exclude globs, sorted.
pub fn discover_files(root: &Path, config: &FilesConfig) -> Result<Vec<String>, ArchError> {
    let mut out = Vec::new();
    walk(root, root, config, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk(root: &Path, dir: &Path, config: &FilesConfig, out: &mut Vec<String>) -> Result<(), ArchError> {
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        if path.is_dir() {
            let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
            if name == ".git" || excluded(&format!("{}/", rel), config) {
                continue;
            }
            walk(root, &path, config, out)?;
        } else if path.is_file() && is_included(&rel, config) {
            out.push(rel);
        }
    }
    Ok(())
}

/// Whether a project-relative file path passes the include/exclude globs.
pub fn is_included(rel: &str, config: &FilesConfig) -> bool {
    config.include.iter().any(|g| glob_match(g, rel)) && !excluded(rel, config)
}

fn excluded(rel: &str, config: &FilesConfig) -> bool {
    config.exclude.iter().any(|g| glob_match(g, rel))
}
