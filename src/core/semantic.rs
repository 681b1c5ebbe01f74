//! Language-agnostic fact sheet for one parsed source file.
//!
//! Produced by a [`LanguageAdapter`](crate::core::adapter::LanguageAdapter);
//! every section is always present (possibly empty). Validators read it and
//! never mutate it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticModel {
    pub file_path: String,
    pub language: String,
    /// Total physical lines.
    pub line_count: usize,
    /// Lines that are neither blank nor comment-only.
    pub loc_count: usize,
    pub imports: Vec<ImportInfo>,
    pub classes: Vec<ClassInfo>,
    pub interfaces: Vec<InterfaceInfo>,
    pub functions: Vec<FunctionInfo>,
    pub function_calls: Vec<CallInfo>,
    pub mutations: Vec<MutationInfo>,
    pub exports: Vec<ExportInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportInfo {
    pub module_specifier: String,
    pub default_import: Option<String>,
    pub named_imports: Vec<String>,
    pub namespace_import: Option<String>,
    pub is_type_only: bool,
    pub line: usize,
}

impl ImportInfo {
    /// Every local binding this import introduces.
    pub fn bound_names(&self) -> impl Iterator<Item = &str> {
        self.default_import
            .iter()
            .chain(self.namespace_import.iter())
            .chain(self.named_imports.iter())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoratorInfo {
    pub name: String,
    pub arguments: Vec<String>,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodInfo {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub decorators: Vec<DecoratorInfo>,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassInfo {
    pub name: String,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    pub decorators: Vec<DecoratorInfo>,
    pub methods: Vec<MethodInfo>,
    pub is_exported: bool,
    pub line: usize,
}

impl ClassInfo {
    pub fn public_method_count(&self) -> usize {
        self.methods
            .iter()
            .filter(|m| m.visibility == Visibility::Public)
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceInfo {
    pub name: String,
    pub extends: Vec<String>,
    pub is_exported: bool,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionInfo {
    pub name: String,
    pub is_exported: bool,
    pub is_async: bool,
    pub decorators: Vec<DecoratorInfo>,
    pub start_line: usize,
    pub end_line: usize,
}

/// Where a call sits relative to error-handling blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlFlow {
    pub in_try_block: bool,
    pub try_depth: u32,
    pub in_catch_block: bool,
    pub in_finally_block: bool,
}

impl ControlFlow {
    pub fn is_guarded(&self) -> bool {
        self.in_try_block || self.try_depth >= 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallInfo {
    /// Full callee expression, e.g. `api.client.get`.
    pub callee: String,
    pub method_name: String,
    pub receiver: Option<String>,
    pub argument_count: usize,
    pub line: usize,
    pub column: usize,
    pub parent_function: Option<String>,
    pub control_flow: ControlFlow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationInfo {
    /// Full target expression, e.g. `process.env.NODE_ENV`.
    pub target: String,
    pub root_object: String,
    pub property_path: Vec<String>,
    pub operator: String,
    pub is_declaration: bool,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportInfo {
    pub name: String,
    pub kind: String,
    pub is_default: bool,
    pub line: usize,
}

impl SemanticModel {
    /// Facts every adapter can compute without a grammar: line counts only.
    pub fn from_text(file_path: &str, content: &str) -> Self {
        let (line_count, loc_count) = count_lines(content);
        Self {
            file_path: file_path.to_string(),
            language: language_for_path(file_path).to_string(),
            line_count,
            loc_count,
            ..Self::default()
        }
    }

    pub fn function_at(&self, line: usize) -> Option<&FunctionInfo> {
        self.functions
            .iter()
            .find(|f| f.start_line <= line && line <= f.end_line)
    }
}

/// Returns `(total_lines, lines_of_code)`; comment-only lines for `//`, `#`,
/// `--` and `/* */` blocks are excluded from the second figure.
pub fn count_lines(content: &str) -> (usize, usize) {
    let mut total = 0;
    let mut loc = 0;
    let mut in_block = false;
    for line in content.lines() {
        total += 1;
        let trimmed = line.trim();
        if in_block {
            if let Some(end) = trimmed.find("*/") {
                in_block = false;
                if !trimmed[end + 2..].trim().is_empty() {
                    loc += 1;
                }
            }
            continue;
        }
        if trimmed.is_empty()
            || trimmed.starts_with("//")
            || trimmed.starts_with('#')
            || trimmed.starts_with("--")
        {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("/*") {
            match rest.find("*/") {
                Some(end) if !rest[end + 2..].trim().is_empty() => loc += 1,
                Some(_) => {}
                None => in_block = true,
            }
            continue;
        }
        loc += 1;
    }
    (total, loc)
}

pub fn language_for_path(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" => "python",
        "go" => "go",
        "rs" => "rust",
        "java" => "java",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_lines_skips_comments_and_blanks() {
        let src = "// header\n\nimport x from 'y';\n/* block\n still */\nconst a = 1; // trailing\n# py comment\n";
        let (total, loc) = count_lines(src);
        assert_eq!(total, 7);
        assert_eq!(loc, 2);
    }

    #[test]
    fn single_line_block_comment_followed_by_code_counts() {
        let (_, loc) = count_lines("/* x */ let y = 1;\n/* only */\n");
        assert_eq!(loc, 1);
    }

    #[test]
    fn missing_sections_deserialize_as_empty() {
        let model: SemanticModel =
            serde_json::from_str(r#"{"file_path":"a.ts","line_count":3}"#).unwrap();
        assert!(model.imports.is_empty());
        assert!(model.function_calls.is_empty());
        assert_eq!(model.line_count, 3);
    }

    #[test]
    fn public_methods_exclude_private() {
        let class = ClassInfo {
            methods: vec![
                MethodInfo {
                    name: "a".into(),
                    ..MethodInfo::default()
                },
                MethodInfo {
                    name: "b".into(),
                    visibility: Visibility::Private,
                    ..MethodInfo::default()
                },
            ],
            ..ClassInfo::default()
        };
        assert_eq!(class.public_method_count(), 1);
    }
}
