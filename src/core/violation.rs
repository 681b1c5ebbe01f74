//! Diagnostics and per-file results.

use crate::core::constraint::{Constraint, ConstraintValue, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured auto-fix a caller may apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Suggestion {
    ReplaceImport { from: String, to: String },
    RemoveImport { module: String },
    AddImport { module: String },
    AddDecorator { name: String },
    RenameFile { pattern: String },
    CreateFile { path: String },
}

/// One diagnostic. Never mutated after creation except by the override
/// engine, which only moves it between lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    pub rule: String,
    pub value: ConstraintValue,
    pub severity: Severity,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub message: String,
    pub fix_hint: String,
    /// Architecture (or `mixin:<name>`) that contributed the constraint.
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Suggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did_you_mean: Option<String>,
}

impl Violation {
    /// A violation raised by evaluating `constraint`; severity and source are
    /// inherited from the constraint.
    pub fn for_constraint(
        code: &str,
        constraint: &Constraint,
        value: ConstraintValue,
        message: impl Into<String>,
        fix_hint: impl Into<String>,
    ) -> Self {
        let mut fix_hint = fix_hint.into();
        if let Some(why) = &constraint.why {
            fix_hint = format!("{} ({})", fix_hint, why);
        }
        Self {
            code: code.to_string(),
            rule: constraint.rule.clone(),
            value,
            severity: constraint.severity,
            line: None,
            column: None,
            message: message.into(),
            fix_hint,
            source: constraint.source.clone(),
            suggestion: None,
            did_you_mean: None,
        }
    }

    /// A diagnostic not tied to a registry constraint (system, override, tag).
    pub fn system(
        code: &str,
        rule: &str,
        severity: Severity,
        message: impl Into<String>,
        fix_hint: impl Into<String>,
    ) -> Self {
        Self {
            code: code.to_string(),
            rule: rule.to_string(),
            value: ConstraintValue::Text(String::new()),
            severity,
            line: None,
            column: None,
            message: message.into(),
            fix_hint: fix_hint.into(),
            source: None,
            suggestion: None,
            did_you_mean: None,
        }
    }

    pub fn at(mut self, line: usize) -> Self {
        if line > 0 {
            self.line = Some(line);
        }
        self
    }

    pub fn at_column(mut self, line: usize, column: usize) -> Self {
        self = self.at(line);
        if column > 0 {
            self.column = Some(column);
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn with_did_you_mean(mut self, candidate: impl Into<String>) -> Self {
        self.did_you_mean = Some(candidate.into());
        self
    }

    pub fn with_value(mut self, value: ConstraintValue) -> Self {
        self.value = value;
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[{}] line {}: {}", self.code, line, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Warn => write!(f, "warn"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Validation outcome for one file, as handed to callers and the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    pub path: String,
    pub arch_id: Option<String>,
    pub status: FileStatus,
    pub violations: Vec<Violation>,
    pub warnings: Vec<Violation>,
    /// Violations suppressed by a matching override.
    pub overridden: Vec<Violation>,
    pub overrides_count: usize,
    /// Resolved project-relative import targets.
    pub imports: Vec<String>,
    /// True when served from the persistent cache.
    #[serde(default)]
    pub from_cache: bool,
}

impl FileResult {
    /// Sorts raw diagnostics into errors and warnings and derives the status.
    pub fn from_diagnostics(path: &str, arch_id: Option<String>, diagnostics: Vec<Violation>) -> Self {
        let (violations, warnings): (Vec<_>, Vec<_>) = diagnostics
            .into_iter()
            .partition(|v| v.severity == Severity::Error);
        let mut out = Self {
            path: path.to_string(),
            arch_id,
            violations,
            warnings,
            ..Self::default()
        };
        out.refresh_status();
        out
    }

    pub fn refresh_status(&mut self) {
        self.status = if !self.violations.is_empty() {
            FileStatus::Fail
        } else if !self.warnings.is_empty() {
            FileStatus::Warn
        } else {
            FileStatus::Pass
        };
    }

    pub fn passed(&self) -> bool {
        self.status != FileStatus::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constraint::Rule;

    #[test]
    fn why_is_appended_to_fix_hint() {
        let mut c = Constraint::new(Rule::ForbidImport, ConstraintValue::List(vec!["axios".into()]));
        c.why = Some("use the shared http client".into());
        c.source = Some("domain.service".into());
        let v = Violation::for_constraint(
            "E003",
            &c,
            ConstraintValue::Text("axios".into()),
            "import 'axios' is forbidden",
            "remove the import",
        )
        .at(4);
        assert_eq!(v.line, Some(4));
        assert!(v.fix_hint.contains("shared http client"));
        assert_eq!(v.source.as_deref(), Some("domain.service"));
        assert_eq!(v.to_string(), "[E003] line 4: import 'axios' is forbidden");
    }

    #[test]
    fn status_derives_from_lists() {
        let warn = Violation::system("W002", "arch_tag", Severity::Warning, "untagged", "add @arch");
        let result = FileResult::from_diagnostics("a.ts", None, vec![warn]);
        assert_eq!(result.status, FileStatus::Warn);
        assert!(result.passed());
    }
}
