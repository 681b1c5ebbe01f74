//! Constraint model: one rule instance attached to an architecture or mixin.

use crate::core::codes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// How multi-value requirements are satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

/// Every rule the validator registry knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rule {
    MustExtend,
    Implements,
    ForbidImport,
    RequireImport,
    AllowImport,
    RequireDecorator,
    ForbidDecorator,
    NamingPattern,
    LocationPattern,
    MaxFileLines,
    MaxPublicMethods,
    RequireTestFile,
    ImportableBy,
    ForbidCircularDeps,
    ForbidCall,
    RequireCall,
    RequireTryCatch,
    RequireCallBefore,
    ForbidMutation,
    ForbidPattern,
    RequirePattern,
    AllowPattern,
    RequireOneOf,
    MaxFunctionLines,
    RequireExport,
    RequireCompanionFile,
    RequireCoverage,
    RequireIntent,
    VerifyIntent,
}

impl Rule {
    pub const ALL: [Rule; 29] = [
        Rule::MustExtend,
        Rule::Implements,
        Rule::ForbidImport,
        Rule::RequireImport,
        Rule::AllowImport,
        Rule::RequireDecorator,
        Rule::ForbidDecorator,
        Rule::NamingPattern,
        Rule::LocationPattern,
        Rule::MaxFileLines,
        Rule::MaxPublicMethods,
        Rule::RequireTestFile,
        Rule::ImportableBy,
        Rule::ForbidCircularDeps,
        Rule::ForbidCall,
        Rule::RequireCall,
        Rule::RequireTryCatch,
        Rule::RequireCallBefore,
        Rule::ForbidMutation,
        Rule::ForbidPattern,
        Rule::RequirePattern,
        Rule::AllowPattern,
        Rule::RequireOneOf,
        Rule::MaxFunctionLines,
        Rule::RequireExport,
        Rule::RequireCompanionFile,
        Rule::RequireCoverage,
        Rule::RequireIntent,
        Rule::VerifyIntent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MustExtend => "must_extend",
            Self::Implements => "implements",
            Self::ForbidImport => "forbid_import",
            Self::RequireImport => "require_import",
            Self::AllowImport => "allow_import",
            Self::RequireDecorator => "require_decorator",
            Self::ForbidDecorator => "forbid_decorator",
            Self::NamingPattern => "naming_pattern",
            Self::LocationPattern => "location_pattern",
            Self::MaxFileLines => "max_file_lines",
            Self::MaxPublicMethods => "max_public_methods",
            Self::RequireTestFile => "require_test_file",
            Self::ImportableBy => "importable_by",
            Self::ForbidCircularDeps => "forbid_circular_deps",
            Self::ForbidCall => "forbid_call",
            Self::RequireCall => "require_call",
            Self::RequireTryCatch => "require_try_catch",
            Self::RequireCallBefore => "require_call_before",
            Self::ForbidMutation => "forbid_mutation",
            Self::ForbidPattern => "forbid_pattern",
            Self::RequirePattern => "require_pattern",
            Self::AllowPattern => "allow_pattern",
            Self::RequireOneOf => "require_one_of",
            Self::MaxFunctionLines => "max_function_lines",
            Self::RequireExport => "require_export",
            Self::RequireCompanionFile => "require_companion_file",
            Self::RequireCoverage => "require_coverage",
            Self::RequireIntent => "require_intent",
            Self::VerifyIntent => "verify_intent",
        }
    }

    pub fn from_name(name: &str) -> Option<Rule> {
        Rule::ALL.iter().copied().find(|r| r.as_str() == name)
    }

    /// Error code owned by the validator for this rule. `verify_intent`
    /// reports through the `I00x` family and owns I002 as its primary code.
    pub fn code(self) -> &'static str {
        match self {
            Self::MustExtend => codes::E001_MUST_EXTEND,
            Self::Implements => codes::E002_IMPLEMENTS,
            Self::ForbidImport => codes::E003_FORBID_IMPORT,
            Self::RequireImport => codes::E004_REQUIRE_IMPORT,
            Self::AllowImport => codes::E005_ALLOW_IMPORT,
            Self::RequireDecorator => codes::E006_REQUIRE_DECORATOR,
            Self::ForbidDecorator => codes::E007_FORBID_DECORATOR,
            Self::NamingPattern => codes::E008_NAMING_PATTERN,
            Self::LocationPattern => codes::E009_LOCATION_PATTERN,
            Self::MaxFileLines => codes::E010_MAX_FILE_LINES,
            Self::MaxPublicMethods => codes::E011_MAX_PUBLIC_METHODS,
            Self::RequireTestFile => codes::E012_REQUIRE_TEST_FILE,
            Self::ImportableBy => codes::E013_IMPORTABLE_BY,
            Self::ForbidCircularDeps => codes::E014_FORBID_CIRCULAR_DEPS,
            Self::ForbidCall => codes::E015_FORBID_CALL,
            Self::RequireCall => codes::E016_REQUIRE_CALL,
            Self::RequireTryCatch => codes::E017_REQUIRE_TRY_CATCH,
            Self::RequireCallBefore => codes::E018_REQUIRE_CALL_BEFORE,
            Self::ForbidMutation => codes::E019_FORBID_MUTATION,
            Self::ForbidPattern => codes::E020_FORBID_PATTERN,
            Self::RequirePattern => codes::E021_REQUIRE_PATTERN,
            Self::AllowPattern => codes::E022_ALLOW_PATTERN,
            Self::RequireOneOf => codes::E023_REQUIRE_ONE_OF,
            Self::MaxFunctionLines => codes::E024_MAX_FUNCTION_LINES,
            Self::RequireExport => codes::E025_REQUIRE_EXPORT,
            Self::RequireCompanionFile => codes::E026_REQUIRE_COMPANION_FILE,
            Self::RequireCoverage => codes::E027_REQUIRE_COVERAGE,
            Self::RequireIntent => codes::E028_REQUIRE_INTENT,
            Self::VerifyIntent => codes::I002_INTENT_PATTERN,
        }
    }

    /// Rules where at most one instance survives flattening.
    pub fn is_singleton(self) -> bool {
        matches!(
            self,
            Self::MaxFileLines
                | Self::MaxPublicMethods
                | Self::MaxFunctionLines
                | Self::NamingPattern
                | Self::LocationPattern
                | Self::MustExtend
        )
    }

    /// The rule whose inherited entries this rule removes, if any.
    pub fn negates(self) -> Option<Rule> {
        match self {
            Self::AllowImport => Some(Self::ForbidImport),
            Self::AllowPattern => Some(Self::ForbidPattern),
            _ => None,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured value for `require_coverage`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoverageSpec {
    /// `export`, `string_literal` or `pattern`.
    pub source_type: String,
    /// For `pattern`: regex whose first capture group is the value.
    #[serde(default)]
    pub source_pattern: Option<String>,
    /// Text that must appear in some target file; `${value}` is substituted.
    pub target_pattern: String,
    /// Glob selecting candidate target files.
    pub in_target_files: String,
}

/// Constraint value polymorphism. Each validator narrows to the shape it
/// expects and reports a malformed constraint otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintValue {
    Number(i64),
    Text(String),
    List(Vec<String>),
    Coverage(CoverageSpec),
}

impl ConstraintValue {
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::List(_) => "string list",
            Self::Coverage(_) => "coverage object",
        }
    }

    /// Text and list values flattened to a list; `None` for other shapes.
    pub fn as_list(&self) -> Option<Vec<&str>> {
        match self {
            Self::Text(s) => Some(vec![s.as_str()]),
            Self::List(items) => Some(items.iter().map(String::as_str).collect()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numbers, or text holding a non-negative integer.
    pub fn as_limit(&self) -> Option<usize> {
        match self {
            Self::Number(n) if *n >= 0 => Some(*n as usize),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Override matching: string equality for scalars, set equality for lists.
    /// An override value with commas is read as a list.
    pub fn matches_override(&self, raw: &str) -> bool {
        let wanted: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        match self {
            Self::Number(n) => wanted.len() == 1 && wanted[0] == n.to_string(),
            Self::Text(s) => wanted.len() == 1 && wanted[0] == s,
            Self::List(items) => {
                let mut have: Vec<&str> = items.iter().map(String::as_str).collect();
                let mut want = wanted;
                have.sort_unstable();
                have.dedup();
                want.sort_unstable();
                want.dedup();
                have == want
            }
            Self::Coverage(_) => false,
        }
    }
}

impl fmt::Display for ConstraintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
            Self::Coverage(c) => write!(f, "coverage({} -> {})", c.source_type, c.in_target_files),
        }
    }
}

/// One rule instance as written in the registry. `source` is filled by the
/// resolver with the architecture or mixin that contributed it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    pub rule: String,
    pub value: ConstraintValue,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
    #[serde(default, rename = "match")]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub exclude_comments: bool,
    /// `require_try_catch`: call names or globs that must be guarded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub around: Vec<String>,
    /// `require_call_before`: calls that must precede the target.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<String>,
    /// `forbid_call`: functions in which the call is allowed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unless: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Constraint {
    pub fn new(rule: Rule, value: ConstraintValue) -> Self {
        Self {
            rule: rule.as_str().to_string(),
            value,
            severity: Severity::Error,
            why: None,
            alternatives: Vec::new(),
            match_mode: MatchMode::All,
            exclude_comments: false,
            around: Vec::new(),
            before: Vec::new(),
            unless: Vec::new(),
            source: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn known_rule(&self) -> Option<Rule> {
        Rule::from_name(&self.rule)
    }

    /// Replaces `${key}` placeholders with mixin parameters.
    pub fn substitute(&self, params: &BTreeMap<String, String>) -> Constraint {
        if params.is_empty() {
            return self.clone();
        }
        let apply = |text: &str| {
            params.iter().fold(text.to_string(), |acc, (k, v)| {
                acc.replace(&format!("${{{}}}", k), v)
            })
        };
        let mut out = self.clone();
        out.value = match &self.value {
            ConstraintValue::Text(s) => {
                let replaced = apply(s);
                match replaced.parse::<i64>() {
                    Ok(n) if s.starts_with("${") && s.ends_with('}') => ConstraintValue::Number(n),
                    _ => ConstraintValue::Text(replaced),
                }
            }
            ConstraintValue::List(items) => {
                ConstraintValue::List(items.iter().map(|i| apply(i)).collect())
            }
            other => other.clone(),
        };
        out.why = self.why.as_deref().map(apply);
        out
    }
}
