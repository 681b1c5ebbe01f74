//! Constraint validators.
//!
//! Each rule is one pure function from `(constraint, context)` to a
//! [`ConstraintResult`]. The [`ValidatorRegistry`] maps rule names to those
//! functions. Validators never perform I/O: everything a check needs about
//! other files is in the [`ProjectIndex`] built before validation starts.
//!
//! Validators by family:
//! - `imports`: import bans and requirements, importers, cycles
//! - `structure`: classes, decorators, naming, sizes, exports
//! - `calls`: call-site and mutation rules
//! - `patterns`: regex rules over file text
//! - `companions`: files that must exist next to this one
//! - `coverage`: cross-file value coverage
//! - `intents`: intent requirements and verification

pub mod calls;
pub mod companions;
pub mod coverage;
pub mod imports;
pub mod intents;
pub mod patterns;
pub mod structure;

use crate::core::codes;
use crate::core::constraint::{Constraint, Rule, Severity};
use crate::core::patterns::{PatternMatcher, PatternRejection};
use crate::core::project::ProjectIndex;
use crate::core::registry::IntentRegistry;
use crate::core::semantic::SemanticModel;
use crate::core::tags::IntentAnnotation;
use crate::core::violation::Violation;
use rustc_hash::FxHashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::OnceLock;
use tracing::warn;

/// Everything a validator may look at for one file.
pub struct ValidationContext<'a> {
    pub file_path: &'a str,
    pub arch_id: &'a str,
    pub model: &'a SemanticModel,
    pub content: &'a str,
    /// File-level and function-level intent annotations.
    pub intents: &'a [IntentAnnotation],
    pub intent_registry: &'a IntentRegistry,
    pub project: &'a ProjectIndex,
    pub patterns: &'a PatternMatcher,
    /// Fallback templates for `require_test_file` with an empty value.
    pub test_file_patterns: &'a [String],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintResult {
    pub passed: bool,
    pub violations: Vec<Violation>,
}

impl ConstraintResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    pub fn fail(violation: Violation) -> Self {
        Self::from_violations(vec![violation])
    }
}

pub type ValidateFn = fn(&Constraint, &ValidationContext<'_>) -> ConstraintResult;

#[derive(Clone, Copy)]
pub struct ValidatorEntry {
    pub rule: Rule,
    pub code: &'static str,
    pub validate: ValidateFn,
}

pub struct ValidatorRegistry {
    entries: FxHashMap<&'static str, ValidatorEntry>,
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ValidatorRegistry {
    pub fn empty() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Every rule in the catalogue.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let table: [(Rule, ValidateFn); 29] = [
            (Rule::MustExtend, structure::must_extend),
            (Rule::Implements, structure::implements),
            (Rule::ForbidImport, imports::forbid_import),
            (Rule::RequireImport, imports::require_import),
            (Rule::AllowImport, imports::allow_import),
            (Rule::RequireDecorator, structure::require_decorator),
            (Rule::ForbidDecorator, structure::forbid_decorator),
            (Rule::NamingPattern, structure::naming_pattern),
            (Rule::LocationPattern, structure::location_pattern),
            (Rule::MaxFileLines, structure::max_file_lines),
            (Rule::MaxPublicMethods, structure::max_public_methods),
            (Rule::RequireTestFile, companions::require_test_file),
            (Rule::ImportableBy, imports::importable_by),
            (Rule::ForbidCircularDeps, imports::forbid_circular_deps),
            (Rule::ForbidCall, calls::forbid_call),
            (Rule::RequireCall, calls::require_call),
            (Rule::RequireTryCatch, calls::require_try_catch),
            (Rule::RequireCallBefore, calls::require_call_before),
            (Rule::ForbidMutation, calls::forbid_mutation),
            (Rule::ForbidPattern, patterns::forbid_pattern),
            (Rule::RequirePattern, patterns::require_pattern),
            (Rule::AllowPattern, patterns::allow_pattern),
            (Rule::RequireOneOf, patterns::require_one_of),
            (Rule::MaxFunctionLines, structure::max_function_lines),
            (Rule::RequireExport, structure::require_export),
            (Rule::RequireCompanionFile, companions::require_companion_file),
            (Rule::RequireCoverage, coverage::require_coverage),
            (Rule::RequireIntent, intents::require_intent),
            (Rule::VerifyIntent, intents::verify_intent),
        ];
        for (rule, validate) in table {
            registry.register(ValidatorEntry {
                rule,
                code: rule.code(),
                validate,
            });
        }
        registry
    }

    /// Adds or replaces the validator for `entry.rule`.
    pub fn register(&mut self, entry: ValidatorEntry) {
        self.entries.insert(entry.rule.as_str(), entry);
    }

    pub fn get_validator(&self, rule: &str) -> Option<&ValidatorEntry> {
        self.entries.get(rule)
    }

    pub fn has_validator(&self, rule: &str) -> bool {
        self.entries.contains_key(rule)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs one constraint, turning an unknown rule into S004 and a
    /// panicking validator into S003. Never panics itself.
    pub fn run(&self, constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
        let Some(entry) = self.get_validator(&constraint.rule) else {
            return ConstraintResult::fail(
                Violation::system(
                    codes::S004_UNKNOWN_RULE,
                    &constraint.rule,
                    Severity::Warning,
                    format!("no validator is registered for rule '{}'", constraint.rule),
                    "Check the rule name in the registry",
                )
                .with_value(constraint.value.clone()),
            );
        };
        match catch_unwind(AssertUnwindSafe(|| (entry.validate)(constraint, ctx))) {
            Ok(result) => result,
            Err(_) => {
                warn!(rule = %constraint.rule, file = ctx.file_path, "validator panicked");
                ConstraintResult::fail(
                    Violation::system(
                        codes::S003_INVALID_CONSTRAINT,
                        &constraint.rule,
                        Severity::Error,
                        format!("validator for '{}' failed on this file", constraint.rule),
                        "Report this as a bug together with the file and constraint",
                    )
                    .with_value(constraint.value.clone()),
                )
            }
        }
    }
}

/// Process-wide registry of the built-in validators.
pub fn builtin_validators() -> &'static ValidatorRegistry {
    static REGISTRY: OnceLock<ValidatorRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ValidatorRegistry::builtin)
}

/// S003 for a constraint whose value has the wrong shape.
pub(crate) fn invalid_value(constraint: &Constraint, expected: &str) -> ConstraintResult {
    ConstraintResult::fail(Violation::for_constraint(
        codes::S003_INVALID_CONSTRAINT,
        constraint,
        constraint.value.clone(),
        format!(
            "'{}' expects {}, found {}",
            constraint.rule,
            expected,
            constraint.value.shape()
        ),
        "Fix the constraint value in the registry",
    ))
}

/// S003/SEC002 for a rejected or invalid regex.
pub(crate) fn rejected_pattern(constraint: &Constraint, pattern: &str, why: &PatternRejection) -> ConstraintResult {
    ConstraintResult::fail(pattern_rejection(constraint, pattern, why))
}

/// The rejection as a violation, for validators that keep checking the
/// remaining patterns.
pub(crate) fn pattern_rejection(constraint: &Constraint, pattern: &str, why: &PatternRejection) -> Violation {
    Violation::for_constraint(
        why.code(),
        constraint,
        constraint.value.clone(),
        format!("pattern '{}' rejected: {}", pattern, why),
        "Simplify the pattern in the registry",
    )
}

/// Text and list values as owned strings.
pub(crate) fn value_list(constraint: &Constraint) -> Option<Vec<String>> {
    constraint
        .value
        .as_list()
        .map(|items| items.into_iter().map(str::to_string).collect())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixture for validator unit tests.

    use super::*;

    pub struct Fixture {
        pub path: String,
        pub model: SemanticModel,
        pub content: String,
        pub intents: Vec<IntentAnnotation>,
        pub intent_registry: IntentRegistry,
        pub project: ProjectIndex,
        pub patterns: PatternMatcher,
        pub test_file_patterns: Vec<String>,
    }

    impl Fixture {
        pub fn new(path: &str, content: &str) -> Self {
            let mut project = ProjectIndex::new(std::path::Path::new("/project"));
            project.add_file(path);
            Self {
                path: path.to_string(),
                model: SemanticModel::from_text(path, content),
                content: content.to_string(),
                intents: Vec::new(),
                intent_registry: IntentRegistry::default(),
                project,
                patterns: PatternMatcher::default(),
                test_file_patterns: vec!["{dir}/{name}.test.{ext}".to_string()],
            }
        }

        pub fn ctx(&self) -> ValidationContext<'_> {
            ValidationContext {
                file_path: &self.path,
                arch_id: "test.arch",
                model: &self.model,
                content: &self.content,
                intents: &self.intents,
                intent_registry: &self.intent_registry,
                project: &self.project,
                patterns: &self.patterns,
                test_file_patterns: &self.test_file_patterns,
            }
        }

        pub fn run(&self, constraint: &Constraint) -> ConstraintResult {
            builtin_validators().run(constraint, &self.ctx())
        }
    }

    pub fn codes_of(result: &ConstraintResult) -> Vec<&str> {
        result.violations.iter().map(|v| v.code.as_str()).collect()
    }
}
