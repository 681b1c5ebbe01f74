//! Import rules: bans, requirements, allowed importers and cycles.

use super::{ConstraintResult, ValidationContext, invalid_value, value_list};
use crate::core::codes;
use crate::core::constraint::{Constraint, ConstraintValue, MatchMode};
use crate::core::patterns::glob_match;
use crate::core::semantic::ImportInfo;
use crate::core::violation::{Suggestion, Violation};

/// An entry matches an import by exact specifier, path prefix (`entry/...`),
/// glob, bound name, or the project file the import resolves to.
pub fn import_matches(entry: &str, import: &ImportInfo, ctx: &ValidationContext<'_>) -> bool {
    let spec = import.module_specifier.as_str();
    if spec == entry {
        return true;
    }
    if spec
        .strip_prefix(entry)
        .is_some_and(|rest| rest.starts_with('/'))
    {
        return true;
    }
    if entry.contains('*') && glob_match(entry, spec) {
        return true;
    }
    if import.bound_names().any(|name| name == entry) {
        return true;
    }
    if entry.contains('/')
        && let Some(target) = ctx.project.resolve_module(ctx.file_path, spec)
    {
        return target == entry
            || target.starts_with(&format!("{}/", entry.trim_end_matches('/')))
            || (entry.contains('*') && glob_match(entry, &target));
    }
    false
}

pub fn forbid_import(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(entries) = value_list(constraint) else {
        return invalid_value(constraint, "a module name or list of module names");
    };
    let mut violations = Vec::new();
    for import in &ctx.model.imports {
        let Some(entry) = entries.iter().find(|e| import_matches(e, import, ctx)) else {
            continue;
        };
        let spec = &import.module_specifier;
        let hint = match constraint.alternatives.as_slice() {
            [] => format!("Remove the import of '{}'", spec),
            alts => format!("Use {} instead", alts.join(" or ")),
        };
        let suggestion = match constraint.alternatives.as_slice() {
            [only] => Suggestion::ReplaceImport {
                from: spec.clone(),
                to: only.clone(),
            },
            _ => Suggestion::RemoveImport {
                module: spec.clone(),
            },
        };
        violations.push(
            Violation::for_constraint(
                codes::E003_FORBID_IMPORT,
                constraint,
                ConstraintValue::Text(entry.clone()),
                format!("Import '{}' is forbidden in {}", spec, ctx.arch_id),
                hint,
            )
            .at(import.line)
            .with_suggestion(suggestion),
        );
    }
    ConstraintResult::from_violations(violations)
}

pub fn require_import(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(entries) = value_list(constraint) else {
        return invalid_value(constraint, "a module name or list of module names");
    };
    let present = |entry: &str| ctx.model.imports.iter().any(|i| import_matches(entry, i, ctx));
    let missing: Vec<&String> = entries.iter().filter(|e| !present(e)).collect();

    match constraint.match_mode {
        MatchMode::Any if missing.len() < entries.len() || entries.is_empty() => ConstraintResult::pass(),
        MatchMode::Any => ConstraintResult::fail(Violation::for_constraint(
            codes::E004_REQUIRE_IMPORT,
            constraint,
            constraint.value.clone(),
            format!("File must import at least one of: {}", entries.join(", ")),
            format!("Add an import of {}", entries.join(" or ")),
        )),
        MatchMode::All => ConstraintResult::from_violations(
            missing
                .into_iter()
                .map(|entry| {
                    Violation::for_constraint(
                        codes::E004_REQUIRE_IMPORT,
                        constraint,
                        ConstraintValue::Text(entry.clone()),
                        format!("File must import '{}'", entry),
                        format!("Add an import of '{}'", entry),
                    )
                    .with_suggestion(Suggestion::AddImport {
                        module: entry.clone(),
                    })
                })
                .collect(),
        ),
    }
}

/// Consumed by the resolver; only the value shape is checked here.
pub fn allow_import(constraint: &Constraint, _ctx: &ValidationContext<'_>) -> ConstraintResult {
    match constraint.value {
        ConstraintValue::Text(_) | ConstraintValue::List(_) => ConstraintResult::pass(),
        _ => invalid_value(constraint, "a module name or list of module names"),
    }
}

pub fn importable_by(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(globs) = value_list(constraint) else {
        return invalid_value(constraint, "a list of path globs");
    };
    let violations = ctx
        .project
        .importers_of(ctx.file_path)
        .iter()
        .filter(|importer| !globs.iter().any(|g| glob_match(g, importer)))
        .map(|importer| {
            Violation::for_constraint(
                codes::E013_IMPORTABLE_BY,
                constraint,
                constraint.value.clone(),
                format!(
                    "'{}' imports this file but is not an allowed importer ({})",
                    importer,
                    globs.join(", ")
                ),
                format!("Move the dependency behind a module matching {}", globs.join(" or ")),
            )
        })
        .collect();
    ConstraintResult::from_violations(violations)
}

pub fn forbid_circular_deps(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let scope = match &constraint.value {
        ConstraintValue::Number(_) | ConstraintValue::Coverage(_) => {
            return invalid_value(constraint, "a list of path globs (empty for the whole project)");
        }
        other => other.as_list().unwrap_or_default(),
    };
    let within = |path: &str| {
        scope.is_empty() || scope.iter().all(|g| g.is_empty()) || scope.iter().any(|g| glob_match(g, path))
    };
    match ctx.project.cycle_through(ctx.file_path, within) {
        None => ConstraintResult::pass(),
        Some(cycle) => ConstraintResult::fail(Violation::for_constraint(
            codes::E014_FORBID_CIRCULAR_DEPS,
            constraint,
            constraint.value.clone(),
            format!("Circular dependency: {}", cycle.join(" -> ")),
            "Break the cycle by extracting the shared code or inverting one dependency",
        )),
    }
}
