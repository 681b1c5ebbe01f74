//! Structural rules over classes, decorators, file placement and sizes.

use super::{ConstraintResult, ValidationContext, invalid_value, rejected_pattern, value_list};
use crate::core::codes;
use crate::core::constraint::{Constraint, ConstraintValue, MatchMode};
use crate::core::patterns::glob_match;
use crate::core::semantic::{ClassInfo, DecoratorInfo};
use crate::core::violation::{Suggestion, Violation};

/// `ns.Base<T>` -> `Base`.
fn bare_type_name(name: &str) -> &str {
    let no_generics = name.split('<').next().unwrap_or(name).trim();
    no_generics.rsplit('.').next().unwrap_or(no_generics)
}

fn same_type(a: &str, b: &str) -> bool {
    a == b || bare_type_name(a) == bare_type_name(b)
}

fn decorator_is(decorator: &DecoratorInfo, wanted: &str) -> bool {
    let wanted = wanted.trim_start_matches('@');
    let name = decorator.name.trim_start_matches('@');
    name == wanted || bare_type_name(name) == wanted
}

/// Classes that must satisfy class-level rules: exported ones, or all of
/// them when the file exports none.
fn subject_classes<'m>(ctx: &ValidationContext<'m>) -> Vec<&'m ClassInfo> {
    let exported: Vec<_> = ctx.model.classes.iter().filter(|c| c.is_exported).collect();
    if exported.is_empty() {
        ctx.model.classes.iter().collect()
    } else {
        exported
    }
}

pub fn must_extend(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(base) = constraint.value.as_text() else {
        return invalid_value(constraint, "a base class name");
    };
    let classes = subject_classes(ctx);
    if classes.is_empty()
        || classes
            .iter()
            .any(|c| c.extends.as_deref().is_some_and(|e| same_type(e, base)))
    {
        return ConstraintResult::pass();
    }
    let class = classes[0];
    ConstraintResult::fail(
        Violation::for_constraint(
            codes::E001_MUST_EXTEND,
            constraint,
            constraint.value.clone(),
            format!("Class '{}' must extend '{}'", class.name, base),
            format!("Declare 'class {} extends {}'", class.name, base),
        )
        .at(class.line),
    )
}

pub fn implements(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(required) = value_list(constraint) else {
        return invalid_value(constraint, "an interface name or list of interface names");
    };
    let classes = subject_classes(ctx);
    if classes.is_empty() {
        return ConstraintResult::pass();
    }
    let implemented = |iface: &str| {
        classes
            .iter()
            .any(|c| c.implements.iter().any(|i| same_type(i, iface)))
    };
    let violations = required
        .iter()
        .filter(|iface| !implemented(iface))
        .map(|iface| {
            Violation::for_constraint(
                codes::E002_IMPLEMENTS,
                constraint,
                ConstraintValue::Text(iface.clone()),
                format!("Class '{}' must implement '{}'", classes[0].name, iface),
                format!("Add 'implements {}' to the class declaration", iface),
            )
            .at(classes[0].line)
        })
        .collect();
    ConstraintResult::from_violations(violations)
}

pub fn require_decorator(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(required) = value_list(constraint) else {
        return invalid_value(constraint, "a decorator name or list of decorator names");
    };
    if required.is_empty() {
        return ConstraintResult::pass();
    }
    let mut violations = Vec::new();
    for class in subject_classes(ctx) {
        let has = |d: &str| class.decorators.iter().any(|dec| decorator_is(dec, d));
        let missing: Vec<&String> = required.iter().filter(|d| !has(d)).collect();
        let failed = match constraint.match_mode {
            MatchMode::All => !missing.is_empty(),
            MatchMode::Any => missing.len() == required.len(),
        };
        if !failed {
            continue;
        }
        let wanted = missing[0].trim_start_matches('@').to_string();
        let listed = missing
            .iter()
            .map(|d| format!("@{}", d.trim_start_matches('@')))
            .collect::<Vec<_>>();
        let joiner = match constraint.match_mode {
            MatchMode::All => ", ",
            MatchMode::Any => " or ",
        };
        violations.push(
            Violation::for_constraint(
                codes::E006_REQUIRE_DECORATOR,
                constraint,
                constraint.value.clone(),
                format!("Class '{}' is missing decorator {}", class.name, listed.join(joiner)),
                format!("Add {} above the class declaration", listed.join(joiner)),
            )
            .at(class.line)
            .with_suggestion(Suggestion::AddDecorator { name: wanted }),
        );
    }
    ConstraintResult::from_violations(violations)
}

pub fn forbid_decorator(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(banned) = value_list(constraint) else {
        return invalid_value(constraint, "a decorator name or list of decorator names");
    };
    let model = ctx.model;
    let all_decorators = model
        .classes
        .iter()
        .flat_map(|c| {
            c.decorators
                .iter()
                .chain(c.methods.iter().flat_map(|m| m.decorators.iter()))
        })
        .chain(model.functions.iter().flat_map(|f| f.decorators.iter()));
    let violations = all_decorators
        .filter_map(|dec| {
            let hit = banned.iter().find(|b| decorator_is(dec, b))?;
            Some(
                Violation::for_constraint(
                    codes::E007_FORBID_DECORATOR,
                    constraint,
                    ConstraintValue::Text(hit.clone()),
                    format!("Decorator '@{}' is forbidden in {}", dec.name.trim_start_matches('@'), ctx.arch_id),
                    "Remove the decorator",
                )
                .at(dec.line),
            )
        })
        .collect();
    ConstraintResult::from_violations(violations)
}

pub fn naming_pattern(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(pattern) = constraint.value.as_text() else {
        return invalid_value(constraint, "a regular expression");
    };
    let file_name = ctx.file_path.rsplit('/').next().unwrap_or(ctx.file_path);
    let stem = match file_name.find('.') {
        Some(i) if i > 0 => &file_name[..i],
        _ => file_name,
    };
    let matched = match ctx.patterns.is_match(pattern, file_name) {
        Ok(false) => ctx.patterns.is_match(pattern, stem),
        other => other,
    };
    match matched {
        Err(why) => rejected_pattern(constraint, pattern, &why),
        Ok(true) => ConstraintResult::pass(),
        Ok(false) => ConstraintResult::fail(
            Violation::for_constraint(
                codes::E008_NAMING_PATTERN,
                constraint,
                constraint.value.clone(),
                format!("File name '{}' does not match /{}/", file_name, pattern),
                format!("Rename the file to match /{}/", pattern),
            )
            .with_suggestion(Suggestion::RenameFile {
                pattern: pattern.to_string(),
            }),
        ),
    }
}

pub fn location_pattern(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(location) = constraint.value.as_text() else {
        return invalid_value(constraint, "a path glob or directory prefix");
    };
    let inside = if location.contains('*') || location.contains('?') {
        glob_match(location, ctx.file_path)
    } else {
        let prefix = location.trim_start_matches("./").trim_end_matches('/');
        prefix.is_empty() || ctx.file_path.starts_with(&format!("{}/", prefix))
    };
    if inside {
        return ConstraintResult::pass();
    }
    ConstraintResult::fail(Violation::for_constraint(
        codes::E009_LOCATION_PATTERN,
        constraint,
        constraint.value.clone(),
        format!("{} files must live under '{}', found '{}'", ctx.arch_id, location, ctx.file_path),
        format!("Move the file under '{}'", location),
    ))
}

pub fn max_file_lines(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(limit) = constraint.value.as_limit() else {
        return invalid_value(constraint, "a non-negative integer");
    };
    let (count, unit) = if constraint.exclude_comments {
        (ctx.model.loc_count, "lines of code")
    } else {
        (ctx.model.line_count, "lines")
    };
    if count <= limit {
        return ConstraintResult::pass();
    }
    ConstraintResult::fail(Violation::for_constraint(
        codes::E010_MAX_FILE_LINES,
        constraint,
        constraint.value.clone(),
        format!("File has {} {} (max {})", count, unit, limit),
        "Split the file into smaller modules",
    ))
}

pub fn max_public_methods(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(limit) = constraint.value.as_limit() else {
        return invalid_value(constraint, "a non-negative integer");
    };
    let violations = ctx
        .model
        .classes
        .iter()
        .filter_map(|class| {
            let count = class.public_method_count();
            (count > limit).then(|| {
                Violation::for_constraint(
                    codes::E011_MAX_PUBLIC_METHODS,
                    constraint,
                    constraint.value.clone(),
                    format!("Class '{}' has {} public methods (max {})", class.name, count, limit),
                    "Extract a collaborator or make helpers private",
                )
                .at(class.line)
            })
        })
        .collect();
    ConstraintResult::from_violations(violations)
}

pub fn max_function_lines(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(limit) = constraint.value.as_limit() else {
        return invalid_value(constraint, "a non-negative integer");
    };
    let span = |start: usize, end: usize| end.saturating_sub(start) + 1;
    let functions = ctx
        .model
        .functions
        .iter()
        .map(|f| (f.name.clone(), f.start_line, f.end_line));
    let methods = ctx.model.classes.iter().flat_map(|c| {
        c.methods
            .iter()
            .map(move |m| (format!("{}.{}", c.name, m.name), m.start_line, m.end_line))
    });
    let violations = functions
        .chain(methods)
        .filter(|(_, start, end)| *start > 0 && span(*start, *end) > limit)
        .map(|(name, start, end)| {
            Violation::for_constraint(
                codes::E024_MAX_FUNCTION_LINES,
                constraint,
                constraint.value.clone(),
                format!("Function '{}' spans {} lines (max {})", name, span(start, end), limit),
                "Extract part of the body into a helper",
            )
            .at(start)
        })
        .collect();
    ConstraintResult::from_violations(violations)
}

pub fn require_export(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(required) = value_list(constraint) else {
        return invalid_value(constraint, "an export name or list of export names");
    };
    let exported = |name: &str| {
        ctx.model
            .exports
            .iter()
            .any(|e| e.name == name || (name == "default" && e.is_default))
    };
    let missing: Vec<&String> = required.iter().filter(|n| !exported(n)).collect();
    let failed = match constraint.match_mode {
        MatchMode::All => !missing.is_empty(),
        MatchMode::Any => !required.is_empty() && missing.len() == required.len(),
    };
    if !failed {
        return ConstraintResult::pass();
    }
    let names = missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");
    ConstraintResult::fail(Violation::for_constraint(
        codes::E025_REQUIRE_EXPORT,
        constraint,
        constraint.value.clone(),
        format!("File must export {}", names),
        format!("Export {} from this module", names),
    ))
}
