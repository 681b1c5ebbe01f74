//! Intent rules: declared intents (`@intent:<name>`) checked against the
//! intent registry.

use super::{ConstraintResult, ValidationContext, invalid_value, pattern_rejection, value_list};
use crate::core::codes;
use crate::core::constraint::{Constraint, ConstraintValue, MatchMode};
use crate::core::registry::closest;
use crate::core::tags::{IntentAnnotation, IntentScope};
use crate::core::violation::Violation;
use std::borrow::Cow;
use std::collections::BTreeSet;

pub fn require_intent(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(required) = value_list(constraint) else {
        return invalid_value(constraint, "an intent name or list of intent names");
    };
    let declared = |name: &str| ctx.intents.iter().any(|i| i.name == name);
    let missing: Vec<&String> = required.iter().filter(|n| !declared(n)).collect();
    let failed = match constraint.match_mode {
        MatchMode::All => !missing.is_empty(),
        MatchMode::Any => !required.is_empty() && missing.len() == required.len(),
    };
    if !failed {
        return ConstraintResult::pass();
    }
    let names = missing
        .iter()
        .map(|n| format!("@intent:{}", n))
        .collect::<Vec<_>>();
    let joiner = if constraint.match_mode == MatchMode::Any { " or " } else { ", " };
    ConstraintResult::fail(Violation::for_constraint(
        codes::E028_REQUIRE_INTENT,
        constraint,
        constraint.value.clone(),
        format!("File must declare {}", names.join(joiner)),
        format!("Add {} to the file header", names.join(joiner)),
    ))
}

/// Intents in effect for `annotation`'s scope: file-level intents always,
/// plus function-level intents on the same function.
fn intents_in_scope<'a>(annotation: &IntentAnnotation, all: &'a [IntentAnnotation]) -> BTreeSet<&'a str> {
    all.iter()
        .filter(|other| match (&annotation.scope, &other.scope) {
            (_, IntentScope::File) => true,
            (IntentScope::Function(a), IntentScope::Function(b)) => a.is_some() && a == b,
            (IntentScope::File, IntentScope::Function(_)) => false,
        })
        .map(|other| other.name.as_str())
        .collect()
}

/// File text, or only the annotated function's lines when it is known.
fn scope_text<'a>(annotation: &IntentAnnotation, ctx: &ValidationContext<'a>) -> (Cow<'a, str>, usize) {
    if let IntentScope::Function(Some(name)) = &annotation.scope
        && let Some(f) = ctx.model.functions.iter().find(|f| &f.name == name)
        && f.start_line > 0
    {
        let body: Vec<&str> = ctx
            .content
            .lines()
            .skip(f.start_line - 1)
            .take(f.end_line.saturating_sub(f.start_line) + 1)
            .collect();
        return (Cow::Owned(body.join("\n")), f.start_line - 1);
    }
    (Cow::Borrowed(ctx.content), 0)
}

pub fn verify_intent(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let mut violations = Vec::new();
    let mut seen: BTreeSet<(&str, &IntentScope)> = BTreeSet::new();
    let mut conflicts_reported: BTreeSet<(String, String)> = BTreeSet::new();

    for annotation in ctx.intents {
        if !seen.insert((annotation.name.as_str(), &annotation.scope)) {
            continue;
        }
        let Some(def) = ctx.intent_registry.get(&annotation.name) else {
            let mut v = Violation::for_constraint(
                codes::I001_UNDEFINED_INTENT,
                constraint,
                ConstraintValue::Text(annotation.name.clone()),
                format!("Intent '{}' is not defined in the registry", annotation.name),
                "Define the intent under [intents] or fix the tag",
            )
            .at(annotation.line);
            if let Some(candidate) = closest(&annotation.name, ctx.intent_registry.names()) {
                v = v.with_did_you_mean(candidate);
            }
            violations.push(v);
            continue;
        };

        let (text, offset) = scope_text(annotation, ctx);
        for pattern in &def.requires {
            match ctx.patterns.is_match(pattern, &text) {
                Err(why) => violations.push(pattern_rejection(constraint, pattern, &why)),
                Ok(true) => {}
                Ok(false) => violations.push(
                    Violation::for_constraint(
                        codes::I002_INTENT_PATTERN,
                        constraint,
                        ConstraintValue::Text(annotation.name.clone()),
                        format!("@intent:{} requires /{}/, which is not present", def.name, pattern),
                        format!("Add code matching /{}/ or drop the intent", pattern),
                    )
                    .at(annotation.line),
                ),
            }
        }
        for pattern in &def.forbids {
            match ctx.patterns.find_line(pattern, &text) {
                Err(why) => violations.push(pattern_rejection(constraint, pattern, &why)),
                Ok(None) => {}
                Ok(Some(line)) => violations.push(
                    Violation::for_constraint(
                        codes::I002_INTENT_PATTERN,
                        constraint,
                        ConstraintValue::Text(annotation.name.clone()),
                        format!("@intent:{} forbids /{}/", def.name, pattern),
                        "Remove the matching code or drop the intent",
                    )
                    .at(line + offset),
                ),
            }
        }

        let in_scope = intents_in_scope(annotation, ctx.intents);
        for other in &def.conflicts_with {
            if !in_scope.contains(other.as_str()) {
                continue;
            }
            let pair = if def.name <= *other {
                (def.name.clone(), other.clone())
            } else {
                (other.clone(), def.name.clone())
            };
            if conflicts_reported.insert(pair) {
                violations.push(
                    Violation::for_constraint(
                        codes::I003_INTENT_CONFLICT,
                        constraint,
                        ConstraintValue::Text(annotation.name.clone()),
                        format!("@intent:{} conflicts with @intent:{}", def.name, other),
                        "Keep only one of the conflicting intents",
                    )
                    .at(annotation.line),
                );
            }
        }
        for needed in &def.requires_intent {
            if !in_scope.contains(needed.as_str()) {
                violations.push(
                    Violation::for_constraint(
                        codes::I004_MISSING_REQUIRED_INTENT,
                        constraint,
                        ConstraintValue::Text(annotation.name.clone()),
                        format!("@intent:{} requires @intent:{} on the same scope", def.name, needed),
                        format!("Add @intent:{}", needed),
                    )
                    .at(annotation.line),
                );
            }
        }
    }
    ConstraintResult::from_violations(violations)
}
