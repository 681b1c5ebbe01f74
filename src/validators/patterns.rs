//! Regex rules over file text.

use super::imports::import_matches;
use super::{ConstraintResult, ValidationContext, invalid_value, pattern_rejection, rejected_pattern, value_list};
use crate::core::codes;
use crate::core::constraint::{Constraint, ConstraintValue};
use crate::core::violation::Violation;
use std::borrow::Cow;

/// File text with comment-only lines blanked; line numbers are preserved.
fn searchable<'a>(constraint: &Constraint, content: &'a str) -> Cow<'a, str> {
    if !constraint.exclude_comments {
        return Cow::Borrowed(content);
    }
    let mut in_block = false;
    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        let t = line.trim_start();
        let comment = if in_block {
            if t.contains("*/") {
                in_block = false;
            }
            true
        } else if t.starts_with("/*") {
            in_block = !t.contains("*/");
            true
        } else {
            t.starts_with("//") || t.starts_with('#') || t.starts_with("--")
        };
        if !comment {
            out.push_str(line);
        }
        out.push('\n');
    }
    Cow::Owned(out)
}

pub fn forbid_pattern(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(patterns) = value_list(constraint) else {
        return invalid_value(constraint, "a regular expression");
    };
    let text = searchable(constraint, ctx.content);
    let mut violations = Vec::new();
    for pattern in &patterns {
        match ctx.patterns.find_line(pattern, &text) {
            Err(why) => violations.push(pattern_rejection(constraint, pattern, &why)),
            Ok(None) => {}
            Ok(Some(line)) => violations.push(
                Violation::for_constraint(
                    codes::E020_FORBID_PATTERN,
                    constraint,
                    ConstraintValue::Text(pattern.clone()),
                    format!("Forbidden pattern /{}/ found", pattern),
                    match constraint.alternatives.as_slice() {
                        [] => "Remove the matching code".to_string(),
                        alts => format!("Use {} instead", alts.join(" or ")),
                    },
                )
                .at(line),
            ),
        }
    }
    ConstraintResult::from_violations(violations)
}

pub fn require_pattern(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(patterns) = value_list(constraint) else {
        return invalid_value(constraint, "a regular expression");
    };
    let text = searchable(constraint, ctx.content);
    let mut violations = Vec::new();
    for pattern in &patterns {
        match ctx.patterns.is_match(pattern, &text) {
            Err(why) => violations.push(pattern_rejection(constraint, pattern, &why)),
            Ok(true) => {}
            Ok(false) => violations.push(Violation::for_constraint(
                codes::E021_REQUIRE_PATTERN,
                constraint,
                ConstraintValue::Text(pattern.clone()),
                format!("Required pattern /{}/ not found", pattern),
                "Add code matching the required pattern",
            )),
        }
    }
    ConstraintResult::from_violations(violations)
}

/// Consumed by the resolver; only the pattern itself is checked here.
pub fn allow_pattern(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(patterns) = value_list(constraint) else {
        return invalid_value(constraint, "a regular expression");
    };
    for pattern in &patterns {
        if let Err(why) = ctx.patterns.compile(pattern) {
            return rejected_pattern(constraint, pattern, &why);
        }
    }
    ConstraintResult::pass()
}

/// Entries are `/regex/`, an import name, or literal text.
pub fn require_one_of(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(entries) = value_list(constraint) else {
        return invalid_value(constraint, "a list of imports, literals or /regex/ entries");
    };
    if entries.is_empty() {
        return ConstraintResult::pass();
    }
    let text = searchable(constraint, ctx.content);
    for entry in &entries {
        let present = match entry.strip_prefix('/').and_then(|e| e.strip_suffix('/')) {
            Some(re) if !re.is_empty() => match ctx.patterns.is_match(re, &text) {
                Ok(found) => found,
                Err(why) => return rejected_pattern(constraint, re, &why),
            },
            _ => {
                ctx.model.imports.iter().any(|i| import_matches(entry, i, ctx)) || text.contains(entry.as_str())
            }
        };
        if present {
            return ConstraintResult::pass();
        }
    }
    ConstraintResult::fail(Violation::for_constraint(
        codes::E023_REQUIRE_ONE_OF,
        constraint,
        constraint.value.clone(),
        format!("File must contain at least one of: {}", entries.join(", ")),
        format!("Add one of {}", entries.join(", ")),
    ))
}
