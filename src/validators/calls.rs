//! Call-site and mutation rules.

use super::{ConstraintResult, ValidationContext, invalid_value, value_list};
use crate::core::codes;
use crate::core::constraint::{Constraint, ConstraintValue, MatchMode};
use crate::core::patterns::{call_glob_match, name_matches};
use crate::core::semantic::{CallInfo, MutationInfo};
use crate::core::tags::IntentScope;
use crate::core::violation::Violation;

fn call_matches(pattern: &str, call: &CallInfo) -> bool {
    name_matches(pattern, &call.callee)
        || (!pattern.contains('.') && call.receiver.is_none() && name_matches(pattern, &call.method_name))
}

/// `unless` entries: function names (globs allowed) or `@intent:<name>`.
fn exempt(unless: &[String], call: &CallInfo, ctx: &ValidationContext<'_>) -> bool {
    unless.iter().any(|entry| match entry.strip_prefix("@intent:") {
        Some(intent) => ctx.intents.iter().any(|i| {
            i.name == intent
                && match &i.scope {
                    IntentScope::File => true,
                    IntentScope::Function(f) => f.is_some() && f.as_deref() == call.parent_function.as_deref(),
                }
        }),
        None => call
            .parent_function
            .as_deref()
            .is_some_and(|f| name_matches(entry, f)),
    })
}

pub fn forbid_call(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(banned) = value_list(constraint) else {
        return invalid_value(constraint, "a call name or list of call names");
    };
    let violations = ctx
        .model
        .function_calls
        .iter()
        .filter(|call| !exempt(&constraint.unless, call, ctx))
        .filter_map(|call| {
            let hit = banned.iter().find(|p| call_matches(p, call))?;
            let hint = match constraint.alternatives.as_slice() {
                [] => format!("Remove the call to '{}'", call.callee),
                alts => format!("Use {} instead", alts.join(" or ")),
            };
            Some(
                Violation::for_constraint(
                    codes::E015_FORBID_CALL,
                    constraint,
                    ConstraintValue::Text(hit.clone()),
                    format!("Call to '{}' is forbidden in {}", call.callee, ctx.arch_id),
                    hint,
                )
                .at_column(call.line, call.column),
            )
        })
        .collect();
    ConstraintResult::from_violations(violations)
}

pub fn require_call(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(required) = value_list(constraint) else {
        return invalid_value(constraint, "a call name or list of call names");
    };
    let called = |p: &str| ctx.model.function_calls.iter().any(|c| call_matches(p, c));
    let missing: Vec<&String> = required.iter().filter(|p| !called(p)).collect();
    let failed = match constraint.match_mode {
        MatchMode::All => !missing.is_empty(),
        MatchMode::Any => !required.is_empty() && missing.len() == required.len(),
    };
    if !failed {
        return ConstraintResult::pass();
    }
    let joiner = if constraint.match_mode == MatchMode::Any { " or " } else { ", " };
    let names = missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(joiner);
    ConstraintResult::fail(Violation::for_constraint(
        codes::E016_REQUIRE_CALL,
        constraint,
        constraint.value.clone(),
        format!("File must call {}", names),
        format!("Add a call to {}", names),
    ))
}

pub fn require_try_catch(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let targets = if constraint.around.is_empty() {
        match value_list(constraint) {
            Some(list) => list,
            None => return invalid_value(constraint, "a list of call names (or `around`)"),
        }
    } else {
        constraint.around.clone()
    };
    let violations = ctx
        .model
        .function_calls
        .iter()
        .filter(|call| !call.control_flow.is_guarded())
        .filter(|call| targets.iter().any(|t| call_matches(t, call)))
        .map(|call| {
            Violation::for_constraint(
                codes::E017_REQUIRE_TRY_CATCH,
                constraint,
                constraint.value.clone(),
                format!("Call to '{}' must be wrapped in try/catch", call.callee),
                format!("Wrap '{}' in a try block and handle the failure", call.callee),
            )
            .at_column(call.line, call.column)
        })
        .collect();
    ConstraintResult::from_violations(violations)
}

pub fn require_call_before(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(targets) = value_list(constraint) else {
        return invalid_value(constraint, "a list of call names");
    };
    if constraint.before.is_empty() {
        return invalid_value(constraint, "a `before` list of prerequisite calls");
    }
    let calls = &ctx.model.function_calls;
    let preceded = |call: &CallInfo| {
        calls.iter().any(|prior| {
            prior.parent_function == call.parent_function
                && (prior.line, prior.column) < (call.line, call.column)
                && constraint.before.iter().any(|b| call_matches(b, prior))
        })
    };
    let violations = calls
        .iter()
        .filter(|call| targets.iter().any(|t| call_matches(t, call)))
        .filter(|&call| !preceded(call))
        .map(|call| {
            let before = constraint.before.join(" or ");
            Violation::for_constraint(
                codes::E018_REQUIRE_CALL_BEFORE,
                constraint,
                constraint.value.clone(),
                format!("Call to '{}' must be preceded by {}", call.callee, before),
                format!("Call {} earlier in the same function", before),
            )
            .at_column(call.line, call.column)
        })
        .collect();
    ConstraintResult::from_violations(violations)
}

fn mutation_matches(entry: &str, mutation: &MutationInfo) -> bool {
    let target = mutation.target.as_str();
    if let Some(base) = entry.strip_suffix(".*") {
        return target
            .strip_prefix(base)
            .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['));
    }
    if entry.contains('*') {
        return call_glob_match(entry, target);
    }
    target == entry
        || mutation.root_object == entry
        || target
            .strip_prefix(entry)
            .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
}

pub fn forbid_mutation(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(roots) = value_list(constraint) else {
        return invalid_value(constraint, "a list of object roots");
    };
    let violations = ctx
        .model
        .mutations
        .iter()
        .filter(|m| !m.is_declaration)
        .filter_map(|m| {
            let hit = roots.iter().find(|r| mutation_matches(r, m))?;
            Some(
                Violation::for_constraint(
                    codes::E019_FORBID_MUTATION,
                    constraint,
                    ConstraintValue::Text(hit.clone()),
                    format!("Mutation of '{}' ({}) is forbidden", m.target, m.operator),
                    "Pass the value in explicitly instead of mutating shared state",
                )
                .at_column(m.line, m.column),
            )
        })
        .collect();
    ConstraintResult::from_violations(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constraint::Rule;
    use crate::core::semantic::ControlFlow;
    use crate::core::tags::IntentAnnotation;
    use crate::validators::testing::*;

    fn call(callee: &str, line: usize, parent: &str) -> CallInfo {
        let (receiver, method) = match callee.rsplit_once('.') {
            Some((r, m)) => (Some(r.to_string()), m.to_string()),
            None => (None, callee.to_string()),
        };
        CallInfo {
            callee: callee.into(),
            method_name: method,
            receiver,
            line,
            column: 1,
            parent_function: Some(parent.into()),
            ..CallInfo::default()
        }
    }

    fn list(items: &[&str]) -> ConstraintValue {
        ConstraintValue::List(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn forbid_call_with_globs_and_unless() {
        let mut fx = Fixture::new("src/a.ts", "");
        fx.model.function_calls = vec![
            call("eval", 1, "run"),
            call("console.log", 2, "run"),
            call("console.log", 3, "debugDump"),
            call("db.query", 4, "run"),
        ];
        let mut c = Constraint::new(Rule::ForbidCall, list(&["eval", "console.*"]));
        c.unless = vec!["debug*".into()];
        let result = fx.run(&c);
        let lines: Vec<_> = result.violations.iter().map(|v| v.line).collect();
        assert_eq!(lines, vec![Some(1), Some(2)]);
        assert_eq!(result.violations[1].value, ConstraintValue::Text("console.*".into()));
    }

    #[test]
    fn unless_intent_exempts_the_file() {
        let mut fx = Fixture::new("src/a.ts", "");
        fx.model.function_calls = vec![call("eval", 1, "run")];
        fx.intents = vec![IntentAnnotation {
            name: "sandboxed".into(),
            line: 1,
            scope: IntentScope::File,
        }];
        let mut c = Constraint::new(Rule::ForbidCall, list(&["eval"]));
        c.unless = vec!["@intent:sandboxed".into()];
        assert!(fx.run(&c).passed);
    }

    #[test]
    fn require_call_modes() {
        let mut fx = Fixture::new("src/a.ts", "");
        fx.model.function_calls = vec![call("logger.info", 1, "run")];
        let mut c = Constraint::new(Rule::RequireCall, list(&["logger.info", "metrics.inc"]));
        assert_eq!(codes_of(&fx.run(&c)), vec!["E016"]);
        c.match_mode = MatchMode::Any;
        assert!(fx.run(&c).passed);
    }

    #[test]
    fn try_catch_uses_control_flow() {
        let mut fx = Fixture::new("src/a.ts", "");
        let mut guarded = call("fetch", 2, "load");
        guarded.control_flow = ControlFlow {
            in_try_block: true,
            try_depth: 1,
            ..ControlFlow::default()
        };
        fx.model.function_calls = vec![guarded, call("fetch", 7, "load"), call("parse", 8, "load")];
        let mut c = Constraint::new(Rule::RequireTryCatch, list(&[]));
        c.around = vec!["fetch".into()];
        let result = fx.run(&c);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].line, Some(7));
    }

    #[test]
    fn call_before_is_per_function() {
        let mut fx = Fixture::new("src/a.ts", "");
        fx.model.function_calls = vec![
            call("auth.check", 1, "save"),
            call("db.write", 2, "save"),
            call("db.write", 5, "purge"),
        ];
        let mut c = Constraint::new(Rule::RequireCallBefore, list(&["db.write"]));
        c.before = vec!["auth.check".into()];
        let result = fx.run(&c);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].line, Some(5));

        c.before.clear();
        assert_eq!(codes_of(&fx.run(&c)), vec!["S003"]);
    }

    #[test]
    fn forbid_mutation_roots() {
        let mut fx = Fixture::new("src/a.ts", "");
        let m = |target: &str, line: usize| MutationInfo {
            target: target.into(),
            root_object: target.split('.').next().unwrap().into(),
            operator: "=".into(),
            line,
            ..MutationInfo::default()
        };
        fx.model.mutations = vec![
            m("process.env.PORT", 1),
            m("window.location", 2),
            m("windowed.x", 3),
            m("state.count", 4),
        ];
        let c = Constraint::new(Rule::ForbidMutation, list(&["process.env", "window.*"]));
        let lines: Vec<_> = fx.run(&c).violations.iter().map(|v| v.line).collect();
        assert_eq!(lines, vec![Some(1), Some(2)]);
    }
}
