//! Cross-file coverage: every value this file declares must be handled
//! somewhere in a set of target files (event handlers for every event,
//! routes for every controller export, and so on).

use super::{ConstraintResult, ValidationContext, invalid_value, pattern_rejection};
use crate::core::codes;
use crate::core::constraint::{Constraint, ConstraintValue, CoverageSpec};
use crate::core::patterns::glob_match;
use crate::core::violation::Violation;

const PLACEHOLDER: &str = "${value}";

/// Values declared by this file according to `source_type`.
fn source_values(spec: &CoverageSpec, ctx: &ValidationContext<'_>) -> Result<Vec<String>, String> {
    let model = ctx.model;
    let mut values: Vec<String> = match spec.source_type.as_str() {
        "export" | "exports" => model.exports.iter().map(|e| e.name.clone()).collect(),
        "function" | "functions" => model.functions.iter().map(|f| f.name.clone()).collect(),
        "class" | "classes" => model.classes.iter().map(|c| c.name.clone()).collect(),
        "file_name" => {
            let file = ctx.file_path.rsplit('/').next().unwrap_or(ctx.file_path);
            vec![file.split('.').next().unwrap_or(file).to_string()]
        }
        "pattern" => {
            let Some(pattern) = spec.source_pattern.as_deref() else {
                return Err("source_type 'pattern' needs a source_pattern".to_string());
            };
            ctx.patterns
                .captures(pattern, ctx.content)
                .map_err(|why| format!("source_pattern rejected: {}", why))?
        }
        other => return Err(format!("unknown source_type '{}'", other)),
    };
    values.retain(|v| !v.is_empty() && v != "default");
    values.sort();
    values.dedup();
    Ok(values)
}

pub fn require_coverage(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let ConstraintValue::Coverage(spec) = &constraint.value else {
        return invalid_value(
            constraint,
            "a coverage table { source_type, target_pattern, in_target_files }",
        );
    };
    let values = match source_values(spec, ctx) {
        Ok(values) => values,
        Err(message) => {
            return ConstraintResult::fail(Violation::for_constraint(
                codes::S003_INVALID_CONSTRAINT,
                constraint,
                constraint.value.clone(),
                message,
                "Fix the coverage table in the registry",
            ));
        }
    };
    if values.is_empty() {
        return ConstraintResult::pass();
    }

    let targets: Vec<&str> = ctx
        .project
        .files()
        .filter(|p| *p != ctx.file_path && glob_match(&spec.in_target_files, p))
        .collect();

    let mut violations = Vec::new();
    for value in &values {
        let escaped = regex::escape(value);
        let pattern = if spec.target_pattern.contains(PLACEHOLDER) {
            spec.target_pattern.replace(PLACEHOLDER, &escaped)
        } else {
            escaped
        };
        let mut covered = false;
        for target in &targets {
            let Some(text) = ctx.project.content(target) else {
                continue;
            };
            match ctx.patterns.is_match(&pattern, text) {
                Ok(true) => {
                    covered = true;
                    break;
                }
                Ok(false) => {}
                Err(why) => {
                    violations.push(pattern_rejection(constraint, &spec.target_pattern, &why));
                    return ConstraintResult::from_violations(violations);
                }
            }
        }
        if !covered {
            violations.push(Violation::for_constraint(
                codes::E027_REQUIRE_COVERAGE,
                constraint,
                ConstraintValue::Text(value.clone()),
                format!(
                    "'{}' is not covered by any file matching '{}'",
                    value, spec.in_target_files
                ),
                format!(
                    "Handle '{}' in one of the target files ({})",
                    value, spec.target_pattern
                ),
            ));
        }
    }
    ConstraintResult::from_violations(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constraint::Rule;
    use crate::core::semantic::ExportInfo;
    use crate::validators::testing::*;
    use std::sync::Arc;

    fn spec(source_type: &str, source_pattern: Option<&str>) -> ConstraintValue {
        ConstraintValue::Coverage(CoverageSpec {
            source_type: source_type.into(),
            source_pattern: source_pattern.map(str::to_string),
            target_pattern: "case '${value}':".into(),
            in_target_files: "src/handlers/**".into(),
        })
    }

    fn with_handler(fx: &mut Fixture, body: &str) {
        fx.project.add_file("src/handlers/events.ts");
        fx.project.set_content("src/handlers/events.ts", Arc::from(body));
    }

    #[test]
    fn pattern_values_must_be_handled() {
        let mut fx = Fixture::new(
            "src/events.ts",
            "emit('user.created');\nemit('user.deleted');\n",
        );
        with_handler(&mut fx, "switch (e) {\n case 'user.created': break;\n}\n");
        let c = Constraint::new(Rule::RequireCoverage, spec("pattern", Some(r"emit\('([^']+)'\)")));
        let result = fx.run(&c);
        assert_eq!(codes_of(&result), vec!["E027"]);
        assert_eq!(result.violations[0].value, ConstraintValue::Text("user.deleted".into()));
    }

    #[test]
    fn export_values_and_escaping() {
        let mut fx = Fixture::new("src/events.ts", "");
        fx.model.exports = vec![ExportInfo {
            name: "a.b".into(),
            ..ExportInfo::default()
        }];
        with_handler(&mut fx, "case 'aXb':\n");
        let c = Constraint::new(Rule::RequireCoverage, spec("exports", None));
        assert!(!fx.run(&c).passed);
        with_handler(&mut fx, "case 'a.b':\n");
        assert!(fx.run(&c).passed);
    }

    #[test]
    fn bad_spec_is_s003() {
        let fx = Fixture::new("src/events.ts", "");
        let c = Constraint::new(Rule::RequireCoverage, spec("pattern", None));
        assert_eq!(codes_of(&fx.run(&c)), vec!["S003"]);
        let shape = Constraint::new(Rule::RequireCoverage, ConstraintValue::Number(1));
        assert_eq!(codes_of(&fx.run(&shape)), vec!["S003"]);
    }
}
