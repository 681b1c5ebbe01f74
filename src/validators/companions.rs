//! Companion-file rules. Templates expand `{dir}`, `{name}` and `{ext}`
//! relative to the validated file and are looked up in the project index.

use super::{ConstraintResult, ValidationContext, invalid_value, value_list};
use crate::core::codes;
use crate::core::constraint::{Constraint, ConstraintValue, MatchMode, Severity};
use crate::core::project::expand_template;
use crate::core::violation::{Suggestion, Violation};

enum Expansion {
    Paths(Vec<String>),
    Escaped(Violation),
}

fn expand_all(constraint: &Constraint, ctx: &ValidationContext<'_>, templates: &[String]) -> Expansion {
    let mut paths = Vec::with_capacity(templates.len());
    for template in templates {
        match expand_template(ctx.file_path, template) {
            Ok(path) => paths.push(path),
            Err(e) => {
                let mut v = Violation::for_constraint(
                    codes::SEC001_PATH_TRAVERSAL,
                    constraint,
                    ConstraintValue::Text(template.clone()),
                    e.to_string(),
                    "Keep companion templates inside the project",
                );
                v.severity = Severity::Error;
                return Expansion::Escaped(v);
            }
        }
    }
    Expansion::Paths(paths)
}

fn looks_like_test(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.contains(".test.")
        || name.contains(".spec.")
        || name.contains("_test.")
        || name.starts_with("test_")
        || path.split('/').any(|seg| seg == "__tests__")
}

pub fn require_test_file(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(mut templates) = value_list(constraint) else {
        return invalid_value(constraint, "a test path template or list of templates");
    };
    templates.retain(|t| !t.trim().is_empty());
    if templates.is_empty() {
        templates = ctx.test_file_patterns.to_vec();
    }
    if looks_like_test(ctx.file_path) || templates.is_empty() {
        return ConstraintResult::pass();
    }
    let candidates = match expand_all(constraint, ctx, &templates) {
        Expansion::Paths(paths) => paths,
        Expansion::Escaped(v) => return ConstraintResult::fail(v),
    };
    if candidates.iter().any(|p| ctx.project.contains(p)) {
        return ConstraintResult::pass();
    }
    ConstraintResult::fail(
        Violation::for_constraint(
            codes::E012_REQUIRE_TEST_FILE,
            constraint,
            constraint.value.clone(),
            format!("No test file found (looked for {})", candidates.join(", ")),
            format!("Create {}", candidates[0]),
        )
        .with_suggestion(Suggestion::CreateFile {
            path: candidates[0].clone(),
        }),
    )
}

pub fn require_companion_file(constraint: &Constraint, ctx: &ValidationContext<'_>) -> ConstraintResult {
    let Some(templates) = value_list(constraint) else {
        return invalid_value(constraint, "a companion path template or list of templates");
    };
    let candidates = match expand_all(constraint, ctx, &templates) {
        Expansion::Paths(paths) => paths,
        Expansion::Escaped(v) => return ConstraintResult::fail(v),
    };
    let missing: Vec<&String> = candidates.iter().filter(|p| !ctx.project.contains(p)).collect();
    let failed = match constraint.match_mode {
        MatchMode::All => !missing.is_empty(),
        MatchMode::Any => !candidates.is_empty() && missing.len() == candidates.len(),
    };
    if !failed {
        return ConstraintResult::pass();
    }
    let violations = match constraint.match_mode {
        MatchMode::All => missing.clone(),
        MatchMode::Any => missing[..1].to_vec(),
    }
    .into_iter()
    .map(|path| {
        Violation::for_constraint(
            codes::E026_REQUIRE_COMPANION_FILE,
            constraint,
            constraint.value.clone(),
            format!("Companion file '{}' is missing", path),
            format!("Create {}", path),
        )
        .with_suggestion(Suggestion::CreateFile { path: path.clone() })
    })
    .collect();
    ConstraintResult::from_violations(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constraint::Rule;
    use crate::validators::testing::*;

    #[test]
    fn test_file_found_via_default_templates() {
        let mut fx = Fixture::new("src/user.ts", "");
        let c = Constraint::new(Rule::RequireTestFile, ConstraintValue::List(vec![]));
        let result = fx.run(&c);
        assert_eq!(codes_of(&result), vec!["E012"]);
        assert_eq!(
            result.violations[0].suggestion,
            Some(Suggestion::CreateFile {
                path: "src/user.test.ts".into()
            })
        );
        fx.project.add_file("src/user.test.ts");
        assert!(fx.run(&c).passed);
    }

    #[test]
    fn root_level_files_use_templates_without_a_dir() {
        let mut fx = Fixture::new("main.py", "");
        fx.test_file_patterns = vec!["{dir}/test_{name}.{ext}".to_string()];
        let c = Constraint::new(Rule::RequireTestFile, ConstraintValue::List(vec![]));
        let result = fx.run(&c);
        assert_eq!(codes_of(&result), vec!["E012"]);
        assert_eq!(
            result.violations[0].suggestion,
            Some(Suggestion::CreateFile {
                path: "test_main.py".into()
            })
        );
        fx.project.add_file("test_main.py");
        assert!(fx.run(&c).passed);

        let readme = Constraint::new(
            Rule::RequireCompanionFile,
            ConstraintValue::Text("{dir}/{name}.md".into()),
        );
        assert_eq!(codes_of(&fx.run(&readme)), vec!["E026"]);
        fx.project.add_file("main.md");
        assert!(fx.run(&readme).passed);
    }

    #[test]
    fn test_files_need_no_tests() {
        let fx = Fixture::new("src/user.test.ts", "");
        let c = Constraint::new(Rule::RequireTestFile, ConstraintValue::Text(String::new()));
        assert!(fx.run(&c).passed);
    }

    #[test]
    fn companion_modes_and_traversal() {
        let mut fx = Fixture::new("src/button.tsx", "");
        fx.project.add_file("src/button.stories.tsx");
        let mut c = Constraint::new(
            Rule::RequireCompanionFile,
            ConstraintValue::List(vec![
                "{dir}/{name}.stories.{ext}".into(),
                "{dir}/{name}.module.css".into(),
            ]),
        );
        let result = fx.run(&c);
        assert_eq!(result.violations.len(), 1);
        assert!(result.violations[0].message.contains("src/button.module.css"));
        c.match_mode = MatchMode::Any;
        assert!(fx.run(&c).passed);

        let escape = Constraint::new(
            Rule::RequireCompanionFile,
            ConstraintValue::Text("{dir}/../../{name}.md".into()),
        );
        assert_eq!(codes_of(&fx.run(&escape)), vec!["SEC001"]);
    }
}
