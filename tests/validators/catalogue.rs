//! Validator catalogue driven end to end through the engine, with semantic
//! models supplied as sidecar JSON under `.arch/models/`.

use archgov::core::constraint::{Rule, Severity};
use archgov::core::engine::ValidationEngine;
use archgov::core::violation::{FileResult, FileStatus, Suggestion};
use archgov::validators::builtin_validators;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn sidecar(root: &Path, rel: &str, model: serde_json::Value) {
    write(root, &format!(".arch/models/{}.json", rel), &model.to_string());
}

fn project(registry: &str) -> TempDir {
    let tmp = tempdir().unwrap();
    write(tmp.path(), ".arch/registry.toml", registry);
    tmp
}

fn check(tmp: &TempDir, path: &str) -> FileResult {
    let engine = ValidationEngine::open(tmp.path()).unwrap().with_cache_enabled(false);
    let report = engine.validate_paths(&[path.to_string()]).unwrap();
    report.results.into_iter().next().unwrap()
}

fn codes(result: &FileResult) -> Vec<&str> {
    result.violations.iter().map(|v| v.code.as_str()).collect()
}

#[test]
fn every_rule_has_a_validator() {
    let registry = builtin_validators();
    for rule in Rule::ALL {
        assert!(registry.has_validator(rule.as_str()), "{}", rule.as_str());
    }
    assert_eq!(registry.len(), Rule::ALL.len());
}

#[test]
fn class_shape_rules_read_the_model() {
    let tmp = project(
        r#"
[architectures.controller]
constraints = [
  { rule = "must_extend", value = "BaseController" },
  { rule = "require_decorator", value = ["@Controller"] },
]
"#,
    );
    write(tmp.path(), "src/users.ts", "// @arch controller\nexport class Users {}\n");
    sidecar(
        tmp.path(),
        "src/users.ts",
        json!({
            "classes": [{ "name": "Users", "extends": "Object", "is_exported": true, "line": 2 }]
        }),
    );
    write(tmp.path(), "src/orders.ts", "// @arch controller\nexport class Orders {}\n");
    sidecar(
        tmp.path(),
        "src/orders.ts",
        json!({
            "classes": [{
                "name": "Orders",
                "extends": "BaseController",
                "decorators": [{ "name": "Controller" }],
                "is_exported": true,
                "line": 2
            }]
        }),
    );

    let users = check(&tmp, "src/users.ts");
    assert_eq!(codes(&users), vec!["E001", "E006"]);
    assert!(users.violations.iter().all(|v| v.line == Some(2)));
    assert!(matches!(
        users.violations[1].suggestion,
        Some(Suggestion::AddDecorator { ref name }) if name == "Controller"
    ));
    assert_eq!(check(&tmp, "src/orders.ts").status, FileStatus::Pass);
}

#[test]
fn forbidden_calls_honour_unless() {
    let tmp = project(
        r#"
[architectures.domain]
constraints = [{ rule = "forbid_call", value = ["setTimeout", "fetch"], unless = ["retryLater"] }]
"#,
    );
    write(tmp.path(), "src/domain.ts", "// @arch domain\nfetch(url);\nsetTimeout(f);\n");
    sidecar(
        tmp.path(),
        "src/domain.ts",
        json!({
            "function_calls": [
                { "callee": "fetch", "method_name": "fetch", "line": 2, "column": 1 },
                { "callee": "setTimeout", "method_name": "setTimeout", "line": 3, "column": 5,
                  "parent_function": "retryLater" }
            ]
        }),
    );
    let result = check(&tmp, "src/domain.ts");
    assert_eq!(codes(&result), vec!["E015"]);
    assert_eq!(result.violations[0].line, Some(2));
    assert_eq!(result.violations[0].column, Some(1));
}

#[test]
fn unguarded_calls_and_mutations() {
    let tmp = project(
        r#"
[architectures.gateway]
constraints = [
  { rule = "require_try_catch", value = [], around = ["db.query"] },
  { rule = "forbid_mutation", value = ["process.env"] },
]
"#,
    );
    write(tmp.path(), "src/gateway.ts", "// @arch gateway\n\n\n\n\n");
    sidecar(
        tmp.path(),
        "src/gateway.ts",
        json!({
            "function_calls": [
                { "callee": "db.query", "method_name": "query", "receiver": "db", "line": 2, "column": 3 },
                { "callee": "db.query", "method_name": "query", "receiver": "db", "line": 3, "column": 3,
                  "control_flow": { "in_try_block": true, "try_depth": 1 } }
            ],
            "mutations": [
                { "target": "process.env.NODE_ENV", "root_object": "process",
                  "property_path": ["env", "NODE_ENV"], "operator": "=", "line": 4, "column": 1 },
                { "target": "process", "root_object": "process", "operator": "=",
                  "is_declaration": true, "line": 5, "column": 1 }
            ]
        }),
    );
    let result = check(&tmp, "src/gateway.ts");
    assert_eq!(codes(&result), vec!["E017", "E019"]);
    assert_eq!(result.violations[0].line, Some(2));
    assert_eq!(result.violations[1].line, Some(4));
}

#[test]
fn companions_and_coverage_look_across_the_project() {
    let tmp = project(
        r#"
[architectures.events]
constraints = [
  { rule = "require_companion_file", value = ["{dir}/README.md"] },
  { rule = "require_coverage", value = { source_type = "pattern", source_pattern = "emit\\('([^']+)'\\)", target_pattern = "case '${value}':", in_target_files = "src/handlers/**" } },
]
"#,
    );
    write(
        tmp.path(),
        "src/events/bus.ts",
        "// @arch events\nemit('user.created');\nemit('user.deleted');\n",
    );
    write(
        tmp.path(),
        "src/handlers/users.ts",
        "switch (e) {\n  case 'user.created': break;\n}\n",
    );
    let result = check(&tmp, "src/events/bus.ts");
    assert_eq!(codes(&result), vec!["E026", "E027"]);
    assert!(matches!(
        result.violations[0].suggestion,
        Some(Suggestion::CreateFile { ref path }) if path == "src/events/README.md"
    ));

    write(tmp.path(), "src/events/README.md", "# events\n");
    write(
        tmp.path(),
        "src/handlers/users.ts",
        "switch (e) {\n  case 'user.created': break;\n  case 'user.deleted': break;\n}\n",
    );
    assert_eq!(check(&tmp, "src/events/bus.ts").status, FileStatus::Pass);
}

#[test]
fn intents_are_verified_without_an_explicit_constraint() {
    let tmp = project(
        r#"
[architectures.svc]
constraints = [{ rule = "max_file_lines", value = 100 }]

[intents.cached]
requires = ["cache\\.get"]
"#,
    );
    write(tmp.path(), "src/svc.ts", "// @arch svc\n// @intent:cachd\nrun();\n");
    let result = check(&tmp, "src/svc.ts");
    assert_eq!(codes(&result), vec!["I001"]);
    assert_eq!(result.violations[0].did_you_mean.as_deref(), Some("cached"));
}

#[test]
fn unknown_rule_warns_and_the_rest_still_run() {
    let tmp = project(
        r#"
[architectures.svc]
constraints = [
  { rule = "max_file_lenght", value = 1 },
  { rule = "forbid_import", value = ["axios"] },
]
"#,
    );
    write(tmp.path(), "src/svc.ts", "// @arch svc\nimport axios from 'axios';\n");
    let result = check(&tmp, "src/svc.ts");
    assert_eq!(codes(&result), vec!["E003"]);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].code, "S004");
    assert_eq!(result.warnings[0].severity, Severity::Warning);
    assert_eq!(result.status, FileStatus::Fail);
}

#[test]
fn malformed_sidecar_is_a_parse_error() {
    let tmp = project("[architectures.svc]\nconstraints = [{ rule = \"max_file_lines\", value = 100 }]\n");
    write(tmp.path(), "src/svc.ts", "// @arch svc\n");
    write(tmp.path(), ".arch/models/src/svc.ts.json", "{ \"classes\": [ ");
    let result = check(&tmp, "src/svc.ts");
    assert_eq!(codes(&result), vec!["S001"]);
    assert_eq!(result.status, FileStatus::Fail);
}

#[test]
fn catastrophic_pattern_is_refused() {
    let tmp = project(
        r#"
[architectures.svc]
constraints = [{ rule = "forbid_pattern", value = "(a+)+$" }]
"#,
    );
    write(tmp.path(), "src/svc.ts", "// @arch svc\nconst s = 'aaaaaaaaaaaaaaaaaaaaaaaaaaaa!';\n");
    let result = check(&tmp, "src/svc.ts");
    assert_eq!(codes(&result), vec!["SEC002"]);
}

#[test]
fn root_level_files_find_their_tests() {
    let tmp = project(
        r#"
[architectures.script]
constraints = [
  { rule = "require_test_file", value = [] },
  { rule = "require_companion_file", value = "{dir}/{name}.md" },
]
"#,
    );
    write(tmp.path(), "main.py", "# @arch script\nprint('hi')\n");
    let missing = check(&tmp, "main.py");
    assert_eq!(codes(&missing), vec!["E012", "E026"]);
    assert!(missing.violations[0].message.contains("test_main.py"));
    assert!(matches!(
        missing.violations[1].suggestion,
        Some(Suggestion::CreateFile { ref path }) if path == "main.md"
    ));

    write(tmp.path(), "test_main.py", "def test_main():\n    pass\n");
    write(tmp.path(), "main.md", "# main\n");
    assert_eq!(check(&tmp, "main.py").status, FileStatus::Pass);
}

#[test]
fn editing_a_sidecar_misses_the_cache() {
    let tmp = project("[architectures.svc]\nconstraints = [{ rule = \"must_extend\", value = \"Base\" }]\n");
    write(tmp.path(), "src/a.ts", "// @arch svc\nexport class A {}\n");
    let model = |base: &str| json!({ "classes": [{ "name": "A", "extends": base, "is_exported": true, "line": 2 }] });
    sidecar(tmp.path(), "src/a.ts", model("Base"));

    let first = ValidationEngine::open(tmp.path()).unwrap().validate_all().unwrap();
    assert_eq!(first.result("src/a.ts").unwrap().status, FileStatus::Pass);
    let again = ValidationEngine::open(tmp.path()).unwrap().validate_all().unwrap();
    assert!(again.result("src/a.ts").unwrap().from_cache);

    sidecar(tmp.path(), "src/a.ts", model("Other"));
    let edited = ValidationEngine::open(tmp.path()).unwrap().validate_all().unwrap();
    let result = edited.result("src/a.ts").unwrap();
    assert!(!result.from_cache);
    assert_eq!(codes(result), vec!["E001"]);
}
