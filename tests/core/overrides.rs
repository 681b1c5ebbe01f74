use archgov::core::audit::{OverrideState, audit_overrides};
use archgov::core::constraint::{Constraint, ConstraintValue, Rule, Severity};
use archgov::core::engine::ValidationEngine;
use archgov::core::overrides::{OverridePolicy, apply_overrides};
use archgov::core::tags::{OverrideTag, extract_tags};
use archgov::core::violation::{FileStatus, Violation};
use chrono::NaiveDate;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn axios_violation() -> Violation {
    let c = Constraint::new(Rule::ForbidImport, ConstraintValue::List(vec!["axios".into()]));
    Violation::for_constraint(
        "E003",
        &c,
        ConstraintValue::Text("axios".into()),
        "Import 'axios' is forbidden",
        "Use the http wrapper",
    )
    .at(4)
}

fn axios_override(reason: Option<&str>, expires: &str) -> OverrideTag {
    OverrideTag {
        rule: "forbid_import".into(),
        value: "axios".into(),
        reason: reason.map(str::to_string),
        expires: Some(expires.into()),
        line: 2,
        ..OverrideTag::default()
    }
}

#[test]
fn matching_override_suppresses_and_counts() {
    let outcome = apply_overrides(
        vec![axios_violation()],
        &[axios_override(Some("legacy client"), "2026-12-01")],
        &OverridePolicy::default(),
        day(2026, 10, 1),
    );
    assert!(outcome.kept.is_empty());
    assert_eq!(outcome.overrides_count(), 1);
    assert!(outcome.issues.is_empty());
}

#[test]
fn missing_reason_reports_the_override_and_keeps_the_violation() {
    let outcome = apply_overrides(
        vec![axios_violation()],
        &[axios_override(None, "2026-12-01")],
        &OverridePolicy::default(),
        day(2026, 10, 1),
    );
    assert_eq!(outcome.kept.len(), 1);
    assert_eq!(outcome.overrides_count(), 0);
    let issue_codes: Vec<&str> = outcome.issues.iter().map(|v| v.code.as_str()).collect();
    assert_eq!(issue_codes, vec!["O002"]);
    assert_eq!(outcome.issues[0].line, Some(2));
}

#[test]
fn expired_override_is_error_or_warning_by_policy_and_still_suppresses() {
    let tag = axios_override(Some("legacy"), "2020-01-01");
    let strict = apply_overrides(vec![axios_violation()], &[tag.clone()], &OverridePolicy::default(), day(2026, 1, 1));
    assert_eq!(strict.overrides_count(), 1);
    assert_eq!(strict.issues[0].code, "O003");
    assert_eq!(strict.issues[0].severity, Severity::Error);

    let lenient_policy = OverridePolicy {
        fail_on_expired: false,
        ..OverridePolicy::default()
    };
    let lenient = apply_overrides(vec![axios_violation()], &[tag], &lenient_policy, day(2026, 1, 1));
    assert_eq!(lenient.overrides_count(), 1);
    assert_eq!(lenient.issues[0].code, "O003");
    assert_eq!(lenient.issues[0].severity, Severity::Warning);
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

#[test]
fn engine_applies_tags_from_the_file_header() {
    let tmp = tempdir().unwrap();
    write(
        tmp.path(),
        ".arch/registry.toml",
        "[architectures.svc]\nconstraints = [{ rule = \"forbid_import\", value = [\"axios\"] }]\n",
    );
    write(
        tmp.path(),
        "src/ok.ts",
        "/**\n * @arch svc\n * @override forbid_import:axios\n * @reason vendor SDK needs it\n * @expires 2026-11-30\n */\nimport axios from 'axios';\n",
    );
    write(
        tmp.path(),
        "src/expired.ts",
        "// @arch svc\n// @override forbid_import:axios\n// @reason vendor SDK\n// @expires 2020-01-01\nimport axios from 'axios';\n",
    );
    let engine = ValidationEngine::open(tmp.path()).unwrap().with_today(day(2026, 10, 19));
    let report = engine.validate_all().unwrap();

    let ok = report.result("src/ok.ts").unwrap();
    assert_eq!(ok.status, FileStatus::Pass);
    assert_eq!(ok.overrides_count, 1);

    let expired = report.result("src/expired.ts").unwrap();
    assert_eq!(expired.status, FileStatus::Fail);
    assert_eq!(expired.overrides_count, 1);
    let found: Vec<&str> = expired.violations.iter().map(|v| v.code.as_str()).collect();
    assert_eq!(found, vec!["O003"]);
}

#[test]
fn audit_groups_recurring_overrides() {
    let tmp = tempdir().unwrap();
    write(tmp.path(), ".arch/registry.toml", "");
    for name in ["a", "b", "c"] {
        write(
            tmp.path(),
            &format!("src/{}.ts", name),
            "// @arch svc\n// @override forbid_import:axios\n// @reason legacy\n// @expires 2026-11-01\n",
        );
    }
    write(
        tmp.path(),
        "src/d.ts",
        "// @arch svc\n// @override max_file_lines:300\n// @reason generated\n",
    );
    let engine = ValidationEngine::open(tmp.path()).unwrap();
    let records = engine.collect_overrides().unwrap();
    let report = audit_overrides(&records, &engine.config().overrides, day(2026, 10, 19));

    assert_eq!(report.totals.total, 4);
    assert_eq!(report.totals.expiring_soon, 3);
    assert_eq!(report.totals.missing_expiry, 1);
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].files.len(), 3);
    assert_eq!(report.clusters[0].suggested_intent, "uses-axios");
    assert!(report.entries.iter().all(|e| e.state != OverrideState::Invalid));
}

#[test]
fn override_blocks_end_at_code() {
    let tags = extract_tags(
        "// @arch svc\n// @override forbid_import:axios\nimport axios from 'axios';\n// @reason too late\n",
    );
    assert_eq!(tags.overrides.len(), 1);
    assert_eq!(tags.overrides[0].reason, None);
    assert_eq!(tags.errors[0].code, "O001");
}
