use archgov::core::config::Config;
use archgov::core::engine::ValidationEngine;
use archgov::core::registry::Registry;
use archgov::core::violation::FileStatus;
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

const REGISTRY: &str = r#"
[architectures.base]
constraints = [{ rule = "max_file_lines", value = 300 }]

[architectures.child]
inherits = "base"
constraints = [{ rule = "forbid_import", value = ["axios"], alternatives = ["src/lib/http"] }]

[architectures.layered]
constraints = [
  { rule = "importable_by", value = ["src/api/**"] },
  { rule = "forbid_circular_deps", value = [] },
]
"#;

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn project() -> TempDir {
    let tmp = tempdir().unwrap();
    write(tmp.path(), ".arch/registry.toml", REGISTRY);
    tmp
}

fn long_file(tag: &str, lines: usize, import: &str) -> String {
    let mut body = format!("// @arch {}\n{}\n", tag, import);
    for i in 2..lines {
        body.push_str(&format!("const v{} = {};\n", i, i));
    }
    body
}

fn codes(engine: &ValidationEngine, path: &str) -> Vec<String> {
    let report = engine.validate_paths(&[path.to_string()]).unwrap();
    report.results[0].violations.iter().map(|v| v.code.clone()).collect()
}

#[test]
fn inherited_line_limit_and_child_forbid_both_fire() {
    let tmp = project();
    let body = long_file("child", 310, "import axios from 'axios';");
    assert_eq!(body.lines().count(), 310);
    write(tmp.path(), "src/service.ts", &body);

    let engine = ValidationEngine::open(tmp.path()).unwrap();
    let report = engine.validate_all().unwrap();
    let result = report.result("src/service.ts").unwrap();
    let found: Vec<&str> = result.violations.iter().map(|v| v.code.as_str()).collect();
    assert_eq!(found, vec!["E010", "E003"]);
    assert_eq!(result.violations[1].line, Some(2));
    assert!(result.violations[1].fix_hint.contains("src/lib/http"));
    assert_eq!(report.summary.failed, 1);
}

#[test]
fn unchanged_file_is_a_cache_hit_with_identical_output() {
    let tmp = project();
    write(tmp.path(), "src/service.ts", &long_file("child", 310, "import axios from 'axios';"));

    let first = ValidationEngine::open(tmp.path()).unwrap().validate_all().unwrap();
    let second = ValidationEngine::open(tmp.path()).unwrap().validate_all().unwrap();

    let a = first.result("src/service.ts").unwrap();
    let b = second.result("src/service.ts").unwrap();
    assert!(!a.from_cache);
    assert!(b.from_cache);
    assert_eq!(a.violations, b.violations);
    assert_eq!(a.status, b.status);
    assert_eq!(second.cache.unwrap().hits, 1);
}

#[test]
fn registry_change_invalidates_every_entry() {
    let tmp = project();
    write(tmp.path(), "src/a.ts", "// @arch base\n");
    write(tmp.path(), "src/b.ts", "// @arch child\n");
    ValidationEngine::open(tmp.path()).unwrap().validate_all().unwrap();

    write(
        tmp.path(),
        ".arch/registry.toml",
        &REGISTRY.replace("value = 300", "value = 299"),
    );
    let report = ValidationEngine::open(tmp.path()).unwrap().validate_all().unwrap();
    let stats = report.cache.unwrap();
    assert!(stats.full_invalidation);
    assert_eq!(stats.hits, 0);
    assert_eq!(report.summary.cached, 0);
}

#[test]
fn config_change_invalidates_too() {
    let tmp = project();
    write(tmp.path(), "src/a.ts", "// @arch base\n");
    ValidationEngine::open(tmp.path()).unwrap().validate_all().unwrap();
    write(tmp.path(), ".arch/config.toml", "[overrides]\nmax_per_file = 2\n");
    let report = ValidationEngine::open(tmp.path()).unwrap().validate_all().unwrap();
    assert!(report.cache.unwrap().full_invalidation);
}

#[test]
fn import_graph_rules_use_the_whole_project() {
    let tmp = project();
    write(tmp.path(), "src/core/db.ts", "// @arch layered\nimport { a } from '../api/a';\n");
    write(tmp.path(), "src/api/a.ts", "// @arch layered\nimport { db } from '../core/db';\n");
    write(tmp.path(), "src/ui/view.ts", "import { db } from '../core/db';\n");

    let engine = ValidationEngine::open(tmp.path()).unwrap();
    let found = codes(&engine, "src/core/db.ts");
    assert!(found.contains(&"E013".to_string()), "{:?}", found);
    assert!(found.contains(&"E014".to_string()), "{:?}", found);
}

#[test]
fn many_files_validate_consistently_in_parallel() {
    let tmp = project();
    for i in 0..64 {
        let import = if i % 2 == 0 { "import axios from 'axios';" } else { "import x from './x';" };
        write(tmp.path(), &format!("src/m{:02}.ts", i), &format!("// @arch child\n{}\n", import));
    }
    let engine = ValidationEngine::new(
        tmp.path(),
        Config::default(),
        Registry::load(tmp.path()).unwrap(),
    )
    .with_cache_enabled(false);
    let report = engine.validate_all().unwrap();
    assert_eq!(report.summary.files, 64);
    assert_eq!(report.summary.failed, 32);
    assert!(report.cache.is_none());
    assert_eq!(report.session.architectures.entries, 1);
    for (i, result) in report.results.iter().enumerate() {
        let expected = if i % 2 == 0 { FileStatus::Fail } else { FileStatus::Pass };
        assert_eq!(result.status, expected, "{}", result.path);
    }
}

#[test]
fn broken_architecture_only_fails_its_files() {
    let tmp = project();
    write(
        tmp.path(),
        ".arch/registry/extra.toml",
        "[architectures.loop_a]\ninherits = \"loop_b\"\n[architectures.loop_b]\ninherits = \"loop_a\"\n",
    );
    write(tmp.path(), "src/a.ts", "// @arch loop_a\n");
    write(tmp.path(), "src/b.ts", "// @arch base\n");
    let report = ValidationEngine::open(tmp.path()).unwrap().validate_all().unwrap();
    assert_eq!(report.result("src/a.ts").unwrap().violations[0].code, "S005");
    assert_eq!(report.result("src/b.ts").unwrap().status, FileStatus::Pass);
}

#[test]
fn clearing_the_cache_forces_revalidation() {
    let tmp = project();
    write(tmp.path(), "src/a.ts", "// @arch base\n");
    let engine = ValidationEngine::open(tmp.path()).unwrap();
    engine.validate_all().unwrap();
    assert_eq!(engine.cache_info().entries, 1);
    assert!(engine.clear_cache().unwrap());
    assert!(!engine.cache_info().exists);
    assert_eq!(engine.validate_all().unwrap().summary.cached, 0);
}
