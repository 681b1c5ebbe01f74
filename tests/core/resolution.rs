use archgov::core::constraint::ConstraintValue;
use archgov::core::error::{ArchError, ResolutionError};
use archgov::core::registry::Registry;
use archgov::core::resolver::{ResolveOptions, resolve, resolve_all};
use std::fs;
use tempfile::tempdir;

fn registry(toml: &str) -> Registry {
    Registry::from_toml_str(toml).expect("registry should parse")
}

fn chain_registry(depth: usize) -> Registry {
    let mut toml = String::from("[architectures.n0]\nconstraints = [{ rule = \"max_file_lines\", value = 100 }]\n");
    for i in 1..depth {
        toml.push_str(&format!(
            "[architectures.n{}]\ninherits = \"n{}\"\nconstraints = [{{ rule = \"forbid_import\", value = [\"pkg{}\"] }}]\n",
            i,
            i - 1,
            i
        ));
    }
    registry(&toml)
}

#[test]
fn acyclic_chains_terminate_at_true_depth() {
    for depth in [1, 2, 7, 40] {
        let reg = chain_registry(depth);
        let leaf = format!("n{}", depth - 1);
        let flat = resolve(&reg, &leaf, ResolveOptions::default()).expect("acyclic chain resolves");
        assert_eq!(flat.inheritance_chain.len(), depth);
        assert_eq!(flat.inheritance_chain.first().map(String::as_str), Some("n0"));
        assert_eq!(flat.inheritance_chain.last(), Some(&leaf));
    }
}

#[test]
fn cycles_are_reported_not_looped() {
    let reg = registry(
        r#"
[architectures.a]
inherits = "b"

[architectures.b]
inherits = "a"

[architectures.self]
inherits = "self"
"#,
    );
    for id in ["a", "b", "self"] {
        let err = resolve(&reg, id, ResolveOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "CIRCULAR_INHERITANCE");
    }
}

#[test]
fn a_broken_node_only_fails_its_descendants() {
    let reg = registry(
        r#"
[architectures.ok]
constraints = [{ rule = "max_file_lines", value = 10 }]

[architectures.orphan]
inherits = "missing"

[architectures.child]
inherits = "orphan"
"#,
    );
    let all = resolve_all(&reg, ResolveOptions::default());
    assert!(all["ok"].is_ok());
    assert!(matches!(
        all["child"],
        Err(ResolutionError::UnknownArch { ref id, .. }) if id == "missing"
    ));
}

#[test]
fn resolution_is_idempotent() {
    let reg = registry(
        r#"
[mixins.tested]
constraints = [{ rule = "require_test_file", value = [] }]

[architectures.base]
constraints = [
  { rule = "forbid_import", value = ["lodash"] },
  { rule = "max_file_lines", value = 300 },
]

[architectures.svc]
inherits = "base"
mixins = ["tested"]
constraints = [{ rule = "forbid_import", value = ["axios", "lodash"] }]
"#,
    );
    let first = resolve(&reg, "svc", ResolveOptions::default()).unwrap();
    let _ = resolve(&reg, "base", ResolveOptions::default()).unwrap();
    let second = resolve(&reg, "svc", ResolveOptions::default()).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first.constraints).unwrap(),
        serde_json::to_string(&second.constraints).unwrap()
    );
}

#[test]
fn child_adds_to_base_in_order() {
    let reg = registry(
        r#"
[architectures.base]
constraints = [{ rule = "max_file_lines", value = 300 }]

[architectures.child]
inherits = "base"
constraints = [{ rule = "forbid_import", value = ["axios"] }]
"#,
    );
    let flat = resolve(&reg, "child", ResolveOptions::default()).unwrap();
    let summary: Vec<(&str, &ConstraintValue)> =
        flat.constraints.iter().map(|c| (c.rule.as_str(), &c.value)).collect();
    assert_eq!(
        summary,
        vec![
            ("max_file_lines", &ConstraintValue::Number(300)),
            ("forbid_import", &ConstraintValue::List(vec!["axios".into()])),
        ]
    );
    assert_eq!(flat.constraints[0].source.as_deref(), Some("base"));
    assert_eq!(flat.constraints[1].source.as_deref(), Some("child"));
}

#[test]
fn closer_to_leaf_wins_for_singletons() {
    let reg = registry(
        r#"
[architectures.base]
constraints = [
  { rule = "max_file_lines", value = 300 },
  { rule = "forbid_import", value = ["axios"] },
]

[architectures.strict]
inherits = "base"
constraints = [{ rule = "max_file_lines", value = 120 }]
"#,
    );
    let flat = resolve(&reg, "strict", ResolveOptions::default()).unwrap();
    assert_eq!(flat.constraints.len(), 2);
    assert_eq!(flat.constraints[0].value, ConstraintValue::Number(120));
    assert_eq!(flat.constraints[0].source.as_deref(), Some("strict"));
}

#[test]
fn allow_import_lifts_inherited_forbids() {
    let reg = registry(
        r#"
[architectures.base]
constraints = [{ rule = "forbid_import", value = ["axios", "fs"] }]

[architectures.io]
inherits = "base"
constraints = [{ rule = "allow_import", value = ["fs"] }]
"#,
    );
    let flat = resolve(&reg, "io", ResolveOptions::default()).unwrap();
    let forbid = flat.constraints.iter().find(|c| c.rule == "forbid_import").unwrap();
    assert_eq!(forbid.value, ConstraintValue::List(vec!["axios".into()]));
}

#[test]
fn registry_files_merge_and_checksum_tracks_constraints() {
    let tmp = tempdir().unwrap();
    let arch = tmp.path().join(".arch/registry");
    fs::create_dir_all(&arch).unwrap();
    fs::write(
        arch.join("a.toml"),
        "[architectures.base]\nconstraints = [{ rule = \"max_file_lines\", value = 300 }]\n",
    )
    .unwrap();
    fs::write(arch.join("b.toml"), "[architectures.child]\ninherits = \"base\"\n").unwrap();

    let first = Registry::load(tmp.path()).unwrap();
    assert!(first.contains("base") && first.contains("child"));

    fs::write(
        arch.join("a.toml"),
        "# reformatted\n[architectures.base]\nconstraints = [\n  { rule = \"max_file_lines\", value = 300 },\n]\n",
    )
    .unwrap();
    assert_eq!(Registry::load(tmp.path()).unwrap().checksum(), first.checksum());

    fs::write(
        arch.join("a.toml"),
        "[architectures.base]\nconstraints = [{ rule = \"max_file_lines\", value = 301 }]\n",
    )
    .unwrap();
    assert_ne!(Registry::load(tmp.path()).unwrap().checksum(), first.checksum());
}

#[test]
fn malformed_registry_is_an_s005() {
    let err = Registry::from_toml_str("[architectures.x\n").unwrap_err();
    assert!(matches!(err, ArchError::RegistryError { .. }));
    assert_eq!(err.code(), "S005");
}
