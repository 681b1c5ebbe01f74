use archgov::core::engine::ValidationEngine;
use archgov::core::registry::Registry;
use archgov::core::resolver::{ResolveOptions, resolve};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn chain(depth: usize) -> Registry {
    let mut toml = String::from("[mixins.tested]\nconstraints = [{ rule = \"require_test_file\", value = [] }]\n");
    toml.push_str("[architectures.n0]\nconstraints = [{ rule = \"max_file_lines\", value = 500 }]\n");
    for i in 1..depth {
        toml.push_str(&format!(
            "[architectures.n{}]\ninherits = \"n{}\"\nmixins = [\"tested\"]\nconstraints = [{{ rule = \"forbid_import\", value = [\"pkg{}\"] }}]\n",
            i,
            i - 1,
            i
        ));
    }
    Registry::from_toml_str(&toml).unwrap()
}

/// Flattening cost as the inheritance chain grows.
fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    for depth in [4, 16, 64] {
        let registry = chain(depth);
        let leaf = format!("n{}", depth - 1);
        group.bench_with_input(BenchmarkId::new("chain", depth), &leaf, |b, leaf| {
            b.iter(|| black_box(resolve(&registry, leaf, ResolveOptions::default()).unwrap()));
        });
    }
    group.finish();
}

fn seed_project(files: usize) -> TempDir {
    let tmp = TempDir::new().unwrap();
    let arch = tmp.path().join(".arch");
    fs::create_dir_all(&arch).unwrap();
    fs::write(
        arch.join("registry.toml"),
        r#"
[architectures.base]
constraints = [
  { rule = "max_file_lines", value = 300 },
  { rule = "forbid_pattern", value = "console\\.log" },
]

[architectures.svc]
inherits = "base"
constraints = [
  { rule = "forbid_import", value = ["axios", "lodash"] },
  { rule = "forbid_circular_deps", value = [] },
]
"#,
    )
    .unwrap();
    let src = tmp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    for i in 0..files {
        let next = (i + 1) % files;
        fs::write(
            src.join(format!("m{}.ts", i)),
            format!(
                "// @arch svc\nimport {{ f{} }} from './m{}';\nexport function f{}() {{ return f{}(); }}\n",
                next, next, i, next
            ),
        )
        .unwrap();
    }
    tmp
}

/// Full project runs, cold (no cache) and warm (every file a hit).
fn bench_batch_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_validation");
    group.measurement_time(Duration::from_secs(10));
    for files in [50, 200] {
        let project = seed_project(files);
        group.bench_with_input(BenchmarkId::new("cold", files), &project, |b, project| {
            let engine = ValidationEngine::open(project.path()).unwrap().with_cache_enabled(false);
            b.iter(|| black_box(engine.validate_all().unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("warm", files), &project, |b, project| {
            let engine = ValidationEngine::open(project.path()).unwrap();
            engine.validate_all().unwrap();
            b.iter(|| black_box(engine.validate_all().unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolution, bench_batch_validation);
criterion_main!(benches);
