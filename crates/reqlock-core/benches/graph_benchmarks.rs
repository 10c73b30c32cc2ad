use criterion::{criterion_group, criterion_main, Criterion};
use reqlock_core::{reconcile, BatchInputs, DependencyGraph, InstalledDistribution, ReverseIndex};
use reqlock_schema::{Category, LockFile, MarkerEnvironment, PackageEntry, ResolvedCandidate};
use std::collections::BTreeMap;

/// A layered distribution set: each package requires the next two.
fn layered(count: usize) -> Vec<InstalledDistribution> {
    (0..count)
        .map(|i| {
            let requires = (i + 1..count.min(i + 3))
                .map(|j| format!("pkg-{j}>=1.0; python_version >= '3.8'"))
                .collect::<Vec<_>>();
            InstalledDistribution::new(format!("pkg-{i}"), "1.2.0").requires(requires)
        })
        .collect()
}

fn environment() -> MarkerEnvironment {
    MarkerEnvironment::new()
        .with_overrides([("python_version", "3.11")])
        .unwrap()
}

fn bench_graph_build(c: &mut Criterion) {
    let dists = layered(500);
    let env = environment();
    c.bench_function("graph_build_500", |b| {
        b.iter(|| DependencyGraph::build(&dists, &env));
    });
}

fn bench_reverse_index(c: &mut Criterion) {
    let graph = DependencyGraph::build(&layered(60), &environment());
    c.bench_function("reverse_index_60_layered", |b| {
        b.iter(|| ReverseIndex::invert(&graph));
    });
}

fn bench_reconcile(c: &mut Criterion) {
    let results: Vec<ResolvedCandidate> = (0..300)
        .map(|i| {
            let mut entry = PackageEntry::with_version("==2.0.0");
            entry.hashes = vec!["sha256:b".into(), "sha256:a".into()];
            ResolvedCandidate::new(format!("pkg-{i}"), entry)
        })
        .collect();
    let mut lock: LockFile = serde_json::from_str(r#"{"_meta": {"pipfile-spec": 6}}"#).unwrap();
    let section: BTreeMap<String, PackageEntry> = (0..300)
        .map(|i| (format!("pkg-{i}"), PackageEntry::with_version("1.0.0")))
        .collect();
    lock.sections.insert("default".into(), section);
    let reverse = ReverseIndex::default();
    let inputs = BatchInputs {
        manifest: None,
        reverse: &reverse,
        constraints: &[],
    };
    let category = Category::default_packages();

    c.bench_function("reconcile_300_tracked", |b| {
        b.iter(|| reconcile(&results, Some(&lock), &category, &inputs).unwrap());
    });
}

criterion_group!(benches, bench_graph_build, bench_reverse_index, bench_reconcile);
criterion_main!(benches);
