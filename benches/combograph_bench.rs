// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Benchmarks for graph build, packages and centrality

use combograph::analytics;
use combograph::config::QuerySettings;
use combograph::graph::ComboGraph;
use combograph::loader::Dataset;
use combograph::query::QueryEngine;
use combograph::types::{ColorIdentity, Combo};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Deterministic synthetic dataset: each combo draws 2-4 cards from a pool
/// sized so that popular cards appear in many combos
fn make_combos(count: usize) -> Vec<Combo> {
    let pool = count / 2 + 8;
    (0..count)
        .map(|i| {
            let size = 2 + i % 3;
            let cards = (0..size)
                .map(|k| format!("card-{}", (i * 7 + k * 13 + (i / 5) * k) % pool))
                .collect();
            Combo {
                id: format!("combo-{i:05}"),
                card_names: cards,
                prerequisites: vec![],
                steps: vec![],
                produces: vec![format!("effect-{}", i % 11)],
                color_identity: ColorIdentity::colorless(),
                popularity: None,
                mana_needed: None,
                description: None,
            }
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for size in [500, 2_000, 8_000] {
        let combos = make_combos(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &combos, |b, combos| {
            b.iter(|| ComboGraph::build(black_box(combos.clone())).unwrap());
        });
    }
    group.finish();
}

fn bench_packages(c: &mut Criterion) {
    let graph = ComboGraph::build(make_combos(4_000)).unwrap();
    let mut group = c.benchmark_group("packages");
    for threshold in [1, 2] {
        group.bench_with_input(BenchmarkId::from_parameter(threshold), &threshold, |b, &t| {
            b.iter(|| analytics::find_packages(&graph, black_box(t)));
        });
    }
    group.finish();
}

fn bench_centrality(c: &mut Criterion) {
    let graph = ComboGraph::build(make_combos(1_000)).unwrap();
    let settings = QuerySettings::default();
    c.bench_function("centrality/1000", |b| {
        b.iter(|| analytics::compute_centrality(black_box(&graph), &settings));
    });
}

fn bench_queries(c: &mut Criterion) {
    let engine = QueryEngine::new(Dataset::from_combos("bench", make_combos(4_000)), QuerySettings::default()).unwrap();
    c.bench_function("distance2", |b| {
        b.iter(|| engine.distance2(black_box("combo-00042")).unwrap());
    });
    c.bench_function("related", |b| {
        b.iter(|| engine.related(black_box("combo-00042"), 10).unwrap());
    });
}

criterion_group!(benches, bench_build, bench_packages, bench_centrality, bench_queries);
criterion_main!(benches);
