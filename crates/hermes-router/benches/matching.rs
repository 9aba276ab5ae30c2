//! Path matching benchmarks.
//!
//! Run with: `cargo bench -p hermes-router`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hermes_router::{Operator, PathPattern};

fn build_patterns(count: usize) -> Vec<(PathPattern, Operator)> {
    let mut patterns = Vec::with_capacity(count);
    for i in 0..count / 3 {
        patterns.push((
            PathPattern::parse(&format!("/api/v1/resource{i}")).unwrap(),
            Operator::Exact,
        ));
        patterns.push((
            PathPattern::parse(&format!("/api/v1/resource{i}/:id")).unwrap(),
            Operator::Prefix,
        ));
        patterns.push((
            PathPattern::parse(&format!("/api/v1/org/{{org}}/resource{i}/*rest")).unwrap(),
            Operator::Prefix,
        ));
    }
    patterns
}

/// Mirrors best-match selection: keep the most specific match, earliest on ties.
fn best_match<'a>(patterns: &'a [(PathPattern, Operator)], path: &str) -> Option<&'a PathPattern> {
    let mut best = None;
    for (pattern, operator) in patterns {
        if pattern.matches(path, *operator).is_some() {
            let rank = pattern.specificity(*operator);
            if best.map_or(true, |(best_rank, _)| rank > best_rank) {
                best = Some((rank, pattern));
            }
        }
    }
    best.map(|(_, pattern)| pattern)
}

fn bench_single_match(c: &mut Criterion) {
    let pattern = PathPattern::parse("/api/v1/org/:org/resource/:id").unwrap();

    c.bench_function("single_param_match", |b| {
        b.iter(|| black_box(pattern.matches("/api/v1/org/acme/resource/42", Operator::Exact)));
    });
}

fn bench_best_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("best_match");

    for count in [30, 150, 600] {
        let patterns = build_patterns(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &patterns, |b, patterns| {
            b.iter(|| black_box(best_match(patterns, "/api/v1/resource7/12345")));
        });
    }

    group.finish();
}

fn bench_miss(c: &mut Criterion) {
    let patterns = build_patterns(150);

    c.bench_function("best_match_miss", |b| {
        b.iter(|| black_box(best_match(&patterns, "/nothing/here")));
    });
}

criterion_group!(benches, bench_single_match, bench_best_match, bench_miss);
criterion_main!(benches);
