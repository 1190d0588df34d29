//! Benchmarks for feature analysis and transformation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use featureflow::features::{analyze, ColumnValues, FeatureSchema, RawFeatures, SparseColumn, TransformPolicy};
use std::sync::Arc;

#[allow(clippy::cast_precision_loss)]
fn kdd_corpus(rows: usize) -> RawFeatures {
    let schema = FeatureSchema::kdd();
    let mut corpus = RawFeatures::new();
    for (i, key) in schema.numerical_keys().iter().enumerate() {
        let values = (0..rows).map(|r| ((r * (i + 3)) % 97) as f64).collect();
        corpus.insert(key.clone(), ColumnValues::Float(values).into());
    }
    for key in schema.categorical_keys() {
        let indices = (0..rows).filter(|r| r % 5 != 0).map(|r| [r, 0]).collect::<Vec<_>>();
        let values = indices.iter().map(|[r, _]| format!("v{}", r % 7)).collect();
        corpus.insert(key.clone(), SparseColumn::new(indices, ColumnValues::Text(values), [rows, 1]).into());
    }
    for key in schema.label_keys() {
        corpus.insert(key.clone(), ColumnValues::Text(vec!["normal.".to_string(); rows]).into());
    }
    corpus
}

fn transform_benchmark(c: &mut Criterion) {
    let schema = FeatureSchema::kdd();
    let mut group = c.benchmark_group("kdd_transform");

    for rows in [200, 2_000] {
        let corpus = kdd_corpus(rows);
        group.bench_with_input(BenchmarkId::new("analyze", rows), &corpus, |b, corpus| {
            b.iter(|| analyze(black_box(&schema), black_box(corpus)));
        });

        let policy = TransformPolicy::new(Arc::new(analyze(&schema, &corpus).unwrap()));
        group.bench_with_input(BenchmarkId::new("transform", rows), &corpus, |b, corpus| {
            b.iter(|| policy.transform(black_box(corpus)));
        });
    }
    group.finish();
}

criterion_group!(benches, transform_benchmark);
criterion_main!(benches);
