use criterion::{criterion_group, criterion_main, Criterion};
use searchcore::tokenizer::{Analyzer, AnalyzerConfig};

const TEXT: &str = include_str!("../../README.md");

fn bench_tokenize(c: &mut Criterion) {
    let plain = Analyzer::default();
    let stemming = Analyzer::new(AnalyzerConfig { stemming: true, fold_accents: true, ..Default::default() });
    c.bench_function("tokenize_default", |b| b.iter(|| plain.tokenize(TEXT)));
    c.bench_function("tokenize_stem_fold", |b| b.iter(|| stemming.tokenize(TEXT)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
