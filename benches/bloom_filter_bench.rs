use criterion::{Criterion, black_box, criterion_group, criterion_main};
use crawlmine::bloom_filter::TokenPreFilter;
use crawlmine::matcher::MatcherLike;
use crawlmine::term::Term;

const UNRELATED: &str = "mix the flour, water and salt, then leave the sourdough to rest overnight \
    before shaping it into a loaf and baking it in a very hot oven for forty minutes.";

fn terms(n: usize) -> Vec<Term> {
    (0..n).map(|i| Term::new(&format!("entity{} name{}", i, i % 113), &format!("Q{}", i))).collect()
}

fn bench_build(c: &mut Criterion) {
    let terms = terms(50_000);
    c.bench_function("prefilter_build_50k", |b| {
        b.iter(|| TokenPreFilter::from_terms(black_box(&terms)))
    });
}

fn bench_reject(c: &mut Criterion) {
    let filter = TokenPreFilter::from_terms(&terms(50_000));
    let page = UNRELATED.repeat(20);
    c.bench_function("prefilter_has_match_unrelated", |b| {
        b.iter(|| filter.has_match(black_box(&page)))
    });
}

criterion_group!(benches, bench_build, bench_reject);
criterion_main!(benches);
