//! Benchmarks for webcrawler
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn vocabulary() -> Vec<String> {
    (0..2000).map(|i| format!("word{:04}x", i * 7919 % 2000)).collect()
}

fn benchmark_trie_operations(c: &mut Criterion) {
    use webcrawler::index::InvertedIndex;

    let words = vocabulary();

    c.bench_function("trie_add_appearance", |b| {
        b.iter(|| {
            let mut index = InvertedIndex::new();
            for (i, word) in words.iter().enumerate() {
                index.add_appearance(word, i % 16, i % 100);
            }
            black_box(index.len());
        })
    });

    let mut index = InvertedIndex::new();
    for (i, word) in words.iter().enumerate() {
        index.add_appearance(word, i % 16, i % 100);
    }
    c.bench_function("trie_lookup", |b| {
        b.iter(|| {
            for word in &words {
                black_box(index.get(word));
            }
        })
    });
}

fn benchmark_visited_set(c: &mut Criterion) {
    use webcrawler::crawler::VisitedSet;

    let urls: Vec<String> = (0..2000)
        .map(|i| format!("/site{}/page{}.html", i % 13, i * 7919 % 2000))
        .collect();

    c.bench_function("visited_set_add", |b| {
        b.iter(|| {
            let set = VisitedSet::new();
            for url in &urls {
                black_box(set.add(url));
            }
        })
    });
}

fn benchmark_underline(c: &mut Criterion) {
    use webcrawler::executor::render::underline;

    let line = "the quick brown apple jumps over the lazy pie ".repeat(8);
    let query = ["apple", "pie"];

    c.bench_function("underline_wrapped_line", |b| {
        b.iter(|| black_box(underline(black_box(&line), &query, 80)))
    });
}

criterion_group!(
    benches,
    benchmark_trie_operations,
    benchmark_visited_set,
    benchmark_underline
);
criterion_main!(benches);
