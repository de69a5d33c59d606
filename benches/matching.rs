// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for the tql compile and match paths
//!
//! Run with: cargo bench

use std::fmt::Write as _;
use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use tql::simple::SimpleTree;

/// A feed-like fragment: `items` articles, each with a header run and a
/// nested body.
fn feed_fragment(items: usize) -> String {
    let mut out = String::from("<div class=\"feed\">");
    for i in 0..items {
        let class = if i % 5 == 0 { " class=\"ad\"" } else { "" };
        let _ = write!(
            out,
            "<article{class}><h2>Title {i}</h2><p>intro</p>\
             <section><span><a href=\"/item/{i}\">read</a></span></section></article>"
        );
    }
    out.push_str("</div>");
    out
}

fn bench_compile(c: &mut Criterion) {
    let query = "article!.ad > (section >)* >> a[txt, .href]~(.href ~~ '/item/.*')";
    c.bench_function("compile", |b| {
        b.iter(|| tql::compile(black_box(query)).expect("should compile"));
    });
}

fn bench_match_deep_repetition(c: &mut Criterion) {
    let pattern = tql::compile("article > (section >)* >> a[.href]").expect("should compile");
    let fragment = feed_fragment(100);
    let tree = SimpleTree::parse(&fragment).expect("should parse");
    c.bench_function("match_deep_repetition", |b| {
        b.iter(|| {
            let found = pattern
                .match_all(black_box(tree.root()))
                .expect("should match");
            black_box(found.len())
        });
    });
}

fn bench_match_breadth_run(c: &mut Criterion) {
    let pattern = tql::compile("{ h2[txt] :: a[.href] }").expect("should compile");
    let fragment = feed_fragment(100);
    let tree = SimpleTree::parse(&fragment).expect("should parse");
    c.bench_function("match_breadth_run", |b| {
        b.iter(|| {
            let found = pattern
                .match_all(black_box(tree.root()))
                .expect("should match");
            black_box(found.len())
        });
    });
}

criterion_group!(
    benches,
    bench_compile,
    bench_match_deep_repetition,
    bench_match_breadth_run
);
criterion_main!(benches);
