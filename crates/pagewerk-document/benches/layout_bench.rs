// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the pagewerk-document crate: grid layout planning
// and a full merge through the in-memory backend.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use pagewerk_document::layout::{self, GridShape};
use pagewerk_document::memory::{MemoryDocument, MemoryLibrary, MemoryPage};
use pagewerk_document::{Composer, PageSize};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Plan a 3-column grid for 500 images of mixed aspect ratios on A4.
fn bench_grid_layout(c: &mut Criterion) {
    let images: Vec<(f32, f32)> = (0..500)
        .map(|i| if i % 2 == 0 { (1200.0, 800.0) } else { (800.0, 1200.0) })
        .collect();
    let page = PageSize::new(595.0, 842.0);

    c.bench_function("plan_grid (500 images)", |b| {
        b.iter(|| layout::plan_grid(black_box(&images), page, 28.35));
    });

    c.bench_function("plan_grid_with_shape 3x3 (500 images)", |b| {
        let shape = GridShape { cols: 3, rows: 3 };
        b.iter(|| layout::plan_grid_with_shape(black_box(&images), page, 28.35, shape));
    });
}

/// Merge ten 50-page in-memory documents.
fn bench_merge(c: &mut Criterion) {
    let inputs: Vec<Vec<u8>> = (0..10)
        .map(|doc| {
            let pages = (0..50).map(|p| MemoryPage::new(format!("{doc}-{p}"))).collect();
            MemoryDocument::with_pages(pages).to_bytes().unwrap()
        })
        .collect();
    let refs: Vec<&[u8]> = inputs.iter().map(Vec::as_slice).collect();
    let composer = Composer::new(&MemoryLibrary);

    c.bench_function("merge (10 x 50 pages)", |b| {
        b.iter(|| composer.merge(black_box(&refs)).unwrap());
    });
}

criterion_group!(benches, bench_grid_layout, bench_merge);
criterion_main!(benches);
