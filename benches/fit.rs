// Copyright 2024 the Bezfit Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks of the fitter on circular arcs of varying density.

#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::f64::consts::PI;
use std::hint::black_box;

use bezfit::fit_cubic_to_points;

fn half_circle(n: usize) -> Vec<f64> {
    (0..n)
        .flat_map(|k| {
            let a = k as f64 / (n - 1) as f64 * PI;
            [a.cos(), a.sin()]
        })
        .collect()
}

fn bench_fit(cc: &mut Criterion) {
    let mut group = cc.benchmark_group("fit_half_circle");
    for n in [64usize, 256, 1024] {
        let points = half_circle(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &points, |b, points| {
            b.iter(|| fit_cubic_to_points(black_box(points), 2, 1e-4, None).unwrap());
        });
    }
    group.finish();

    let mut group = cc.benchmark_group("fit_tolerance");
    let points = half_circle(256);
    for accuracy in [1e-2, 1e-4, 1e-6] {
        group.bench_with_input(
            BenchmarkId::from_parameter(accuracy),
            &accuracy,
            |b, &accuracy| {
                b.iter(|| fit_cubic_to_points(black_box(&points), 2, accuracy, None).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_fit);
criterion_main!(benches);
