// Preprocessing benchmark - per-plane filter stages and the volume driver
//
// Run with: cargo bench --bench preprocess_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array2, Array3};

use atlasreg_preprocess::plane::{DESPECKLE_RADIUS, FLATFIELD_SIGMA};
use atlasreg_preprocess::{
    despeckle, filter_plane, filter_volume, pseudo_flatfield, remove_stripes, rescale_to_u16,
    PreprocessingMode, PreprocessorConfig, StripeDirection,
};

/// Synthetic microscopy plane: smooth illumination gradient, a bright
/// blob and periodic stripes.
fn test_plane(size: usize) -> Array2<f64> {
    Array2::from_shape_fn((size, size), |(r, c)| {
        let gradient = 200.0 + 0.5 * (r + c) as f64;
        let blob = if (r as isize - size as isize / 2).pow(2)
            + (c as isize - size as isize / 2).pow(2)
            < (size as isize / 8).pow(2)
        {
            3000.0
        } else {
            0.0
        };
        let stripes = 50.0 * ((c as f64) * 0.8).sin();
        gradient + blob + stripes
    })
}

fn test_volume(planes: usize, size: usize) -> Array3<f64> {
    let plane = test_plane(size);
    Array3::from_shape_fn((planes, size, size), |(p, r, c)| {
        plane[[r, c]] + 10.0 * p as f64
    })
}

/// Benchmark the individual plane filters at different plane sizes
fn bench_plane_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("plane_filters");

    for size in [64usize, 128, 256] {
        let plane = test_plane(size);
        let name = format!("{size}x{size}");

        group.bench_with_input(BenchmarkId::new("despeckle", &name), &plane, |b, p| {
            b.iter(|| black_box(despeckle(black_box(p.clone()), DESPECKLE_RADIUS)));
        });
        group.bench_with_input(BenchmarkId::new("flatfield", &name), &plane, |b, p| {
            b.iter(|| black_box(pseudo_flatfield(black_box(p.clone()), FLATFIELD_SIGMA)));
        });
        group.bench_with_input(BenchmarkId::new("stripes", &name), &plane, |b, p| {
            b.iter(|| {
                black_box(remove_stripes(
                    black_box(p.clone()),
                    StripeDirection::Horizontal,
                ))
            });
        });
        group.bench_with_input(BenchmarkId::new("full_plane", &name), &plane, |b, p| {
            b.iter(|| black_box(filter_plane(black_box(p.clone()))));
        });
    }

    group.finish();
}

/// Benchmark the volume driver in each mode, sequential and parallel
fn bench_volume_filtering(c: &mut Criterion) {
    let mut group = c.benchmark_group("volume_filtering");
    group.sample_size(20);

    let volume = test_volume(16, 128);

    for (mode, name) in [
        (PreprocessingMode::Skip, "skip"),
        (PreprocessingMode::Default, "default"),
        (PreprocessingMode::Striped, "striped"),
    ] {
        for parallel in [false, true] {
            let config = PreprocessorConfig {
                mode,
                parallel,
                ..PreprocessorConfig::default()
            };
            let label = if parallel {
                format!("{name}_parallel")
            } else {
                name.to_string()
            };
            group.bench_with_input(
                BenchmarkId::new("filter_volume", label),
                &volume,
                |b, v| {
                    b.iter(|| black_box(filter_volume(black_box(v.clone()), &config)));
                },
            );
        }
    }

    group.finish();
}

/// Benchmark the final 16-bit rescale on its own
fn bench_rescale(c: &mut Criterion) {
    let mut group = c.benchmark_group("rescale");

    for planes in [16usize, 64] {
        let volume = test_volume(planes, 128);
        group.bench_with_input(
            BenchmarkId::new("rescale_to_u16", format!("{planes}x128x128")),
            &volume,
            |b, v| {
                b.iter(|| black_box(rescale_to_u16(black_box(v))));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_plane_filters,
    bench_volume_filtering,
    bench_rescale
);
criterion_main!(benches);
