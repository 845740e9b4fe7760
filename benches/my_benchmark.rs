use criterion::{criterion_group, criterion_main, Criterion};
use image::{DynamicImage, GrayImage, Luma};
use image_fault_injector::faults::{FaultKind, FaultSpec};
use image_fault_injector::selector::{plan, random_walk, InjectionMode, SelectionStrategy};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;

fn criterion_benchmark(c: &mut Criterion) {
    let candidates: Vec<String> = (0..10_000).map(|i| format!("img{i:05}")).collect();

    let mut group = c.benchmark_group("selection");
    group.warm_up_time(std::time::Duration::from_secs(1));
    group.sample_size(20);
    group.bench_function("random walk 30%", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        b.iter(|| random_walk(black_box(candidates.len()), 3_000, &mut rng))
    });
    group.bench_function("random walk 100%", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        b.iter(|| random_walk(black_box(candidates.len()), candidates.len(), &mut rng))
    });
    group.bench_function("randomized plan", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        b.iter(|| {
            plan(
                black_box(&candidates),
                InjectionMode::Randomized,
                SelectionStrategy::RandomWalk,
                &mut rng,
            )
        })
    });
    group.finish();

    let image = DynamicImage::ImageLuma8(GrayImage::from_fn(256, 256, |x, y| {
        Luma([((x * y) % 256) as u8])
    }));
    let mut group = c.benchmark_group("transform");
    group.sample_size(20);
    for kind in [FaultKind::Gaussian, FaultKind::Erosion, FaultKind::MotionBlur] {
        if let Ok(spec) = FaultSpec::new(kind, 50) {
            group.bench_function(kind.name(), |b| {
                b.iter(|| spec.transform().apply(black_box(image.clone()), &spec, 7))
            });
        }
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
