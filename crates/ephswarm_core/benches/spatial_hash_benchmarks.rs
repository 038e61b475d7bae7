use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ephswarm_core::config::Topology;
use ephswarm_core::geometry::Arena;
use ephswarm_core::spatial_hash::SpatialHash;
use ephswarm_data::Vec2;

fn lattice() -> Vec<Vec2> {
    (0..1000)
        .map(|i| Vec2::new((i % 100) as f64 * 10.0, (i / 100) as f64 * 10.0))
        .collect()
}

fn bench_spatial_hash_build(c: &mut Criterion) {
    let positions = lattice();
    let arena = Arena::new(1000.0, 1000.0, Topology::Clamped);

    c.bench_function("spatial_hash_build_1000", |b| {
        b.iter(|| {
            let mut spatial = SpatialHash::new(10.0, &arena);
            spatial.build(&positions);
            black_box(spatial)
        })
    });
}

fn bench_spatial_hash_query(c: &mut Criterion) {
    let positions = lattice();
    let arena = Arena::new(1000.0, 1000.0, Topology::Clamped);
    let mut spatial = SpatialHash::new(10.0, &arena);
    spatial.build(&positions);

    c.bench_function("spatial_hash_query_50_radius", |b| {
        let mut results = Vec::new();
        b.iter(|| {
            spatial.query_into(Vec2::new(500.0, 50.0), 50.0, &mut results);
            black_box(results.len())
        })
    });
}

fn bench_spatial_hash_query_wrapped(c: &mut Criterion) {
    let positions = lattice();
    let arena = Arena::new(1000.0, 1000.0, Topology::Toroidal);
    let mut spatial = SpatialHash::new(10.0, &arena);
    spatial.build(&positions);

    c.bench_function("spatial_hash_query_within_wrapped", |b| {
        let mut results = Vec::new();
        b.iter(|| {
            spatial.query_within(&arena, &positions, Vec2::new(2.0, 2.0), 25.0, &mut results);
            black_box(results.len())
        })
    });
}

criterion_group!(
    benches,
    bench_spatial_hash_build,
    bench_spatial_hash_query,
    bench_spatial_hash_query_wrapped
);
criterion_main!(benches);
