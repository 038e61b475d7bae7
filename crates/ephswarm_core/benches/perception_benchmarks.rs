use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ephswarm_core::config::SimConfig;
use ephswarm_core::geometry::Arena;
use ephswarm_core::obstacles::ObstacleField;
use ephswarm_core::spm::{GridBuilder, Percept};
use ephswarm_core::world::World;
use ephswarm_data::{Agent, Goal, Obstacle, Vec2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn crowd(n: u32, extent: f64) -> Vec<Agent> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    (0..n)
        .map(|i| {
            let p = Vec2::new(rng.gen_range(0.0..extent), rng.gen_range(0.0..extent));
            let g = Vec2::new(rng.gen_range(0.0..extent), rng.gen_range(0.0..extent));
            Agent::new(i, p, Goal::Point { at: g })
                .with_velocity(Vec2::from_angle(rng.gen_range(0.0..6.28)) * 0.5)
        })
        .collect()
}

fn bench_grid_build(c: &mut Criterion) {
    let config = SimConfig::default();
    let builder = GridBuilder::new(&config.sensing, config.haze.epsilon).unwrap();
    let arena = Arena::from_config(&config.world);
    let agents = crowd(40, 16.0);
    let neighbors: Vec<&Agent> = agents.iter().skip(1).collect();
    let obstacles = ObstacleField::new(
        vec![Obstacle::rect(Vec2::new(4.0, 4.0), Vec2::new(6.0, 12.0))],
        config.sensing.obstacle_spacing,
    );

    c.bench_function("spm_build_40_neighbors", |b| {
        b.iter(|| {
            let grid = builder
                .build(&Percept {
                    observer: &agents[0],
                    neighbors: &neighbors,
                    obstacles: &obstacles,
                    arena: &arena,
                    precision_hint: 1.0,
                    step: 0,
                })
                .unwrap();
            black_box(grid)
        })
    });
}

fn bench_world_step(c: &mut Criterion) {
    let mut world = World::new(SimConfig::default(), crowd(200, 100.0), vec![], None).unwrap();

    c.bench_function("world_step_200_agents", |b| {
        b.iter(|| {
            let report = world.step().unwrap();
            black_box(report.collisions.len())
        })
    });
}

criterion_group!(benches, bench_grid_build, bench_world_step);
criterion_main!(benches);
