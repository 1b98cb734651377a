use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use impulse2d::{
    moment_for_circle, Constraint, PivotJoint, RigidBody, Shape, Space, SpaceConfig, Vec2,
};

const DT: f64 = 1.0 / 60.0;

// --- Helper for creating stack benchmarks ---
fn build_circle_stack(space: &mut Space, num_circles: usize) {
    let radius = 0.5;
    let ground = space.static_body();
    space
        .add_shape(Shape::segment(ground, Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0), 0.0).unwrap().with_friction(1.0))
        .unwrap();

    for i in 0..num_circles {
        let y_pos = radius + (i as f64 * (radius * 2.1)); // Stack with slight gap
        let mut body = RigidBody::new_dynamic(1.0, moment_for_circle(1.0, 0.0, radius, Vec2::ZERO)).unwrap();
        body.set_position(Vec2::new(0.0, y_pos));
        let body = space.add_body(body).unwrap();
        space
            .add_shape(Shape::circle(body, radius, Vec2::ZERO).unwrap().with_friction(0.7))
            .unwrap();
    }
}

// --- Helper for creating chain benchmarks ---
fn build_pivot_chain(space: &mut Space, num_links: usize) {
    let link_length = 0.5;
    let anchor = Vec2::new(0.0, 5.0);

    let mut last = space.static_body();
    let mut last_pos = anchor;
    for _ in 0..num_links {
        let pos = last_pos + Vec2::new(link_length, 0.0);
        let mut body = RigidBody::new_dynamic(1.0, moment_for_circle(1.0, 0.0, 0.2, Vec2::ZERO)).unwrap();
        body.set_position(pos);
        let current = space.add_body(body).unwrap();
        space.add_shape(Shape::circle(current, 0.2, Vec2::ZERO).unwrap()).unwrap();

        let pivot = last_pos + Vec2::new(link_length / 2.0, 0.0);
        let joint = PivotJoint::from_world_pivot(
            space.body(last).unwrap(),
            space.body(current).unwrap(),
            pivot,
        );
        space.add_constraint(Constraint::new(last, current, joint).unwrap()).unwrap();
        last = current;
        last_pos = pos;
    }
}

// Benchmark for a stack of circles falling under gravity
fn bench_circle_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("circle_stack");

    for num_circles in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(num_circles), num_circles, |b, &n| {
            b.iter(|| {
                // Fewer iterations for benchmark speed
                let config = SpaceConfig::default().with_iterations(4);
                let mut space = Space::with_config(config).unwrap();
                build_circle_stack(&mut space, black_box(n));
                for _ in 0..30 {
                    space.step(black_box(DT));
                }
            });
        });
    }
    group.finish();
}

// Benchmark for a chain of bodies linked by pivots
fn bench_pivot_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("pivot_chain");

    for num_links in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(num_links), num_links, |b, &n| {
            b.iter(|| {
                let config = SpaceConfig::default().with_iterations(8);
                let mut space = Space::with_config(config).unwrap();
                build_pivot_chain(&mut space, black_box(n));
                for _ in 0..30 {
                    space.step(black_box(DT));
                }
            });
        });
    }
    group.finish();
}

// Broad phase only: a loose grid of circles with gravity off
fn bench_broad_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("broad_phase");

    for side in [10, 30].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(side * side), side, |b, &n| {
            let config = SpaceConfig::default().with_gravity(Vec2::ZERO);
            let mut space = Space::with_config(config).unwrap();
            for i in 0..n {
                for j in 0..n {
                    let mut body = RigidBody::new_dynamic(1.0, 1.0).unwrap();
                    body.set_position(Vec2::new(i as f64 * 3.0, j as f64 * 3.0));
                    body.linear_velocity = Vec2::new(1.0, 0.5);
                    let body = space.add_body(body).unwrap();
                    space.add_shape(Shape::circle(body, 1.0, Vec2::ZERO).unwrap()).unwrap();
                }
            }
            b.iter(|| space.step(black_box(DT)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_circle_stack, bench_pivot_chain, bench_broad_phase);
criterion_main!(benches);
