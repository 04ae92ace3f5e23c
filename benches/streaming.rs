use criterion::{Criterion, black_box, criterion_group, criterion_main};

use glam::Vec3;

use gridstream::core::CameraPose;
use gridstream::streaming::parse::decode_binary;
use gridstream::streaming::want::{ModelTransform, build_want_set};
use gridstream::world::grid::ChunkGrid;
use gridstream::world::jenkins_hash;

fn bench_want_set_radius_8(c: &mut Criterion) {
    let grid = ChunkGrid::new(256.0, -100.0, 100.0);
    let model = ModelTransform::default();
    let position = Vec3::new(1300.0, -700.0, 80.0);
    let camera = CameraPose::look_at(position, position + Vec3::new(1.0, 1.0, -0.1));

    c.bench_function("want_set_radius_8_culled", |b| {
        b.iter(|| {
            build_want_set(
                black_box(&camera),
                black_box(&grid),
                &model,
                8,
                true,
                None,
            )
        });
    });

    c.bench_function("want_set_radius_8_unculled", |b| {
        b.iter(|| {
            build_want_set(
                black_box(&camera),
                black_box(&grid),
                &model,
                8,
                false,
                None,
            )
        });
    });
}

fn bench_jenkins_hash(c: &mut Criterion) {
    c.bench_function("jenkins_hash_weather_name", |b| {
        b.iter(|| jenkins_hash(black_box("thunderstorm_heavy")));
    });
}

fn bench_binary_decode_10k(c: &mut Criterion) {
    let count = 10_000u32;
    let mut bytes = Vec::with_capacity(8 + count as usize * 12);
    bytes.extend_from_slice(b"ENT0");
    bytes.extend_from_slice(&count.to_le_bytes());
    for i in 0..count * 3 {
        bytes.extend_from_slice(&(i as f32 * 0.25).to_le_bytes());
    }

    c.bench_function("binary_decode_10k_entities", |b| {
        b.iter(|| decode_binary(black_box(&bytes)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_want_set_radius_8,
    bench_jenkins_hash,
    bench_binary_decode_10k
);
criterion_main!(benches);
