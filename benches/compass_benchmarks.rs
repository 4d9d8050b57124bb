use compass_fusion::{
    AccuracyEstimator, Compass, CompassSettings, DeclinationTable, GeoCoordinate, HeadingHistory, RawSample,
    SampleValidator, VectorFilterKind, calculate_heading,
};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use nalgebra::Vector3;
use rand::prelude::*;
use rand_pcg::Pcg64;
use std::f32::consts::PI;

// Pre-generated sensor data to eliminate RNG overhead during benchmarks
struct PreGeneratedData {
    samples: Vec<RawSample>,
    index: usize,
}

impl PreGeneratedData {
    fn new(count: usize, seed: u64) -> Self {
        let mut rng = Pcg64::seed_from_u64(seed);
        let mut samples = Vec::with_capacity(count);

        for i in 0..count {
            let timestamp_ms = i as u64 * 20; // 50Hz sample rate
            let heading = (i as f32 * 0.5).to_radians() % (2.0 * PI);

            let magnetometer = Vector3::new(
                35.0 * heading.cos() + rng.random_range(-0.5..0.5),
                -35.0 * heading.sin() + rng.random_range(-0.5..0.5),
                -25.0 + rng.random_range(-0.5..0.5),
            );

            let accelerometer = Vector3::new(
                rng.random_range(-0.2..0.2),
                rng.random_range(-0.2..0.2),
                9.8 + rng.random_range(-0.05..0.05),
            );

            samples.push(RawSample::new(magnetometer, accelerometer, timestamp_ms));
        }

        Self { samples, index: 0 }
    }

    fn next(&mut self) -> RawSample {
        let sample = self.samples[self.index];
        self.index = (self.index + 1) % self.samples.len();
        sample
    }
}

/// Benchmark a full pipeline pass with the low-pass filter
fn bench_on_raw_sample(c: &mut Criterion) {
    let compass = Compass::new();
    compass.on_location_update(GeoCoordinate::new(51.51, -0.13));
    let mut data = PreGeneratedData::new(1000, 42);

    c.bench_function("compass_on_raw_sample", |b| {
        b.iter(|| black_box(compass.on_raw_sample(black_box(data.next()))))
    });
}

/// Benchmark a full pipeline pass with the Kalman filter
fn bench_on_raw_sample_kalman(c: &mut Criterion) {
    let mut settings = CompassSettings::default();
    settings.filter.kind = VectorFilterKind::Kalman;
    let Ok(compass) = Compass::with_settings(settings) else {
        return;
    };
    let mut data = PreGeneratedData::new(1000, 43);

    c.bench_function("compass_on_raw_sample_kalman", |b| {
        b.iter(|| black_box(compass.on_raw_sample(black_box(data.next()))))
    });
}

/// Benchmark a pipeline pass while a calibration cycle is collecting
fn bench_on_raw_sample_calibrating(c: &mut Criterion) {
    let compass = Compass::new();
    let mut data = PreGeneratedData::new(1000, 44);

    c.bench_function("compass_on_raw_sample_calibrating", |b| {
        b.iter(|| {
            compass.start_calibration();
            black_box(compass.on_raw_sample(black_box(data.next())))
        })
    });
}

/// Benchmark batch processing of samples
fn bench_batch_samples(c: &mut Criterion) {
    let compass = Compass::new();
    let mut data = PreGeneratedData::new(1000, 45);

    c.bench_function("compass_batch_100_samples", |b| {
        b.iter(|| {
            for _ in 0..100 {
                black_box(compass.on_raw_sample(black_box(data.next())));
            }
        })
    });
}

/// Benchmark the tilt-compensated heading alone
fn bench_calculate_heading(c: &mut Criterion) {
    let mut data = PreGeneratedData::new(1000, 46);

    c.bench_function("calculate_heading", |b| {
        b.iter(|| {
            let sample = data.next();
            black_box(calculate_heading(black_box(sample.accelerometer), black_box(sample.magnetometer)))
        })
    });
}

/// Benchmark sample validation
fn bench_validate(c: &mut Criterion) {
    let validator = SampleValidator::default();
    let mut data = PreGeneratedData::new(1000, 47);

    c.bench_function("validate_sample", |b| {
        b.iter(|| black_box(validator.validate(black_box(&data.next()))))
    });
}

/// Benchmark declination lookup falling through to the approximation tier
fn bench_declination_lookup(c: &mut Criterion) {
    let table = DeclinationTable::default();
    let coordinate = GeoCoordinate::new(39.1, -94.6);

    c.bench_function("declination_lookup", |b| {
        b.iter(|| black_box(table.declination_for(black_box(&coordinate))))
    });
}

/// Benchmark accuracy scoring over a full history
fn bench_accuracy_score(c: &mut Criterion) {
    let estimator = AccuracyEstimator::default();
    let mut rng = Pcg64::seed_from_u64(48);
    let mut history = HeadingHistory::new(30);
    for i in 0..30 {
        history.push(rng.random_range(0.0..360.0), i * 20);
    }

    c.bench_function("accuracy_score", |b| {
        b.iter(|| black_box(estimator.score(black_box(&history))))
    });
}

/// Benchmark compass creation
fn bench_compass_creation(c: &mut Criterion) {
    c.bench_function("compass_new", |b| b.iter(|| black_box(Compass::new())));
}

criterion_group!(
    benches,
    bench_on_raw_sample,
    bench_on_raw_sample_kalman,
    bench_on_raw_sample_calibrating,
    bench_batch_samples,
    bench_calculate_heading,
    bench_validate,
    bench_declination_lookup,
    bench_accuracy_score,
    bench_compass_creation
);

criterion_main!(benches);
