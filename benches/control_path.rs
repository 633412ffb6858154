//! Benchmarks for the per-frame and per-command hot paths
//!
//! Every camera frame runs the rate controller, every drive cycle builds and serializes
//! a command, and every telemetry reply is parsed and decorated. None of these should
//! show up next to a network round trip.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rover_teleop::input::{
    GamepadDevice, GamepadInfo, GamepadMapping, GamepadSnapshot, InputController,
    StandardGamepadController,
};
use rover_teleop::types::{InputCommand, ServerTelemetryMessage};
use rover_teleop::{FrameRateController, collapse};
use std::hint::black_box;
use std::time::Duration;
use tokio::time::Instant;

struct FixedPad(GamepadSnapshot);

impl GamepadDevice for FixedPad {
    fn snapshot(&mut self) -> Option<GamepadSnapshot> {
        Some(self.0.clone())
    }
}

fn bench_rate_controller(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_controller");

    for fps in [4u32, 16] {
        group.bench_with_input(BenchmarkId::new("on_frame_received", fps), &fps, |b, &fps| {
            let start = Instant::now();
            let mut rate = FrameRateController::new(25, 50, 25, 0.8);
            rate.set_target_fps(fps, start);
            let mut now = start;
            b.iter(|| {
                now += Duration::from_millis(55);
                black_box(rate.on_frame_received(black_box(now)))
            });
        });
    }

    group.finish();
}

fn bench_drive_command(c: &mut Criterion) {
    let mut group = c.benchmark_group("drive_command");

    group.bench_function("collapse", |b| {
        b.iter(|| black_box(collapse(black_box(0.42), black_box(0.1))));
    });

    let id = "045e-028e-Xbox 360 Wired Controller";
    let snapshot = GamepadSnapshot::standard(id)
        .with_axis(0, 0.3)
        .with_axis(2, -0.7)
        .with_button(7, 0.8)
        .with_button(0, 1.0);
    let info = GamepadInfo::parse(id).expect("valid id");
    let mut pad = StandardGamepadController::new(
        info,
        GamepadMapping::standard(0.1),
        Box::new(FixedPad(snapshot)),
    );

    group.bench_function("poll_and_command", |b| {
        b.iter(|| {
            pad.poll();
            black_box(pad.command())
        });
    });

    let sparse = InputCommand { throttle: 0.5, button_a: true, ..InputCommand::neutral() }
        .with_camera_id(0);
    group.bench_function("serialize_sparse", |b| {
        b.iter(|| black_box(serde_json::to_string(black_box(&sparse)).expect("serializable")));
    });

    group.finish();
}

fn bench_telemetry(c: &mut Criterion) {
    let payload = r#"{"ctl":5,"inf_total_penalty":0.4,"geo_head":271.3,"geo_lat":49.1,"geo_long":5.2,"vel_y":0.8,"inf_hz":14.9}"#;
    c.bench_function("telemetry_decorate", |b| {
        b.iter(|| black_box(ServerTelemetryMessage::parse(black_box(payload)).expect("valid payload")));
    });
}

criterion_group!(benches, bench_rate_controller, bench_drive_command, bench_telemetry);
criterion_main!(benches);
