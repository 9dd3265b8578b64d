//! Performance benchmarks for the audio and wire hot paths
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use realtime_voice::core::audio::{
    AudioFrame, decode_base64_pcm16, encode_base64_pcm16, float_to_pcm16, pcm16_to_float,
    resample,
};
use realtime_voice::core::playback::{ManualClock, PlaybackScheduler};
use realtime_voice::core::realtime::openai::{ClientEvent, OutboundEnvelope, ServerEvent};

/// A 440Hz tone at `rate`, `ms` long.
fn tone(rate: u32, ms: u32) -> Vec<f32> {
    let len = (rate * ms / 1000) as usize;
    (0..len)
        .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / rate as f32).sin() * 0.5)
        .collect()
}

/// Benchmark sample format conversion
fn bench_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversion");
    group.measurement_time(Duration::from_secs(5));

    for ms in [10u32, 100] {
        let float = tone(24000, ms);
        let pcm = float_to_pcm16(&float);

        group.throughput(Throughput::Elements(float.len() as u64));
        group.bench_with_input(BenchmarkId::new("float_to_pcm16", ms), &float, |b, samples| {
            b.iter(|| float_to_pcm16(black_box(samples)));
        });
        group.bench_with_input(BenchmarkId::new("pcm16_to_float", ms), &pcm, |b, samples| {
            b.iter(|| pcm16_to_float(black_box(samples)));
        });
    }

    group.finish();
}

/// Benchmark capture and playback rate conversion
fn bench_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample");
    group.measurement_time(Duration::from_secs(5));

    // Typical device rates converted to and from the 24kHz wire rate
    let cases = [(48000u32, 24000u32), (44100, 24000), (16000, 24000), (24000, 48000)];
    for (from, to) in cases {
        let samples = tone(from, 100);
        group.throughput(Throughput::Elements(samples.len() as u64));
        group.bench_with_input(
            BenchmarkId::new(format!("{from}_to_{to}"), samples.len()),
            &samples,
            |b, samples| {
                b.iter(|| resample(black_box(samples), from, to));
            },
        );
    }

    group.finish();
}

/// Benchmark base64 audio payloads and event envelopes
fn bench_wire(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire");
    group.measurement_time(Duration::from_secs(5));

    let pcm = float_to_pcm16(&tone(24000, 100));
    let payload = encode_base64_pcm16(&pcm);

    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("encode_base64_pcm16", |b| {
        b.iter(|| encode_base64_pcm16(black_box(&pcm)));
    });
    group.bench_function("decode_base64_pcm16", |b| {
        b.iter(|| decode_base64_pcm16(black_box(&payload)));
    });

    let frame = AudioFrame::capture(pcm.clone(), 24000);
    group.bench_function("audio_append_envelope", |b| {
        b.iter(|| {
            let event = ClientEvent::audio_append(black_box(&frame));
            serde_json::to_string(&OutboundEnvelope::new(event))
        });
    });

    let delta = format!(
        r#"{{"type":"response.audio.delta","response_id":"resp_1","item_id":"item_1","output_index":0,"content_index":0,"delta":"{payload}"}}"#
    );
    group.bench_function("parse_audio_delta", |b| {
        b.iter(|| serde_json::from_str::<ServerEvent>(black_box(&delta)));
    });

    group.finish();
}

/// Benchmark the playback timeline
fn bench_playback(c: &mut Criterion) {
    let mut group = c.benchmark_group("playback");

    let frame = AudioFrame::playback(vec![0; 240], 24000);
    group.bench_function("schedule_and_drain_50", |b| {
        let clock = Arc::new(ManualClock::new());
        let scheduler = PlaybackScheduler::new(clock.clone());
        b.iter(|| {
            for _ in 0..50 {
                scheduler.schedule(frame.clone());
            }
            clock.advance(Duration::from_millis(500));
            black_box(scheduler.drain_due(Duration::ZERO))
        });
    });

    group.bench_function("schedule_and_flush_50", |b| {
        let scheduler = PlaybackScheduler::new(Arc::new(ManualClock::new()));
        b.iter(|| {
            for _ in 0..50 {
                scheduler.schedule(frame.clone());
            }
            black_box(scheduler.flush())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_conversion,
    bench_resample,
    bench_wire,
    bench_playback,
);

criterion_main!(benches);
