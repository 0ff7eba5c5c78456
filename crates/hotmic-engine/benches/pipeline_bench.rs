//! Output pipeline throughput: full render calls with a realistic chain.

use std::f32::consts::PI;
use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use hotmic_config::{ChannelConfig, EngineConfig, PluginConfig};
use hotmic_core::ring::StagingRing;
use hotmic_core::signal::{AnalysisSignal, SignalMask};
use hotmic_engine::{EngineRig, PluginFactory, build_engine};
use hotmic_registry::PluginRegistry;

const BLOCK: usize = 256;

fn rig_with_chain(plugins: &[&str]) -> (EngineRig, hotmic_core::ring::StagingWriter) {
    let registry = PluginRegistry::new();
    let factory: Arc<PluginFactory> = Arc::new(move |type_id, sample_rate, block_size| {
        registry.create(type_id, sample_rate, block_size)
    });

    let mut channel = ChannelConfig::new("Bench");
    for plugin in plugins {
        channel.plugins.push(PluginConfig::new(*plugin));
    }
    let config = EngineConfig {
        sample_rate: 48000,
        block_size: BLOCK,
        channels: vec![channel],
        ..EngineConfig::default()
    };

    let mut rig = build_engine(&config, factory).expect("engine builds");
    let (writer, reader) = StagingRing::with_capacity(BLOCK * 8);
    rig.handle
        .set_channel_input(0, Some(reader))
        .expect("attach");

    // Drain build commands once.
    let mut output = vec![0.0_f32; BLOCK * 2];
    rig.audio.render(&mut output);
    (rig, writer)
}

fn tone(block: usize) -> Vec<f32> {
    (0..BLOCK)
        .map(|i| {
            let n = block * BLOCK + i;
            0.8 * (2.0 * PI * 220.0 * n as f32 / 48000.0).sin()
        })
        .collect()
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    group.bench_function("empty_chain", |b| {
        let (mut rig, mut writer) = rig_with_chain(&[]);
        let mut output = vec![0.0_f32; BLOCK * 2];
        let mut block = 0usize;
        b.iter(|| {
            writer.push(&tone(block));
            block += 1;
            rig.audio.render(black_box(&mut output));
        });
    });

    group.bench_function("gate_and_gain", |b| {
        let (mut rig, mut writer) = rig_with_chain(&["gate", "gain"]);
        let mut output = vec![0.0_f32; BLOCK * 2];
        let mut block = 0usize;
        b.iter(|| {
            writer.push(&tone(block));
            block += 1;
            rig.audio.render(black_box(&mut output));
        });
    });

    group.bench_function("full_voice_chain", |b| {
        let (mut rig, mut writer) =
            rig_with_chain(&["gate", "voice_analyzer", "analysis_tap", "output_send"]);
        rig.handle.request_signals(SignalMask::of(&[
            AnalysisSignal::PitchHz,
            AnalysisSignal::VoicingScore,
        ]));
        let mut output = vec![0.0_f32; BLOCK * 2];
        let mut block = 0usize;
        b.iter(|| {
            writer.push(&tone(block));
            block += 1;
            rig.audio.render(black_box(&mut output));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
