//! `hotmic check` - headless engine smoke check.
//!
//! Builds the configured engine with no devices attached, feeds channel 0
//! a 1 kHz tone through a staging ring, renders the requested number of
//! blocks, and prints meters, loudness, and diagnostics. Catches broken
//! configs and faulting chains before they reach a live session.

use std::f32::consts::PI;
use std::path::PathBuf;

use hotmic_analysis::AnalysisOrchestrator;
use hotmic_core::ring::StagingRing;
use hotmic_core::signal::{AnalysisSignal, SignalMask};
use hotmic_engine::build_engine;

use super::{CommandError, load_config, registry_factory};

/// Test tone frequency.
const TONE_HZ: f32 = 1000.0;
/// Analysis window for the check's orchestrator.
const WINDOW: usize = 2048;

pub fn run(config_path: Option<PathBuf>, blocks: usize) -> Result<(), CommandError> {
    let config = load_config(config_path)?;
    let sample_rate = config.sample_rate as f32;
    let block_size = config.block_size;

    let rig = build_engine(&config, registry_factory())?;
    let mut audio = rig.audio;
    let mut handle = rig.handle;

    // Feed channel 0 from a synthetic staging ring.
    let (mut writer, reader) = StagingRing::with_capacity(block_size * 4);
    handle.set_channel_input(0, Some(reader))?;
    handle.request_signals(SignalMask::of(&[
        AnalysisSignal::PitchHz,
        AnalysisSignal::VoicingScore,
    ]));

    let orchestrator = AnalysisOrchestrator::spawn(
        handle.capture_link(),
        handle.shared().requested(),
        handle.shared().bus_generation(),
        sample_rate,
        WINDOW,
    )?;

    let mut output = vec![0.0_f32; block_size * 2];
    let mut tone = vec![0.0_f32; block_size];
    for block in 0..blocks {
        for (i, sample) in tone.iter_mut().enumerate() {
            let n = block * block_size + i;
            *sample = (2.0 * PI * TONE_HZ * n as f32 / sample_rate).sin();
        }
        writer.push(&tone);
        audio.render(&mut output);
        handle.drain_retired();
    }

    // Give the analysis worker a moment to drain the capture link.
    std::thread::sleep(std::time::Duration::from_millis(50));

    let diag = handle.diagnostics();
    let lufs = handle.lufs();
    let (left, right) = (&handle.master_meters().0, &handle.master_meters().1);
    let frame = orchestrator.latest();

    println!("rendered {blocks} blocks of {block_size} samples at {sample_rate} Hz");
    println!("sample clock: {}", handle.sample_clock());
    println!(
        "master peak: {:.2} dBFS / {:.2} dBFS   rms: {:.2} dBFS",
        left.peak_db(),
        right.peak_db(),
        left.rms_db(),
    );
    println!(
        "loudness: momentary {:.1} LUFS, short-term {:.1} LUFS, integrated {:.1} LUFS",
        lufs.momentary(),
        lufs.short_term(),
        lufs.integrated(),
    );
    if frame.sample_time >= 0 {
        println!(
            "analysis: pitch {:.1} Hz, voicing {:.2}",
            frame.value(AnalysisSignal::PitchHz),
            frame.value(AnalysisSignal::VoicingScore),
        );
    }
    println!(
        "diagnostics: {} plugin faults, {} param drops, {} capture drops",
        diag.plugin_faults(),
        diag.param_drops(),
        handle.capture_link().dropped(),
    );

    if diag.plugin_faults() > 0 {
        return Err("plugin faults during check".into());
    }
    Ok(())
}
