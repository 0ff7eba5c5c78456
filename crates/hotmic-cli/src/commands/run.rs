//! `hotmic run` - run the engine against real devices.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use hotmic_analysis::AnalysisOrchestrator;
use hotmic_core::signal::{AnalysisSignal, SignalMask};
use hotmic_engine::build_engine;
use hotmic_io::{AudioSession, CpalBackend};

use super::{CommandError, load_config, registry_factory};

/// Analysis window for the live orchestrator.
const WINDOW: usize = 2048;
/// How often the status line refreshes.
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

pub fn run(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let factory = registry_factory();
    let mut config = load_config(config_path)?;

    loop {
        let rig = build_engine(&config, factory.clone())?;
        let mut handle = rig.handle;
        let sample_rate = handle.sample_rate();

        handle.request_signals(SignalMask::of(&[
            AnalysisSignal::PitchHz,
            AnalysisSignal::VoicingScore,
            AnalysisSignal::SpeechPresence,
        ]));
        let orchestrator = AnalysisOrchestrator::spawn(
            handle.capture_link(),
            handle.shared().requested(),
            handle.shared().bus_generation(),
            sample_rate,
            WINDOW,
        )?;

        let inputs: Vec<(String, usize)> = config
            .inputs
            .iter()
            .map(|input| (input.device.clone(), input.channel))
            .collect();
        let monitor = match (&config.monitor_device, rig.monitor) {
            (Some(device), Some(reader)) => Some((device.clone(), reader)),
            _ => None,
        };

        let backend = CpalBackend::new();
        let session = AudioSession::start(
            &backend,
            rig.audio,
            &mut handle,
            &inputs,
            config.output_device.clone(),
            monitor,
        )?;

        info!("engine running; ctrl-c to quit");
        let diag = handle.diagnostics();
        loop {
            std::thread::sleep(STATUS_INTERVAL);
            handle.drain_retired();

            if diag.is_recovering() {
                break;
            }

            let lufs = handle.lufs();
            let frame = orchestrator.latest();
            let pitch = frame.value(AnalysisSignal::PitchHz);
            println!(
                "clock {:>12}  momentary {:>6.1} LUFS  pitch {:>6.1} Hz  faults {}",
                handle.sample_clock(),
                lufs.momentary(),
                pitch,
                diag.plugin_faults(),
            );
        }

        // Recoverable device fault: tear down, rebuild from the current
        // state, restart.
        info!("device fault detected; reinitializing");
        config = handle.export_config();
        drop(session);
        drop(orchestrator);
        drop(handle);
        std::thread::sleep(Duration::from_millis(250));
    }
}
