//! The analysis worker thread.
//!
//! Pops capture records in push order, accumulates them into the analysis
//! window, and produces [`AnalysisFrame`]s for the visualizers. Signals the
//! in-chain producers already put on the bus are read back from the
//! record's bus snapshot; only the missing requested signals are computed
//! here. Records that reference a retired bus generation are discarded
//! (their slices still return to the pool).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::{debug, info};

use hotmic_core::bus::RequestedSignals;
use hotmic_core::capture::{CaptureLink, CaptureRecord};
use hotmic_core::signal::{AnalysisSignal, SIGNAL_COUNT, SignalMask};

use crate::flux::FluxAnalyzer;
use crate::pitch::PitchTracker;
use crate::voice::VoiceAnalyzer;
use crate::window::AnalysisWindow;

/// Poll interval while the capture queue is empty.
const IDLE_SLEEP: Duration = Duration::from_micros(500);

/// Signals whose compute path is the pitch tracker.
const PITCH_SIGNALS: SignalMask = SignalMask::of(&[
    AnalysisSignal::PitchHz,
    AnalysisSignal::PitchConfidence,
    AnalysisSignal::Hnr,
]);
/// Signals whose compute path is the voice analyzer.
const VOICE_SIGNALS: SignalMask = SignalMask::of(&[
    AnalysisSignal::SpeechPresence,
    AnalysisSignal::VoicingScore,
    AnalysisSignal::VoicingState,
    AnalysisSignal::FricativeActivity,
    AnalysisSignal::SibilanceEnergy,
    AnalysisSignal::FormantF1,
    AnalysisSignal::FormantF2,
    AnalysisSignal::FormantF3,
    AnalysisSignal::FormantConfidence,
]);
/// Signals whose compute path is the flux analyzer.
const FLUX_SIGNALS: SignalMask = SignalMask::of(&[
    AnalysisSignal::SpectralFlux,
    AnalysisSignal::OnsetFluxHigh,
]);

/// One published analysis result.
#[derive(Debug, Clone)]
pub struct AnalysisFrame {
    /// Sample time of the newest sample the frame describes.
    pub sample_time: i64,
    /// Value per signal id; unrequested signals stay 0.
    pub values: [f32; SIGNAL_COUNT],
    /// Signals that came off the bus.
    pub from_bus: SignalMask,
    /// Signals computed by this worker.
    pub computed: SignalMask,
}

impl AnalysisFrame {
    fn empty() -> Self {
        Self {
            sample_time: -1,
            values: [0.0; SIGNAL_COUNT],
            from_bus: SignalMask::EMPTY,
            computed: SignalMask::EMPTY,
        }
    }

    /// Value of one signal.
    pub fn value(&self, signal: AnalysisSignal) -> f32 {
        self.values[signal.index()]
    }
}

/// Owns the analysis thread; dropping it stops and joins the worker.
pub struct AnalysisOrchestrator {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    frame: Arc<ArcSwap<AnalysisFrame>>,
    requested: Arc<RequestedSignals>,
}

impl AnalysisOrchestrator {
    /// Spawn the worker.
    ///
    /// `bus_generation` is bumped by the engine on every chain rebuild;
    /// records carrying an older generation are discarded. `requested` is
    /// the shared demand bitmap also read by in-chain producers.
    pub fn spawn(
        link: Arc<CaptureLink>,
        requested: Arc<RequestedSignals>,
        bus_generation: Arc<AtomicU64>,
        sample_rate: f32,
        window_size: usize,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let frame = Arc::new(ArcSwap::from_pointee(AnalysisFrame::empty()));

        let worker_stop = Arc::clone(&stop);
        let worker_frame = Arc::clone(&frame);
        let worker_requested = Arc::clone(&requested);
        let handle = std::thread::Builder::new()
            .name("hotmic-analysis".into())
            .spawn(move || {
                info!(window_size, "analysis worker started");
                let mut worker = Worker::new(sample_rate, window_size);
                while !worker_stop.load(Ordering::Acquire) {
                    match link.pop() {
                        Some(record) => worker.consume(
                            record,
                            &link,
                            &bus_generation,
                            &worker_requested,
                            &worker_frame,
                        ),
                        None => std::thread::sleep(IDLE_SLEEP),
                    }
                }
                info!("analysis worker stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
            frame,
            requested,
        })
    }

    /// Latest published frame.
    pub fn latest(&self) -> Arc<AnalysisFrame> {
        self.frame.load_full()
    }

    /// Replace the visualizer demand set.
    pub fn request(&self, mask: SignalMask) {
        self.requested.set(mask);
    }
}

impl Drop for AnalysisOrchestrator {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Worker-side state; lives entirely on the analysis thread.
struct Worker {
    window: AnalysisWindow,
    pitch: PitchTracker,
    voice: VoiceAnalyzer,
    flux: FluxAnalyzer,
    /// Sample time of the last computed frame; throttles to one compute
    /// per hop.
    last_computed: i64,
    hop: i64,
}

impl Worker {
    fn new(sample_rate: f32, window_size: usize) -> Self {
        Self {
            window: AnalysisWindow::new(window_size),
            pitch: PitchTracker::new(sample_rate, window_size),
            voice: VoiceAnalyzer::new(sample_rate, window_size),
            flux: FluxAnalyzer::new(window_size),
            last_computed: i64::MIN,
            hop: (window_size / 4).max(1) as i64,
        }
    }

    fn consume(
        &mut self,
        record: CaptureRecord,
        link: &CaptureLink,
        bus_generation: &AtomicU64,
        requested: &RequestedSignals,
        out: &ArcSwap<AnalysisFrame>,
    ) {
        // A rebuilt chain retired this record's bus; its signal data and
        // window continuity are both meaningless now.
        if record.bus.generation() != bus_generation.load(Ordering::Acquire) {
            debug!(
                record_generation = record.bus.generation(),
                "discarding capture for retired bus"
            );
            self.window.clear();
            self.flux.reset();
            self.last_computed = i64::MIN;
            link.recycle(record.slice);
            return;
        }

        self.window.push(record.slice.samples(), record.sample_time);

        let demand = requested.get();
        if self.window.is_filled()
            && !demand.is_empty()
            && self.window.latest_time() >= self.last_computed + self.hop
        {
            let frame = self.build_frame(&record, demand);
            self.last_computed = frame.sample_time;
            out.store(Arc::new(frame));
        }

        link.recycle(record.slice);
    }

    fn build_frame(&mut self, record: &CaptureRecord, demand: SignalMask) -> AnalysisFrame {
        let mut frame = AnalysisFrame::empty();
        frame.sample_time = self.window.latest_time();

        // Bus-borne signals are free: read them at the newest sample time.
        let mut missing = SignalMask::EMPTY;
        for signal in demand.iter() {
            match record.producer_map.lane(signal) {
                Some(lane) => {
                    frame.values[signal.index()] =
                        record.bus.read(lane, signal, frame.sample_time);
                    frame.from_bus = frame.from_bus.union(signal.bit());
                }
                None => missing = missing.union(signal.bit()),
            }
        }

        if missing.is_empty() {
            return frame;
        }

        let need_pitch = !missing.intersection(PITCH_SIGNALS).is_empty();
        let need_voice = !missing.intersection(VOICE_SIGNALS).is_empty();
        let need_flux = !missing.intersection(FLUX_SIGNALS).is_empty();

        // The voice analyzer wants periodicity, so pitch runs for both.
        let pitch_est = if need_pitch || need_voice {
            let samples = self.window.samples().to_vec();
            self.pitch.analyze(&samples)
        } else {
            Default::default()
        };

        if need_pitch {
            Self::fill(&mut frame, missing, AnalysisSignal::PitchHz, pitch_est.pitch_hz);
            Self::fill(
                &mut frame,
                missing,
                AnalysisSignal::PitchConfidence,
                pitch_est.confidence,
            );
            Self::fill(&mut frame, missing, AnalysisSignal::Hnr, pitch_est.hnr_db);
        }

        if need_voice {
            let samples = self.window.samples().to_vec();
            let features = self.voice.analyze(&samples, &pitch_est);
            Self::fill(
                &mut frame,
                missing,
                AnalysisSignal::SpeechPresence,
                features.speech_presence,
            );
            Self::fill(
                &mut frame,
                missing,
                AnalysisSignal::VoicingScore,
                features.voicing_score,
            );
            Self::fill(
                &mut frame,
                missing,
                AnalysisSignal::VoicingState,
                features.voicing_state,
            );
            Self::fill(
                &mut frame,
                missing,
                AnalysisSignal::FricativeActivity,
                features.fricative_activity,
            );
            Self::fill(
                &mut frame,
                missing,
                AnalysisSignal::SibilanceEnergy,
                features.sibilance_energy,
            );
            Self::fill(&mut frame, missing, AnalysisSignal::FormantF1, features.formant_f1);
            Self::fill(&mut frame, missing, AnalysisSignal::FormantF2, features.formant_f2);
            Self::fill(&mut frame, missing, AnalysisSignal::FormantF3, features.formant_f3);
            Self::fill(
                &mut frame,
                missing,
                AnalysisSignal::FormantConfidence,
                features.formant_confidence,
            );
        }

        if need_flux {
            let samples = self.window.samples().to_vec();
            let flux_frame = self.flux.analyze(&samples);
            Self::fill(
                &mut frame,
                missing,
                AnalysisSignal::SpectralFlux,
                flux_frame.flux,
            );
            Self::fill(
                &mut frame,
                missing,
                AnalysisSignal::OnsetFluxHigh,
                flux_frame.onset_high,
            );
        }

        frame
    }

    fn fill(frame: &mut AnalysisFrame, missing: SignalMask, signal: AnalysisSignal, value: f32) {
        if missing.contains(signal) {
            frame.values[signal.index()] = value;
            frame.computed = frame.computed.union(signal.bit());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotmic_core::capture::CaptureSource;
    use hotmic_core::signal::ProducerMap;
    use hotmic_core::bus::SignalBus;
    use std::f32::consts::PI;

    fn publish_tone_blocks(
        link: &CaptureLink,
        bus: &Arc<SignalBus>,
        map: ProducerMap,
        blocks: usize,
        block_size: usize,
    ) {
        for b in 0..blocks {
            let mut slice = link.acquire_slice().expect("pool slice");
            let start = b * block_size;
            let tone: Vec<f32> = (0..block_size)
                .map(|i| (2.0 * PI * 220.0 * (start + i) as f32 / 48000.0).sin())
                .collect();
            slice.fill_from(&tone);
            link.publish(CaptureRecord {
                sample_time: start as i64,
                source: CaptureSource::Output,
                slice,
                bus: Arc::clone(bus),
                producer_map: map,
                channel_id: 0,
            });
        }
    }

    fn wait_for_frame(orchestrator: &AnalysisOrchestrator) -> Arc<AnalysisFrame> {
        for _ in 0..400 {
            let frame = orchestrator.latest();
            if frame.sample_time >= 0 {
                return frame;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("no analysis frame published");
    }

    #[test]
    fn computes_missing_requested_signals() {
        let link = CaptureLink::new(8, 256);
        let bus = Arc::new(SignalBus::new(1, 0, 2048));
        let generation = Arc::new(AtomicU64::new(1));
        let requested = Arc::new(RequestedSignals::new());
        requested.set(SignalMask::of(&[
            AnalysisSignal::PitchHz,
            AnalysisSignal::VoicingScore,
        ]));

        let orchestrator = AnalysisOrchestrator::spawn(
            Arc::clone(&link),
            requested,
            generation,
            48000.0,
            2048,
        )
        .unwrap();

        publish_tone_blocks(&link, &bus, ProducerMap::empty(), 12, 256);
        let frame = wait_for_frame(&orchestrator);

        assert!(frame.computed.contains(AnalysisSignal::PitchHz));
        assert!(frame.from_bus.is_empty());
        let pitch = frame.value(AnalysisSignal::PitchHz);
        assert!((pitch - 220.0).abs() < 5.0, "pitch {pitch}");
        assert!(frame.value(AnalysisSignal::VoicingScore) > 0.5);
    }

    #[test]
    fn reuses_bus_borne_signals() {
        let link = CaptureLink::new(8, 256);
        let bus = Arc::new(SignalBus::new(1, 1, 4096));
        let generation = Arc::new(AtomicU64::new(1));
        let requested = Arc::new(RequestedSignals::new());
        requested.set(AnalysisSignal::VoicingScore.bit());

        // A producer wrote voicing over the whole range already.
        for t in 0..4096 {
            bus.write(0, AnalysisSignal::VoicingScore, t, 0.77);
        }
        let mut map = ProducerMap::empty();
        map.assign(AnalysisSignal::VoicingScore.bit(), 0);

        let orchestrator = AnalysisOrchestrator::spawn(
            Arc::clone(&link),
            requested,
            generation,
            48000.0,
            2048,
        )
        .unwrap();

        publish_tone_blocks(&link, &bus, map, 12, 256);
        let frame = wait_for_frame(&orchestrator);

        assert!(frame.from_bus.contains(AnalysisSignal::VoicingScore));
        assert!(frame.computed.is_empty());
        assert_eq!(frame.value(AnalysisSignal::VoicingScore), 0.77);
    }

    #[test]
    fn stale_generation_records_are_discarded() {
        let link = CaptureLink::new(8, 256);
        let stale_bus = Arc::new(SignalBus::new(1, 0, 2048));
        let generation = Arc::new(AtomicU64::new(2)); // bus gen 1 is stale
        let requested = Arc::new(RequestedSignals::new());
        requested.set(AnalysisSignal::PitchHz.bit());

        let orchestrator = AnalysisOrchestrator::spawn(
            Arc::clone(&link),
            requested,
            generation,
            48000.0,
            2048,
        )
        .unwrap();

        publish_tone_blocks(&link, &stale_bus, ProducerMap::empty(), 12, 256);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(orchestrator.latest().sample_time, -1);
        // Slices still made it back to the pool.
        assert_eq!(link.starved(), 0);
    }
}
