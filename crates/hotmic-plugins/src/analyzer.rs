//! In-chain voice analysis producer.
//!
//! Runs the pitch/voice/flux compute blocks at its chain position and
//! writes every produced signal onto the bus, sample by sample. Compute is
//! demand-driven: when neither a downstream consumer nor the orchestrator
//! requests any produced signal, the plugin only maintains its window and
//! skips the FFT work entirely.

use hotmic_analysis::flux::FluxAnalyzer;
use hotmic_analysis::pitch::{PitchEstimate, PitchTracker};
use hotmic_analysis::voice::VoiceAnalyzer;
use hotmic_analysis::window::AnalysisWindow;

use hotmic_core::context::ProcessContext;
use hotmic_core::plugin::Plugin;
use hotmic_core::signal::{AnalysisSignal, SIGNAL_COUNT, SignalMask};

/// Every signal the voice analyzer can produce.
pub const ANALYZER_SIGNALS: SignalMask = SignalMask::ALL;

/// Analysis window length in samples.
const WINDOW_SAMPLES: usize = 2048;

/// Shared compute state for in-chain signal generation.
///
/// Also used by the tap plugin's generate mode, so the two stay in
/// agreement about what each signal means.
pub(crate) struct SignalComputeCore {
    window: AnalysisWindow,
    pitch: Option<PitchTracker>,
    voice: Option<VoiceAnalyzer>,
    flux: Option<FluxAnalyzer>,
    values: [f32; SIGNAL_COUNT],
    hop: i64,
    last_computed: i64,
}

impl SignalComputeCore {
    pub(crate) fn new() -> Self {
        Self {
            window: AnalysisWindow::new(WINDOW_SAMPLES),
            pitch: None,
            voice: None,
            flux: None,
            values: [0.0; SIGNAL_COUNT],
            hop: (WINDOW_SAMPLES / 4) as i64,
            last_computed: i64::MIN,
        }
    }

    pub(crate) fn initialize(&mut self, sample_rate: f32) {
        self.pitch = Some(PitchTracker::new(sample_rate, WINDOW_SAMPLES));
        self.voice = Some(VoiceAnalyzer::new(sample_rate, WINDOW_SAMPLES));
        self.flux = Some(FluxAnalyzer::new(WINDOW_SAMPLES));
        self.reset();
    }

    pub(crate) fn reset(&mut self) {
        self.window.clear();
        if let Some(flux) = self.flux.as_mut() {
            flux.reset();
        }
        self.values = [0.0; SIGNAL_COUNT];
        self.last_computed = i64::MIN;
    }

    /// Feed one block and recompute `needed` signals if a hop elapsed.
    pub(crate) fn push_block(&mut self, buffer: &[f32], sample_time: i64, needed: SignalMask) {
        self.window.push(buffer, sample_time);
        if needed.is_empty()
            || !self.window.is_filled()
            || self.window.latest_time() < self.last_computed + self.hop
        {
            return;
        }
        self.last_computed = self.window.latest_time();

        let (Some(pitch), Some(voice), Some(flux)) =
            (self.pitch.as_mut(), self.voice.as_mut(), self.flux.as_mut())
        else {
            return;
        };

        let samples = self.window.samples();
        let pitch_est: PitchEstimate = pitch.analyze(samples);
        self.values[AnalysisSignal::PitchHz.index()] = pitch_est.pitch_hz;
        self.values[AnalysisSignal::PitchConfidence.index()] = pitch_est.confidence;
        self.values[AnalysisSignal::Hnr.index()] = pitch_est.hnr_db;

        let features = voice.analyze(samples, &pitch_est);
        self.values[AnalysisSignal::SpeechPresence.index()] = features.speech_presence;
        self.values[AnalysisSignal::VoicingScore.index()] = features.voicing_score;
        self.values[AnalysisSignal::VoicingState.index()] = features.voicing_state;
        self.values[AnalysisSignal::FricativeActivity.index()] = features.fricative_activity;
        self.values[AnalysisSignal::SibilanceEnergy.index()] = features.sibilance_energy;
        self.values[AnalysisSignal::FormantF1.index()] = features.formant_f1;
        self.values[AnalysisSignal::FormantF2.index()] = features.formant_f2;
        self.values[AnalysisSignal::FormantF3.index()] = features.formant_f3;
        self.values[AnalysisSignal::FormantConfidence.index()] = features.formant_confidence;

        let flux_frame = flux.analyze(samples);
        self.values[AnalysisSignal::SpectralFlux.index()] = flux_frame.flux;
        self.values[AnalysisSignal::OnsetFluxHigh.index()] = flux_frame.onset_high;
    }

    pub(crate) fn value(&self, signal: AnalysisSignal) -> f32 {
        self.values[signal.index()]
    }
}

/// Signal producer plugin: audio passes through untouched, voice signals
/// land on the bus.
pub struct VoiceAnalyzerPlugin {
    core: SignalComputeCore,
}

impl VoiceAnalyzerPlugin {
    /// Create an analyzer producer.
    pub fn new() -> Self {
        Self {
            core: SignalComputeCore::new(),
        }
    }
}

impl Default for VoiceAnalyzerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for VoiceAnalyzerPlugin {
    fn id(&self) -> &'static str {
        "voice_analyzer"
    }

    fn name(&self) -> &'static str {
        "Voice Analyzer"
    }

    fn initialize(&mut self, sample_rate: f32, _block_size: usize) {
        self.core.initialize(sample_rate);
    }

    fn reset(&mut self) {
        self.core.reset();
    }

    fn process(&mut self, buffer: &mut [f32], ctx: &mut ProcessContext<'_>) {
        let needed = ctx.requested_mask.intersection(ctx.allowed_mask);
        self.core.push_block(buffer, ctx.sample_time, needed);
        if needed.is_empty() {
            return;
        }
        for signal in needed.iter() {
            let value = self.core.value(signal);
            for i in 0..buffer.len() {
                ctx.write_signal(signal, ctx.sample_time + i as i64, value);
            }
        }
    }

    fn produced_signals(&self) -> Option<SignalMask> {
        Some(ANALYZER_SIGNALS)
    }
}
