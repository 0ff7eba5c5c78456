//! HotMic Analysis - deferred voice analysis off the audio thread
//!
//! The audio engine hands per-block capture records across the capture
//! link; this crate turns them into the analysis signals the visualizers
//! ask for, computing only what the in-chain producers did not already put
//! on the signal bus.
//!
//! - [`fft`] - pre-planned FFT with windowing, allocation-free per frame
//! - [`window`] - capture-slice accumulation into analysis windows
//! - [`flux`] - spectral flux and high-band onset detection
//! - [`pitch`] - autocorrelation pitch tracking with confidence and HNR
//! - [`voice`] - speech presence, voicing, fricative/sibilance, formants
//! - [`orchestrator`] - the analysis thread and its published frames
//!
//! The compute blocks are deliberately opaque to the engine: their contract
//! is "produce signal X from a window of audio", nothing more.

pub mod fft;
pub mod flux;
pub mod orchestrator;
pub mod pitch;
pub mod voice;
pub mod window;

pub use fft::{Fft, Window};
pub use flux::FluxAnalyzer;
pub use orchestrator::{AnalysisFrame, AnalysisOrchestrator};
pub use pitch::{PitchEstimate, PitchTracker};
pub use voice::{VoiceAnalyzer, VoiceFeatures};
pub use window::AnalysisWindow;
