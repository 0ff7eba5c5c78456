//! FFT wrapper with windowing, planned once and reused per frame.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{FftPlanner, num_complex::Complex};

/// Window function types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Rectangular (no windowing)
    Rectangular,
    /// Hann window (raised cosine)
    Hann,
}

impl Window {
    /// Apply the window to a buffer in place.
    pub fn apply(&self, buffer: &mut [f32]) {
        let n = buffer.len();
        match self {
            Window::Rectangular => {}
            Window::Hann => {
                for (i, sample) in buffer.iter_mut().enumerate() {
                    let w = 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos());
                    *sample *= w;
                }
            }
        }
    }
}

/// Forward/inverse FFT pair of a fixed size with reusable scratch.
///
/// All buffers are allocated at construction; [`forward_magnitudes`]
/// (`Fft::forward_magnitudes`) and [`autocorrelate`](Fft::autocorrelate)
/// are allocation-free afterwards.
pub struct Fft {
    forward: Arc<dyn rustfft::Fft<f32>>,
    inverse: Arc<dyn rustfft::Fft<f32>>,
    size: usize,
    work: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    windowed: Vec<f32>,
}

impl Fft {
    /// Plan an FFT pair for `size` (power of two recommended).
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            forward,
            inverse,
            size,
            work: vec![Complex::new(0.0, 0.0); size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            windowed: vec![0.0; size],
        }
    }

    /// FFT size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of positive-frequency bins (`size / 2 + 1`).
    pub fn bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Windowed forward transform; writes bin magnitudes into `out`.
    ///
    /// `input` shorter than the FFT size is zero-padded. `out` must hold
    /// [`bins`](Self::bins) values.
    pub fn forward_magnitudes(&mut self, input: &[f32], window: Window, out: &mut [f32]) {
        let n = input.len().min(self.size);
        self.windowed[..n].copy_from_slice(&input[..n]);
        self.windowed[n..].fill(0.0);
        window.apply(&mut self.windowed[..n]);

        for (w, x) in self.work.iter_mut().zip(self.windowed.iter()) {
            *w = Complex::new(*x, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.work, &mut self.scratch);

        for (o, c) in out.iter_mut().zip(self.work.iter()).take(self.bins()) {
            *o = c.norm();
        }
    }

    /// Biased autocorrelation of `input` via the power spectrum; writes
    /// lags `0..out.len()` into `out`.
    ///
    /// The input is zero-padded to the FFT size, so lags shorter than
    /// `size - input.len()` are alias-free.
    pub fn autocorrelate(&mut self, input: &[f32], out: &mut [f32]) {
        let n = input.len().min(self.size);
        for (i, w) in self.work.iter_mut().enumerate() {
            *w = if i < n {
                Complex::new(input[i], 0.0)
            } else {
                Complex::new(0.0, 0.0)
            };
        }
        self.forward
            .process_with_scratch(&mut self.work, &mut self.scratch);

        // Power spectrum, then inverse transform back to the lag domain.
        for w in self.work.iter_mut() {
            *w = Complex::new(w.norm_sqr(), 0.0);
        }
        self.inverse
            .process_with_scratch(&mut self.work, &mut self.scratch);

        let scale = 1.0 / self.size as f32;
        for (o, c) in out.iter_mut().zip(self.work.iter()) {
            *o = c.re * scale;
        }
    }
}
