//! Accumulation of capture slices into analysis windows.
//!
//! Capture records arrive one block at a time; the analyzers want a longer
//! window (a few tens of milliseconds). [`AnalysisWindow`] keeps the most
//! recent `window_size` samples in arrival order and tracks the sample
//! time of the newest sample, so analysis output can be stamped with the
//! time it describes.

/// Sliding window over the captured sample stream.
#[derive(Debug)]
pub struct AnalysisWindow {
    ring: Vec<f32>,
    mask: usize,
    /// Total samples ever pushed.
    written: u64,
    /// Sample time of the newest sample, from the last push.
    latest_time: i64,
    /// Linearized snapshot, oldest first.
    snapshot: Vec<f32>,
}

impl AnalysisWindow {
    /// Create a window of `window_size` samples (rounded up to a power of
    /// two).
    pub fn new(window_size: usize) -> Self {
        let capacity = window_size.max(2).next_power_of_two();
        Self {
            ring: vec![0.0; capacity],
            mask: capacity - 1,
            written: 0,
            latest_time: -1,
            snapshot: vec![0.0; capacity],
        }
    }

    /// Window length in samples.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// True until the first push.
    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Whether a full window has accumulated.
    pub fn is_filled(&self) -> bool {
        self.written >= self.ring.len() as u64
    }

    /// Sample time of the newest sample.
    pub fn latest_time(&self) -> i64 {
        self.latest_time
    }

    /// Append one captured block. `first_sample_time` is the sample time
    /// of `block[0]`.
    pub fn push(&mut self, block: &[f32], first_sample_time: i64) {
        for &s in block {
            self.ring[(self.written as usize) & self.mask] = s;
            self.written += 1;
        }
        self.latest_time = first_sample_time + block.len() as i64 - 1;
    }

    /// Linearized view of the window, oldest sample first.
    pub fn samples(&mut self) -> &[f32] {
        let n = self.ring.len();
        let newest = self.written as usize;
        for i in 0..n {
            self.snapshot[i] = self.ring[(newest + i) & self.mask];
        }
        &self.snapshot
    }

    /// Forget everything (preset-load boundary).
    pub fn clear(&mut self) {
        self.ring.fill(0.0);
        self.snapshot.fill(0.0);
        self.written = 0;
        self.latest_time = -1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_after_enough_blocks() {
        let mut win = AnalysisWindow::new(256);
        assert!(win.is_empty());
        assert!(!win.is_filled());

        let block = vec![1.0; 128];
        win.push(&block, 0);
        assert!(!win.is_filled());
        win.push(&block, 128);
        assert!(win.is_filled());
        assert_eq!(win.latest_time(), 255);
    }

    #[test]
    fn samples_are_oldest_first() {
        let mut win = AnalysisWindow::new(4);
        win.push(&[1.0, 2.0, 3.0, 4.0], 0);
        win.push(&[5.0, 6.0], 4);
        assert_eq!(win.samples(), &[3.0, 4.0, 5.0, 6.0]);
        assert_eq!(win.latest_time(), 5);
    }

    #[test]
    fn clear_resets_state() {
        let mut win = AnalysisWindow::new(4);
        win.push(&[1.0; 4], 0);
        win.clear();
        assert!(win.is_empty());
        assert_eq!(win.latest_time(), -1);
        assert_eq!(win.samples(), &[0.0; 4]);
    }
}
