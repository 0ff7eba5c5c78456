//! Wiring an engine to live streams.
//!
//! [`AudioSession`] owns the stream handles for one running engine:
//!
//! - the output stream drives [`AudioEngine::render`] through a
//!   block-size adapter (device callbacks rarely match the engine block
//!   exactly, so rendered blocks spill into the callback buffer);
//! - each configured input stream downmixes its interleaved capture to
//!   mono and pushes into the channel's staging ring;
//! - the optional monitor stream drains the engine's monitor ring.
//!
//! A device error on any stream flips the diagnostics `recovering` flag;
//! the owner tears the session down and builds a new one off the audio
//! thread (the engine's reinitialize path).

use std::sync::Arc;

use tracing::{error, info};

use hotmic_core::ring::{StagingReader, StagingRing, StagingWriter};
use hotmic_engine::diag::EngineDiagnostics;
use hotmic_engine::{AudioEngine, EngineHandle};

use crate::backend::{AudioBackend, BackendStreamConfig, StreamHandle};
use crate::Result;

/// Per-input staging capacity in blocks.
const INPUT_RING_BLOCKS: usize = 8;

/// Adapts engine-sized blocks to arbitrary device callback sizes.
struct OutputAdapter {
    engine: AudioEngine,
    /// One rendered block, interleaved.
    spill: Vec<f32>,
    /// Read position into `spill`; `spill.len()` means empty.
    spill_pos: usize,
}

impl OutputAdapter {
    fn new(engine: AudioEngine) -> Self {
        let spill_len = engine.block_size() * 2;
        Self {
            engine,
            spill: vec![0.0; spill_len],
            spill_pos: spill_len,
        }
    }

    fn fill(&mut self, output: &mut [f32]) {
        let mut written = 0;
        while written < output.len() {
            if self.spill_pos >= self.spill.len() {
                let spill = &mut self.spill;
                self.engine.render(spill);
                self.spill_pos = 0;
            }
            let take = (output.len() - written).min(self.spill.len() - self.spill_pos);
            output[written..written + take]
                .copy_from_slice(&self.spill[self.spill_pos..self.spill_pos + take]);
            self.spill_pos += take;
            written += take;
        }
    }
}

/// Downmixes interleaved capture to mono and stages it.
struct InputAdapter {
    writer: StagingWriter,
    channels: usize,
    /// Mono scratch sized for one driver chunk.
    scratch: Vec<f32>,
}

impl InputAdapter {
    fn push(&mut self, data: &[f32]) {
        let frames = data.len() / self.channels.max(1);
        if self.scratch.len() < frames {
            // Driver grew its chunk size; resize once on the capture
            // thread (not the output callback).
            self.scratch.resize(frames, 0.0);
        }
        for (frame, out) in data.chunks_exact(self.channels.max(1)).zip(&mut self.scratch) {
            *out = frame.iter().sum::<f32>() / self.channels.max(1) as f32;
        }
        self.writer.push(&self.scratch[..frames]);
    }
}

/// A running set of device streams for one engine.
pub struct AudioSession {
    _output: StreamHandle,
    _inputs: Vec<StreamHandle>,
    _monitor: Option<StreamHandle>,
}

impl AudioSession {
    /// Start streaming.
    ///
    /// `inputs` pairs a device name with the channel its capture feeds.
    /// The session registers a staging ring per input with the engine
    /// handle before the streams go live.
    pub fn start(
        backend: &dyn AudioBackend,
        engine: AudioEngine,
        handle: &mut EngineHandle,
        inputs: &[(String, usize)],
        output_device: Option<String>,
        monitor: Option<(String, StagingReader)>,
    ) -> Result<Self> {
        let sample_rate = engine.sample_rate() as u32;
        let block_size = engine.block_size() as u32;
        let diag = handle.diagnostics();

        // Input streams first, so the first rendered block already sees
        // captured samples.
        let mut input_handles = Vec::new();
        for (device, channel) in inputs {
            let (writer, reader) =
                StagingRing::with_capacity(engine.block_size() * INPUT_RING_BLOCKS);
            let _ = handle.set_channel_input(*channel, Some(reader));

            let config = BackendStreamConfig {
                sample_rate,
                buffer_size: block_size,
                channels: 1,
                device_name: Some(device.clone()),
            };
            let mut adapter = InputAdapter {
                writer,
                channels: 1,
                scratch: vec![0.0; engine.block_size()],
            };
            let stream = backend.build_input_stream(
                &config,
                Box::new(move |data| adapter.push(data)),
                recover_callback(Arc::clone(&diag), "input"),
            )?;
            info!(device, channel, "input stream started");
            input_handles.push(stream);
        }

        // The output stream owns the engine.
        let mut adapter = OutputAdapter::new(engine);
        let output_config = BackendStreamConfig {
            sample_rate,
            buffer_size: block_size,
            channels: 2,
            device_name: output_device,
        };
        let output = backend.build_output_stream(
            &output_config,
            Box::new(move |data| adapter.fill(data)),
            recover_callback(Arc::clone(&diag), "output"),
        )?;
        info!("output stream started");

        // Monitor mirror, when configured.
        let monitor_handle = match monitor {
            Some((device, mut reader)) => {
                let config = BackendStreamConfig {
                    sample_rate,
                    buffer_size: block_size,
                    channels: 2,
                    device_name: Some(device.clone()),
                };
                let stream = backend.build_output_stream(
                    &config,
                    Box::new(move |data| {
                        reader.read_block(data);
                    }),
                    recover_callback(Arc::clone(&diag), "monitor"),
                )?;
                info!(device, "monitor stream started");
                Some(stream)
            }
            None => None,
        };

        Ok(Self {
            _output: output,
            _inputs: input_handles,
            _monitor: monitor_handle,
        })
    }
}

/// Error callback that flags a recoverable device fault.
fn recover_callback(
    diag: Arc<EngineDiagnostics>,
    stream: &'static str,
) -> Box<dyn FnMut(&str) + Send> {
    Box::new(move |message| {
        error!(stream, message, "device fault; scheduling reinitialize");
        diag.set_recovering(true);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotmic_core::ring::StagingRing;

    #[test]
    fn input_adapter_downmixes_stereo() {
        let (writer, mut reader) = StagingRing::with_capacity(64);
        let mut adapter = InputAdapter {
            writer,
            channels: 2,
            scratch: vec![0.0; 32],
        };
        // L=1.0, R=0.0 per frame downmixes to 0.5.
        let interleaved = [1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        adapter.push(&interleaved);

        let mut block = [0.0_f32; 4];
        assert_eq!(reader.read_block(&mut block), 4);
        assert!(block.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn input_adapter_passes_mono_through() {
        let (writer, mut reader) = StagingRing::with_capacity(64);
        let mut adapter = InputAdapter {
            writer,
            channels: 1,
            scratch: vec![0.0; 32],
        };
        adapter.push(&[0.25; 16]);
        let mut block = [0.0_f32; 16];
        assert_eq!(reader.read_block(&mut block), 16);
        assert!(block.iter().all(|&s| s == 0.25));
    }
}
