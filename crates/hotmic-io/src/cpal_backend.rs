//! cpal implementation of the backend abstraction.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, StreamConfig};
use tracing::warn;

use crate::backend::{
    AudioBackend, BackendStreamConfig, ErrorCallback, InputCallback, OutputCallback, StreamHandle,
};
use crate::devices;
use crate::{AudioDevice, IoError, Result};

/// The default desktop backend over cpal (ALSA / CoreAudio / WASAPI).
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }

    fn find_input_device(&self, name: &str) -> Result<Device> {
        let host = cpal::default_host();
        host.input_devices()
            .map_err(|e| IoError::Stream(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| IoError::DeviceNotFound(name.to_string()))
    }

    fn find_output_device(&self, name: &str) -> Result<Device> {
        let host = cpal::default_host();
        host.output_devices()
            .map_err(|e| IoError::Stream(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| IoError::DeviceNotFound(name.to_string()))
    }

    fn stream_config(config: &BackendStreamConfig) -> StreamConfig {
        StreamConfig {
            channels: config.channels,
            sample_rate: config.sample_rate,
            buffer_size: BufferSize::Fixed(config.buffer_size),
        }
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>> {
        devices::list_devices()
    }

    fn default_output_device(&self) -> Result<Option<AudioDevice>> {
        devices::default_devices().map(|(_, output)| output)
    }

    fn default_input_device(&self) -> Result<Option<AudioDevice>> {
        devices::default_devices().map(|(input, _)| input)
    }

    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        mut callback: OutputCallback,
        mut error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let device = match &config.device_name {
            Some(name) => self.find_output_device(name)?,
            None => cpal::default_host()
                .default_output_device()
                .ok_or(IoError::NoDevice)?,
        };

        let stream_config = Self::stream_config(config);
        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _| callback(data),
                move |err| {
                    warn!(%err, "output stream error");
                    error_callback(&err.to_string());
                },
                None,
            )
            .map_err(|e| IoError::Stream(e.to_string()))?;

        stream.play().map_err(|e| IoError::Stream(e.to_string()))?;
        Ok(StreamHandle::new(stream))
    }

    fn build_input_stream(
        &self,
        config: &BackendStreamConfig,
        mut callback: InputCallback,
        mut error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let device = match &config.device_name {
            Some(name) => self.find_input_device(name)?,
            None => cpal::default_host()
                .default_input_device()
                .ok_or(IoError::NoDevice)?,
        };

        let stream_config = Self::stream_config(config);
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _| callback(data),
                move |err| {
                    warn!(%err, "input stream error");
                    error_callback(&err.to_string());
                },
                None,
            )
            .map_err(|e| IoError::Stream(e.to_string()))?;

        stream.play().map_err(|e| IoError::Stream(e.to_string()))?;
        Ok(StreamHandle::new(stream))
    }
}
