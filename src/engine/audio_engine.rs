//! Audio Engine
//!
//! Manages the cpal audio stream. When an output device is available the
//! engine processor is driven from the device callback, so queued mutations
//! are applied at the start of every audio block.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use thiserror::Error;

use super::processor::EngineProcessor;

/// Reasons the audio host could not be started.
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("No audio output device found")]
    NoOutputDevice,
    #[error("Failed to get device configuration: {0}")]
    ConfigurationFailed(String),
    #[error("Failed to create audio stream: {0}")]
    StreamCreationFailed(String),
    #[error("Failed to control audio playback: {0}")]
    StreamPlaybackFailed(String),
}

/// Drives an [`EngineProcessor`] from a cpal output stream.
pub struct AudioEngine {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioEngine {
    /// Opens the default output device with its preferred configuration.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        let supported_config = device
            .default_output_config()
            .map_err(|e| AudioError::ConfigurationFailed(e.to_string()))?;

        let config = StreamConfig {
            channels: supported_config.channels(),
            sample_rate: SampleRate(supported_config.sample_rate().0),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    /// Device name for log messages.
    pub fn current_device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Start the audio stream, processing one engine block per callback.
    ///
    /// The processor is shared behind a mutex that only the callback locks;
    /// the stream holds the last reference, so stopping the stream drops the
    /// processor and with it the engine side of the queues.
    pub fn start_with_processor(
        &mut self,
        processor: Arc<Mutex<EngineProcessor>>,
    ) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if let Ok(mut processor) = processor.try_lock() {
                        processor.process(data, channels);
                    } else {
                        data.fill(0.0);
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlaybackFailed(e.to_string()))?;

        log::info!(
            "audio started on '{}' ({} Hz, {} channels)",
            self.current_device_name(),
            self.sample_rate(),
            self.channels()
        );
        self.stream = Some(stream);
        Ok(())
    }

    /// Pauses and drops the stream, and with it the processor.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| AudioError::StreamPlaybackFailed(e.to_string()))?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}
