use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::{BlockAdapter, BlockCallback, CallbackFlow, StreamDriver, StreamSpec};
use crate::{Result, SpectrumError};

/// Plays blocks through the platform default output device.
///
/// The stream is opened mono, 32-bit float, at the source sample rate, and
/// asks the backend for a fixed period of one block. Backends that round the
/// period are handled by a [`BlockAdapter`].
pub struct CpalDriver {
    stream: Option<cpal::Stream>,
    finished: Arc<AtomicBool>,
}

impl CpalDriver {
    pub fn new() -> Self {
        Self {
            stream: None,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the callback has reported the end of the source.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl Default for CpalDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDriver for CpalDriver {
    fn start(&mut self, spec: StreamSpec, callback: BlockCallback) -> Result<()> {
        if self.stream.is_some() {
            return Err(SpectrumError::Device("output stream already running".into()));
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SpectrumError::Device("no default output device".into()))?;
        let frames = u32::try_from(spec.block_size)
            .map_err(|_| SpectrumError::Device(format!("block size {} too large", spec.block_size)))?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(frames),
        };
        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = spec.sample_rate,
            frames,
            "opening output stream"
        );

        self.finished.store(false, Ordering::Release);
        let finished = Arc::clone(&self.finished);
        let mut adapter = BlockAdapter::new(spec.block_size, callback);
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if adapter.fill(data) == CallbackFlow::Complete {
                        finished.store(true, Ordering::Release);
                    }
                },
                |err| tracing::error!(%err, "audio stream error"),
                None,
            )
            .map_err(|err| SpectrumError::Device(err.to_string()))?;

        stream
            .play()
            .map_err(|err| SpectrumError::Device(err.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };

        let paused = stream.pause();
        drop(stream);
        tracing::debug!("output stream released");
        paused.map_err(|err| SpectrumError::Device(err.to_string()))
    }

    fn is_running(&self) -> bool {
        self.stream.is_some() && !self.is_finished()
    }
}

impl Drop for CpalDriver {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(%err, "failed to stop output stream");
        }
    }
}

impl std::fmt::Debug for CpalDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalDriver")
            .field("open", &self.stream.is_some())
            .field("finished", &self.is_finished())
            .finish()
    }
}
