//! Output stream drivers.
//!
//! A [`StreamDriver`] owns whatever invokes the real-time callback: a `cpal`
//! output stream for real playback, or a plain thread when no device is
//! wanted. The callback always receives exactly one block per call.

use std::time::Duration;

use crate::Result;

mod device;
mod headless;

pub use device::CpalDriver;
pub use headless::HeadlessDriver;

/// Value returned by the block callback after each invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFlow {
    Continue,
    /// The source is exhausted; the driver must not call back again.
    Complete,
}

/// Callback invoked on the real-time thread with an output block to fill.
pub type BlockCallback = Box<dyn FnMut(&mut [f32]) -> CallbackFlow + Send + 'static>;

/// Parameters a driver needs to open its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub block_size: usize,
}

impl StreamSpec {
    /// Wall-clock time covered by one block.
    pub fn block_period(&self) -> Duration {
        let nanos = self.block_size as u64 * 1_000_000_000 / u64::from(self.sample_rate.max(1));
        Duration::from_nanos(nanos)
    }
}

/// Something that repeatedly invokes a [`BlockCallback`] once started.
pub trait StreamDriver {
    /// Opens the stream and begins invoking `callback`.
    fn start(&mut self, spec: StreamSpec, callback: BlockCallback) -> Result<()>;

    /// Stops invoking the callback and releases the underlying stream.
    /// Calling it on a stopped driver is a no-op.
    fn stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;
}

/// Mode enum describes which driver plays the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioMode {
    /// Play through the platform default output device.
    #[default]
    Device,
    /// No device; blocks are produced on a thread at the real playback rate.
    Headless,
    /// No device; blocks are produced as fast as the callback allows.
    Unpaced,
}

/// Creates the driver for `mode`.
pub fn driver_for(mode: AudioMode) -> Box<dyn StreamDriver> {
    match mode {
        AudioMode::Device => Box::new(CpalDriver::new()),
        AudioMode::Headless => Box::new(HeadlessDriver::paced()),
        AudioMode::Unpaced => Box::new(HeadlessDriver::unpaced()),
    }
}

/// Turns device buffers of any length into callbacks of exactly one block.
///
/// When the device period matches the block size the callback writes straight
/// into the device buffer; otherwise blocks are staged in a buffer allocated
/// up front. Once the callback completes, the rest of the output is silence.
pub struct BlockAdapter {
    callback: BlockCallback,
    staging: Vec<f32>,
    position: usize,
    finished: bool,
}

impl BlockAdapter {
    pub fn new(block_size: usize, callback: BlockCallback) -> Self {
        Self {
            callback,
            staging: vec![0.0; block_size],
            position: block_size,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fills `out` completely, invoking the callback as often as needed.
    pub fn fill(&mut self, out: &mut [f32]) -> CallbackFlow {
        let block_size = self.staging.len();
        let mut written = 0;

        while written < out.len() {
            if self.finished || block_size == 0 {
                out[written..].fill(0.0);
                break;
            }

            if self.position == block_size {
                if out.len() - written >= block_size {
                    let target = &mut out[written..written + block_size];
                    if (self.callback)(target) == CallbackFlow::Complete {
                        self.finished = true;
                    } else {
                        written += block_size;
                    }
                    continue;
                }

                if (self.callback)(&mut self.staging) == CallbackFlow::Complete {
                    self.finished = true;
                    continue;
                }
                self.position = 0;
            }

            let count = (block_size - self.position).min(out.len() - written);
            out[written..written + count]
                .copy_from_slice(&self.staging[self.position..self.position + count]);
            self.position += count;
            written += count;
        }

        if self.finished {
            CallbackFlow::Complete
        } else {
            CallbackFlow::Continue
        }
    }
}

impl std::fmt::Debug for BlockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockAdapter")
            .field("block_size", &self.staging.len())
            .field("position", &self.position)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    /// Emits blocks counting up from 1.0 and completes after `blocks` calls.
    fn counting_callback(blocks: usize, calls: Arc<AtomicUsize>) -> BlockCallback {
        let mut next = 0.0_f32;
        Box::new(move |out: &mut [f32]| {
            if calls.fetch_add(1, Ordering::SeqCst) >= blocks {
                out.fill(0.0);
                return CallbackFlow::Complete;
            }
            for sample in out.iter_mut() {
                next += 1.0;
                *sample = next;
            }
            CallbackFlow::Continue
        })
    }

    #[test]
    fn matching_period_calls_once_per_buffer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut adapter = BlockAdapter::new(4, counting_callback(10, calls.clone()));
        let mut out = [0.0; 4];

        assert_eq!(adapter.fill(&mut out), CallbackFlow::Continue);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn small_device_buffers_are_fed_from_staging() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut adapter = BlockAdapter::new(4, counting_callback(10, calls.clone()));
        let mut out = [0.0; 3];

        adapter.fill(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0]);
        adapter.fill(&mut out);
        assert_eq!(out, [4.0, 5.0, 6.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn completion_fills_remaining_output_with_silence() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut adapter = BlockAdapter::new(2, counting_callback(1, calls.clone()));
        let mut out = [9.0; 5];

        assert_eq!(adapter.fill(&mut out), CallbackFlow::Complete);
        assert_eq!(out, [1.0, 2.0, 0.0, 0.0, 0.0]);
        assert!(adapter.is_finished());

        let mut later = [9.0; 2];
        assert_eq!(adapter.fill(&mut later), CallbackFlow::Complete);
        assert_eq!(later, [0.0, 0.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn block_period_follows_rate() {
        let spec = StreamSpec {
            sample_rate: 48_000,
            block_size: 480,
        };
        assert_eq!(spec.block_period(), Duration::from_millis(10));
    }
}
