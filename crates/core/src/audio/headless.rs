use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use super::{BlockCallback, CallbackFlow, StreamDriver, StreamSpec};
use crate::{Result, SpectrumError};

/// Drives the callback from a plain thread instead of an audio device.
///
/// A paced driver waits one block period between calls, like a device
/// would. An unpaced driver calls back in a tight loop, which is what tests
/// and offline runs want.
#[derive(Debug)]
pub struct HeadlessDriver {
    paced: bool,
    halt: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl HeadlessDriver {
    pub fn paced() -> Self {
        Self::new(true)
    }

    pub fn unpaced() -> Self {
        Self::new(false)
    }

    fn new(paced: bool) -> Self {
        Self {
            paced,
            halt: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl StreamDriver for HeadlessDriver {
    fn start(&mut self, spec: StreamSpec, mut callback: BlockCallback) -> Result<()> {
        if self.worker.is_some() {
            return Err(SpectrumError::Device("headless stream already running".into()));
        }

        self.halt.store(false, Ordering::Release);
        self.running.store(true, Ordering::Release);
        let halt = Arc::clone(&self.halt);
        let running = Arc::clone(&self.running);
        let paced = self.paced;
        let period = spec.block_period();
        let mut buffer = vec![0.0; spec.block_size];

        let worker = thread::Builder::new()
            .name("headless-audio".into())
            .spawn(move || {
                let mut deadline = Instant::now();
                while !halt.load(Ordering::Acquire) {
                    if callback(&mut buffer) == CallbackFlow::Complete {
                        break;
                    }
                    if paced {
                        deadline += period;
                        if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                            thread::sleep(wait);
                        }
                    }
                }
                running.store(false, Ordering::Release);
            })
            .map_err(|err| {
                self.running.store(false, Ordering::Release);
                SpectrumError::Device(format!("failed to spawn headless audio thread: {err}"))
            })?;

        tracing::info!(
            paced,
            sample_rate = spec.sample_rate,
            block_size = spec.block_size,
            "headless stream started"
        );
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        self.halt.store(true, Ordering::Release);
        worker
            .join()
            .map_err(|_| SpectrumError::msg("headless audio thread panicked"))?;
        tracing::debug!("headless stream stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for HeadlessDriver {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(%err, "failed to stop headless stream");
        }
    }
}
