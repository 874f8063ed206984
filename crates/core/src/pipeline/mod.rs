//! Playback controller wiring the stream driver, mailbox and transform.
//!
//! The controller moves through `Idle -> Loaded -> Streaming -> Completed`,
//! or to `Failed` on any fatal error. The real-time callback owns the
//! playback cursor and only touches the mailbox and the state cell; the
//! consumer side pulls blocks from the mailbox and transforms them outside
//! the lock.

use std::{
    fmt,
    path::Path,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use crate::{
    audio::{BlockCallback, CallbackFlow, StreamDriver, StreamSpec},
    config::{AudioConfig, TailPolicy},
    decode::{self, DecodedSource},
    mailbox::{Mailbox, MailboxStats},
    render::Visualizer,
    MagnitudeSpectrum, Result, SpectralTransform, SpectrumError,
};

/// Lifecycle of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Loaded = 1,
    Streaming = 2,
    Completed = 3,
    Failed = 4,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Loaded,
            2 => Self::Streaming,
            3 => Self::Completed,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State shared between the controller and the real-time callback.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: PipelineState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves to `to` only if the current state is `from`.
    fn transition(&self, from: PipelineState, to: PipelineState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Everything the real-time callback owns. Lives inside the callback closure,
/// so every pipeline has its own cursor.
struct Playback {
    source: Arc<DecodedSource>,
    cursor: usize,
    tail: TailPolicy,
    pad: Vec<f32>,
    mailbox: Arc<Mailbox>,
    state: Arc<StateCell>,
}

impl Playback {
    fn fill(&mut self, out: &mut [f32]) -> CallbackFlow {
        let left = self.source.left();
        let block_size = out.len();
        let end = self.cursor + block_size;

        let block: &[f32] = if end <= left.len() {
            let block = &left[self.cursor..end];
            self.cursor = end;
            block
        } else if self.tail == TailPolicy::ZeroPad
            && self.cursor < left.len()
            && self.pad.len() == block_size
        {
            let remaining = &left[self.cursor..];
            self.pad[..remaining.len()].copy_from_slice(remaining);
            self.pad[remaining.len()..].fill(0.0);
            self.cursor = left.len();
            &self.pad
        } else {
            out.fill(0.0);
            self.finish(PipelineState::Completed);
            return CallbackFlow::Complete;
        };

        out.copy_from_slice(block);
        if self.mailbox.publish(block).is_err() {
            self.finish(PipelineState::Failed);
            return CallbackFlow::Complete;
        }
        CallbackFlow::Continue
    }

    fn finish(&self, state: PipelineState) {
        self.state.transition(PipelineState::Streaming, state);
        self.mailbox.close();
    }
}

/// Controller that streams a decoded source and hands out spectra.
pub struct Pipeline {
    config: AudioConfig,
    state: Arc<StateCell>,
    mailbox: Arc<Mailbox>,
    source: Option<Arc<DecodedSource>>,
    transform: Option<SpectralTransform>,
    driver: Box<dyn StreamDriver>,
    block: Vec<f32>,
}

impl Pipeline {
    /// Creates an idle pipeline. The mailbox is sized to the configured block.
    pub fn new(config: AudioConfig, driver: Box<dyn StreamDriver>) -> Result<Self> {
        config.validate()?;
        let block_size = config.block_size;

        Ok(Self {
            config,
            state: Arc::new(StateCell::new(PipelineState::Idle)),
            mailbox: Arc::new(Mailbox::new(block_size)),
            source: None,
            transform: None,
            driver,
            block: vec![0.0; block_size],
        })
    }

    /// Current lifecycle state, as last published by either thread.
    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// Samples per block and per analysed window.
    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// Sample rate of the loaded source.
    pub fn sample_rate(&self) -> Option<u32> {
        self.source.as_ref().map(|source| source.sample_rate())
    }

    /// Traffic counters of the handoff between the two threads.
    pub fn mailbox_stats(&self) -> Result<MailboxStats> {
        self.mailbox.stats()
    }

    /// Decodes `path` and prepares the transform.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.expect_state("load a source", PipelineState::Idle)?;

        let path = path.as_ref();
        match decode::load(path) {
            Ok(source) => self.load_source(source),
            Err(err) => {
                tracing::error!(path = %path.display(), %err, "failed to load audio file");
                self.fail();
                Err(err)
            }
        }
    }

    /// Adopts already decoded samples and prepares the transform.
    pub fn load_source(&mut self, source: DecodedSource) -> Result<()> {
        self.expect_state("load a source", PipelineState::Idle)?;

        let transform =
            match SpectralTransform::with_window(self.config.block_size, self.config.window) {
                Ok(transform) => transform,
                Err(err) => {
                    self.fail();
                    return Err(err);
                }
            };

        tracing::info!(
            sample_rate = source.sample_rate(),
            frames = source.frames(),
            duration_seconds = source.duration_seconds(),
            block_size = self.config.block_size,
            "source loaded"
        );
        self.source = Some(Arc::new(source));
        self.transform = Some(transform);
        self.state.set(PipelineState::Loaded);
        Ok(())
    }

    /// Starts the stream driver. The callback begins publishing blocks.
    pub fn start(&mut self) -> Result<()> {
        self.expect_state("start streaming", PipelineState::Loaded)?;
        let Some(source) = self.source.clone() else {
            return Err(SpectrumError::msg("loaded pipeline has no source"));
        };

        let spec = StreamSpec {
            sample_rate: source.sample_rate(),
            block_size: self.config.block_size,
        };
        let mut playback = Playback {
            source,
            cursor: 0,
            tail: self.config.tail,
            pad: vec![0.0; self.config.block_size],
            mailbox: Arc::clone(&self.mailbox),
            state: Arc::clone(&self.state),
        };
        let callback: BlockCallback = Box::new(move |out: &mut [f32]| playback.fill(out));

        // Streaming must be visible before the first callback can complete.
        self.state.set(PipelineState::Streaming);
        if let Err(err) = self.driver.start(spec, callback) {
            tracing::error!(%err, "failed to start output stream");
            self.fail();
            return Err(err);
        }

        tracing::info!(
            sample_rate = spec.sample_rate,
            block_size = spec.block_size,
            "streaming started"
        );
        Ok(())
    }

    /// Stops streaming, releases the driver and wakes any blocked consumer.
    /// Does nothing before streaming has started. A failed pipeline still
    /// releases its driver.
    pub fn stop(&mut self) -> Result<()> {
        let state = self.state();
        if matches!(state, PipelineState::Idle | PipelineState::Loaded) {
            return Ok(());
        }

        let stopped = self.driver.stop();
        if self
            .state
            .transition(PipelineState::Streaming, PipelineState::Completed)
        {
            tracing::info!("streaming stopped");
        }
        self.mailbox.close();

        if let Err(err) = stopped {
            if state != PipelineState::Failed {
                self.fail();
            }
            return Err(err);
        }
        Ok(())
    }

    /// Waits for the next block and returns its magnitude spectrum.
    ///
    /// Returns `Ok(None)` once streaming is over and no block is pending.
    pub fn pull_spectrum(&mut self) -> Result<Option<MagnitudeSpectrum>> {
        match self.state() {
            PipelineState::Streaming | PipelineState::Completed => {}
            state => {
                return Err(SpectrumError::InvalidState {
                    operation: "pull a spectrum",
                    state,
                })
            }
        }
        // The lock is released before the transform runs.
        if !self.mailbox.take_into(&mut self.block)? {
            // Shutdown observed: the stream is over, so release the driver.
            self.stop()?;
            return Ok(None);
        }
        let Some(transform) = self.transform.as_mut() else {
            return Err(SpectrumError::msg("streaming pipeline has no transform"));
        };
        transform.transform(&self.block).map(Some)
    }

    /// Feeds spectra to `visualizer` until it asks to close or the stream
    /// ends, then stops the pipeline and cleans the visualizer up. Returns the
    /// number of rendered frames.
    pub fn drive(&mut self, visualizer: &mut dyn Visualizer) -> Result<usize> {
        let mut rendered = 0;
        let outcome = loop {
            if visualizer.should_close() {
                break Ok(());
            }
            match self.pull_spectrum() {
                Ok(Some(spectrum)) => {
                    if let Err(err) = visualizer.render(&spectrum) {
                        break Err(err);
                    }
                    rendered += 1;
                }
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        let stopped = self.stop();
        visualizer.cleanup();
        outcome.and(stopped)?;

        if let Ok(stats) = self.mailbox.stats() {
            tracing::info!(
                rendered,
                published = stats.published,
                dropped = stats.overwritten,
                "render loop finished"
            );
        }
        Ok(rendered)
    }

    fn expect_state(&self, operation: &'static str, expected: PipelineState) -> Result<()> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(SpectrumError::InvalidState { operation, state })
        }
    }

    fn fail(&mut self) {
        self.state.set(PipelineState::Failed);
        if let Err(err) = self.driver.stop() {
            tracing::warn!(%err, "failed to release output stream");
        }
        self.mailbox.close();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(%err, "failed to stop pipeline");
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("source_frames", &self.source.as_ref().map(|s| s.frames()))
            .field("transform", &self.transform)
            .finish()
    }
}
