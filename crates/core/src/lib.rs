//! Core library for the Spectrum Player.
//!
//! Decoded audio is streamed to an output device one block at a time while a
//! consumer thread pulls the magnitude spectrum of the most recent block.
//! The real-time side only copies samples and hands them over through a
//! single-slot [`Mailbox`]; the transform runs entirely on the consumer side.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod decode;
pub mod error;
pub mod mailbox;
pub mod pipeline;
pub mod render;

pub use analysis::{MagnitudeSpectrum, SpectralTransform};
pub use audio::{AudioMode, CallbackFlow, CpalDriver, HeadlessDriver, StreamDriver, StreamSpec};
pub use config::{AppConfig, AudioConfig, RenderConfig, TailPolicy, WindowFunction};
pub use decode::{AudioFormat, DecodedSource};
pub use error::{Result, SpectrumError};
pub use mailbox::{Mailbox, MailboxStats};
pub use pipeline::{Pipeline, PipelineState};
pub use render::{SpectrumSmoother, TraceVisualizer, Visualizer};
