use std::path::PathBuf;

use crate::pipeline::PipelineState;

/// Result alias that carries the custom [`SpectrumError`] type.
pub type Result<T> = std::result::Result<T, SpectrumError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SpectrumError {
    /// Free-form error used where no dedicated variant applies.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The file extension does not select a known decoder.
    #[error("unsupported audio format `{0}`, expected `.mp3` or `.wav`")]
    UnsupportedFormat(String),
    /// The file could not be read or its stream is malformed.
    #[error("failed to decode `{}`: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    /// The spectral plan could not be built. No spectra can ever be produced.
    #[error("failed to build spectral transform: {0}")]
    TransformInit(String),
    /// A block handed to the transform or the mailbox has the wrong length.
    #[error("block holds {actual} samples but {expected} were expected")]
    SizeMismatch { expected: usize, actual: usize },
    /// The output device is unavailable or refused to open or start.
    #[error("audio device error: {0}")]
    Device(String),
    /// A lock was poisoned by a panicking thread.
    #[error("{0} lock has been poisoned")]
    Poisoned(&'static str),
    /// The controller was asked to do something its current state forbids.
    #[error("cannot {operation} while the pipeline is {state}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Fft(#[from] realfft::FftError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SpectrumError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` for every failure of the load step, including an
    /// unrecognised file extension.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::UnsupportedFormat(_))
    }
}
