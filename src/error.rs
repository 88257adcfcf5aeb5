//! Error types for engine creation and kernel lifecycle.
//!
//! None of these are produced on the render thread; `process` reports its
//! state through [`crate::dsp::BlockOutcome`] instead.

use thiserror::Error;

/// Failure reported by an [`crate::dsp::EngineFactory`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("denoising engine unavailable: {0}")]
    Unavailable(String),
}

/// Lifecycle errors of the denoise kernel
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("engine creation failed for channel {channel}: {source}")]
    EngineCreation {
        channel: usize,
        #[source]
        source: EngineError,
    },

    #[error("channel count must be at least 1")]
    InvalidChannelCount,

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(f32),

    #[error("kernel used before init")]
    NotInitialized,
}

/// Errors raised while reading gate settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to parse gate settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown preset: {0}")]
    UnknownPreset(String),
}
