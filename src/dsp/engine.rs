//! Denoising engine seam.
//!
//! The frame adapter only ever talks to a [`DenoiseEngine`]: one opaque,
//! stateful instance per channel that turns exactly [`FRAME_SIZE`] samples into
//! [`FRAME_SIZE`] denoised samples plus a speech confidence. Instances are
//! produced by an [`EngineFactory`] so that creation can fail and be surfaced
//! at init instead of on the audio thread.

use crate::error::EngineError;
use nnnoiseless::DenoiseState;

/// Samples per engine frame (10 ms at 48 kHz). All chunking is done in units of this.
pub const FRAME_SIZE: usize = DenoiseState::FRAME_SIZE;

/// Sample rate the RNNoise model was trained at.
pub const ENGINE_SAMPLE_RATE: f32 = 48000.0;

pub trait DenoiseEngine: Send {
    /// Denoise one frame.
    ///
    /// * `output` - receives exactly `FRAME_SIZE` samples (i16-range floats)
    /// * `input` - exactly `FRAME_SIZE` samples (i16-range floats)
    ///
    /// Returns the speech confidence for this frame (0.0 - 1.0).
    fn process_frame(&mut self, output: &mut [f32], input: &[f32]) -> f32;
}

pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn DenoiseEngine>, EngineError>;
}

/// RNNoise instance backed by `nnnoiseless`.
pub struct RnnoiseEngine {
    state: Box<DenoiseState<'static>>,
}

impl RnnoiseEngine {
    pub fn new() -> Self {
        Self {
            state: DenoiseState::new(),
        }
    }
}

impl Default for RnnoiseEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DenoiseEngine for RnnoiseEngine {
    #[inline]
    fn process_frame(&mut self, output: &mut [f32], input: &[f32]) -> f32 {
        debug_assert_eq!(input.len(), FRAME_SIZE);
        debug_assert_eq!(output.len(), FRAME_SIZE);
        self.state.process_frame(output, input).clamp(0.0, 1.0)
    }
}

/// Creates RNNoise instances with the built-in model.
#[derive(Debug, Default, Clone, Copy)]
pub struct RnnoiseFactory;

impl EngineFactory for RnnoiseFactory {
    fn create(&self) -> Result<Box<dyn DenoiseEngine>, EngineError> {
        Ok(Box::new(RnnoiseEngine::new()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted engines shared by the dsp tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Copies input to output and always reports speech.
    pub struct IdentityEngine;

    impl DenoiseEngine for IdentityEngine {
        fn process_frame(&mut self, output: &mut [f32], input: &[f32]) -> f32 {
            output.copy_from_slice(input);
            1.0
        }
    }

    /// Output depends on every frame seen so far, so any reordering,
    /// duplication or drop of a frame changes the result.
    pub struct RunningEngine {
        acc: f32,
    }

    impl RunningEngine {
        pub fn fresh() -> Self {
            Self { acc: 0.0 }
        }
    }

    impl DenoiseEngine for RunningEngine {
        fn process_frame(&mut self, output: &mut [f32], input: &[f32]) -> f32 {
            for (o, &x) in output.iter_mut().zip(input) {
                self.acc = 0.5 * self.acc + 0.25 * x;
                *o = x * 0.5 + self.acc;
            }
            1.0
        }
    }

    /// Passes audio through and reports confidences from a fixed script.
    pub struct ScriptedEngine {
        script: Arc<Vec<f32>>,
        pos: usize,
    }

    impl DenoiseEngine for ScriptedEngine {
        fn process_frame(&mut self, output: &mut [f32], input: &[f32]) -> f32 {
            output.copy_from_slice(input);
            let conf = self.script.get(self.pos).copied().unwrap_or(0.0);
            self.pos += 1;
            conf
        }
    }

    pub struct IdentityFactory;

    impl EngineFactory for IdentityFactory {
        fn create(&self) -> Result<Box<dyn DenoiseEngine>, EngineError> {
            Ok(Box::new(IdentityEngine))
        }
    }

    pub struct RunningFactory;

    impl EngineFactory for RunningFactory {
        fn create(&self) -> Result<Box<dyn DenoiseEngine>, EngineError> {
            Ok(Box::new(RunningEngine::fresh()))
        }
    }

    pub struct ScriptedFactory {
        pub script: Arc<Vec<f32>>,
    }

    impl EngineFactory for ScriptedFactory {
        fn create(&self) -> Result<Box<dyn DenoiseEngine>, EngineError> {
            Ok(Box::new(ScriptedEngine {
                script: self.script.clone(),
                pos: 0,
            }))
        }
    }

    /// Fails on the `fail_at`-th creation (0-based), identity otherwise.
    pub struct FailingFactory {
        pub fail_at: usize,
        pub created: AtomicUsize,
    }

    impl FailingFactory {
        pub fn new(fail_at: usize) -> Self {
            Self {
                fail_at,
                created: AtomicUsize::new(0),
            }
        }
    }

    impl EngineFactory for FailingFactory {
        fn create(&self) -> Result<Box<dyn DenoiseEngine>, EngineError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            if n == self.fail_at {
                Err(EngineError::Unavailable("scripted failure".into()))
            } else {
                Ok(Box::new(IdentityEngine))
            }
        }
    }
}
