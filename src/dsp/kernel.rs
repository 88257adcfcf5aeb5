//! Denoise kernel
//!
//! Owns one [`ChannelState`] per channel and drives them once per host block:
//! host buffer → scale in → frame adapter → engine → VOX gate → scale out.
//!
//! # Lifecycle
//! - **Uninitialized**: `process` writes silence and reports `NotInitialized`.
//! - **Active**: `init` created every channel (a channel whose engine could not
//!   be created stays silent and `init` returns the error).
//! - **Bypassed**: input copied to output, carries and gates untouched.
//!
//! # Audio Thread Safety
//! - Channels are allocated in `init`; engines are created in `init`/`reset`.
//! - `process` and `flush` never allocate, lock or log through `log`.
//! - Gate parameters and bypass are read from atomics once per block.

use super::channel::{ChannelState, GateParams};
use super::engine::{DenoiseEngine, EngineFactory, ENGINE_SAMPLE_RATE, FRAME_SIZE};
use super::gate::{GateControls, ParameterId};
use super::io::{BlockIo, ChannelIo, InPlaceBlock};
use crate::error::KernelError;
use crate::meters::KernelMeters;
use crate::rt_log;
use log::{error, info, warn};
use std::sync::Arc;

/// Result of one `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Processed,
    Bypassed,
    NotInitialized,
    /// Reset or teardown held the kernel; the block was silenced.
    Busy,
}

/// Freshly created engines, one slot per channel. `None` marks a failed creation.
pub struct EngineSet {
    engines: Vec<Option<Box<dyn DenoiseEngine>>>,
    error: Option<KernelError>,
}

impl EngineSet {
    /// Create `channel_count` engines. Keeps going after a failure so every
    /// healthy channel still gets an engine; the first error is retained.
    pub fn create(factory: &dyn EngineFactory, channel_count: usize) -> Self {
        let mut engines = Vec::with_capacity(channel_count);
        let mut first_error = None;
        for channel in 0..channel_count {
            match factory.create() {
                Ok(engine) => engines.push(Some(engine)),
                Err(source) => {
                    error!("Engine creation failed for channel {}: {}", channel, source);
                    if first_error.is_none() {
                        first_error = Some(KernelError::EngineCreation { channel, source });
                    }
                    engines.push(None);
                }
            }
        }
        Self {
            engines,
            error: first_error,
        }
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn error(&self) -> Option<&KernelError> {
        self.error.as_ref()
    }
}

pub struct DenoiseKernel {
    factory: Arc<dyn EngineFactory>,
    channels: Vec<ChannelState>,
    sample_rate: f32,
    controls: Arc<GateControls>,
    meters: Arc<KernelMeters>,
    warned_uninitialized: bool,
}

impl DenoiseKernel {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self::with_shared(factory, Arc::new(GateControls::new()), Arc::new(KernelMeters::new()))
    }

    /// Build a kernel around controls and meters owned by someone else
    /// (usually the host adapter or a [`super::SharedKernel`]).
    pub fn with_shared(
        factory: Arc<dyn EngineFactory>,
        controls: Arc<GateControls>,
        meters: Arc<KernelMeters>,
    ) -> Self {
        Self {
            factory,
            channels: Vec::new(),
            sample_rate: ENGINE_SAMPLE_RATE,
            controls,
            meters,
            warned_uninitialized: false,
        }
    }

    /// Allocate channel state and one engine per channel.
    ///
    /// Must run before the first `process`. Calling it again rebuilds
    /// everything for the new layout.
    pub fn init(&mut self, channel_count: usize, sample_rate: f32) -> Result<(), KernelError> {
        if channel_count == 0 {
            return Err(KernelError::InvalidChannelCount);
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(KernelError::InvalidSampleRate(sample_rate));
        }
        if (sample_rate - ENGINE_SAMPLE_RATE).abs() > f32::EPSILON {
            warn!(
                "Sample rate {} Hz differs from the {} Hz the denoiser was trained at; quality will suffer",
                sample_rate, ENGINE_SAMPLE_RATE
            );
        }

        let set = EngineSet::create(&*self.factory, channel_count);
        let EngineSet { engines, error } = set;
        self.channels = engines.into_iter().map(ChannelState::new).collect();
        self.sample_rate = sample_rate;
        self.warned_uninitialized = false;

        info!(
            "Denoise kernel initialized: {} channel(s) at {} Hz, latency {} samples",
            channel_count,
            sample_rate,
            self.latency_samples()
        );
        error.map_or(Ok(()), Err)
    }

    /// Recreate every engine and clear all carries and gate counters.
    pub fn reset(&mut self) -> Result<(), KernelError> {
        if self.channels.is_empty() {
            return Err(KernelError::NotInitialized);
        }
        let mut set = EngineSet::create(&*self.factory, self.channels.len());
        self.install(&mut set);
        // `set` now owns the retired engines; they drop here.
        match set.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Swap `set`'s engines into the channels and reset their carries. The
    /// retired engines are left in `set` so the caller controls where they drop.
    pub fn install(&mut self, set: &mut EngineSet) {
        debug_assert_eq!(set.engines.len(), self.channels.len());
        for (channel, slot) in self.channels.iter_mut().zip(set.engines.iter_mut()) {
            *slot = channel.reset(slot.take());
        }
        self.meters.set_gate_open(false);
    }

    /// Drop all channels; the kernel returns to the uninitialized state.
    pub fn teardown(&mut self) -> Vec<ChannelState> {
        self.warned_uninitialized = false;
        std::mem::take(&mut self.channels)
    }

    pub fn is_initialized(&self) -> bool {
        !self.channels.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn factory(&self) -> &Arc<dyn EngineFactory> {
        &self.factory
    }

    pub fn controls(&self) -> &Arc<GateControls> {
        &self.controls
    }

    pub fn meters(&self) -> &Arc<KernelMeters> {
        &self.meters
    }

    pub fn set_bypass(&self, bypass: bool) {
        self.controls.set_bypass(bypass);
    }

    pub fn is_bypassed(&self) -> bool {
        self.controls.is_bypassed()
    }

    pub fn set_parameter(&self, id: ParameterId, value: f32) {
        self.controls.set_parameter(id, value);
    }

    pub fn get_parameter(&self, id: ParameterId) -> f32 {
        self.controls.get_parameter(id)
    }

    pub fn latency_samples(&self) -> usize {
        FRAME_SIZE - 1
    }

    pub fn latency_seconds(&self) -> f64 {
        self.latency_samples() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelState> {
        self.channels.get(index)
    }

    /// Process `frame_count` samples starting at `buffer_offset` of every channel.
    pub fn process<B: BlockIo + ?Sized>(
        &mut self,
        io: &mut B,
        frame_count: usize,
        buffer_offset: usize,
    ) -> BlockOutcome {
        if self.channels.is_empty() {
            if !self.warned_uninitialized {
                rt_log!("process called before init; emitting silence");
                self.warned_uninitialized = true;
            }
            self.meters.inc_uninitialized_blocks();
            silence(io, frame_count, buffer_offset);
            return BlockOutcome::NotInitialized;
        }

        if self.controls.is_bypassed() {
            pass_through(io, frame_count, buffer_offset);
            return BlockOutcome::Bypassed;
        }

        self.process_channels(io, frame_count, buffer_offset);
        BlockOutcome::Processed
    }

    /// Push the still-latent tail out at end of stream.
    ///
    /// Feeds `latency_samples()` zeros through every channel and writes the
    /// resulting samples into `outputs`. Returns the number written per channel.
    /// Live hosts never call this; zero padding only happens here.
    pub fn flush(&mut self, outputs: &mut [&mut [f32]]) -> usize {
        if self.channels.is_empty() {
            return 0;
        }
        let n = outputs
            .iter()
            .map(|o| o.len())
            .min()
            .unwrap_or(0)
            .min(self.latency_samples());
        for out in outputs.iter_mut() {
            out[..n].fill(0.0);
        }
        let mut block = InPlaceBlock::new(outputs);
        self.process_channels(&mut block, n, 0);
        n
    }

    fn process_channels<B: BlockIo + ?Sized>(
        &mut self,
        io: &mut B,
        frame_count: usize,
        buffer_offset: usize,
    ) {
        // Every channel must advance by the same amount or the carries drift apart.
        let mut count = frame_count;
        for index in 0..self.channels.len() {
            match io.channel(index) {
                Some(ch) => count = count.min(ch.len().saturating_sub(buffer_offset)),
                None => {
                    rt_log!("host supplied no buffer for channel {}", index);
                    count = 0;
                }
            }
        }
        if count < frame_count {
            rt_log!(
                "block clamped from {} to {} samples at offset {}",
                frame_count,
                count,
                buffer_offset
            );
        }

        let gate = GateParams {
            threshold: self.controls.confidence_threshold(),
            release_frames: self.controls.release_frames(),
        };

        let mut frames = 0usize;
        let mut max_confidence = 0.0f32;
        let mut any_open = false;
        for (index, channel) in self.channels.iter_mut().enumerate() {
            let Some(mut ch) = io.channel(index) else {
                continue;
            };
            let report = channel.process(&mut ch, buffer_offset, count, gate);
            frames += report.frames;
            max_confidence = max_confidence.max(report.max_confidence);
            any_open |= report.gate_open;
            // Anything past the clamped range is left silent rather than stale.
            let end = (buffer_offset + frame_count).min(ch.len());
            let start = (buffer_offset + count).min(end);
            ch.output()[start..end].fill(0.0);
        }

        // Host channels beyond the initialized layout get silence.
        for index in self.channels.len()..io.num_channels() {
            if let Some(mut ch) = io.channel(index) {
                let (start, end) = span(&ch, frame_count, buffer_offset);
                ch.output()[start..end].fill(0.0);
            }
        }

        debug_assert!(self.carries_are_symmetric());

        if frames > 0 {
            self.meters.set_speech_confidence(max_confidence);
        }
        self.meters.set_gate_open(any_open);
        self.meters.add_frames(frames as u64);
    }

    fn carries_are_symmetric(&self) -> bool {
        let Some(first) = self.channels.first() else {
            return true;
        };
        self.channels.iter().all(|c| {
            c.input_carry_len() == first.input_carry_len()
                && c.output_carry_len() == first.output_carry_len()
        })
    }
}

/// The `[offset, offset + count)` range clamped to what the channel can address.
fn span(ch: &ChannelIo<'_>, frame_count: usize, buffer_offset: usize) -> (usize, usize) {
    let end = (buffer_offset + frame_count).min(ch.len());
    (buffer_offset.min(end), end)
}

pub(crate) fn silence<B: BlockIo + ?Sized>(io: &mut B, frame_count: usize, buffer_offset: usize) {
    for index in 0..io.num_channels() {
        if let Some(mut ch) = io.channel(index) {
            let (start, end) = span(&ch, frame_count, buffer_offset);
            ch.output()[start..end].fill(0.0);
        }
    }
}

fn pass_through<B: BlockIo + ?Sized>(io: &mut B, frame_count: usize, buffer_offset: usize) {
    for index in 0..io.num_channels() {
        let Some(ch) = io.channel(index) else {
            continue;
        };
        let (start, end) = span(&ch, frame_count, buffer_offset);
        match ch {
            // Same memory: nothing to copy.
            ChannelIo::InPlace(_) => {}
            ChannelIo::Split { input, output } => {
                output[start..end].copy_from_slice(&input[start..end]);
            }
        }
    }
}
