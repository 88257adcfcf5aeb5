//! VOX noise gate
//!
//! Hysteretic gate driven by the engine's per-frame speech confidence. It runs
//! on the denoised signal, once per completed frame, per channel.
//!
//! - **Open**: a frame at or above the threshold re-arms the release counter
//! - **Holding**: each low-confidence frame spends one frame of the release window
//! - **Closed**: once the window is spent, frames are replaced with silence
//!
//! A frame the engine judged speech-positive is never muted, and a release of
//! `N` frames keeps exactly `N` low-confidence frames audible after speech.
//!
//! Gate configuration is shared with the control thread through atomics so
//! parameter changes never block the render thread.

use super::engine::FRAME_SIZE;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.95;
pub const DEFAULT_RELEASE_FRAMES: u32 = 10;
/// 5 s of 10 ms frames.
pub const MAX_RELEASE_FRAMES: u32 = 500;
pub const MAX_RELEASE_MS: f32 = 5000.0;

/// Addressable gate parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterId {
    ConfidenceThreshold,
    ReleaseFrameCount,
}

impl ParameterId {
    pub fn from_address(address: u64) -> Option<Self> {
        match address {
            0 => Some(ParameterId::ConfidenceThreshold),
            1 => Some(ParameterId::ReleaseFrameCount),
            _ => None,
        }
    }
}

/// Convert a release time to whole engine frames at the given sample rate.
pub fn release_frames_for_ms(ms: f32, sample_rate: f32) -> u32 {
    if !(sample_rate > 0.0) || !ms.is_finite() {
        return 0;
    }
    let frames = (ms.clamp(0.0, MAX_RELEASE_MS) * sample_rate / 1000.0 / FRAME_SIZE as f32).round();
    (frames as u32).min(MAX_RELEASE_FRAMES)
}

/// Inverse of [`release_frames_for_ms`].
pub fn release_ms_for_frames(frames: u32, sample_rate: f32) -> f32 {
    if !(sample_rate > 0.0) {
        return 0.0;
    }
    frames as f32 * FRAME_SIZE as f32 * 1000.0 / sample_rate
}

/// Per-channel gate state.
#[derive(Debug, Default, Clone, Copy)]
pub struct VoxGate {
    counter: u32,
}

impl VoxGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one frame. Returns whether the frame passes (true) or is muted.
    #[inline]
    pub fn update(&mut self, confidence: f32, threshold: f32, release_frames: u32) -> bool {
        if confidence >= threshold {
            self.counter = release_frames;
            true
        } else if self.counter > 0 {
            self.counter -= 1;
            true
        } else {
            false
        }
    }

    /// Frames left in the release window.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn is_open(&self) -> bool {
        self.counter > 0
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

/// Live configuration shared between the control thread and `process`.
#[derive(Debug)]
pub struct GateControls {
    confidence_threshold: AtomicU32,
    release_frames: AtomicU32,
    bypassed: AtomicBool,
}

impl Default for GateControls {
    fn default() -> Self {
        Self {
            confidence_threshold: AtomicU32::new(DEFAULT_CONFIDENCE_THRESHOLD.to_bits()),
            release_frames: AtomicU32::new(DEFAULT_RELEASE_FRAMES),
            bypassed: AtomicBool::new(false),
        }
    }
}

impl GateControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confidence_threshold(&self) -> f32 {
        f32::from_bits(self.confidence_threshold.load(Ordering::Relaxed))
    }

    pub fn set_confidence_threshold(&self, value: f32) {
        let v = if value.is_nan() { DEFAULT_CONFIDENCE_THRESHOLD } else { value.clamp(0.0, 1.0) };
        self.confidence_threshold.store(v.to_bits(), Ordering::Relaxed);
    }

    pub fn release_frames(&self) -> u32 {
        self.release_frames.load(Ordering::Relaxed)
    }

    pub fn set_release_frames(&self, frames: u32) {
        self.release_frames
            .store(frames.min(MAX_RELEASE_FRAMES), Ordering::Relaxed);
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed.load(Ordering::Acquire)
    }

    pub fn set_bypass(&self, bypass: bool) {
        self.bypassed.store(bypass, Ordering::Release);
    }

    pub fn set_parameter(&self, id: ParameterId, value: f32) {
        match id {
            ParameterId::ConfidenceThreshold => self.set_confidence_threshold(value),
            ParameterId::ReleaseFrameCount => {
                let frames = if value.is_finite() { value.round().max(0.0) } else { 0.0 };
                self.set_release_frames(frames.min(MAX_RELEASE_FRAMES as f32) as u32);
            }
        }
    }

    pub fn get_parameter(&self, id: ParameterId) -> f32 {
        match id {
            ParameterId::ConfidenceThreshold => self.confidence_threshold(),
            ParameterId::ReleaseFrameCount => self.release_frames() as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_starts_closed() {
        let mut gate = VoxGate::new();
        assert!(!gate.is_open());
        assert!(!gate.update(0.1, 0.95, 10));
    }

    #[test]
    fn test_release_window_holds_exactly_release_frames() {
        let mut gate = VoxGate::new();
        assert!(gate.update(0.99, 0.95, 10));
        let passed: Vec<bool> = (0..30).map(|_| gate.update(0.1, 0.95, 10)).collect();
        assert!(passed[..10].iter().all(|&p| p));
        assert!(passed[10..].iter().all(|&p| !p));
        assert_eq!(gate.counter(), 0);
    }

    #[test]
    fn test_speech_frame_passes_with_zero_release() {
        let mut gate = VoxGate::new();
        assert!(gate.update(0.96, 0.95, 0));
        assert!(!gate.update(0.5, 0.95, 0));
    }

    #[test]
    fn test_speech_rearms_window() {
        let mut gate = VoxGate::new();
        gate.update(1.0, 0.5, 3);
        gate.update(0.0, 0.5, 3);
        gate.update(0.0, 0.5, 3);
        assert_eq!(gate.counter(), 1);
        gate.update(0.7, 0.5, 3);
        assert_eq!(gate.counter(), 3);
    }

    #[test]
    fn test_release_ms_conversion() {
        // 100 ms at 48 kHz is ten 480-sample frames
        assert_eq!(release_frames_for_ms(100.0, 48000.0), 10);
        assert_eq!(release_frames_for_ms(0.0, 48000.0), 0);
        assert_eq!(release_frames_for_ms(5000.0, 48000.0), 500);
        assert_eq!(release_frames_for_ms(100.0, 0.0), 0);
        assert!((release_ms_for_frames(10, 48000.0) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_controls_clamp_values() {
        let controls = GateControls::new();
        controls.set_parameter(ParameterId::ConfidenceThreshold, 1.5);
        assert_eq!(controls.get_parameter(ParameterId::ConfidenceThreshold), 1.0);
        controls.set_parameter(ParameterId::ReleaseFrameCount, -3.0);
        assert_eq!(controls.get_parameter(ParameterId::ReleaseFrameCount), 0.0);
        controls.set_parameter(ParameterId::ReleaseFrameCount, 12.4);
        assert_eq!(controls.release_frames(), 12);
        controls.set_release_frames(10_000);
        assert_eq!(controls.release_frames(), MAX_RELEASE_FRAMES);
    }

    #[test]
    fn test_parameter_addresses() {
        assert_eq!(ParameterId::from_address(0), Some(ParameterId::ConfidenceThreshold));
        assert_eq!(ParameterId::from_address(1), Some(ParameterId::ReleaseFrameCount));
        assert_eq!(ParameterId::from_address(7), None);
    }
}
