//! Thread-safe telemetry for the denoise kernel.
//!
//! Atomic storage shared between the audio thread and whoever wants to watch
//! it (host adapter, tests, offline tool) without locks.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

#[derive(Default)]
pub struct KernelMeters {
    speech_confidence: AtomicU32,
    gate_open: AtomicBool,
    frames_processed: AtomicU64,
    skipped_blocks: AtomicU32,
    uninitialized_blocks: AtomicU32,
}

impl KernelMeters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest speech confidence of any channel during the last processed block
    /// that completed a frame.
    pub fn set_speech_confidence(&self, val: f32) {
        self.speech_confidence.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_gate_open(&self, open: bool) {
        self.gate_open.store(open, Ordering::Relaxed);
    }

    pub fn add_frames(&self, frames: u64) {
        self.frames_processed.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn inc_skipped_blocks(&self) {
        self.skipped_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_uninitialized_blocks(&self) {
        self.uninitialized_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_speech_confidence(&self) -> f32 {
        f32::from_bits(self.speech_confidence.load(Ordering::Relaxed))
    }

    pub fn is_gate_open(&self) -> bool {
        self.gate_open.load(Ordering::Relaxed)
    }

    pub fn get_frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn get_skipped_blocks(&self) -> u32 {
        self.skipped_blocks.load(Ordering::Relaxed)
    }

    pub fn get_uninitialized_blocks(&self) -> u32 {
        self.uninitialized_blocks.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.set_speech_confidence(0.0);
        self.set_gate_open(false);
        self.frames_processed.store(0, Ordering::Relaxed);
        self.skipped_blocks.store(0, Ordering::Relaxed);
        self.uninitialized_blocks.store(0, Ordering::Relaxed);
    }
}
