//! Teardown guard for hosts with a separate control thread.
//!
//! The render thread only ever *tries* the lock. If reset or teardown holds
//! it, the block is skipped and silenced instead of waiting, so `process`
//! never blocks. The control thread does its allocation (new engines) and
//! deallocation (old engines, channel state) outside the lock and only holds
//! it for the swap, which keeps skipped blocks rare and short.
//!
//! Bypass and gate parameters live in atomics and never touch the lock.

use super::engine::{EngineFactory, ENGINE_SAMPLE_RATE};
use super::gate::{GateControls, ParameterId};
use super::io::BlockIo;
use super::kernel::{silence, BlockOutcome, DenoiseKernel, EngineSet};
use crate::error::KernelError;
use crate::meters::KernelMeters;
use log::{info, warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

pub struct SharedKernel {
    kernel: Mutex<DenoiseKernel>,
    factory: Arc<dyn EngineFactory>,
    controls: Arc<GateControls>,
    meters: Arc<KernelMeters>,
    sample_rate: AtomicU32,
}

impl SharedKernel {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        let controls = Arc::new(GateControls::new());
        let meters = Arc::new(KernelMeters::new());
        let kernel = DenoiseKernel::with_shared(factory.clone(), controls.clone(), meters.clone());
        Self {
            kernel: Mutex::new(kernel),
            factory,
            controls,
            meters,
            sample_rate: AtomicU32::new(ENGINE_SAMPLE_RATE.to_bits()),
        }
    }

    /// Blocking lock for the control thread. A poisoned lock is recovered:
    /// the kernel holds no invariant a panicking `process` could break halfway
    /// that `reset` would not repair.
    fn lock(&self) -> MutexGuard<'_, DenoiseKernel> {
        self.kernel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn init(&self, channel_count: usize, sample_rate: f32) -> Result<(), KernelError> {
        let mut fresh =
            DenoiseKernel::with_shared(self.factory.clone(), self.controls.clone(), self.meters.clone());
        let result = fresh.init(channel_count, sample_rate);
        if fresh.is_initialized() {
            self.sample_rate.store(sample_rate.to_bits(), Ordering::Relaxed);
            let old = std::mem::replace(&mut *self.lock(), fresh);
            drop(old);
        }
        result
    }

    pub fn reset(&self) -> Result<(), KernelError> {
        let channel_count = self.lock().channel_count();
        if channel_count == 0 {
            return Err(KernelError::NotInitialized);
        }

        let mut set = EngineSet::create(&*self.factory, channel_count);
        {
            let mut kernel = self.lock();
            if kernel.channel_count() != set.len() {
                // Re-initialized or torn down while we were building engines.
                warn!("Reset raced with a layout change; discarding new engines");
                return Err(KernelError::NotInitialized);
            }
            kernel.install(&mut set);
        }
        // Retired engines drop here, outside the lock.
        match set.error() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Free every engine. Waits for an in-flight `process` to finish first.
    pub fn teardown(&self) {
        let channels = self.lock().teardown();
        info!("Denoise kernel torn down ({} channel(s))", channels.len());
        drop(channels);
    }

    /// Render-thread entry point; never blocks.
    pub fn process<B: BlockIo + ?Sized>(
        &self,
        io: &mut B,
        frame_count: usize,
        buffer_offset: usize,
    ) -> BlockOutcome {
        match self.kernel.try_lock() {
            Ok(mut kernel) => kernel.process(io, frame_count, buffer_offset),
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().process(io, frame_count, buffer_offset)
            }
            Err(TryLockError::WouldBlock) => {
                self.meters.inc_skipped_blocks();
                silence(io, frame_count, buffer_offset);
                BlockOutcome::Busy
            }
        }
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

    pub fn latency_seconds(&self) -> f64 {
        let sr = f32::from_bits(self.sample_rate.load(Ordering::Relaxed));
        (super::engine::FRAME_SIZE - 1) as f64 / sr as f64
    }

    pub fn meters(&self) -> &Arc<KernelMeters> {
        &self.meters
    }

    pub fn controls(&self) -> &Arc<GateControls> {
        &self.controls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::engine::testing::{FailingFactory, IdentityFactory};
    use crate::dsp::engine::FRAME_SIZE;
    use crate::dsp::io::InPlaceBlock;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn test_contended_block_is_skipped_and_silenced() {
        let shared = SharedKernel::new(Arc::new(IdentityFactory));
        shared.init(1, 48000.0).unwrap();

        let held = shared.kernel.lock().unwrap();
        let mut buf = vec![0.5f32; 128];
        let mut chans: [&mut [f32]; 1] = [&mut buf];
        let outcome = shared.process(&mut InPlaceBlock::new(&mut chans), 128, 0);
        drop(held);

        assert_eq!(outcome, BlockOutcome::Busy);
        assert!(buf.iter().all(|&v| v == 0.0));
        assert_eq!(shared.meters().get_skipped_blocks(), 1);
    }

    #[test]
    fn test_process_after_teardown_is_silent() {
        let shared = SharedKernel::new(Arc::new(IdentityFactory));
        shared.init(2, 48000.0).unwrap();
        shared.teardown();

        let mut a = vec![0.5f32; 64];
        let mut b = vec![0.5f32; 64];
        let mut chans: [&mut [f32]; 2] = [&mut a, &mut b];
        let outcome = shared.process(&mut InPlaceBlock::new(&mut chans), 64, 0);
        assert_eq!(outcome, BlockOutcome::NotInitialized);
        assert!(a.iter().chain(b.iter()).all(|&v| v == 0.0));
        assert_eq!(shared.reset(), Err(KernelError::NotInitialized));
    }

    #[test]
    fn test_init_failure_is_reported() {
        let shared = SharedKernel::new(Arc::new(FailingFactory::new(0)));
        let err = shared.init(2, 48000.0).unwrap_err();
        assert!(matches!(err, KernelError::EngineCreation { channel: 0, .. }));
    }

    #[test]
    fn test_parameters_do_not_need_the_lock() {
        let shared = SharedKernel::new(Arc::new(IdentityFactory));
        shared.init(1, 44100.0).unwrap();
        let _held = shared.kernel.lock().unwrap();
        shared.set_bypass(true);
        shared.set_parameter(ParameterId::ReleaseFrameCount, 25.0);
        assert!(shared.is_bypassed());
        assert_eq!(shared.get_parameter(ParameterId::ReleaseFrameCount), 25.0);
        assert!((shared.latency_seconds() - (FRAME_SIZE - 1) as f64 / 44100.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_and_teardown_race_with_render_thread() {
        let shared = Arc::new(SharedKernel::new(Arc::new(IdentityFactory)));
        shared.init(2, 48000.0).unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let render = {
            let shared = shared.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut a = vec![0.0f32; 441];
                let mut b = vec![0.0f32; 441];
                let mut blocks = 0usize;
                while !stop.load(Ordering::Relaxed) || blocks < 100 {
                    a.fill(0.25);
                    b.fill(0.25);
                    let mut chans: [&mut [f32]; 2] = [&mut a, &mut b];
                    let outcome = shared.process(&mut InPlaceBlock::new(&mut chans), 441, 0);
                    // Whatever happened, both channels agree and nothing is garbage.
                    assert_eq!(a, b);
                    assert!(a.iter().all(|&v| v == 0.0 || (v - 0.25).abs() < 1e-6));
                    assert!(matches!(
                        outcome,
                        BlockOutcome::Processed | BlockOutcome::Busy | BlockOutcome::NotInitialized
                    ));
                    blocks += 1;
                }
            })
        };

        for _ in 0..50 {
            shared.reset().unwrap();
            thread::yield_now();
        }
        shared.teardown();
        stop.store(true, Ordering::Relaxed);
        render.join().unwrap();

        let mut c = vec![0.5f32; 16];
        let mut chans: [&mut [f32]; 1] = [&mut c];
        assert_eq!(
            shared.process(&mut InPlaceBlock::new(&mut chans), 16, 0),
            BlockOutcome::NotInitialized
        );
    }
}
