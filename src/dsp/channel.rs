//! Per-channel state and the frame adapter.
//!
//! The host hands us blocks of any length; the engine only takes frames of
//! exactly `FRAME_SIZE`. Each channel keeps two bounded carries:
//!
//! - `input` carry: scaled samples that do not yet form a complete frame
//! - `output` carry: denoised samples produced but not yet handed to the host
//!
//! At rest `input + output == FRAME_SIZE - 1`. The input carry is primed with
//! `FRAME_SIZE - 1` zeros, so the first new sample completes a frame and every
//! block can be answered in full. This fixes the latency at `FRAME_SIZE - 1`
//! samples and bounds each carry below one frame.
//!
//! Partial frames are never zero-padded mid-stream; they wait for the next
//! block. Nothing here allocates after construction.

use super::codec::{scale_in, scale_out};
use super::engine::{DenoiseEngine, FRAME_SIZE};
use super::gate::VoxGate;
use super::io::ChannelIo;
use ringbuf::{Consumer, Producer, RingBuffer};

/// Input carry holds at most one frame (transiently full right before it is drained).
const INPUT_CAP: usize = FRAME_SIZE;
/// Output carry holds at most `FRAME_SIZE - 1` leftovers plus one fresh frame.
const OUTPUT_CAP: usize = FRAME_SIZE * 2;

/// Gate configuration snapshot taken once per block.
#[derive(Debug, Clone, Copy)]
pub struct GateParams {
    pub threshold: f32,
    pub release_frames: u32,
}

/// What one channel did during one block.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelReport {
    pub frames: usize,
    pub max_confidence: f32,
    pub gate_open: bool,
}

pub struct ChannelState {
    /// `None` when engine creation failed; such a channel emits silence.
    engine: Option<Box<dyn DenoiseEngine>>,

    input_producer: Producer<f32>,
    input_consumer: Consumer<f32>,
    output_producer: Producer<f32>,
    output_consumer: Consumer<f32>,

    frame_in: [f32; FRAME_SIZE],
    frame_out: [f32; FRAME_SIZE],

    gate: VoxGate,
    priming: usize,
}

impl ChannelState {
    pub fn new(engine: Option<Box<dyn DenoiseEngine>>) -> Self {
        Self::with_priming(engine, FRAME_SIZE - 1)
    }

    /// `priming` zeros are queued ahead of the first real sample.
    pub(crate) fn with_priming(engine: Option<Box<dyn DenoiseEngine>>, priming: usize) -> Self {
        let (input_producer, input_consumer) = RingBuffer::<f32>::new(INPUT_CAP).split();
        let (output_producer, output_consumer) = RingBuffer::<f32>::new(OUTPUT_CAP).split();

        let mut state = Self {
            engine,
            input_producer,
            input_consumer,
            output_producer,
            output_consumer,
            frame_in: [0.0; FRAME_SIZE],
            frame_out: [0.0; FRAME_SIZE],
            gate: VoxGate::new(),
            priming: priming.min(FRAME_SIZE - 1),
        };
        state.prime();
        state
    }

    fn prime(&mut self) {
        for _ in 0..self.priming {
            let _ = self.input_producer.push(0.0);
        }
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn input_carry_len(&self) -> usize {
        self.input_consumer.len()
    }

    pub fn output_carry_len(&self) -> usize {
        self.output_consumer.len()
    }

    pub fn gate_counter(&self) -> u32 {
        self.gate.counter()
    }

    /// Clear carries and gate, install a fresh engine and hand back the old one
    /// so the caller decides where it is dropped.
    pub fn reset(
        &mut self,
        engine: Option<Box<dyn DenoiseEngine>>,
    ) -> Option<Box<dyn DenoiseEngine>> {
        while self.input_consumer.pop().is_some() {}
        while self.output_consumer.pop().is_some() {}
        self.frame_in.fill(0.0);
        self.frame_out.fill(0.0);
        self.gate.reset();
        self.prime();
        std::mem::replace(&mut self.engine, engine)
    }

    /// Run `count` samples starting at `offset` through the adapter.
    ///
    /// Exactly `count` samples are written to the output range. Output
    /// positions are only written after the matching input positions have been
    /// read, so in-place buffers are safe.
    pub fn process(
        &mut self,
        io: &mut ChannelIo<'_>,
        offset: usize,
        count: usize,
        gate: GateParams,
    ) -> ChannelReport {
        let mut report = ChannelReport::default();
        let end = offset + count;
        let mut consumed = offset;

        while consumed < end {
            let room = INPUT_CAP - self.input_consumer.len();
            let take = room.min(end - consumed);

            for &x in &io.input()[consumed..consumed + take] {
                let _ = self.input_producer.push(scale_in(x));
            }

            if self.input_consumer.len() == FRAME_SIZE {
                self.run_frame(gate, &mut report);
            }

            let out = &mut io.output()[consumed..consumed + take];
            let popped = self.output_consumer.pop_slice(out);
            // Only reachable without priming; never emit stale samples.
            out[popped..].fill(0.0);
            for y in out[..popped].iter_mut() {
                *y = scale_out(*y);
            }

            consumed += take;
        }

        report.gate_open = self.has_engine() && self.gate.is_open();
        report
    }

    fn run_frame(&mut self, gate: GateParams, report: &mut ChannelReport) {
        let got = self.input_consumer.pop_slice(&mut self.frame_in);
        debug_assert_eq!(got, FRAME_SIZE);

        let passes = match self.engine.as_mut() {
            Some(engine) => {
                let confidence = engine.process_frame(&mut self.frame_out, &self.frame_in);
                report.max_confidence = report.max_confidence.max(confidence);
                self.gate
                    .update(confidence, gate.threshold, gate.release_frames)
            }
            None => false,
        };
        if !passes {
            self.frame_out.fill(0.0);
        }

        let pushed = self.output_producer.push_slice(&self.frame_out);
        debug_assert_eq!(pushed, FRAME_SIZE);
        report.frames += 1;
    }
}
