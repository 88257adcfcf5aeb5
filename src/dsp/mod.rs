pub mod channel;
pub mod codec;
pub mod engine;
pub mod gate;
pub mod guard;
pub mod io;
pub mod kernel;

pub use channel::{ChannelReport, ChannelState, GateParams};
pub use codec::{scale_in, scale_out, I16_FULL_SCALE};
pub use engine::{
    DenoiseEngine, EngineFactory, RnnoiseEngine, RnnoiseFactory, ENGINE_SAMPLE_RATE, FRAME_SIZE,
};
pub use gate::{
    release_frames_for_ms, release_ms_for_frames, GateControls, ParameterId, VoxGate,
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_RELEASE_FRAMES, MAX_RELEASE_FRAMES, MAX_RELEASE_MS,
};
pub use guard::SharedKernel;
pub use io::{BlockIo, ChannelIo, InPlaceBlock, SplitBlock};
pub use kernel::{BlockOutcome, DenoiseKernel, EngineSet};
