pub mod debug;
pub mod dsp;
pub mod error;
pub mod meters;
pub mod presets;

use crate::dsp::{
    release_frames_for_ms, DenoiseKernel, InPlaceBlock, RnnoiseFactory, DEFAULT_CONFIDENCE_THRESHOLD,
    ENGINE_SAMPLE_RATE, MAX_RELEASE_MS,
};
use crate::presets::{GatePreset, FACTORY_PRESETS};
use assert_no_alloc::permit_alloc;
use nih_plug::prelude::*;
use once_cell::sync::Lazy;
use std::sync::Arc;

pub use crate::dsp::{BlockOutcome, ParameterId, SharedKernel};
pub use crate::error::{EngineError, KernelError};

const DEFAULT_RELEASE_MS: f32 = 100.0;

// -----------------------------------------------------------------------------
// PARAMETERS
// -----------------------------------------------------------------------------
#[derive(Params)]
pub struct VoxParams {
    /// Speech confidence below which the gate starts its release
    #[id = "speech_threshold"]
    pub speech_threshold: FloatParam,

    /// How long the gate stays open after the last confident frame
    #[id = "gate_release"]
    pub gate_release: FloatParam,

    #[id = "gate_preset"]
    pub gate_preset: EnumParam<GatePreset>,

    #[id = "bypass"]
    pub bypass: BoolParam,
}

// Helper to format values as "95%" for the DAW display
fn format_percent(v: f32) -> String {
    format!("{:.0}%", v * 100.0)
}

fn format_ms(v: f32) -> String {
    format!("{:.0} ms", v)
}

impl Default for VoxParams {
    fn default() -> Self {
        Self {
            speech_threshold: FloatParam::new(
                "Speech Threshold",
                DEFAULT_CONFIDENCE_THRESHOLD,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_value_to_string(Arc::new(format_percent)),

            gate_release: FloatParam::new(
                "Gate Release",
                DEFAULT_RELEASE_MS,
                FloatRange::Linear {
                    min: 0.0,
                    max: MAX_RELEASE_MS,
                },
            )
            .with_value_to_string(Arc::new(format_ms)),

            gate_preset: EnumParam::new("Gate Preset", GatePreset::Manual),

            bypass: BoolParam::new("Bypass", false).make_bypass(),
        }
    }
}

// -----------------------------------------------------------------------------
// PLUGIN STRUCT
// -----------------------------------------------------------------------------
struct RnnoiseVoxPlugin {
    params: Arc<VoxParams>,
    kernel: DenoiseKernel,
    sample_rate: f32,
}

impl Default for RnnoiseVoxPlugin {
    fn default() -> Self {
        Self {
            params: Arc::new(VoxParams::default()),
            kernel: DenoiseKernel::new(Arc::new(RnnoiseFactory)),
            sample_rate: ENGINE_SAMPLE_RATE,
        }
    }
}

impl Plugin for RnnoiseVoxPlugin {
    const NAME: &'static str = "RNNoise VOX";
    const VENDOR: &'static str = "William Wold";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            ..AudioIOLayout::const_default()
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        context: &mut impl InitContext<Self>,
    ) -> bool {
        crate::debug::init();

        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            // Parse the preset table here, not on the first audio callback.
            Lazy::force(&FACTORY_PRESETS);

            let channels = audio_io_layout
                .main_output_channels
                .map(NonZeroU32::get)
                .unwrap_or(0) as usize;
            self.sample_rate = buffer_config.sample_rate;

            if let Err(e) = self.kernel.init(channels, self.sample_rate) {
                // Passing noisy audio through would look like success, so refuse to run.
                log::error!("RNNoise VOX failed to initialize: {}", e);
                self.kernel.teardown();
                return false;
            }
            self.sync_controls();

            context.set_latency_samples(self.kernel.latency_samples() as u32);
            log::info!(
                "RNNoise VOX ready: {} channel(s), max block {}, latency {:.2} ms",
                channels,
                buffer_config.max_buffer_size,
                self.kernel.latency_seconds() * 1000.0
            );

            crate::debug::drain();
            true
        }))
        .unwrap_or(false)
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.process_internal(buffer)))
            .unwrap_or(ProcessStatus::Normal)
    }

    fn reset(&mut self) {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            // Engines are recreated here, which allocates.
            permit_alloc(|| {
                if let Err(e) = self.kernel.reset() {
                    log::error!("RNNoise VOX reset failed: {}", e);
                }
            });
        }))
        .unwrap_or(());
    }

    fn deactivate(&mut self) {
        let channels = self.kernel.teardown();
        log::info!("RNNoise VOX deactivated, released {} engine(s)", channels.len());
        crate::debug::drain();
    }
}

impl RnnoiseVoxPlugin {
    /// Copy host parameters into the kernel's lock-free controls.
    fn sync_controls(&self) {
        let controls = self.kernel.controls();
        match self.params.gate_preset.value().settings() {
            Some(settings) => settings.apply(controls, self.sample_rate),
            None => {
                controls.set_confidence_threshold(self.params.speech_threshold.value());
                controls.set_release_frames(release_frames_for_ms(
                    self.params.gate_release.value(),
                    self.sample_rate,
                ));
            }
        }
        controls.set_bypass(self.params.bypass.value());
    }

    fn process_internal(&mut self, buffer: &mut Buffer) -> ProcessStatus {
        self.sync_controls();

        let frames = buffer.samples();
        let mut block = InPlaceBlock::new(buffer.as_slice());
        match self.kernel.process(&mut block, frames, 0) {
            BlockOutcome::NotInitialized => ProcessStatus::Error("denoise kernel not initialized"),
            _ => ProcessStatus::Normal,
        }
    }
}

impl ClapPlugin for RnnoiseVoxPlugin {
    const CLAP_ID: &'static str = "com.williamwold.rnnoise-vox";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("RNNoise voice denoiser with a speech-driven noise gate");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Restoration,
        ClapFeature::Stereo,
        ClapFeature::Mono,
    ];
}

impl Vst3Plugin for RnnoiseVoxPlugin {
    const VST3_CLASS_ID: [u8; 16] = *b"RNNoiseVoxGate01";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Restoration,
    ];
}

nih_export_clap!(RnnoiseVoxPlugin);
nih_export_vst3!(RnnoiseVoxPlugin);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_match_gate_defaults() {
        let params = VoxParams::default();
        assert_eq!(params.speech_threshold.value(), DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(
            release_frames_for_ms(params.gate_release.value(), ENGINE_SAMPLE_RATE),
            crate::dsp::DEFAULT_RELEASE_FRAMES
        );
        assert!(!params.bypass.value());
    }

    #[test]
    fn test_preset_overrides_manual_params() {
        let plugin = RnnoiseVoxPlugin::default();
        plugin.sync_controls();
        assert_eq!(
            plugin.kernel.controls().confidence_threshold(),
            DEFAULT_CONFIDENCE_THRESHOLD
        );
        assert_eq!(plugin.kernel.controls().release_frames(), 10);
        assert!(!plugin.kernel.is_bypassed());
    }

    #[test]
    fn test_formatters() {
        assert_eq!(format_percent(0.95), "95%");
        assert_eq!(format_ms(100.0), "100 ms");
    }
}
