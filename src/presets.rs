use crate::dsp::{release_frames_for_ms, GateControls, MAX_RELEASE_MS};
use crate::error::SettingsError;
use nih_plug::prelude::Enum;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// GATE FACTORY PRESETS
// =============================================================================

/// Factory gate presets. `Manual` leaves the individual parameters in charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[repr(usize)]
pub enum GatePreset {
    #[serde(rename = "Manual")]
    #[name = "Manual"]
    Manual,
    #[serde(rename = "Off")]
    #[name = "Off"]
    Off,
    #[serde(rename = "Gentle")]
    #[name = "Gentle"]
    Gentle,
    #[serde(rename = "Standard")]
    #[name = "Standard"]
    Standard,
    #[serde(rename = "Tight")]
    #[name = "Tight"]
    Tight,
}

impl GatePreset {
    pub fn all() -> [GatePreset; 5] {
        [
            GatePreset::Manual,
            GatePreset::Off,
            GatePreset::Gentle,
            GatePreset::Standard,
            GatePreset::Tight,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            GatePreset::Manual => "Manual",
            GatePreset::Off => "Off",
            GatePreset::Gentle => "Gentle",
            GatePreset::Standard => "Standard",
            GatePreset::Tight => "Tight",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            GatePreset::Manual => "Use the threshold and release parameters",
            GatePreset::Off => "Denoise only, never mute",
            GatePreset::Gentle => "Lower threshold with a long tail for soft talkers",
            GatePreset::Standard => "Strict threshold, 100 ms release",
            GatePreset::Tight => "Mute almost immediately after speech stops",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Settings for this preset, `None` for `Manual`.
    pub fn settings(&self) -> Option<GateSettings> {
        match self {
            GatePreset::Manual => None,
            preset => Some(
                FACTORY_PRESETS
                    .get(preset.name())
                    .copied()
                    .unwrap_or_else(|| preset.builtin()),
            ),
        }
    }

    /// Compiled-in values, used when the embedded table lacks an entry.
    fn builtin(&self) -> GateSettings {
        match self {
            GatePreset::Off => GateSettings::new(0.0, 0.0),
            GatePreset::Gentle => GateSettings::new(0.80, 250.0),
            GatePreset::Manual | GatePreset::Standard => GateSettings::default(),
            GatePreset::Tight => GateSettings::new(0.98, 30.0),
        }
    }
}

impl Default for GatePreset {
    fn default() -> Self {
        GatePreset::Manual
    }
}

// =============================================================================
// GATE SETTINGS
// =============================================================================

/// Serializable gate configuration. Release is stored in milliseconds so the
/// same settings work at any sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateSettings {
    pub confidence_threshold: f32,
    pub release_ms: f32,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.95,
            release_ms: 100.0,
        }
    }
}

impl GateSettings {
    pub fn new(confidence_threshold: f32, release_ms: f32) -> Self {
        Self {
            confidence_threshold: confidence_threshold.clamp(0.0, 1.0),
            release_ms: release_ms.clamp(0.0, MAX_RELEASE_MS),
        }
    }

    /// Parse user settings. Out-of-range values are clamped, not rejected.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let raw: GateSettings = serde_json::from_str(json)?;
        Ok(Self::new(raw.confidence_threshold, raw.release_ms))
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn release_frames(&self, sample_rate: f32) -> u32 {
        release_frames_for_ms(self.release_ms, sample_rate)
    }

    /// Push these settings into live controls.
    pub fn apply(&self, controls: &GateControls, sample_rate: f32) {
        controls.set_confidence_threshold(self.confidence_threshold);
        controls.set_release_frames(self.release_frames(sample_rate));
    }
}

// =============================================================================
// EMBEDDED TABLE
// =============================================================================

/// Factory presets from the baked-in JSON. Parsing failure is non-fatal: the
/// table is empty and presets fall back to their compiled-in values.
pub static FACTORY_PRESETS: Lazy<HashMap<String, GateSettings>> = Lazy::new(|| {
    let presets_str = include_str!("../presets.json");
    match serde_json::from_str::<HashMap<String, GateSettings>>(presets_str) {
        Ok(presets) => presets,
        Err(e) => {
            log::error!("Embedded gate presets are malformed: {}", e);
            HashMap::new()
        }
    }
});

/// Look up settings by preset name (case-insensitive), as used by the CLI.
pub fn settings_for_name(name: &str) -> Result<GateSettings, SettingsError> {
    GatePreset::from_name(name)
        .and_then(|p| p.settings())
        .ok_or_else(|| SettingsError::UnknownPreset(name.to_string()))
}
