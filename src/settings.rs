use serde_derive::{Deserialize, Serialize};

/// Region enhancement mode applied before feature sampling.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum LevelMode {
    Auto,
    Slice,
    Chroma,
    Sky,
}

/// Per-target sensor calibration. A freshly spawned target copies these by
/// value from the active one; afterwards each target mutates its own copy
/// independently.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Settings {
    pub mode: LevelMode,
    pub exposure: f32,
    pub contrast: f32,
    pub level_center: f32,
    pub level_width: f32,
    pub hue_center: f32,
    pub sat_min: f32,
    pub val_min: f32,

    /// Pixels below the gate are zeroed before sampling; 255 disables it.
    pub intensity_gate: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: LevelMode::Auto,
            exposure: 0.0,
            contrast: 1.0,
            level_center: 128.0,
            level_width: 64.0,
            hue_center: 90.0,
            sat_min: 60.0,
            val_min: 60.0,
            intensity_gate: 255,
        }
    }
}
