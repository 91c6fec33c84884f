use leaf_imu::{CalibrationOffsets, IntegratorConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Motion integrator tuning.
    pub motion: MotionConfig,
    /// Offsets from the last calibration, restored at session start.
    pub calibration: Option<SavedCalibration>,
    /// Recording export defaults.
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// High-pass filter coefficient on the change in acceleration.
    pub filter_coefficient: f64,
    /// Velocity decay applied every sample. 1.0 disables damping.
    pub velocity_damping: f64,
    /// Samples arriving further apart than this (seconds) are not integrated.
    pub max_dt_s: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            filter_coefficient: 0.8,
            velocity_damping: 0.98,
            max_dt_s: 1.0,
        }
    }
}

impl From<&MotionConfig> for IntegratorConfig {
    fn from(motion: &MotionConfig) -> Self {
        Self {
            filter_coefficient: motion.filter_coefficient,
            velocity_damping: motion.velocity_damping,
            max_dt_s: motion.max_dt_s,
        }
    }
}

/// Calibration offsets in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedCalibration {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

impl From<SavedCalibration> for CalibrationOffsets {
    fn from(saved: SavedCalibration) -> Self {
        CalibrationOffsets::new(saved.pitch, saved.roll, saved.yaw)
    }
}

impl From<CalibrationOffsets> for SavedCalibration {
    fn from(offsets: CalibrationOffsets) -> Self {
        Self {
            pitch: offsets.pitch,
            roll: offsets.roll,
            yaw: offsets.yaw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Where exports go when no explicit path is given.
    /// `None` means the current directory.
    pub directory: Option<PathBuf>,
    /// Tag used for recordings taken without one.
    pub default_tag: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: None,
            default_tag: "leaf".to_string(),
        }
    }
}

impl ExportConfig {
    /// Resolve `file_name` against the configured export directory.
    pub fn resolve(&self, file_name: &str) -> PathBuf {
        match &self.directory {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}
