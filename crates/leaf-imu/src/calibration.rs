use crate::types::{Angles, CalibrationOffsets};

/// Holds the additive per-axis offsets for the current session.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalibrationStore {
    offsets: CalibrationOffsets,
}

impl CalibrationStore {
    pub fn new(offsets: CalibrationOffsets) -> Self {
        Self { offsets }
    }

    pub fn offsets(&self) -> CalibrationOffsets {
        self.offsets
    }

    /// Use `raw` as the new zero reference.
    pub fn capture(&mut self, raw: Angles) -> CalibrationOffsets {
        self.offsets = raw.into();
        self.offsets
    }

    pub fn set(&mut self, offsets: CalibrationOffsets) {
        self.offsets = offsets;
    }

    /// `raw - offset` per axis, before wrapping.
    pub fn apply(&self, raw: Angles) -> Angles {
        Angles {
            pitch: raw.pitch - self.offsets.pitch,
            roll: raw.roll - self.offsets.roll,
            yaw: raw.yaw - self.offsets.yaw,
        }
    }
}
