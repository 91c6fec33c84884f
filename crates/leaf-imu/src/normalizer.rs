//! Canonical angle representation.

use crate::calibration::CalibrationStore;
use crate::types::Angles;

/// Wrap `degrees` into (-180, 180].
///
/// Whole turns are removed with an exact remainder, so the result matches
/// repeated +/-360 steps for every finite input. Non-finite input is
/// returned unchanged; callers filter it before calibration.
pub fn wrap_degrees(degrees: f64) -> f64 {
    let mut wrapped = degrees % 360.0;
    if wrapped > 180.0 {
        wrapped -= 360.0;
    } else if wrapped <= -180.0 {
        wrapped += 360.0;
    }
    // -0.0 from a negative whole turn
    if wrapped == 0.0 {
        0.0
    } else {
        wrapped
    }
}

/// Turns the latest raw sample plus calibration into published angles.
#[derive(Debug, Clone, Copy, Default)]
pub struct AngleNormalizer {
    raw: Angles,
    current: Angles,
}

impl AngleNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent raw sample (zero before the first one arrives).
    pub fn raw(&self) -> Angles {
        self.raw
    }

    /// Last computed canonical angles.
    pub fn current(&self) -> Angles {
        self.current
    }

    /// Accept a new raw sample and recompute.
    pub fn update(&mut self, raw: Angles, calibration: &CalibrationStore) -> Angles {
        self.raw = raw;
        self.recompute(calibration)
    }

    /// Recompute from the stored raw sample, e.g. after the offsets changed.
    pub fn recompute(&mut self, calibration: &CalibrationStore) -> Angles {
        let calibrated = calibration.apply(self.raw);
        self.current = Angles {
            pitch: wrap_degrees(calibrated.pitch),
            roll: wrap_degrees(calibrated.roll),
            yaw: wrap_degrees(calibrated.yaw),
        };
        self.current
    }
}
