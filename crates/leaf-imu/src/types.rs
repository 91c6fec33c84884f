use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Raw device orientation event from the host sensor source.
///
/// Field names follow the host convention: `alpha` is rotation about Z (yaw),
/// `beta` about X (pitch) and `gamma` about Y (roll), all in degrees.
/// Any axis may be absent while the sensor is warming up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationEvent {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    /// Arrival time in milliseconds.
    pub timestamp_ms: f64,
}

impl OrientationEvent {
    pub fn new(timestamp_ms: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            alpha: Some(alpha),
            beta: Some(beta),
            gamma: Some(gamma),
            timestamp_ms,
        }
    }

    /// The raw angle triple, or `None` if any axis is absent or non-finite.
    pub fn angles(&self) -> Option<Angles> {
        Some(Angles {
            pitch: finite(self.beta)?,
            roll: finite(self.gamma)?,
            yaw: finite(self.alpha)?,
        })
    }
}

/// Raw linear-acceleration event (m/s^2, gravity excluded by the host).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionEvent {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    /// Arrival time in milliseconds.
    pub timestamp_ms: f64,
}

impl MotionEvent {
    pub fn new(timestamp_ms: f64, x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
            timestamp_ms,
        }
    }

    /// The acceleration vector, or `None` if any axis is absent or non-finite.
    pub fn acceleration(&self) -> Option<DVec3> {
        Some(DVec3::new(finite(self.x)?, finite(self.y)?, finite(self.z)?))
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Device rotation in degrees. Published values lie in (-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Angles {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

impl Angles {
    pub const ZERO: Self = Self {
        pitch: 0.0,
        roll: 0.0,
        yaw: 0.0,
    };

    pub fn new(pitch: f64, roll: f64, yaw: f64) -> Self {
        Self { pitch, roll, yaw }
    }
}

/// Additive per-axis bias subtracted from raw angles before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationOffsets {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

impl CalibrationOffsets {
    pub fn new(pitch: f64, roll: f64, yaw: f64) -> Self {
        Self { pitch, roll, yaw }
    }
}

impl From<Angles> for CalibrationOffsets {
    fn from(a: Angles) -> Self {
        Self::new(a.pitch, a.roll, a.yaw)
    }
}

/// Relative displacement in meters since the last calibration.
///
/// Reconstructed by double integration, so it drifts. Never fused with GPS.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
}

impl From<DVec3> for Position {
    fn from(v: DVec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

/// Normal of the plane the device rests against.
///
/// Unit length unless the attitude is degenerate, in which case it is `(0, 0, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SurfaceNormal {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl SurfaceNormal {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// True for the zero vector produced by a degenerate attitude.
    pub fn is_degenerate(&self) -> bool {
        self.magnitude() == 0.0
    }
}

/// Leaf angle descriptor in degrees, rounded to 2 decimals.
///
/// `zenith` is in [0, 90] (0 = horizontal surface), `azimuth` in [0, 360)
/// measured from the device's local +Y axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LeafOrientation {
    pub zenith: f64,
    pub azimuth: f64,
}

/// The sensor-derived part of one recorded observation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub angles: Angles,
    pub position: Position,
    pub normal: SurfaceNormal,
    pub orientation: LeafOrientation,
}
