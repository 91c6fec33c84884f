//! Surface normal and leaf angle derivation.
//!
//! The attitude is composed yaw, then pitch, then roll (ZYX Euler order) and
//! the normal is the image of the device's local +Z axis. The formula is
//! kept exactly as below; changing the convention shifts every downstream
//! zenith and azimuth.

use crate::types::{Angles, LeafOrientation, SurfaceNormal};

/// Normal of the plane under the device for the given calibrated angles.
///
/// Returns `(0, 0, 0)` when the rotated axis has zero magnitude.
pub fn surface_normal(angles: &Angles) -> SurfaceNormal {
    let pitch = angles.pitch.to_radians();
    let roll = angles.roll.to_radians();
    let yaw = angles.yaw.to_radians();

    let x = pitch.sin() * yaw.cos() + pitch.cos() * roll.sin() * yaw.sin();
    let y = pitch.sin() * yaw.sin() - pitch.cos() * roll.sin() * yaw.cos();
    let z = pitch.cos() * roll.cos();

    let magnitude = (x * x + y * y + z * z).sqrt();
    if magnitude == 0.0 {
        return SurfaceNormal::new(x, y, z);
    }
    SurfaceNormal::new(x / magnitude, y / magnitude, z / magnitude)
}

/// Zenith and azimuth of `normal`, in degrees rounded to 2 decimals.
///
/// Face-agnostic: a normal pointing down yields the same zenith as one
/// pointing up.
pub fn leaf_orientation(normal: &SurfaceNormal) -> LeafOrientation {
    let zenith = normal.z.abs().min(1.0).acos().to_degrees();

    let mut azimuth = normal.x.atan2(normal.y).to_degrees();
    if azimuth < 0.0 {
        azimuth += 360.0;
    }

    let mut azimuth = round2(azimuth);
    if azimuth >= 360.0 {
        azimuth -= 360.0;
    }

    LeafOrientation {
        zenith: round2(zenith),
        azimuth,
    }
}

/// Convenience: angles straight to leaf orientation.
pub fn orientation_from_angles(angles: &Angles) -> LeafOrientation {
    leaf_orientation(&surface_normal(angles))
}

/// Round half away from zero at the second decimal, without negative zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0 + 0.0
}
