//! Leaf orientation engine.
//!
//! Ingests raw device orientation and linear-acceleration events from a
//! host [`SensorSource`], applies calibration, and publishes canonical
//! [`Angles`] and a drift-prone relative [`Position`]. The
//! [`geometry`] functions turn calibrated angles into the normal of the
//! surface the device is pressed against and its zenith/azimuth.
//!
//! Everything runs on the thread that delivers sensor callbacks; there is
//! no internal locking and no blocking.

pub mod broadcast;
pub mod calibration;
pub mod engine;
pub mod geometry;
pub mod integrator;
pub mod normalizer;
pub mod protocol;
pub mod source;
pub mod types;

pub use broadcast::{Broadcast, Subscription};
pub use engine::{EngineError, OrientationEngine};
pub use geometry::{leaf_orientation, surface_normal};
pub use integrator::{IntegratorConfig, MotionIntegrator, MotionStep};
pub use protocol::{parse_script, ProtocolError, ProtocolParser, ReplayRecord};
pub use source::{PermissionState, SensorSource, SimulatedSource, SourceError};
pub use types::{
    Angles, CalibrationOffsets, LeafOrientation, MotionEvent, OrientationEvent, Position,
    Snapshot, SurfaceNormal,
};
