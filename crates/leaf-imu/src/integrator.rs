use crate::types::{MotionEvent, Position};
use glam::DVec3;

/// Tuning constants for the motion integrator.
///
/// The defaults reproduce the reference drift behaviour exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegratorConfig {
    /// High-pass coefficient applied to the change in acceleration.
    pub filter_coefficient: f64,
    /// Per-sample velocity decay factor.
    pub velocity_damping: f64,
    /// Largest accepted inter-sample gap in seconds (exclusive).
    pub max_dt_s: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            filter_coefficient: 0.8,
            velocity_damping: 0.98,
            max_dt_s: 1.0,
        }
    }
}

/// Outcome of feeding one acceleration sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionStep {
    /// An axis was absent; nothing changed.
    Ignored,
    /// First sample or out-of-range `dt`; only the timestamp and filter
    /// reference moved.
    Skipped { dt_s: Option<f64> },
    /// Velocity and position were advanced.
    Integrated(Position),
}

/// High-pass filters linear acceleration and double-integrates it into a
/// relative, damped position estimate.
#[derive(Debug, Clone)]
pub struct MotionIntegrator {
    config: IntegratorConfig,
    last_timestamp_ms: Option<f64>,
    last_acceleration: DVec3,
    velocity: DVec3,
    position: DVec3,
    sample_count: u64,
}

impl MotionIntegrator {
    pub fn new(config: IntegratorConfig) -> Self {
        Self {
            config,
            last_timestamp_ms: None,
            last_acceleration: DVec3::ZERO,
            velocity: DVec3::ZERO,
            position: DVec3::ZERO,
            sample_count: 0,
        }
    }

    pub fn config(&self) -> IntegratorConfig {
        self.config
    }

    /// Process one acceleration sample.
    pub fn update(&mut self, event: &MotionEvent) -> MotionStep {
        let Some(accel) = event.acceleration() else {
            return MotionStep::Ignored;
        };
        self.sample_count += 1;

        let dt_s = self
            .last_timestamp_ms
            .map(|last| (event.timestamp_ms - last) / 1000.0);
        self.last_timestamp_ms = Some(event.timestamp_ms);

        let step = match dt_s {
            Some(dt) if dt > 0.0 && dt < self.config.max_dt_s => {
                let filtered = (accel - self.last_acceleration) * self.config.filter_coefficient;
                self.velocity += filtered * dt;
                self.velocity *= self.config.velocity_damping;
                self.position += self.velocity * dt;
                MotionStep::Integrated(self.position.into())
            }
            _ => {
                tracing::debug!(?dt_s, "Skipping integration for acceleration sample");
                MotionStep::Skipped { dt_s }
            }
        };

        self.last_acceleration = accel;
        step
    }

    /// Zero velocity, position and the filter reference. The last timestamp
    /// is kept so the next sample still measures `dt` from real arrival time.
    pub fn reset(&mut self) {
        self.velocity = DVec3::ZERO;
        self.position = DVec3::ZERO;
        self.last_acceleration = DVec3::ZERO;
    }

    pub fn position(&self) -> Position {
        self.position.into()
    }

    pub fn velocity(&self) -> DVec3 {
        self.velocity
    }

    pub fn last_timestamp_ms(&self) -> Option<f64> {
        self.last_timestamp_ms
    }

    /// Accepted samples (missing-axis events are not counted).
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }
}

impl Default for MotionIntegrator {
    fn default() -> Self {
        Self::new(IntegratorConfig::default())
    }
}
