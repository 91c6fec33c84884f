use crate::broadcast::{Broadcast, Subscription};
use crate::calibration::CalibrationStore;
use crate::geometry::{leaf_orientation, surface_normal};
use crate::integrator::{IntegratorConfig, MotionIntegrator, MotionStep};
use crate::normalizer::AngleNormalizer;
use crate::source::{PermissionState, SensorSource, SourceError};
use crate::types::{Angles, CalibrationOffsets, MotionEvent, OrientationEvent, Position, Snapshot};
use glam::DVec3;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("No motion sensors available on this host")]
    SensorUnavailable,
    #[error("Motion sensor permission denied")]
    PermissionDenied,
    #[error("Motion sensor permission has not been requested yet")]
    PermissionNotRequested,
    #[error(transparent)]
    Source(#[from] SourceError),
}

struct EngineState {
    calibration: CalibrationStore,
    normalizer: AngleNormalizer,
    integrator: MotionIntegrator,
    orientation_samples: u64,
}

/// State and output streams shared with the source callbacks.
struct EngineCore {
    state: RefCell<EngineState>,
    angles: Broadcast<Angles>,
    position: Broadcast<Position>,
}

impl EngineCore {
    // State borrows end before publishing so subscribers may call back in.

    fn on_orientation(&self, event: &OrientationEvent) {
        let Some(raw) = event.angles() else {
            tracing::trace!("Ignoring orientation event with missing axis");
            return;
        };
        let angles = {
            let mut state = self.state.borrow_mut();
            state.orientation_samples += 1;
            if state.orientation_samples % 1000 == 0 {
                tracing::debug!(
                    samples = state.orientation_samples,
                    "Orientation samples processed"
                );
            }
            let EngineState {
                calibration,
                normalizer,
                ..
            } = &mut *state;
            normalizer.update(raw, calibration)
        };
        self.angles.publish(&angles);
    }

    fn on_motion(&self, event: &MotionEvent) {
        let step = self.state.borrow_mut().integrator.update(event);
        match step {
            MotionStep::Integrated(position) => self.position.publish(&position),
            MotionStep::Ignored => tracing::trace!("Ignoring motion event with missing axis"),
            MotionStep::Skipped { .. } => {}
        }
    }
}

/// The orientation engine for one measurement session.
///
/// Attaches to a [`SensorSource`], applies calibration, publishes canonical
/// [`Angles`] and the drifting relative [`Position`]. All methods take
/// `&self`, so a subscriber holding a shared handle may calibrate or stop
/// the engine from inside its callback.
pub struct OrientationEngine<S: SensorSource> {
    source: RefCell<S>,
    core: Rc<EngineCore>,
    attachment: RefCell<Vec<Subscription>>,
    attaching: Cell<bool>,
    // Last values read from the source, reported while it is mid-subscribe.
    supported: Cell<bool>,
    last_permission: Cell<PermissionState>,
}

impl<S: SensorSource> OrientationEngine<S> {
    pub fn new(source: S, config: IntegratorConfig) -> Self {
        let supported = source.is_available();
        let permission = source.permission();
        Self {
            source: RefCell::new(source),
            core: Rc::new(EngineCore {
                state: RefCell::new(EngineState {
                    calibration: CalibrationStore::default(),
                    normalizer: AngleNormalizer::new(),
                    integrator: MotionIntegrator::new(config),
                    orientation_samples: 0,
                }),
                angles: Broadcast::new(),
                position: Broadcast::new(),
            }),
            attachment: RefCell::new(Vec::new()),
            attaching: Cell::new(false),
            supported: Cell::new(supported),
            last_permission: Cell::new(permission),
        }
    }

    /// Capability query: false on hosts without motion sensors.
    pub fn is_supported(&self) -> bool {
        if let Ok(source) = self.source.try_borrow() {
            self.supported.set(source.is_available());
        }
        self.supported.get()
    }

    pub fn permission(&self) -> PermissionState {
        if let Ok(source) = self.source.try_borrow() {
            self.last_permission.set(source.permission());
        }
        self.last_permission.get()
    }

    /// Pass-through to the host permission prompt.
    ///
    /// While the source is delivering events from inside a subscribe call
    /// the prompt cannot be shown; the last known state is returned.
    pub fn request_permission(&self) -> Result<PermissionState, EngineError> {
        let Ok(mut source) = self.source.try_borrow_mut() else {
            return Ok(self.last_permission.get());
        };
        let state = source.request_permission()?;
        drop(source);
        self.last_permission.set(state);
        tracing::info!(?state, "Sensor permission resolved");
        Ok(state)
    }

    /// Attach to the sensor source. Calling it while running is a no-op.
    pub fn start(&self) -> Result<(), EngineError> {
        if self.is_running() || self.attaching.get() {
            return Ok(());
        }

        if !self.is_supported() {
            return Err(EngineError::SensorUnavailable);
        }
        match self.permission() {
            PermissionState::Granted => {}
            PermissionState::Denied => return Err(EngineError::PermissionDenied),
            PermissionState::Prompt => return Err(EngineError::PermissionNotRequested),
        }

        // Each subscribe holds the source only for its own call. A source may
        // deliver events synchronously from it.
        self.attaching.set(true);
        let attached = self.attach();
        self.attaching.set(false);

        *self.attachment.borrow_mut() = attached?;
        tracing::info!("Orientation engine started");
        Ok(())
    }

    fn attach(&self) -> Result<Vec<Subscription>, EngineError> {
        let core = Rc::clone(&self.core);
        let orientation = self
            .source
            .borrow_mut()
            .subscribe_orientation(Box::new(move |event: &OrientationEvent| {
                core.on_orientation(event)
            }))?;
        let core = Rc::clone(&self.core);
        let motion = self
            .source
            .borrow_mut()
            .subscribe_motion(Box::new(move |event: &MotionEvent| core.on_motion(event)))?;
        Ok(vec![orientation, motion])
    }

    /// Detach from the sensor source, leaving all state as it is.
    /// Calling it while stopped is a no-op.
    pub fn stop(&self) {
        let attachment = std::mem::take(&mut *self.attachment.borrow_mut());
        if attachment.is_empty() {
            return;
        }
        for subscription in attachment {
            subscription.unsubscribe();
        }
        tracing::info!("Orientation engine stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.attachment.borrow().is_empty()
    }

    /// Zero the current raw attitude and restart motion integration.
    pub fn calibrate(&self) -> CalibrationOffsets {
        let (offsets, angles) = {
            let mut state = self.core.state.borrow_mut();
            let EngineState {
                calibration,
                normalizer,
                integrator,
                ..
            } = &mut *state;
            let offsets = calibration.capture(normalizer.raw());
            let angles = normalizer.recompute(calibration);
            integrator.reset();
            (offsets, angles)
        };
        tracing::info!(
            pitch = offsets.pitch,
            roll = offsets.roll,
            yaw = offsets.yaw,
            "Calibrated"
        );
        self.core.angles.publish(&angles);
        self.core.position.publish(&Position::ORIGIN);
        offsets
    }

    /// Restore previously saved offsets. Motion state is untouched.
    pub fn set_offsets(&self, offsets: CalibrationOffsets) {
        let angles = {
            let mut state = self.core.state.borrow_mut();
            let EngineState {
                calibration,
                normalizer,
                ..
            } = &mut *state;
            calibration.set(offsets);
            normalizer.recompute(calibration)
        };
        tracing::info!(?offsets, "Calibration offsets restored");
        self.core.angles.publish(&angles);
    }

    pub fn offsets(&self) -> CalibrationOffsets {
        self.core.state.borrow().calibration.offsets()
    }

    pub fn angles(&self) -> Angles {
        self.core.state.borrow().normalizer.current()
    }

    pub fn raw_angles(&self) -> Angles {
        self.core.state.borrow().normalizer.raw()
    }

    pub fn position(&self) -> Position {
        self.core.state.borrow().integrator.position()
    }

    pub fn velocity(&self) -> DVec3 {
        self.core.state.borrow().integrator.velocity()
    }

    pub fn subscribe_angles(&self, callback: impl FnMut(&Angles) + 'static) -> Subscription {
        self.core.angles.subscribe(callback)
    }

    pub fn subscribe_position(&self, callback: impl FnMut(&Position) + 'static) -> Subscription {
        self.core.position.subscribe(callback)
    }

    /// The sensor-derived fields of a recording, taken at this instant.
    pub fn snapshot(&self) -> Snapshot {
        let (angles, position) = {
            let state = self.core.state.borrow();
            (state.normalizer.current(), state.integrator.position())
        };
        let normal = surface_normal(&angles);
        Snapshot {
            angles,
            position,
            normal,
            orientation: leaf_orientation(&normal),
        }
    }
}

impl<S: SensorSource> Drop for OrientationEngine<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MotionHandler, OrientationHandler, SimulatedSource};

    fn running_engine() -> (Rc<OrientationEngine<SimulatedSource>>, SimulatedSource) {
        let feeder = SimulatedSource::granted();
        let engine = Rc::new(OrientationEngine::new(feeder.clone(), IntegratorConfig::default()));
        engine.start().unwrap();
        (engine, feeder)
    }

    fn collect_angles(engine: &OrientationEngine<SimulatedSource>) -> (Rc<RefCell<Vec<Angles>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in_cb = Rc::clone(&seen);
        let sub = engine.subscribe_angles(move |a| seen_in_cb.borrow_mut().push(*a));
        (seen, sub)
    }

    fn collect_positions(engine: &OrientationEngine<SimulatedSource>) -> (Rc<RefCell<Vec<Position>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in_cb = Rc::clone(&seen);
        let sub = engine.subscribe_position(move |p| seen_in_cb.borrow_mut().push(*p));
        (seen, sub)
    }

    #[test]
    fn raw_event_is_published_without_calibration() {
        let (engine, feeder) = running_engine();
        let (seen, _sub) = collect_angles(&engine);

        feeder.emit_orientation(OrientationEvent::new(0.0, 90.0, 45.0, 30.0));
        assert_eq!(*seen.borrow(), vec![Angles::new(45.0, 30.0, 90.0)]);
    }

    #[test]
    fn offsets_are_subtracted() {
        let (engine, feeder) = running_engine();
        engine.set_offsets(CalibrationOffsets::new(10.0, 5.0, 15.0));
        feeder.emit_orientation(OrientationEvent::new(0.0, 90.0, 45.0, 30.0));
        assert_eq!(engine.angles(), Angles::new(35.0, 25.0, 75.0));
    }

    #[test]
    fn set_offsets_republishes() {
        let (engine, feeder) = running_engine();
        feeder.emit_orientation(OrientationEvent::new(0.0, 90.0, 45.0, 30.0));
        let (seen, _sub) = collect_angles(&engine);
        engine.set_offsets(CalibrationOffsets::new(10.0, 5.0, 15.0));
        assert_eq!(*seen.borrow(), vec![Angles::new(35.0, 25.0, 75.0)]);
    }

    #[test]
    fn calibrate_zeroes_angles_and_position() {
        let (engine, feeder) = running_engine();
        feeder.emit_orientation(OrientationEvent::new(0.0, 120.0, 20.0, -40.0));
        feeder.emit_motion(MotionEvent::new(0.0, 0.0, 0.0, 0.0));
        feeder.emit_motion(MotionEvent::new(100.0, 2.0, 1.0, 0.5));
        assert_ne!(engine.position(), Position::ORIGIN);

        let (angles, _a) = collect_angles(&engine);
        let (positions, _p) = collect_positions(&engine);
        let offsets = engine.calibrate();

        assert_eq!(offsets, CalibrationOffsets::new(20.0, -40.0, 120.0));
        assert_eq!(engine.angles(), Angles::ZERO);
        assert_eq!(engine.position(), Position::ORIGIN);
        assert_eq!(engine.velocity(), DVec3::ZERO);
        assert_eq!(*angles.borrow(), vec![Angles::ZERO]);
        assert_eq!(*positions.borrow(), vec![Position::ORIGIN]);

        feeder.emit_orientation(OrientationEvent::new(10.0, 120.0, 20.0, -40.0));
        assert_eq!(angles.borrow().last(), Some(&Angles::ZERO));
    }

    #[test]
    fn missing_axis_event_changes_nothing() {
        let (engine, feeder) = running_engine();
        feeder.emit_orientation(OrientationEvent::new(0.0, 10.0, 20.0, 30.0));
        let (seen, _sub) = collect_angles(&engine);

        feeder.emit_orientation(OrientationEvent {
            alpha: Some(1.0),
            beta: None,
            gamma: Some(2.0),
            timestamp_ms: 5.0,
        });
        assert!(seen.borrow().is_empty());
        assert_eq!(engine.raw_angles(), Angles::new(20.0, 30.0, 10.0));
    }

    #[test]
    fn position_published_only_for_integrated_samples() {
        let (engine, feeder) = running_engine();
        let (positions, _sub) = collect_positions(&engine);

        feeder.emit_motion(MotionEvent::new(0.0, 1.0, 0.0, 0.0)); // first
        feeder.emit_motion(MotionEvent::new(3000.0, 1.0, 0.0, 0.0)); // gap
        feeder.emit_motion(MotionEvent::new(3050.0, 2.0, 0.0, 0.0));
        assert_eq!(positions.borrow().len(), 1);
        assert!(positions.borrow()[0].x > 0.0);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (engine, feeder) = running_engine();
        engine.start().unwrap();
        assert_eq!(feeder.orientation_listeners(), 1);
        assert_eq!(feeder.motion_listeners(), 1);

        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
        assert_eq!(feeder.orientation_listeners(), 0);
        assert_eq!(feeder.motion_listeners(), 0);

        engine.start().unwrap();
        assert_eq!(feeder.orientation_listeners(), 1);
    }

    #[test]
    fn stop_freezes_state() {
        let (engine, feeder) = running_engine();
        feeder.emit_orientation(OrientationEvent::new(0.0, 5.0, 6.0, 7.0));
        feeder.emit_motion(MotionEvent::new(0.0, 0.0, 0.0, 0.0));
        feeder.emit_motion(MotionEvent::new(100.0, 1.0, 1.0, 1.0));
        let angles = engine.angles();
        let position = engine.position();

        engine.stop();
        feeder.emit_orientation(OrientationEvent::new(200.0, 50.0, 60.0, 70.0));
        feeder.emit_motion(MotionEvent::new(200.0, 9.0, 9.0, 9.0));

        assert_eq!(engine.angles(), angles);
        assert_eq!(engine.position(), position);
    }

    #[test]
    fn start_before_permission_fails_without_attaching() {
        let feeder = SimulatedSource::prompt();
        let engine = OrientationEngine::new(feeder.clone(), IntegratorConfig::default());
        assert_eq!(engine.start(), Err(EngineError::PermissionNotRequested));
        assert_eq!(feeder.orientation_listeners(), 0);

        assert_eq!(engine.request_permission(), Ok(PermissionState::Granted));
        engine.start().unwrap();
        assert!(engine.is_running());
    }

    #[test]
    fn denied_permission_is_reported() {
        let engine = OrientationEngine::new(SimulatedSource::prompt_then_deny(), IntegratorConfig::default());
        assert_eq!(engine.request_permission(), Ok(PermissionState::Denied));
        assert_eq!(engine.start(), Err(EngineError::PermissionDenied));
        assert!(!engine.is_running());
    }

    #[test]
    fn unsupported_host_reports_capability() {
        let engine = OrientationEngine::new(SimulatedSource::unavailable(), IntegratorConfig::default());
        assert!(!engine.is_supported());
        assert_eq!(engine.start(), Err(EngineError::SensorUnavailable));
        assert_eq!(
            engine.request_permission(),
            Err(EngineError::Source(SourceError::Unavailable))
        );
    }

    #[test]
    fn subscriber_may_calibrate_from_callback() {
        let (engine, feeder) = running_engine();
        let engine_in_cb = Rc::clone(&engine);
        let calibrated = Rc::new(Cell::new(false));
        let calibrated_in_cb = Rc::clone(&calibrated);
        let _sub = engine.subscribe_angles(move |_| {
            if !calibrated_in_cb.get() {
                calibrated_in_cb.set(true);
                engine_in_cb.calibrate();
            }
        });
        let (later, _later_sub) = collect_angles(&engine);

        feeder.emit_orientation(OrientationEvent::new(0.0, 30.0, 20.0, 10.0));
        assert!(calibrated.get());
        assert_eq!(engine.angles(), Angles::ZERO);
        // The sample reaches everyone first, then the calibrated angles.
        let sample = Angles::new(20.0, 10.0, 30.0);
        assert_eq!(*later.borrow(), vec![sample, Angles::ZERO]);
    }

    #[test]
    fn calibrating_subscriber_receives_calibrated_angles() {
        let (engine, feeder) = running_engine();
        let engine_in_cb = Rc::clone(&engine);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in_cb = Rc::clone(&seen);
        let _sub = engine.subscribe_angles(move |a| {
            seen_in_cb.borrow_mut().push(*a);
            if seen_in_cb.borrow().len() == 1 {
                engine_in_cb.calibrate();
            }
        });
        let (later, _later_sub) = collect_angles(&engine);

        feeder.emit_orientation(OrientationEvent::new(0.0, 30.0, 20.0, 10.0));
        let sample = Angles::new(20.0, 10.0, 30.0);
        assert_eq!(*seen.borrow(), vec![sample, Angles::ZERO]);
        assert_eq!(*later.borrow(), vec![sample, Angles::ZERO]);
        assert_eq!(seen.borrow().last().copied(), Some(engine.angles()));
        assert_eq!(later.borrow().last().copied(), Some(engine.angles()));
    }

    /// Delivers one orientation event from inside `subscribe_orientation`.
    struct EagerSource {
        inner: SimulatedSource,
        first: OrientationEvent,
    }

    impl SensorSource for EagerSource {
        fn is_available(&self) -> bool {
            self.inner.is_available()
        }

        fn permission(&self) -> PermissionState {
            self.inner.permission()
        }

        fn request_permission(&mut self) -> Result<PermissionState, SourceError> {
            self.inner.request_permission()
        }

        fn subscribe_orientation(
            &mut self,
            mut handler: OrientationHandler,
        ) -> Result<Subscription, SourceError> {
            handler(&self.first);
            self.inner.subscribe_orientation(handler)
        }

        fn subscribe_motion(&mut self, handler: MotionHandler) -> Result<Subscription, SourceError> {
            self.inner.subscribe_motion(handler)
        }
    }

    #[test]
    fn subscriber_may_query_engine_during_synchronous_delivery() {
        let source = EagerSource {
            inner: SimulatedSource::granted(),
            first: OrientationEvent::new(0.0, 0.0, 30.0, 0.0),
        };
        let engine = Rc::new(OrientationEngine::new(source, IntegratorConfig::default()));
        let engine_in_cb = Rc::clone(&engine);
        let observed = Rc::new(RefCell::new(Vec::new()));
        let observed_in_cb = Rc::clone(&observed);
        let _sub = engine.subscribe_angles(move |a| {
            observed_in_cb.borrow_mut().push((
                *a,
                engine_in_cb.is_supported(),
                engine_in_cb.permission(),
                engine_in_cb.request_permission(),
            ));
            // Already attaching: a nested start is a no-op.
            assert_eq!(engine_in_cb.start(), Ok(()));
        });

        engine.start().unwrap();
        assert!(engine.is_running());
        assert_eq!(
            *observed.borrow(),
            vec![(
                Angles::new(30.0, 0.0, 0.0),
                true,
                PermissionState::Granted,
                Ok(PermissionState::Granted)
            )]
        );
    }

    #[test]
    fn subscriber_may_stop_engine_from_callback() {
        let (engine, feeder) = running_engine();
        let engine_in_cb = Rc::clone(&engine);
        let _sub = engine.subscribe_angles(move |_| engine_in_cb.stop());

        feeder.emit_orientation(OrientationEvent::new(0.0, 1.0, 2.0, 3.0));
        assert!(!engine.is_running());
        assert_eq!(feeder.orientation_listeners(), 0);
    }

    #[test]
    fn snapshot_derives_geometry_from_current_angles() {
        let (engine, feeder) = running_engine();
        feeder.emit_orientation(OrientationEvent::new(0.0, 0.0, 30.0, 0.0));
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.angles, Angles::new(30.0, 0.0, 0.0));
        assert_eq!(snapshot.orientation.zenith, 30.0);
        assert_eq!(snapshot.orientation.azimuth, 90.0);
        assert_eq!(snapshot.position, Position::ORIGIN);
    }

    #[test]
    fn dropping_engine_detaches() {
        let (engine, feeder) = running_engine();
        drop(engine);
        assert_eq!(feeder.orientation_listeners(), 0);
        assert_eq!(feeder.motion_listeners(), 0);
    }
}
