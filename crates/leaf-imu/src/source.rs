//! Host sensor source abstraction.
//!
//! The engine never touches platform sensor APIs directly. Hosts implement
//! [`SensorSource`]; tests and scripted sessions use [`SimulatedSource`].

use crate::broadcast::{Broadcast, Subscription};
use crate::types::{MotionEvent, OrientationEvent};
use std::cell::Cell;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not yet asked; the host needs a user-interactive grant.
    Prompt,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Motion sensors are not available on this host")]
    Unavailable,
    #[error("Motion sensor permission was not granted")]
    PermissionDenied,
}

pub type OrientationHandler = Box<dyn FnMut(&OrientationEvent)>;
pub type MotionHandler = Box<dyn FnMut(&MotionEvent)>;

/// Capability set a host exposes to the orientation engine.
pub trait SensorSource {
    /// Whether the host has orientation and motion sensors at all.
    fn is_available(&self) -> bool;

    fn permission(&self) -> PermissionState;

    /// Ask the user for sensor access. Resolves `Prompt` to a final state.
    fn request_permission(&mut self) -> Result<PermissionState, SourceError>;

    fn subscribe_orientation(
        &mut self,
        handler: OrientationHandler,
    ) -> Result<Subscription, SourceError>;

    fn subscribe_motion(&mut self, handler: MotionHandler) -> Result<Subscription, SourceError>;
}

/// In-process source driven by explicit `emit_*` calls.
///
/// Clones share listeners and permission state, so one handle can be given
/// to the engine while another feeds it events.
#[derive(Clone)]
pub struct SimulatedSource {
    available: bool,
    permission: Rc<Cell<PermissionState>>,
    /// What a prompt resolves to.
    grant_on_request: bool,
    orientation: Broadcast<OrientationEvent>,
    motion: Broadcast<MotionEvent>,
}

impl SimulatedSource {
    fn with_state(available: bool, permission: PermissionState, grant_on_request: bool) -> Self {
        Self {
            available,
            permission: Rc::new(Cell::new(permission)),
            grant_on_request,
            orientation: Broadcast::new(),
            motion: Broadcast::new(),
        }
    }

    /// Sensors present and already permitted.
    pub fn granted() -> Self {
        Self::with_state(true, PermissionState::Granted, true)
    }

    /// Sensors present; permission must be requested and will be granted.
    pub fn prompt() -> Self {
        Self::with_state(true, PermissionState::Prompt, true)
    }

    /// Sensors present; the user will decline the prompt.
    pub fn prompt_then_deny() -> Self {
        Self::with_state(true, PermissionState::Prompt, false)
    }

    pub fn denied() -> Self {
        Self::with_state(true, PermissionState::Denied, false)
    }

    /// Host without motion sensors.
    pub fn unavailable() -> Self {
        Self::with_state(false, PermissionState::Denied, false)
    }

    /// Deliver an orientation event to attached listeners.
    ///
    /// Nothing is delivered unless permission has been granted.
    pub fn emit_orientation(&self, event: OrientationEvent) {
        if self.delivering() {
            self.orientation.publish(&event);
        }
    }

    pub fn emit_motion(&self, event: MotionEvent) {
        if self.delivering() {
            self.motion.publish(&event);
        }
    }

    pub fn orientation_listeners(&self) -> usize {
        self.orientation.len()
    }

    pub fn motion_listeners(&self) -> usize {
        self.motion.len()
    }

    fn delivering(&self) -> bool {
        self.available && self.permission.get() == PermissionState::Granted
    }

    fn check_access(&self) -> Result<(), SourceError> {
        if !self.available {
            return Err(SourceError::Unavailable);
        }
        match self.permission.get() {
            PermissionState::Granted => Ok(()),
            _ => Err(SourceError::PermissionDenied),
        }
    }
}

impl SensorSource for SimulatedSource {
    fn is_available(&self) -> bool {
        self.available
    }

    fn permission(&self) -> PermissionState {
        self.permission.get()
    }

    fn request_permission(&mut self) -> Result<PermissionState, SourceError> {
        if !self.available {
            return Err(SourceError::Unavailable);
        }
        if self.permission.get() == PermissionState::Prompt {
            let resolved = if self.grant_on_request {
                PermissionState::Granted
            } else {
                PermissionState::Denied
            };
            self.permission.set(resolved);
        }
        Ok(self.permission.get())
    }

    fn subscribe_orientation(
        &mut self,
        handler: OrientationHandler,
    ) -> Result<Subscription, SourceError> {
        self.check_access()?;
        Ok(self.orientation.subscribe(handler))
    }

    fn subscribe_motion(&mut self, handler: MotionHandler) -> Result<Subscription, SourceError> {
        self.check_access()?;
        Ok(self.motion.subscribe(handler))
    }
}
