//! Tracer lifecycle states and events.
//!
//! ```text
//! IDLE ── operation_start ──> OPERATION_STARTED ── attempt_start ──> ATTEMPT_STARTED
//!                                                                      │        ^
//!                                                     attempt_complete │        │ attempt_start
//!                                                                      v        │
//!                                                                   ATTEMPT_COMPLETED
//!
//! ATTEMPT_STARTED | ATTEMPT_COMPLETED ── operation_complete ──> OPERATION_COMPLETED
//! ```

use strum::{AsRefStr, Display};

/// Where a tracer is in its operation's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum TracerState {
    /// Built but `on_operation_start` not yet called.
    Idle,
    /// Operation running, no attempt opened yet.
    OperationStarted,
    /// An attempt is in flight.
    AttemptStarted,
    /// The last attempt finished; awaiting a retry or operation completion.
    AttemptCompleted,
    /// Terminal. Every further call is rejected.
    OperationCompleted,
}

/// Lifecycle call received by a tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, AsRefStr)]
pub enum LifecycleEvent {
    #[strum(serialize = "on_operation_start")]
    OperationStart,
    #[strum(serialize = "on_attempt_start")]
    AttemptStart,
    #[strum(serialize = "on_status_received")]
    StatusReceived,
    #[strum(serialize = "on_metadata_received")]
    MetadataReceived,
    #[strum(serialize = "on_response")]
    Response,
    #[strum(serialize = "on_read")]
    Read,
    #[strum(serialize = "on_attempt_complete")]
    AttemptComplete,
    #[strum(serialize = "on_operation_complete")]
    OperationComplete,
}

impl LifecycleEvent {
    /// States in which this event is accepted.
    pub fn allowed_from(&self) -> &'static [TracerState] {
        use TracerState::*;
        match self {
            Self::OperationStart => &[Idle],
            Self::AttemptStart => &[OperationStarted, AttemptCompleted],
            Self::StatusReceived | Self::MetadataReceived | Self::Response => &[AttemptStarted],
            Self::Read => &[OperationStarted, AttemptStarted, AttemptCompleted],
            Self::AttemptComplete => &[AttemptStarted],
            Self::OperationComplete => &[AttemptStarted, AttemptCompleted],
        }
    }

    pub fn is_allowed_in(&self, state: TracerState) -> bool {
        self.allowed_from().contains(&state)
    }
}
