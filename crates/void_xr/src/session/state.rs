//! Session lifecycle state machine

use crate::context::Context;
use crate::error::{RuntimeCheck, XrError, XrResult};
use crate::ViewConfigurationType;

use super::{live, SessionService};

/// Runtime session state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Not yet reported by the runtime
    #[default]
    Unknown,
    /// Created, waiting for the runtime to be ready
    Idle,
    /// Ready to begin; frames may be submitted
    Ready,
    /// Frame timing synchronized with the display
    Synchronized,
    /// Content is displayed but input goes elsewhere
    Visible,
    /// Content is displayed and receives input
    Focused,
    /// Runtime asked the application to end the session
    Stopping,
    /// Instance is about to be lost
    LossPending,
    /// Session is ending for good
    Exiting,
}

impl SessionState {
    /// States that run the frame protocol
    pub fn is_running(self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::Synchronized | SessionState::Visible | SessionState::Focused
        )
    }

    /// States after which the session cannot be used again
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::LossPending | SessionState::Exiting)
    }

    /// Map an `XrSessionState` value
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => SessionState::Idle,
            2 => SessionState::Ready,
            3 => SessionState::Synchronized,
            4 => SessionState::Visible,
            5 => SessionState::Focused,
            6 => SessionState::Stopping,
            7 => SessionState::LossPending,
            8 => SessionState::Exiting,
            _ => SessionState::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SessionState::Unknown => "UNKNOWN",
            SessionState::Idle => "IDLE",
            SessionState::Ready => "READY",
            SessionState::Synchronized => "SYNCHRONIZED",
            SessionState::Visible => "VISIBLE",
            SessionState::Focused => "FOCUSED",
            SessionState::Stopping => "STOPPING",
            SessionState::LossPending => "LOSS_PENDING",
            SessionState::Exiting => "EXITING",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Apply a state change reported by the runtime
pub(super) fn transition(service: &mut SessionService<'_>, ctx: &Context, next: SessionState) -> XrResult<()> {
    let current = service.state;
    if next == current {
        return Ok(());
    }

    match (current, next) {
        (_, SessionState::Unknown) => service.adopt(next),
        (SessionState::Idle, SessionState::Ready) => {
            if !ctx.is_supported(ViewConfigurationType::PrimaryStereo)? {
                return Err(XrError::Unsupported("stereo view configuration required".into()));
            }
            live(&mut service.session)?
                .begin(ViewConfigurationType::PrimaryStereo)
                .check()?;
            log::debug!("XR session begun");
            service.adopt(next)
        }
        (SessionState::Idle, SessionState::Exiting | SessionState::LossPending) => {
            service.adopt(next)?;
            service.destroy_session()
        }
        (running, SessionState::Stopping) if running.is_running() => {
            service.adopt(next)?;
            live(&mut service.session)?.end().check()?;
            log::debug!("XR session ended");
            Ok(())
        }
        _ => service.adopt(next),
    }
}
