//! XR error types

use thiserror::Error;

/// Failure reported by a call into the device runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{call} failed: {message} ({code})")]
pub struct RuntimeError {
    /// Name of the runtime entry point that failed
    pub call: &'static str,
    /// Raw result code reported by the runtime
    pub code: i32,
    /// Human readable form of the result code
    pub message: String,
}

impl RuntimeError {
    pub fn new(call: &'static str, code: i32, message: impl Into<String>) -> Self {
        Self {
            call,
            code,
            message: message.into(),
        }
    }
}

/// Result type for calls across the runtime boundary
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// XR errors
#[derive(Debug, Clone, Error)]
pub enum XrError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Version mismatch: {0}")]
    VersionMismatch(String),

    #[error("{message} after {retries} retries")]
    RetriesExhausted { message: String, retries: u32 },

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Context has already been destroyed")]
    ContextDestroyed,

    #[error("Session has already been destroyed")]
    SessionDestroyed,

    #[error("Invalid session state transition to {0}")]
    InvalidTransition(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Event type not handled: {0}")]
    UnhandledEvent(String),
}

/// Result type for XR operations
pub type XrResult<T> = Result<T, XrError>;

/// Converts runtime failures into [`XrError`], logging them on the way.
pub(crate) trait RuntimeCheck<T> {
    fn check(self) -> XrResult<T>;
}

impl<T> RuntimeCheck<T> for RuntimeResult<T> {
    fn check(self) -> XrResult<T> {
        self.map_err(|err| {
            log::error!("{}", err);
            #[cfg(not(test))]
            debug_assert!(false, "runtime call failed: {}", err);
            XrError::Runtime(err)
        })
    }
}
