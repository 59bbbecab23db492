use thiserror::Error;

/// Liveness error types covering configuration, pipeline registration, and server startup.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LivenessError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The pipeline has no element with the requested name.
    #[error("unable to get element {0}")]
    ElementNotFound(String),

    /// The element exists but does not expose the requested pad.
    #[error("unable to get {pad} pad of {element}")]
    PadNotFound {
        /// Element that was found.
        element: String,
        /// Pad that is missing on the element.
        pad: String,
    },

    /// An observation point specifier could not be parsed.
    #[error("invalid observation point {0:?}: expected \"element\" or \"element:pad\"")]
    InvalidObservationPoint(String),

    /// The health-check listener could not be bound.
    #[error("failed to bind health check listener on {addr}: {reason}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying failure.
        reason: String,
    },

    /// The background health-check thread could not be started.
    #[error("health check server error: {0}")]
    Server(String),
}

/// Convenience type alias for liveness operations.
pub type LivenessResult<T> = Result<T, LivenessError>;
