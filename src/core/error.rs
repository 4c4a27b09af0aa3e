//! Error types for the provisioning service

use thiserror::Error;

/// Result type for device setup-API operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Result type for network binding operations
pub type BindingResult<T> = Result<T, BindingError>;

/// Result type for controller operations
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Errors talking to the device's setup API
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("invalid device URL: {0}")]
    InvalidUrl(String),

    #[error("device request failed: {0}")]
    RequestFailed(String),

    #[error("device request timed out")]
    Timeout,

    #[error("malformed device response: {0}")]
    MalformedResponse(String),
}

/// Errors acquiring or releasing the setup-network binding
#[derive(Error, Debug, Clone)]
pub enum BindingError {
    #[error("setup network did not become available within {0:?}")]
    Unavailable(std::time::Duration),

    #[error("failed to bind to network: {0}")]
    BindFailed(String),

    #[error("network control unavailable: {0}")]
    ControlUnavailable(String),
}

/// Errors from the controller's state gate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("operation already in progress")]
    OperationInProgress,

    #[error("operation not permitted while {phase}")]
    NotPermitted { phase: &'static str },
}
