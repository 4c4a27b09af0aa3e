//! Domain types for device provisioning

use serde::{Deserialize, Serialize};

/// A WiFi network visible to the device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WifiNetwork {
    /// Network SSID
    pub ssid: String,
    /// Signal strength in dBm
    pub rssi: i32,
}

/// Provisioning flow states
///
/// Exactly one state is active at a time; the presentation layer renders
/// strictly as a function of this value. `Error` is recoverable (the operator
/// may retry), `SaveSuccess` is terminal for the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProvisioningState {
    /// No operation in flight, no binding held yet
    Idle,
    /// A bind, scan or save operation is in flight
    Loading,
    /// Scan finished; entries keep device order and the list may be empty
    ScanResult { networks: Vec<WifiNetwork> },
    /// Credentials were handed to the device
    SaveSuccess,
    /// Recoverable failure with operator-facing guidance
    Error { message: String },
}

impl ProvisioningState {
    /// Short label for logs and state-gate errors
    pub fn phase(&self) -> &'static str {
        match self {
            ProvisioningState::Idle => "idle",
            ProvisioningState::Loading => "loading",
            ProvisioningState::ScanResult { .. } => "scan_result",
            ProvisioningState::SaveSuccess => "save_success",
            ProvisioningState::Error { .. } => "error",
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ProvisioningState::Loading)
    }
}

/// Identifier attached to one provisioning session's log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
