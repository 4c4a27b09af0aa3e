//! Device client trait definition

use std::net::IpAddr;

use trait_variant::make;

use crate::core::error::DeviceResult;
use crate::core::types::WifiNetwork;

/// Abstraction over the device's captive-portal setup API
///
/// The device serves this API over its own access point and is reachable
/// only while the host is joined to that network. The trait enables testing
/// with mock implementations.
#[make(Send)]
pub trait DeviceClient: Sync + 'static {
    /// Fetch the networks the device can currently see
    ///
    /// Entries are returned in device order, unfiltered. Hidden networks
    /// show up with an empty SSID.
    async fn fetch_networks(&self) -> DeviceResult<Vec<WifiNetwork>>;

    /// Hand WiFi credentials to the device
    ///
    /// The password may be empty (open networks). The device restarts once
    /// it accepts valid credentials, so the response body is returned
    /// verbatim and its status is not interpreted by callers.
    async fn save_credentials(&self, ssid: &str, pass: &str) -> DeviceResult<String>;

    /// Pin this client's outbound traffic to a local source address
    ///
    /// `None` clears the pin. The selection is scoped to this client
    /// instance; the rest of the process's networking is unaffected.
    async fn bind_local(&self, addr: Option<IpAddr>) -> DeviceResult<()>;
}
