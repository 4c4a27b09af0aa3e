//! Wireless-interface binder

use std::net::IpAddr;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::{
    connectivity::{NetworkBinder, NetworkBinding},
    core::error::{BindingError, BindingResult},
};

const ADDR_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Binder that waits for the wireless interface to join the setup network
///
/// Association is detected through the interface holding an IPv4 address:
/// the device's access point hands one out once the host joins. The address
/// becomes the binding's local source address, which scopes device traffic
/// to that interface without touching the rest of the host's routing.
pub struct InterfaceBinder {
    interface: String,
    setup_ssid: String,
}

impl InterfaceBinder {
    pub fn new(interface: String, setup_ssid: String) -> Self {
        Self {
            interface,
            setup_ssid,
        }
    }

    /// Get the interface's IPv4 address using the ip command
    async fn interface_addr(&self) -> BindingResult<Option<IpAddr>> {
        let output = Command::new("ip")
            .args(["-4", "addr", "show", &self.interface])
            .output()
            .await
            .map_err(|e| BindingError::ControlUnavailable(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_inet_addr(&stdout))
    }
}

fn parse_inet_addr(output: &str) -> Option<IpAddr> {
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("inet ") {
            let addr = rest
                .split_whitespace()
                .next()
                .and_then(|cidr| cidr.split('/').next());
            if let Some(addr) = addr {
                if let Ok(ip) = addr.parse() {
                    return Some(ip);
                }
            }
        }
    }
    None
}

impl NetworkBinder for InterfaceBinder {
    async fn acquire(&self, timeout: Duration) -> BindingResult<NetworkBinding> {
        debug!(
            interface = %self.interface,
            ssid = %self.setup_ssid,
            "waiting for setup network"
        );

        let start = std::time::Instant::now();
        loop {
            if let Some(addr) = self.interface_addr().await? {
                debug!(%addr, "setup network available");
                return Ok(NetworkBinding::new(self.interface.clone(), addr));
            }
            if start.elapsed() >= timeout {
                return Err(BindingError::Unavailable(timeout));
            }
            tokio::time::sleep(ADDR_POLL_INTERVAL).await;
        }
    }

    async fn release(&self, binding: NetworkBinding) -> BindingResult<()> {
        // The pin lives in the HTTP client; nothing to undo at the OS level.
        debug!(interface = %binding.interface(), "released setup-network binding");
        Ok(())
    }
}
