//! Mock device client for testing

use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::error::{DeviceError, DeviceResult};
use crate::core::types::WifiNetwork;
use crate::device::DeviceClient;

/// Internal state for the mock client
#[derive(Debug, Clone, Default)]
struct MockState {
    scan_results: Vec<WifiNetwork>,
    should_fail_scan: bool,
    should_fail_save: bool,
    scan_requests: usize,
    save_requests: usize,
    saved_credentials: Vec<(String, String)>,
    bound_addr: Option<IpAddr>,
}

/// Mock device client for testing
///
/// Allows configuring behavior for tests without a reachable device.
#[derive(Debug, Clone, Default)]
pub struct MockDeviceClient {
    inner: Arc<Mutex<MockState>>,
}

impl MockDeviceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the networks returned on scan
    pub async fn set_scan_results(&self, networks: Vec<WifiNetwork>) {
        self.inner.lock().await.scan_results = networks;
    }

    /// Configure scan requests to fail
    pub async fn set_scan_failure(&self, should_fail: bool) {
        self.inner.lock().await.should_fail_scan = should_fail;
    }

    /// Configure save requests to fail
    pub async fn set_save_failure(&self, should_fail: bool) {
        self.inner.lock().await.should_fail_save = should_fail;
    }

    /// Number of scan requests issued so far
    pub async fn scan_requests(&self) -> usize {
        self.inner.lock().await.scan_requests
    }

    /// Number of save requests issued so far
    pub async fn save_requests(&self) -> usize {
        self.inner.lock().await.save_requests
    }

    /// Credentials the device received, in order
    pub async fn saved_credentials(&self) -> Vec<(String, String)> {
        self.inner.lock().await.saved_credentials.clone()
    }

    /// The currently pinned local address, if any
    pub async fn bound_addr(&self) -> Option<IpAddr> {
        self.inner.lock().await.bound_addr
    }
}

impl DeviceClient for MockDeviceClient {
    async fn fetch_networks(&self) -> DeviceResult<Vec<WifiNetwork>> {
        let mut state = self.inner.lock().await;
        state.scan_requests += 1;
        if state.should_fail_scan {
            Err(DeviceError::RequestFailed("mock scan failure".into()))
        } else {
            Ok(state.scan_results.clone())
        }
    }

    async fn save_credentials(&self, ssid: &str, pass: &str) -> DeviceResult<String> {
        let mut state = self.inner.lock().await;
        state.save_requests += 1;
        state
            .saved_credentials
            .push((ssid.to_string(), pass.to_string()));
        if state.should_fail_save {
            Err(DeviceError::RequestFailed("mock connection reset".into()))
        } else {
            Ok(r#"{"status":"saved"}"#.to_string())
        }
    }

    async fn bind_local(&self, addr: Option<IpAddr>) -> DeviceResult<()> {
        self.inner.lock().await.bound_addr = addr;
        Ok(())
    }
}
