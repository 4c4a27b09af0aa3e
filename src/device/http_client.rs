//! reqwest-based device client

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    core::{
        error::{DeviceError, DeviceResult},
        types::WifiNetwork,
    },
    device::DeviceClient,
};

/// HTTP client for the device's setup API
///
/// Holds its own reqwest client so that a local-address pin stays scoped to
/// device traffic. `bind_local` swaps the inner client out; requests already
/// in flight finish on the old one.
pub struct HttpDeviceClient {
    base_url: Url,
    timeout: Duration,
    http: RwLock<reqwest::Client>,
}

impl HttpDeviceClient {
    pub fn new(base_url: &str, timeout: Duration) -> DeviceResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| DeviceError::InvalidUrl(e.to_string()))?;
        let http = Self::build(timeout, None)?;

        Ok(Self {
            base_url,
            timeout,
            http: RwLock::new(http),
        })
    }

    fn build(timeout: Duration, local_addr: Option<IpAddr>) -> DeviceResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .local_address(local_addr)
            .build()
            .map_err(|e| DeviceError::RequestFailed(e.to_string()))
    }

    fn endpoint(&self, path: &str) -> DeviceResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DeviceError::InvalidUrl(e.to_string()))
    }

    fn map_error(e: reqwest::Error) -> DeviceError {
        if e.is_timeout() {
            DeviceError::Timeout
        } else if e.is_decode() {
            DeviceError::MalformedResponse(e.to_string())
        } else {
            DeviceError::RequestFailed(e.to_string())
        }
    }
}

impl DeviceClient for HttpDeviceClient {
    async fn fetch_networks(&self) -> DeviceResult<Vec<WifiNetwork>> {
        let url = self.endpoint("scan")?;
        debug!(%url, "requesting device scan");

        let http = self.http.read().await.clone();
        let response = http.get(url).send().await.map_err(Self::map_error)?;
        let response = response.error_for_status().map_err(Self::map_error)?;
        let networks = response
            .json::<Vec<WifiNetwork>>()
            .await
            .map_err(Self::map_error)?;

        debug!(count = networks.len(), "device scan response received");
        Ok(networks)
    }

    async fn save_credentials(&self, ssid: &str, pass: &str) -> DeviceResult<String> {
        let url = self.endpoint("save")?;
        debug!(%url, ssid, "sending credentials to device");

        let http = self.http.read().await.clone();
        let response = http
            .post(url)
            .form(&[("ssid", ssid), ("pass", pass)])
            .send()
            .await
            .map_err(Self::map_error)?;

        // The device may already be restarting; status is not interpreted.
        response.text().await.map_err(Self::map_error)
    }

    async fn bind_local(&self, addr: Option<IpAddr>) -> DeviceResult<()> {
        let client = Self::build(self.timeout, addr)?;
        *self.http.write().await = client;
        debug!(?addr, "device client rebound");
        Ok(())
    }
}
