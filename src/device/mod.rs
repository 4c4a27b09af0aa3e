//! Device setup-API abstraction layer

pub mod client;
pub mod http_client;
pub mod mock_client;

pub use client::DeviceClient;
pub use http_client::HttpDeviceClient;

#[cfg(test)]
pub use mock_client::MockDeviceClient;
