//! Runtime settings

use std::time::Duration;

use crate::config::CliArgs;

/// Runtime configuration settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub device_url: String,
    pub interface: String,
    pub setup_ssid: String,
    pub bind_timeout: Duration,
    pub http_timeout: Duration,
}

impl From<CliArgs> for Settings {
    fn from(args: CliArgs) -> Self {
        Settings {
            device_url: args.device_url,
            interface: args.interface,
            setup_ssid: args.setup_ssid,
            bind_timeout: Duration::from_millis(args.bind_timeout_ms),
            http_timeout: Duration::from_millis(args.http_timeout_ms),
        }
    }
}
