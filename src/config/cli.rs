//! Command-line argument parsing

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "plantvita-provisioner", version)]
#[clap(about = "WiFi provisioning tool for Plant-Vita sensor devices")]
pub struct CliArgs {
    /// Base URL of the device's setup API
    #[clap(short, long, default_value = "http://192.168.4.1/")]
    pub device_url: String,

    /// Wireless network interface name
    #[clap(short, long, default_value = "wlan0")]
    pub interface: String,

    /// SSID of the device's setup access point
    #[clap(long, default_value = "Plant-Vita-Setup")]
    pub setup_ssid: String,

    /// Maximum wait for the setup network to become usable, in milliseconds
    #[clap(long, default_value_t = 5000)]
    pub bind_timeout_ms: u64,

    /// Timeout for device HTTP requests, in milliseconds
    #[clap(long, default_value_t = 10000)]
    pub http_timeout_ms: u64,
}
