//! Plant-Vita Device Provisioner
//!
//! A tool for onboarding Plant-Vita sensor devices onto a home WiFi network.
//! An unconfigured device serves a small setup API over its own access point;
//! this crate binds to that isolated network, asks the device which networks
//! it can see, and hands it the operator's chosen credentials.

pub mod config;
pub mod connectivity;
pub mod core;
pub mod device;

pub use core::{
    error::{BindingError, ControllerError, DeviceError},
    types::{ProvisioningState, SessionId, WifiNetwork},
};
