//! Network binder trait definition

use std::net::IpAddr;
use std::time::Duration;

use trait_variant::make;

use crate::core::error::BindingResult;

/// Handle to an acquired setup-network binding
///
/// At most one is held per provisioning session, and each must be released
/// exactly once, whether the flow succeeds, fails or is torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkBinding {
    interface: String,
    local_addr: IpAddr,
}

impl NetworkBinding {
    pub fn new(interface: impl Into<String>, local_addr: IpAddr) -> Self {
        Self {
            interface: interface.into(),
            local_addr,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Local source address device traffic should originate from
    pub fn local_addr(&self) -> IpAddr {
        self.local_addr
    }
}

/// Abstraction over the host's connectivity layer
///
/// The device's access point has no internet route, so default routing would
/// ignore it; a binder grants access to that isolated network for the
/// duration of a provisioning session.
#[make(Send)]
pub trait NetworkBinder: Sync + 'static {
    /// Wait for the setup network to become usable, bounded by `timeout`
    ///
    /// Returns `BindingError::Unavailable` once the deadline passes without
    /// a grant.
    async fn acquire(&self, timeout: Duration) -> BindingResult<NetworkBinding>;

    /// Release a previously acquired binding
    async fn release(&self, binding: NetworkBinding) -> BindingResult<()>;
}
