//! Setup-network binding layer

pub mod binder;
pub mod interface_binder;
pub mod mock_binder;

pub use binder::{NetworkBinder, NetworkBinding};
pub use interface_binder::InterfaceBinder;

#[cfg(test)]
pub use mock_binder::MockNetworkBinder;
