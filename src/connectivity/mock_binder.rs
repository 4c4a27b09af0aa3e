//! Mock network binder for testing

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::connectivity::{NetworkBinder, NetworkBinding};
use crate::core::error::{BindingError, BindingResult};

#[derive(Debug, Clone)]
enum GrantBehavior {
    Grant { interface: String, addr: IpAddr },
    Unavailable,
    Fail(String),
}

#[derive(Debug)]
struct MockState {
    behavior: GrantBehavior,
    grant_delay: Duration,
    acquires: usize,
    releases: usize,
}

/// Mock network binder for testing
///
/// Counts acquisitions and releases so tests can verify the
/// release-exactly-once invariant.
#[derive(Debug, Clone)]
pub struct MockNetworkBinder {
    inner: Arc<Mutex<MockState>>,
}

impl MockNetworkBinder {
    fn with_behavior(behavior: GrantBehavior) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                behavior,
                grant_delay: Duration::ZERO,
                acquires: 0,
                releases: 0,
            })),
        }
    }

    /// Binder that grants a binding on the given interface and address
    pub fn granting(interface: &str, addr: IpAddr) -> Self {
        Self::with_behavior(GrantBehavior::Grant {
            interface: interface.to_string(),
            addr,
        })
    }

    /// Binder whose network never becomes available
    pub fn unavailable() -> Self {
        Self::with_behavior(GrantBehavior::Unavailable)
    }

    /// Binder that fails outright during acquisition
    pub fn failing(message: &str) -> Self {
        Self::with_behavior(GrantBehavior::Fail(message.to_string()))
    }

    /// Delay applied before each acquisition resolves
    pub async fn set_grant_delay(&self, delay: Duration) {
        self.inner.lock().await.grant_delay = delay;
    }

    pub async fn acquires(&self) -> usize {
        self.inner.lock().await.acquires
    }

    pub async fn releases(&self) -> usize {
        self.inner.lock().await.releases
    }
}

impl NetworkBinder for MockNetworkBinder {
    async fn acquire(&self, timeout: Duration) -> BindingResult<NetworkBinding> {
        let (behavior, delay) = {
            let mut state = self.inner.lock().await;
            state.acquires += 1;
            (state.behavior.clone(), state.grant_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match behavior {
            GrantBehavior::Grant { interface, addr } => Ok(NetworkBinding::new(interface, addr)),
            GrantBehavior::Unavailable => Err(BindingError::Unavailable(timeout)),
            GrantBehavior::Fail(message) => Err(BindingError::BindFailed(message)),
        }
    }

    async fn release(&self, _binding: NetworkBinding) -> BindingResult<()> {
        self.inner.lock().await.releases += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn addr() -> IpAddr {
        "192.168.4.2".parse().unwrap()
    }

    #[tokio::test]
    async fn granting_binder_hands_out_the_configured_binding() {
        let binder = MockNetworkBinder::granting("wlan0", addr());

        let binding = binder.acquire(Duration::from_millis(10)).await.unwrap();
        assert_eq!(binding.interface(), "wlan0");
        assert_eq!(binding.local_addr(), addr());
        assert_eq!(binder.acquires().await, 1);

        binder.release(binding).await.unwrap();
        assert_eq!(binder.releases().await, 1);
    }

    #[tokio::test]
    async fn unavailable_binder_reports_the_timeout() {
        let binder = MockNetworkBinder::unavailable();
        let result = binder.acquire(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(BindingError::Unavailable(_))));
    }

    #[tokio::test]
    async fn failing_binder_reports_the_failure() {
        let binder = MockNetworkBinder::failing("no such interface");
        let result = binder.acquire(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(BindingError::BindFailed(_))));
    }
}
