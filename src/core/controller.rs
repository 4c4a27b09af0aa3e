//! Provisioning flow controller with state machine

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info, warn};

use crate::{
    connectivity::{NetworkBinder, NetworkBinding},
    core::{
        error::{BindingError, ControllerError, ControllerResult},
        types::{ProvisioningState, SessionId, WifiNetwork},
    },
    device::DeviceClient,
};

/// Operator-facing guidance when the device cannot be reached
const SCAN_GUIDANCE: &str =
    "Failed to reach the device. Make sure this machine is connected to the device's setup WiFi.";

/// Provisioning state machine
///
/// The single re-entrancy gate for the flow: entering `Loading` excludes
/// further operations until the in-flight one resolves. Every transition is
/// published on the watch channel.
#[derive(Debug)]
struct ProvisioningStateMachine {
    state: ProvisioningState,
    tx: watch::Sender<ProvisioningState>,
}

impl ProvisioningStateMachine {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(ProvisioningState::Idle);
        Self {
            state: ProvisioningState::Idle,
            tx,
        }
    }

    fn set(&mut self, state: ProvisioningState) {
        self.state = state.clone();
        self.tx.send_replace(state);
    }

    /// Start a bind; only permitted from `Idle`
    fn begin_bind(&mut self) -> ControllerResult<()> {
        match self.state {
            ProvisioningState::Idle => {
                self.set(ProvisioningState::Loading);
                Ok(())
            }
            ProvisioningState::Loading => Err(ControllerError::OperationInProgress),
            _ => Err(ControllerError::NotPermitted {
                phase: self.state.phase(),
            }),
        }
    }

    /// Start a scan; permitted from `Idle` and as a retry from `Error`
    fn begin_scan(&mut self) -> ControllerResult<()> {
        match self.state {
            ProvisioningState::Idle | ProvisioningState::Error { .. } => {
                self.set(ProvisioningState::Loading);
                Ok(())
            }
            ProvisioningState::Loading => Err(ControllerError::OperationInProgress),
            _ => Err(ControllerError::NotPermitted {
                phase: self.state.phase(),
            }),
        }
    }

    /// Start a credential send; permitted from any settled state
    fn begin_send(&mut self) -> ControllerResult<()> {
        if self.state.is_loading() {
            return Err(ControllerError::OperationInProgress);
        }
        self.set(ProvisioningState::Loading);
        Ok(())
    }

    fn finish_scan(&mut self, networks: Vec<WifiNetwork>) {
        self.set(ProvisioningState::ScanResult { networks });
    }

    fn finish_send(&mut self) {
        self.set(ProvisioningState::SaveSuccess);
    }

    fn fail(&mut self, message: impl Into<String>) {
        self.set(ProvisioningState::Error {
            message: message.into(),
        });
    }

    fn reset(&mut self) {
        self.set(ProvisioningState::Idle);
    }

    fn state(&self) -> &ProvisioningState {
        &self.state
    }

    fn subscribe(&self) -> watch::Receiver<ProvisioningState> {
        self.tx.subscribe()
    }
}

/// Sequences the bind, scan, collect, send, unbind protocol against a device
/// reachable only over its own access point.
///
/// State is surfaced through a watch channel, so the presentation layer
/// observes transitions instead of polling; operations return as soon as the
/// state gate passes and complete in background tasks.
pub struct ProvisioningController<D: DeviceClient, B: NetworkBinder> {
    session: SessionId,
    device: Arc<D>,
    binder: Arc<B>,
    bind_timeout: Duration,
    setup_ssid: String,
    sm: Arc<RwLock<ProvisioningStateMachine>>,
    binding: Arc<Mutex<Option<NetworkBinding>>>,
}

impl<D: DeviceClient, B: NetworkBinder> ProvisioningController<D, B> {
    pub fn new(
        device: Arc<D>,
        binder: Arc<B>,
        bind_timeout: Duration,
        setup_ssid: impl Into<String>,
    ) -> Self {
        Self {
            session: SessionId::new(),
            device,
            binder,
            bind_timeout,
            setup_ssid: setup_ssid.into(),
            sm: Arc::new(RwLock::new(ProvisioningStateMachine::new())),
            binding: Arc::new(Mutex::new(None)),
        }
    }

    /// Observe state transitions
    pub async fn subscribe(&self) -> watch::Receiver<ProvisioningState> {
        self.sm.read().await.subscribe()
    }

    /// Current state snapshot
    pub async fn state(&self) -> ProvisioningState {
        self.sm.read().await.state().clone()
    }

    /// Whether a setup-network binding is currently held
    pub async fn has_binding(&self) -> bool {
        self.binding.lock().await.is_some()
    }

    /// Acquire the setup-network binding, then scan through it
    ///
    /// Only valid from `Idle`; a rejected call issues no network request.
    /// On a grant the device client is scoped to the granted address and the
    /// scan starts immediately. If the network never becomes available the
    /// operator is told to join the setup access point manually.
    pub async fn bind_to_network(&self) -> ControllerResult<()> {
        self.sm.write().await.begin_bind()?;
        info!(session = %self.session, "requesting setup network");

        let device = self.device.clone();
        let binder = self.binder.clone();
        let sm = self.sm.clone();
        let binding_slot = self.binding.clone();
        let timeout = self.bind_timeout;
        let setup_ssid = self.setup_ssid.clone();

        tokio::spawn(async move {
            match binder.acquire(timeout).await {
                Ok(binding) => {
                    info!(
                        interface = %binding.interface(),
                        addr = %binding.local_addr(),
                        "setup network granted"
                    );
                    match device.bind_local(Some(binding.local_addr())).await {
                        Ok(()) => {
                            let displaced = binding_slot.lock().await.replace(binding);
                            if let Some(old) = displaced {
                                // A binding can survive into Idle via reset_state.
                                warn!("releasing displaced setup-network binding");
                                if let Err(e) = binder.release(old).await {
                                    warn!("binding release failed: {e}");
                                }
                            }
                            Self::run_scan(device, sm).await;
                        }
                        Err(e) => {
                            warn!("scoping device client to setup network failed: {e}");
                            if let Err(re) = binder.release(binding).await {
                                warn!("binding release failed: {re}");
                            }
                            sm.write().await.fail(format!("Failed to bind to network: {e}"));
                        }
                    }
                }
                Err(BindingError::Unavailable(_)) => {
                    sm.write()
                        .await
                        .fail(format!("Please connect to '{setup_ssid}' WiFi manually."));
                }
                Err(e) => {
                    sm.write().await.fail(format!("Failed to bind to network: {e}"));
                }
            }
        });

        Ok(())
    }

    /// Ask the device for the networks it can see
    ///
    /// Works from `Idle` without a prior bind (the request is identical) and
    /// from `Error` as a manual retry.
    pub async fn scan_networks(&self) -> ControllerResult<()> {
        self.sm.write().await.begin_scan()?;
        debug!(session = %self.session, "starting device scan");

        let device = self.device.clone();
        let sm = self.sm.clone();
        tokio::spawn(async move {
            Self::run_scan(device, sm).await;
        });

        Ok(())
    }

    /// One scan request against the device; shared by the bind path and the
    /// manual retry path. Expects the machine to already be in `Loading`.
    async fn run_scan(device: Arc<D>, sm: Arc<RwLock<ProvisioningStateMachine>>) {
        match device.fetch_networks().await {
            Ok(networks) => {
                let total = networks.len();
                // Hidden networks report an empty SSID; device order is kept.
                let networks: Vec<WifiNetwork> = networks
                    .into_iter()
                    .filter(|n| !n.ssid.is_empty())
                    .collect();
                debug!(total, kept = networks.len(), "device scan finished");
                sm.write().await.finish_scan(networks);
            }
            Err(e) => {
                warn!("device scan failed: {e}");
                sm.write().await.fail(SCAN_GUIDANCE);
            }
        }
    }

    /// Hand the chosen network's credentials to the device
    ///
    /// The outcome of the device call is collapsed into `SaveSuccess`: the
    /// device restarts on valid credentials and drops the setup access point,
    /// so a transport failure is indistinguishable from an accepted save.
    /// The true outcome is logged, and the binding is released either way.
    pub async fn send_credentials(&self, ssid: &str, password: &str) -> ControllerResult<()> {
        self.sm.write().await.begin_send()?;
        info!(session = %self.session, ssid, "sending credentials to device");

        let device = self.device.clone();
        let binder = self.binder.clone();
        let sm = self.sm.clone();
        let binding_slot = self.binding.clone();
        let ssid = ssid.to_string();
        let password = password.to_string();

        tokio::spawn(async move {
            match device.save_credentials(&ssid, &password).await {
                Ok(body) => debug!(%body, "device acknowledged credentials"),
                Err(e) => warn!("credential save did not complete cleanly: {e}"),
            }
            sm.write().await.finish_send();
            Self::release_binding(&device, &binder, &binding_slot).await;
        });

        Ok(())
    }

    /// Release any held binding; idempotent, never errors outward
    ///
    /// Also the teardown hook: callers exiting mid-flight invoke this so the
    /// binding never outlives the session.
    pub async fn unbind_network(&self) {
        Self::release_binding(&self.device, &self.binder, &self.binding).await;
    }

    async fn release_binding(
        device: &Arc<D>,
        binder: &Arc<B>,
        slot: &Arc<Mutex<Option<NetworkBinding>>>,
    ) {
        let taken = slot.lock().await.take();
        let Some(binding) = taken else { return };

        if let Err(e) = device.bind_local(None).await {
            warn!("clearing device client binding failed: {e}");
        }
        if let Err(e) = binder.release(binding).await {
            warn!("binding release failed: {e}");
        }
        debug!("setup-network binding released");
    }

    /// Force the flow back to `Idle` without touching the binding
    pub async fn reset_state(&self) {
        self.sm.write().await.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::IpAddr;
    use tokio_test::assert_ok;

    use crate::connectivity::MockNetworkBinder;
    use crate::device::MockDeviceClient;

    const BIND_TIMEOUT: Duration = Duration::from_millis(50);

    fn addr() -> IpAddr {
        "192.168.4.2".parse().unwrap()
    }

    fn net(ssid: &str, rssi: i32) -> WifiNetwork {
        WifiNetwork {
            ssid: ssid.to_string(),
            rssi,
        }
    }

    fn controller(
        device: Arc<MockDeviceClient>,
        binder: Arc<MockNetworkBinder>,
    ) -> ProvisioningController<MockDeviceClient, MockNetworkBinder> {
        ProvisioningController::new(device, binder, BIND_TIMEOUT, "Plant-Vita-Setup")
    }

    async fn wait_for(
        rx: &mut watch::Receiver<ProvisioningState>,
        pred: impl Fn(&ProvisioningState) -> bool,
    ) -> ProvisioningState {
        let state = tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| pred(s)))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
        (*state).clone()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn state_machine_gates_reentrancy() {
        let mut sm = ProvisioningStateMachine::new();
        assert_eq!(sm.state(), &ProvisioningState::Idle);

        sm.begin_bind().unwrap();
        assert_eq!(sm.state(), &ProvisioningState::Loading);

        // Nothing else may start while an operation is in flight.
        assert_eq!(sm.begin_bind(), Err(ControllerError::OperationInProgress));
        assert_eq!(sm.begin_scan(), Err(ControllerError::OperationInProgress));
        assert_eq!(sm.begin_send(), Err(ControllerError::OperationInProgress));

        sm.finish_scan(vec![]);
        assert_eq!(sm.state(), &ProvisioningState::ScanResult { networks: vec![] });

        // A settled scan result does not allow another bind, but does allow a send.
        assert_eq!(
            sm.begin_bind(),
            Err(ControllerError::NotPermitted {
                phase: "scan_result"
            })
        );
        sm.begin_send().unwrap();
        sm.finish_send();
        assert_eq!(sm.state(), &ProvisioningState::SaveSuccess);

        sm.reset();
        assert_eq!(sm.state(), &ProvisioningState::Idle);
    }

    #[tokio::test]
    async fn state_machine_error_is_recoverable_via_scan() {
        let mut sm = ProvisioningStateMachine::new();
        sm.begin_scan().unwrap();
        sm.fail("boom");
        assert_eq!(sm.state().phase(), "error");

        sm.begin_scan().unwrap();
        assert_eq!(sm.state(), &ProvisioningState::Loading);
    }

    #[tokio::test]
    async fn scan_filters_empty_ssids_and_preserves_order() {
        let device = Arc::new(MockDeviceClient::new());
        device
            .set_scan_results(vec![
                net("Cafe", -70),
                net("", -40),
                net("Home", -50),
                net("Home", -81),
            ])
            .await;
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        let ctl = controller(device, binder);
        let mut rx = ctl.subscribe().await;

        tokio_test::assert_ok!(ctl.scan_networks().await);
        let state = wait_for(&mut rx, |s| !s.is_loading()).await;

        assert_eq!(
            state,
            ProvisioningState::ScanResult {
                networks: vec![net("Cafe", -70), net("Home", -50), net("Home", -81)],
            }
        );
    }

    #[tokio::test]
    async fn scan_from_idle_needs_no_prior_bind() {
        let device = Arc::new(MockDeviceClient::new());
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        let ctl = controller(device.clone(), binder.clone());
        let mut rx = ctl.subscribe().await;

        tokio_test::assert_ok!(ctl.scan_networks().await);
        wait_for(&mut rx, |s| matches!(s, ProvisioningState::ScanResult { .. })).await;

        assert_eq!(device.scan_requests().await, 1);
        assert_eq!(binder.acquires().await, 0);
        assert!(!ctl.has_binding().await);
    }

    #[tokio::test]
    async fn scan_failure_surfaces_fixed_guidance() {
        let device = Arc::new(MockDeviceClient::new());
        device.set_scan_failure(true).await;
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        let ctl = controller(device, binder);
        let mut rx = ctl.subscribe().await;

        tokio_test::assert_ok!(ctl.scan_networks().await);
        let state = wait_for(&mut rx, |s| !s.is_loading()).await;

        // The raw error is logged, not shown.
        assert_eq!(
            state,
            ProvisioningState::Error {
                message: SCAN_GUIDANCE.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn bind_grants_then_scans_automatically() {
        let device = Arc::new(MockDeviceClient::new());
        device
            .set_scan_results(vec![net("Cafe", -70), net("", -40), net("Home", -50)])
            .await;
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        let ctl = controller(device.clone(), binder.clone());
        let mut rx = ctl.subscribe().await;

        tokio_test::assert_ok!(ctl.bind_to_network().await);
        let state = wait_for(&mut rx, |s| !s.is_loading()).await;

        assert_eq!(
            state,
            ProvisioningState::ScanResult {
                networks: vec![net("Cafe", -70), net("Home", -50)],
            }
        );
        assert_eq!(binder.acquires().await, 1);
        assert_eq!(device.bound_addr().await, Some(addr()));
        assert!(ctl.has_binding().await);
    }

    #[tokio::test]
    async fn bind_timeout_instructs_manual_connection() {
        let device = Arc::new(MockDeviceClient::new());
        let binder = Arc::new(MockNetworkBinder::unavailable());
        let ctl = controller(device, binder.clone());
        let mut rx = ctl.subscribe().await;

        tokio_test::assert_ok!(ctl.bind_to_network().await);
        let state = wait_for(&mut rx, |s| !s.is_loading()).await;

        assert_eq!(
            state,
            ProvisioningState::Error {
                message: "Please connect to 'Plant-Vita-Setup' WiFi manually.".to_string(),
            }
        );
        assert!(!ctl.has_binding().await);
        assert_eq!(binder.releases().await, 0);
    }

    #[tokio::test]
    async fn bind_failure_surfaces_a_descriptive_error() {
        let device = Arc::new(MockDeviceClient::new());
        let binder = Arc::new(MockNetworkBinder::failing("no such interface"));
        let ctl = controller(device, binder);
        let mut rx = ctl.subscribe().await;

        tokio_test::assert_ok!(ctl.bind_to_network().await);
        let state = wait_for(&mut rx, |s| !s.is_loading()).await;

        match state {
            ProvisioningState::Error { message } => {
                assert!(message.starts_with("Failed to bind to network:"), "{message}");
            }
            other => panic!("expected error state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_bind_while_loading_is_rejected_without_a_request() {
        let device = Arc::new(MockDeviceClient::new());
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        binder.set_grant_delay(Duration::from_millis(100)).await;
        let ctl = controller(device, binder.clone());

        tokio_test::assert_ok!(ctl.bind_to_network().await);
        assert_eq!(
            ctl.bind_to_network().await,
            Err(ControllerError::OperationInProgress)
        );

        settle().await;
        assert_eq!(binder.acquires().await, 1);
    }

    #[tokio::test]
    async fn send_success_reaches_save_success_and_releases_binding() {
        let device = Arc::new(MockDeviceClient::new());
        device.set_scan_results(vec![net("Home", -50)]).await;
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        let ctl = controller(device.clone(), binder.clone());
        let mut rx = ctl.subscribe().await;

        tokio_test::assert_ok!(ctl.bind_to_network().await);
        wait_for(&mut rx, |s| matches!(s, ProvisioningState::ScanResult { .. })).await;

        tokio_test::assert_ok!(ctl.send_credentials("Home", "pw1").await);
        let state = wait_for(&mut rx, |s| matches!(s, ProvisioningState::SaveSuccess)).await;
        assert_eq!(state, ProvisioningState::SaveSuccess);

        settle().await;
        assert_eq!(
            device.saved_credentials().await,
            vec![("Home".to_string(), "pw1".to_string())]
        );
        assert!(!ctl.has_binding().await);
        assert_eq!(binder.releases().await, 1);
        assert_eq!(device.bound_addr().await, None);
    }

    #[tokio::test]
    async fn send_failure_still_reports_success_and_releases_binding() {
        let device = Arc::new(MockDeviceClient::new());
        device.set_scan_results(vec![net("HomeNet", -55)]).await;
        device.set_save_failure(true).await;
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        let ctl = controller(device.clone(), binder.clone());
        let mut rx = ctl.subscribe().await;

        tokio_test::assert_ok!(ctl.bind_to_network().await);
        wait_for(&mut rx, |s| matches!(s, ProvisioningState::ScanResult { .. })).await;

        tokio_test::assert_ok!(ctl.send_credentials("HomeNet", "secret123").await);
        let state = wait_for(&mut rx, |s| matches!(s, ProvisioningState::SaveSuccess)).await;
        assert_eq!(state, ProvisioningState::SaveSuccess);

        settle().await;
        assert!(!ctl.has_binding().await);
        assert_eq!(binder.releases().await, 1);
    }

    #[tokio::test]
    async fn send_accepts_an_empty_password() {
        let device = Arc::new(MockDeviceClient::new());
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        let ctl = controller(device.clone(), binder);
        let mut rx = ctl.subscribe().await;

        tokio_test::assert_ok!(ctl.send_credentials("OpenNet", "").await);
        wait_for(&mut rx, |s| matches!(s, ProvisioningState::SaveSuccess)).await;

        settle().await;
        assert_eq!(
            device.saved_credentials().await,
            vec![("OpenNet".to_string(), String::new())]
        );
    }

    #[tokio::test]
    async fn send_while_loading_is_rejected_without_a_device_call() {
        let device = Arc::new(MockDeviceClient::new());
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        binder.set_grant_delay(Duration::from_millis(100)).await;
        let ctl = controller(device.clone(), binder);

        tokio_test::assert_ok!(ctl.bind_to_network().await);
        assert_eq!(
            ctl.send_credentials("Home", "pw1").await,
            Err(ControllerError::OperationInProgress)
        );
        assert_eq!(device.save_requests().await, 0);
    }

    #[tokio::test]
    async fn unbind_is_idempotent_and_safe_without_a_binding() {
        let device = Arc::new(MockDeviceClient::new());
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        let ctl = controller(device, binder.clone());

        // Nothing held yet.
        ctl.unbind_network().await;
        ctl.unbind_network().await;
        assert_eq!(binder.releases().await, 0);

        let mut rx = ctl.subscribe().await;
        tokio_test::assert_ok!(ctl.bind_to_network().await);
        wait_for(&mut rx, |s| matches!(s, ProvisioningState::ScanResult { .. })).await;

        ctl.unbind_network().await;
        ctl.unbind_network().await;
        assert_eq!(binder.releases().await, 1);
        assert!(!ctl.has_binding().await);
    }

    #[tokio::test]
    async fn reset_state_forces_idle_and_keeps_the_binding() {
        let device = Arc::new(MockDeviceClient::new());
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        let ctl = controller(device, binder.clone());
        let mut rx = ctl.subscribe().await;

        tokio_test::assert_ok!(ctl.bind_to_network().await);
        wait_for(&mut rx, |s| matches!(s, ProvisioningState::ScanResult { .. })).await;

        ctl.reset_state().await;
        assert_eq!(ctl.state().await, ProvisioningState::Idle);
        assert!(ctl.has_binding().await);
        assert_eq!(binder.releases().await, 0);
    }

    #[tokio::test]
    async fn rebinding_after_reset_releases_the_displaced_binding() {
        let device = Arc::new(MockDeviceClient::new());
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        let ctl = controller(device, binder.clone());
        let mut rx = ctl.subscribe().await;

        tokio_test::assert_ok!(ctl.bind_to_network().await);
        wait_for(&mut rx, |s| matches!(s, ProvisioningState::ScanResult { .. })).await;
        ctl.reset_state().await;

        tokio_test::assert_ok!(ctl.bind_to_network().await);
        wait_for(&mut rx, |s| matches!(s, ProvisioningState::ScanResult { .. })).await;

        settle().await;
        assert_eq!(binder.acquires().await, 2);
        assert_eq!(binder.releases().await, 1);
        assert!(ctl.has_binding().await);
    }

    #[tokio::test]
    async fn full_provisioning_flow() {
        let device = Arc::new(MockDeviceClient::new());
        device
            .set_scan_results(vec![net("Cafe", -70), net("", -40), net("Home", -50)])
            .await;
        let binder = Arc::new(MockNetworkBinder::granting("wlan0", addr()));
        let ctl = controller(device.clone(), binder.clone());
        let mut rx = ctl.subscribe().await;

        tokio_test::assert_ok!(ctl.bind_to_network().await);
        let state = wait_for(&mut rx, |s| !s.is_loading()).await;
        assert_eq!(
            state,
            ProvisioningState::ScanResult {
                networks: vec![net("Cafe", -70), net("Home", -50)],
            }
        );

        // Operator picks "Home" and types the password.
        tokio_test::assert_ok!(ctl.send_credentials("Home", "pw1").await);
        let state = wait_for(&mut rx, |s| !s.is_loading()).await;
        assert_eq!(state, ProvisioningState::SaveSuccess);

        settle().await;
        assert_eq!(
            device.saved_credentials().await,
            vec![("Home".to_string(), "pw1".to_string())]
        );
        assert!(!ctl.has_binding().await);
        assert_eq!(binder.acquires().await, 1);
        assert_eq!(binder.releases().await, 1);
    }
}
