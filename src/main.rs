//! Plant-Vita Device Provisioner - Main Entry Point

use std::sync::Arc;

use clap::Parser;
use plantvita_provisioner::{
    ProvisioningState, WifiNetwork,
    config::{CliArgs, Settings},
    connectivity::InterfaceBinder,
    core::controller::ProvisioningController,
    device::HttpDeviceClient,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Controller = ProvisioningController<HttpDeviceClient, InterfaceBinder>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,plantvita_provisioner=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let settings = Settings::from(CliArgs::parse());
    info!(?settings, "Starting Plant-Vita provisioner");

    let device = Arc::new(HttpDeviceClient::new(
        &settings.device_url,
        settings.http_timeout,
    )?);
    let binder = Arc::new(InterfaceBinder::new(
        settings.interface.clone(),
        settings.setup_ssid.clone(),
    ));
    let controller = Arc::new(ProvisioningController::new(
        device,
        binder,
        settings.bind_timeout,
        settings.setup_ssid.clone(),
    ));

    println!("Setup steps:");
    println!("  1. Power on the Plant-Vita device.");
    println!("  2. Check that its green LED is blinking slowly.");
    println!("  3. Join this machine's WiFi to '{}'.", settings.setup_ssid);
    println!();

    let result = tokio::select! {
        r = run_flow(controller.clone()) => r,
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down");
            Ok(())
        }
    };

    // The binding must never outlive the session, even on an interrupted flow.
    controller.unbind_network().await;

    if let Err(e) = &result {
        error!("provisioning failed: {e}");
    }
    result
}

async fn run_flow(controller: Arc<Controller>) -> Result<(), Box<dyn std::error::Error>> {
    let mut state_rx = controller.subscribe().await;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    controller.bind_to_network().await?;
    println!("Waiting for the setup network...");

    loop {
        state_rx.changed().await?;
        let state = state_rx.borrow_and_update().clone();
        debug!(
            event = %serde_json::to_string(&state).unwrap_or_default(),
            "state changed"
        );

        match state {
            ProvisioningState::Idle | ProvisioningState::Loading => {}
            ProvisioningState::Error { message } => {
                println!("{message}");
                println!("Press Enter to search again, or Ctrl+C to quit.");
                if input.next_line().await?.is_none() {
                    return Ok(());
                }
                controller.scan_networks().await?;
            }
            ProvisioningState::ScanResult { networks } => {
                if networks.is_empty() {
                    println!("The device sees no networks. Press Enter to rescan.");
                    if input.next_line().await?.is_none() {
                        return Ok(());
                    }
                    controller.reset_state().await;
                    controller.scan_networks().await?;
                    continue;
                }
                let (ssid, password) = prompt_credentials(&networks, &mut input).await?;
                controller.send_credentials(&ssid, &password).await?;
            }
            ProvisioningState::SaveSuccess => {
                println!("WiFi credentials saved. The Plant-Vita device will now restart.");
                return Ok(());
            }
        }
    }
}

async fn prompt_credentials(
    networks: &[WifiNetwork],
    input: &mut Lines<BufReader<Stdin>>,
) -> Result<(String, String), Box<dyn std::error::Error>> {
    println!("Select a WiFi network:");
    for (i, network) in networks.iter().enumerate() {
        println!("  {}: {} ({} dBm)", i + 1, network.ssid, network.rssi);
    }

    let ssid = loop {
        println!("Network number:");
        let Some(line) = input.next_line().await? else {
            return Err("stdin closed before a network was chosen".into());
        };
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=networks.len()).contains(&n) => break networks[n - 1].ssid.clone(),
            _ => println!("Enter a number between 1 and {}.", networks.len()),
        }
    };

    println!("Password for '{ssid}' (leave empty for open networks):");
    let password = input.next_line().await?.unwrap_or_default();

    Ok((ssid, password))
}
