// Two-device simulation over loopback radios
//
// Each simulated device runs a full discovery service on its own loopback
// adapter. Whatever one device has on air is relayed to the other's scanner a
// few times over, the way a real radio reports the same advertisement again
// and again.

use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use colored::*;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use streetpass_core::discovery::ENTRY_HEADER;
use streetpass_core::{
    event_channel, spawn_service, DisplayState, LoopbackAdapter, RawDiscoveryEvent,
    ServiceHandle, StreetpassConfig,
};
use tracing::info;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

struct SimDevice {
    label: &'static str,
    user_id: String,
    /// Identifier the other device's radio reports for this one
    radio_id: String,
    adapter: Arc<LoopbackAdapter>,
    handle: ServiceHandle,
}

impl SimDevice {
    fn spawn(label: &'static str, config: StreetpassConfig) -> Result<Self> {
        let (callbacks, events) = event_channel();
        let adapter = Arc::new(LoopbackAdapter::new(callbacks));
        let user_id = config.user_id.clone();
        let handle = spawn_service(config, adapter.clone(), events)
            .with_context(|| format!("Failed to start {}", label))?;

        Ok(Self {
            label,
            user_id,
            radio_id: uuid::Uuid::new_v4().to_string().to_uppercase(),
            adapter,
            handle,
        })
    }

    async fn wait_until(&self, what: &str, predicate: impl FnMut(&DisplayState) -> bool) -> Result<()> {
        let mut updates = self.handle.subscribe();
        let reached = tokio::time::timeout(SETTLE_TIMEOUT, updates.wait_for(predicate))
            .await
            .with_context(|| format!("{} timed out waiting for {}", self.label, what))?
            .is_ok();
        if !reached {
            return Err(anyhow!("{} stopped while waiting for {}", self.label, what));
        }
        Ok(())
    }

    /// Hand this device's advertisement to the other device's scanner
    fn relay_to(&self, other: &SimDevice, signal_strength: i16) -> bool {
        match self.adapter.current_advertisement() {
            Some(payload) => other.adapter.deliver(RawDiscoveryEvent::from_payload(
                self.radio_id.clone(),
                signal_strength,
                &payload,
            )),
            None => false,
        }
    }
}

pub async fn run(config: &Config, rounds: Option<usize>, json: bool) -> Result<()> {
    let rounds = rounds.unwrap_or(config.simulation.rounds);
    let local = SimDevice::spawn("this device", config.device.clone())?;
    let peer = SimDevice::spawn(
        "peer",
        config
            .device
            .clone()
            .with_user_id(config.simulation.peer_user_id.clone()),
    )?;
    let devices = [&local, &peer];

    for device in devices {
        device.adapter.power_on();
        device
            .wait_until("radio power", |s| s.broadcast_adapter_ready && s.is_scanning)
            .await?;
    }

    for device in devices {
        device
            .handle
            .toggle_broadcast()
            .await
            .with_context(|| format!("{} could not start broadcasting", device.label))?;
        device.wait_until("advertising", |s| s.is_advertising).await?;
    }

    let relayed = {
        let mut rng = rand::thread_rng();
        let mut relayed = 0;
        for _ in 0..rounds {
            relayed += usize::from(local.relay_to(&peer, rng.gen_range(-85i16..=-45)));
            relayed += usize::from(peer.relay_to(&local, rng.gen_range(-85i16..=-45)));
        }
        relayed
    };
    info!("Relayed {} advertisements over {} rounds", relayed, rounds);

    let mut states = Vec::with_capacity(devices.len());
    for device in devices {
        states.push(device.handle.display_state().await?);
    }
    for device in devices {
        device.handle.shutdown().await?;
    }

    if json {
        let report = serde_json::json!({
            "local": &states[0],
            "peer": &states[1],
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (device, state) in devices.iter().zip(&states) {
        println!(
            "{}",
            format!("=== {} ({}) ===", device.label, device.user_id).bold()
        );
        println!("{}", state.log_snapshot);
        println!();
    }

    let discoveries: usize = states
        .iter()
        .map(|s| s.log_snapshot.matches(ENTRY_HEADER).count())
        .sum();
    println!(
        "{} {} advertisements relayed, {} discoveries logged",
        "✓".green(),
        relayed,
        discoveries
    );
    Ok(())
}
