//! Discovery service
//!
//! [`DiscoveryService`] owns the adapter state, both controllers and the log.
//! [`spawn_service`] runs it on a single tokio task that consumes adapter
//! events and presentation commands, so no state is ever shared across
//! threads. The presentation layer talks to it through a [`ServiceHandle`].

use crate::adapter::{
    AdapterEvent, AdapterEventReceiver, AdapterRole, AdapterState, RadioAdapter,
};
use crate::config::{ConfigError, StreetpassConfig};
use crate::discovery::{
    BroadcastController, BroadcastError, DiscoveryLog, ScanController, ScanOutcome, ToggleOutcome,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Capacity of the presentation command queue
const COMMAND_QUEUE_DEPTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Broadcast failed: {0}")]
    Broadcast(#[from] BroadcastError),
    #[error("Discovery service is not running")]
    NotRunning,
    #[error("No reply from discovery service")]
    NoReply,
}

/// Everything the presentation layer shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayState {
    pub broadcast_adapter_ready: bool,
    pub scan_adapter_ready: bool,
    pub is_advertising: bool,
    pub is_scanning: bool,
    pub log_snapshot: String,
}

/// Cheap stand-in for a [`DisplayState`]: equal markers mean equal states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DisplayMarker {
    flags: [bool; 4],
    log_revision: u64,
}

/// Synchronous core of the service; driven by [`spawn_service`] or directly
pub struct DiscoveryService {
    adapter: Arc<dyn RadioAdapter>,
    adapter_state: AdapterState,
    broadcast: BroadcastController,
    scanner: ScanController,
    log: DiscoveryLog,
}

impl DiscoveryService {
    pub fn new(config: &StreetpassConfig, adapter: Arc<dyn RadioAdapter>) -> Result<Self, ConfigError> {
        config.validate()?;

        let token = config.token();
        let scanner = ScanController::new(config.codec(), token.app_tag.clone(), config.deduplicator());
        Ok(Self {
            adapter,
            adapter_state: AdapterState::new(),
            broadcast: BroadcastController::new(token, config.codec()),
            scanner,
            log: DiscoveryLog::with_placeholder(config.placeholder.clone()),
        })
    }

    /// Apply one adapter event, stamping discoveries with the current time
    pub fn handle_event(&mut self, event: AdapterEvent) -> Option<ScanOutcome> {
        self.handle_event_at(event, Utc::now())
    }

    /// Apply one adapter event. Returns the scan outcome for discoveries.
    pub fn handle_event_at(&mut self, event: AdapterEvent, now: DateTime<Utc>) -> Option<ScanOutcome> {
        debug!("Adapter event: {}", event);
        match event {
            AdapterEvent::PowerStateChanged { role, state } => {
                let transition = self.adapter_state.apply(role, state)?;
                info!("{} adapter: {} -> {}", role, transition.from, transition.to);
                self.log.record(transition.status_message());
                self.broadcast.on_power_transition(&transition);

                if role == AdapterRole::Scan {
                    if transition.entered_powered_on() {
                        self.scanner.on_adapter_powered_on(self.adapter.as_ref(), &mut self.log);
                    } else {
                        self.scanner.on_power_lost();
                    }
                }
                None
            }
            AdapterEvent::AdvertisingStarted { request, result } => {
                self.broadcast.on_start_result(request, result, &mut self.log);
                None
            }
            AdapterEvent::Discovered(raw) => Some(self.scanner.on_discovery(raw, now, &mut self.log)),
        }
    }

    pub fn toggle_broadcast(&mut self) -> Result<ToggleOutcome, BroadcastError> {
        self.broadcast
            .toggle(self.adapter.as_ref(), &self.adapter_state, &mut self.log)
    }

    pub fn display_state(&self) -> DisplayState {
        DisplayState {
            broadcast_adapter_ready: self.adapter_state.is_ready(AdapterRole::Broadcast),
            scan_adapter_ready: self.adapter_state.is_ready(AdapterRole::Scan),
            is_advertising: self.broadcast.is_advertising(),
            is_scanning: self.scanner.is_scanning(),
            log_snapshot: self.log.snapshot(),
        }
    }

    fn display_marker(&self) -> DisplayMarker {
        DisplayMarker {
            flags: [
                self.adapter_state.is_ready(AdapterRole::Broadcast),
                self.adapter_state.is_ready(AdapterRole::Scan),
                self.broadcast.is_advertising(),
                self.scanner.is_scanning(),
            ],
            log_revision: self.log.revision(),
        }
    }

    pub fn log(&self) -> &DiscoveryLog {
        &self.log
    }

    /// Stop scanning and advertising
    pub fn shutdown(&mut self) {
        if let Err(err) = self.scanner.stop(self.adapter.as_ref()) {
            tracing::warn!("Failed to stop scanning during shutdown: {}", err);
        }
        self.broadcast.shutdown(self.adapter.as_ref());
    }
}

/// Commands accepted by the service task
#[derive(Debug)]
pub enum ServiceCommand {
    ToggleBroadcast {
        reply: mpsc::Sender<Result<ToggleOutcome, BroadcastError>>,
    },
    GetDisplayState {
        reply: mpsc::Sender<DisplayState>,
    },
    Shutdown {
        reply: mpsc::Sender<()>,
    },
}

/// Handle to the running service task
#[derive(Clone)]
pub struct ServiceHandle {
    command_tx: mpsc::Sender<ServiceCommand>,
    state_rx: watch::Receiver<DisplayState>,
}

impl ServiceHandle {
    /// Start advertising if idle, stop if advertising
    pub async fn toggle_broadcast(&self) -> Result<ToggleOutcome, ServiceError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(ServiceCommand::ToggleBroadcast { reply: reply_tx })
            .await
            .map_err(|_| ServiceError::NotRunning)?;

        reply_rx
            .recv()
            .await
            .ok_or(ServiceError::NoReply)?
            .map_err(ServiceError::from)
    }

    /// Current display state, after every event queued so far
    pub async fn display_state(&self) -> Result<DisplayState, ServiceError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(ServiceCommand::GetDisplayState { reply: reply_tx })
            .await
            .map_err(|_| ServiceError::NotRunning)?;

        reply_rx.recv().await.ok_or(ServiceError::NoReply)
    }

    /// Change notifications for the display state
    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.state_rx.clone()
    }

    /// Stop the radio and end the service task
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(ServiceCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| ServiceError::NotRunning)?;

        reply_rx.recv().await.ok_or(ServiceError::NoReply)
    }

    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

/// Spawn the service task. Must be called from within a tokio runtime.
pub fn spawn_service(
    config: StreetpassConfig,
    adapter: Arc<dyn RadioAdapter>,
    mut events: AdapterEventReceiver,
) -> Result<ServiceHandle, ServiceError> {
    let mut service = DiscoveryService::new(&config, adapter)?;
    let (command_tx, mut command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let (state_tx, state_rx) = watch::channel(service.display_state());

    info!(
        "Discovery service starting ({} as {})",
        config.payload_format, config.user_id
    );

    tokio::spawn(async move {
        let mut events_open = true;
        // Most radio traffic is duplicates and foreign broadcasts; only
        // rebuild the snapshot when something visible changed
        let mut published = service.display_marker();

        loop {
            tokio::select! {
                // Drain adapter events first so a command sees every event
                // queued before it
                biased;

                event = events.recv(), if events_open => {
                    match event {
                        Some(event) => {
                            service.handle_event(event);
                        }
                        None => {
                            debug!("Adapter event queue closed");
                            events_open = false;
                        }
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ServiceCommand::ToggleBroadcast { reply }) => {
                            let result = service.toggle_broadcast();
                            let _ = reply.send(result).await;
                        }
                        Some(ServiceCommand::GetDisplayState { reply }) => {
                            let _ = reply.send(service.display_state()).await;
                        }
                        Some(ServiceCommand::Shutdown { reply }) => {
                            service.shutdown();
                            state_tx.send_replace(service.display_state());
                            let _ = reply.send(()).await;
                            break;
                        }
                        None => {
                            debug!("All service handles dropped");
                            service.shutdown();
                            break;
                        }
                    }
                }
            }

            let marker = service.display_marker();
            if marker != published {
                published = marker;
                state_tx.send_replace(service.display_state());
            }
        }

        info!("Discovery service stopped");
    });

    Ok(ServiceHandle {
        command_tx,
        state_rx,
    })
}
