//! Command station client
//!
//! Owns the transport and the decode path. Inbound frames are decoded
//! and republished on typed notification hubs in wire arrival order.
//! Mid-session send failures are retried inside the transport and only
//! surface after the retry budget is exhausted; receive path problems
//! are logged and never terminate the session.

use crate::domain::types::{BusStatus, FeedbackEvent, SystemState, VersionInfo};
use crate::infra::events::EventHub;
use crate::io::transport::{Datagram, Transport, TransportError};
use crate::protocol::decode::{self, Message};
use crate::protocol::{command, to_hex, DEFAULT_PORT};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Consecutive keepalive failures before the station is flagged
/// unresponsive.
const MAX_KEEPALIVE_FAILURES: u32 = 3;

pub struct CommandStationClient {
    transport: Arc<dyn Transport>,
    /// Pause between startup commands so the station is not flooded.
    startup_gap: Duration,
    /// Zero disables the keepalive task.
    keepalive_interval: Duration,
    feedback: EventHub<FeedbackEvent>,
    system_state: EventHub<SystemState>,
    bus_status: EventHub<BusStatus>,
    version_info: EventHub<VersionInfo>,
    current_system_state: RwLock<Option<SystemState>>,
    version: RwLock<VersionInfo>,
    keepalive_shutdown: Mutex<Option<watch::Sender<bool>>>,
    keepalive_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CommandStationClient {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Self::with_settings(transport, Duration::from_millis(50), Duration::from_secs(30))
    }

    pub fn with_settings(
        transport: Arc<dyn Transport>,
        startup_gap: Duration,
        keepalive_interval: Duration,
    ) -> Arc<Self> {
        let client = Arc::new(Self {
            transport,
            startup_gap,
            keepalive_interval,
            feedback: EventHub::new(),
            system_state: EventHub::new(),
            bus_status: EventHub::new(),
            version_info: EventHub::new(),
            current_system_state: RwLock::new(None),
            version: RwLock::new(VersionInfo::default()),
            keepalive_shutdown: Mutex::new(None),
            keepalive_task: tokio::sync::Mutex::new(None),
        });

        let weak = Arc::downgrade(&client);
        client.transport.incoming().subscribe(move |datagram: &Datagram| {
            if let Some(client) = weak.upgrade() {
                client.on_datagram(datagram);
            }
        });

        client
    }

    /// Open the transport and run the startup sequence: handshake,
    /// broadcast subscription, status request, version requests.
    pub async fn connect(&self, addr: SocketAddr) -> Result<(), TransportError> {
        self.transport.connect(addr).await?;

        self.transport.send(&command::handshake()).await?;
        self.pause().await;
        self.transport.send(&command::broadcast_flags_basic()).await?;
        self.pause().await;
        self.transport.send(&command::status_request()).await?;
        self.pause().await;
        self.transport.send(&command::serial_number_request()).await?;
        self.transport.send(&command::hardware_info_request()).await?;

        self.start_keepalive().await;

        info!(remote = %addr, "station_connected");
        Ok(())
    }

    /// Stop cleanly. The logoff frame immediately frees the client slot
    /// on the station; without it the station holds the session for
    /// another 60 seconds.
    pub async fn disconnect(&self) {
        self.stop_keepalive().await;

        if self.transport.is_connected() {
            if let Err(e) = self.transport.send(&command::logoff()).await {
                warn!(error = %e, "logoff_send_failed");
            }
        }

        self.transport.disconnect().await;
        info!("station_disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Send raw protocol bytes.
    pub async fn send_command(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.transport.send(bytes).await
    }

    pub async fn set_track_power(&self, on: bool) -> Result<(), TransportError> {
        let frame = if on { command::track_power_on() } else { command::track_power_off() };
        self.send_command(&frame).await?;
        info!(on = on, "track_power_command_sent");
        Ok(())
    }

    /// Locomotives halt, track power stays on.
    pub async fn emergency_stop(&self) -> Result<(), TransportError> {
        self.send_command(&command::emergency_stop()).await?;
        info!("emergency_stop_sent");
        Ok(())
    }

    pub async fn request_status(&self) -> Result<(), TransportError> {
        self.send_command(&command::status_request()).await
    }

    pub async fn set_turnout(
        &self,
        decoder_address: u16,
        output: u8,
        activate: bool,
        queue: bool,
    ) -> Result<(), TransportError> {
        self.send_command(&command::turnout_set(decoder_address, output, activate, queue)).await
    }

    pub async fn drive_locomotive(
        &self,
        address: u16,
        speed: u8,
        forward: bool,
    ) -> Result<(), TransportError> {
        self.send_command(&command::locomotive_drive(address, speed, forward)).await
    }

    pub async fn set_locomotive_function(
        &self,
        address: u16,
        function_index: u8,
        on: bool,
    ) -> Result<(), TransportError> {
        self.send_command(&command::locomotive_function(address, function_index, on)).await
    }

    pub async fn set_extended_accessory(
        &self,
        address: u16,
        value: u8,
    ) -> Result<(), TransportError> {
        self.send_command(&command::extended_accessory_set(address, value)).await
    }

    /// Synthesize a local feedback event without wire traffic. Runs the
    /// same decode and publish path a real frame would.
    pub fn simulate_feedback(&self, channel: u8) {
        let frame = vec![0x04, 0x00, 0xF0, 0xA1, channel, 0x01];
        info!(channel = channel, "feedback_simulated");
        self.on_datagram(&Datagram {
            payload: frame,
            peer: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
        });
    }

    pub fn feedback(&self) -> &EventHub<FeedbackEvent> {
        &self.feedback
    }

    pub fn system_state(&self) -> &EventHub<SystemState> {
        &self.system_state
    }

    pub fn bus_status(&self) -> &EventHub<BusStatus> {
        &self.bus_status
    }

    pub fn version_info(&self) -> &EventHub<VersionInfo> {
        &self.version_info
    }

    /// Most recent system state report, if any arrived yet.
    pub fn current_system_state(&self) -> Option<SystemState> {
        *self.current_system_state.read()
    }

    pub fn current_version_info(&self) -> VersionInfo {
        *self.version.read()
    }

    fn on_datagram(&self, datagram: &Datagram) {
        match decode::parse(&datagram.payload) {
            Message::Feedback(event) => {
                debug!(channel = event.channel, bits = event.bits, "feedback_received");
                self.feedback.publish(&event);
            }
            Message::SystemState(state) => {
                *self.current_system_state.write() = Some(state);
                debug!(
                    main_current_ma = state.main_current_ma,
                    temperature_c = state.temperature_c,
                    "system_state_received"
                );
                self.system_state.publish(&state);
            }
            Message::BusStatus(status) => {
                debug!(
                    emergency_stop = status.emergency_stop,
                    track_off = status.track_off,
                    short_circuit = status.short_circuit,
                    "bus_status_received"
                );
                self.bus_status.publish(&status);
            }
            Message::SerialNumber(serial) => {
                let info = {
                    let mut version = self.version.write();
                    version.serial_number = serial;
                    *version
                };
                info!(serial = serial, "station_serial_number");
                self.version_info.publish(&info);
            }
            Message::HardwareInfo { hardware_type, firmware } => {
                let info = {
                    let mut version = self.version.write();
                    version.hardware_type_code = hardware_type;
                    version.firmware_code = firmware;
                    *version
                };
                info!(
                    hardware = %info.hardware_name(),
                    firmware = %info.firmware_version(),
                    "station_hardware_info"
                );
                self.version_info.publish(&info);
            }
            Message::Unknown => {
                // Newer firmware emits frame types this client does not
                // know; they are dropped, never raised as errors.
                trace!(payload = %to_hex(&datagram.payload), "unknown_frame_dropped");
            }
        }
    }

    async fn pause(&self) {
        if !self.startup_gap.is_zero() {
            tokio::time::sleep(self.startup_gap).await;
        }
    }

    async fn start_keepalive(&self) {
        if self.keepalive_interval.is_zero() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        *self.keepalive_shutdown.lock() = Some(shutdown_tx);

        let transport = self.transport.clone();
        let interval_len = self.keepalive_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_len);
            // The first tick fires immediately; the startup sequence
            // already requested status, so skip it.
            ticker.tick().await;
            let mut failures = 0u32;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match transport.send(&command::status_request()).await {
                            Ok(_) => {
                                if failures > 0 {
                                    info!(failures = failures, "keepalive_recovered");
                                }
                                failures = 0;
                                trace!("keepalive_sent");
                            }
                            Err(e) => {
                                failures += 1;
                                warn!(
                                    failures = failures,
                                    max = MAX_KEEPALIVE_FAILURES,
                                    error = %e,
                                    "keepalive_failed"
                                );
                                if failures >= MAX_KEEPALIVE_FAILURES {
                                    error!("station_unresponsive");
                                }
                            }
                        }
                    }
                }
            }

            debug!("keepalive_stopped");
        });

        *self.keepalive_task.lock().await = Some(handle);
    }

    async fn stop_keepalive(&self) {
        let shutdown = self.keepalive_shutdown.lock().take();
        if let Some(tx) = shutdown {
            let _ = tx.send(true);
        }
        let task = self.keepalive_task.lock().await.take();
        if let Some(handle) = task {
            let _ = handle.await;
        }
    }
}
