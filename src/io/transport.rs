//! UDP transport for the command station link
//!
//! Owns the socket lifecycle and a background receive loop. Sends are
//! retried on transient socket errors with exponential backoff; receive
//! failures are logged and stop the loop without tearing down the
//! session (the caller decides when to disconnect).

use crate::infra::events::EventHub;
use crate::protocol::to_hex;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport is already connected")]
    AlreadyConnected,
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("send failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}

/// A received datagram with its sender address.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub peer: SocketAddr,
}

/// Send retry policy: `max_attempts` total tries, backoff doubling from
/// `initial_backoff` between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff: Duration::from_millis(50) }
    }
}

/// Datagram transport seam. Production uses [`UdpTransport`]; tests
/// substitute a fake that records sends and injects inbound traffic.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, addr: SocketAddr) -> Result<(), TransportError>;
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;
    async fn disconnect(&self);
    fn is_connected(&self) -> bool;
    /// Inbound datagram notifications, in wire arrival order.
    fn incoming(&self) -> &EventHub<Datagram>;
}

pub struct UdpTransport {
    retry: RetryPolicy,
    socket: RwLock<Option<Arc<UdpSocket>>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    recv_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    incoming: EventHub<Datagram>,
    total_sends: AtomicU64,
    total_retries: AtomicU64,
    total_receives: Arc<AtomicU64>,
}

impl UdpTransport {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            socket: RwLock::new(None),
            shutdown: Mutex::new(None),
            recv_task: tokio::sync::Mutex::new(None),
            incoming: EventHub::new(),
            total_sends: AtomicU64::new(0),
            total_retries: AtomicU64::new(0),
            total_receives: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn receive_loop(
        socket: Arc<UdpSocket>,
        incoming: EventHub<Datagram>,
        receives: Arc<AtomicU64>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("udp_receive_loop_started");
        let mut buf = [0u8; 2048];

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                result = socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => {
                            receives.fetch_add(1, Ordering::Relaxed);
                            trace!(
                                len = len,
                                peer = %peer,
                                payload = %to_hex(&buf[..len]),
                                "udp_datagram_received"
                            );
                            incoming.publish(&Datagram { payload: buf[..len].to_vec(), peer });
                        }
                        Err(e) => {
                            error!(error = %e, "udp_receive_error");
                            break;
                        }
                    }
                }
            }
        }

        info!("udp_receive_loop_stopped");
    }

    fn log_periodic_stats(&self, send_number: u64) {
        if send_number % 10 == 0 {
            info!(
                sends = send_number,
                retries = self.total_retries.load(Ordering::Relaxed),
                receives = self.total_receives.load(Ordering::Relaxed),
                "udp_transport_stats"
            );
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn connect(&self, addr: SocketAddr) -> Result<(), TransportError> {
        if self.is_connected() {
            return Err(TransportError::AlreadyConnected);
        }

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect(addr).await?;
        let socket = Arc::new(socket);
        *self.socket.write() = Some(socket.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown.lock() = Some(shutdown_tx);

        let handle = tokio::spawn(Self::receive_loop(
            socket,
            self.incoming.clone(),
            self.total_receives.clone(),
            shutdown_rx,
        ));
        *self.recv_task.lock().await = Some(handle);

        info!(remote = %addr, "udp_connected");
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let socket =
            self.socket.read().as_ref().cloned().ok_or(TransportError::NotConnected)?;

        let send_number = self.total_sends.fetch_add(1, Ordering::Relaxed) + 1;
        self.log_periodic_stats(send_number);

        let attempts = self.retry.max_attempts.max(1);
        let mut delay = self.retry.initial_backoff;

        for attempt in 1..=attempts {
            match socket.send(data).await {
                Ok(_) => {
                    trace!(
                        len = data.len(),
                        attempt = attempt,
                        payload = %to_hex(data),
                        "udp_datagram_sent"
                    );
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    self.total_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        attempt = attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "udp_send_retry"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    error!(attempts = attempts, error = %e, "udp_send_retries_exhausted");
                    return Err(TransportError::RetriesExhausted { attempts, source: e });
                }
            }
        }

        Err(TransportError::NotConnected)
    }

    async fn disconnect(&self) {
        let shutdown = self.shutdown.lock().take();
        if let Some(tx) = shutdown {
            let _ = tx.send(true);
        }

        let task = self.recv_task.lock().await.take();
        if let Some(handle) = task {
            let _ = handle.await;
        }

        *self.socket.write() = None;

        info!(
            sends = self.total_sends.load(Ordering::Relaxed),
            retries = self.total_retries.load(Ordering::Relaxed),
            receives = self.total_receives.load(Ordering::Relaxed),
            "udp_disconnected"
        );
    }

    fn is_connected(&self) -> bool {
        self.socket.read().is_some()
    }

    fn incoming(&self) -> &EventHub<Datagram> {
        &self.incoming
    }
}

/// In-memory transport double: records sent frames and lets tests
/// inject inbound datagrams.
#[cfg(test)]
pub struct FakeTransport {
    connected: std::sync::atomic::AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
    incoming: EventHub<Datagram>,
}

#[cfg(test)]
impl FakeTransport {
    pub fn new() -> Self {
        Self {
            connected: std::sync::atomic::AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            incoming: EventHub::new(),
        }
    }

    /// Start connected, for tests that skip the connect call.
    pub fn connected() -> Self {
        let transport = Self::new();
        transport.connected.store(true, Ordering::SeqCst);
        transport
    }

    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Deliver a datagram as if it arrived from the station.
    pub fn inject(&self, payload: &[u8]) {
        let peer = SocketAddr::from(([127, 0, 0, 1], crate::protocol::DEFAULT_PORT));
        self.incoming.publish(&Datagram { payload: payload.to_vec(), peer });
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _addr: SocketAddr) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(data.to_vec());
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn incoming(&self) -> &EventHub<Datagram> {
        &self.incoming
    }
}
