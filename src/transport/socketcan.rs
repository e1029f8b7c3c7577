//! SocketCAN transport (Linux only, feature `can`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Frame, Socket, StandardId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::core::data::CanFrameData;
use crate::core::error::{BridgeError, Result};
use crate::core::traits::{CanLink, ConnectionState, FrameReceiver, FrameSender};

/// Last received frame for one CAN id.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    /// The frame as received.
    pub frame: CanFrameData,

    /// When it was received.
    pub received_at: DateTime<Utc>,
}

/// CAN bus access over a SocketCAN interface.
///
/// Outbound frames go through a dedicated socket; inbound frames are read
/// by a spawned task on its own socket and fanned out over a broadcast
/// channel. Only standard 11-bit identifiers are handled; extended frames
/// are dropped on receive and rejected on send.
pub struct SocketCanLink {
    interface: String,
    rx_poll_interval: Duration,
    state: Arc<RwLock<ConnectionState>>,
    is_open: Arc<AtomicBool>,
    frame_tx: FrameSender,
    tx_socket: Arc<Mutex<Option<CanSocket>>>,
    receive_handle: Option<JoinHandle<()>>,
    snapshots: Arc<DashMap<u32, FrameSnapshot>>,
}

impl SocketCanLink {
    /// Default interval between non-blocking receive polls.
    pub const DEFAULT_RX_POLL_INTERVAL_MS: u64 = 10;

    /// Create a link for the given interface (e.g. `can0`, `vcan0`).
    pub fn new(interface: impl Into<String>) -> Self {
        let (frame_tx, _) = broadcast::channel(1024);
        Self {
            interface: interface.into(),
            rx_poll_interval: Duration::from_millis(Self::DEFAULT_RX_POLL_INTERVAL_MS),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            is_open: Arc::new(AtomicBool::new(false)),
            frame_tx,
            tx_socket: Arc::new(Mutex::new(None)),
            receive_handle: None,
            snapshots: Arc::new(DashMap::new()),
        }
    }

    /// Override the receive poll interval.
    pub fn with_rx_poll_interval(mut self, interval: Duration) -> Self {
        self.rx_poll_interval = interval;
        self
    }

    /// Last received frame per CAN id.
    pub fn snapshot(&self, id: u32) -> Option<FrameSnapshot> {
        self.snapshots.get(&id).map(|s| s.clone())
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut s) = self.state.write() {
            *s = state;
        }
    }

    fn spawn_receive_task(&mut self) {
        let interface = self.interface.clone();
        let is_open = Arc::clone(&self.is_open);
        let frame_tx = self.frame_tx.clone();
        let snapshots = Arc::clone(&self.snapshots);
        let poll_interval = self.rx_poll_interval;

        let handle = tokio::spawn(async move {
            let socket = match CanSocket::open(&interface) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("failed to open CAN receive socket on {}: {}", interface, e);
                    return;
                }
            };
            if let Err(e) = socket.set_nonblocking(true) {
                tracing::error!("failed to set non-blocking mode on {}: {}", interface, e);
                return;
            }

            tracing::info!("CAN receive task started on {}", interface);
            let mut interval = tokio::time::interval(poll_interval);

            loop {
                interval.tick().await;
                if !is_open.load(Ordering::SeqCst) {
                    break;
                }

                match socket.read_frame() {
                    Ok(CanFrame::Data(frame)) => {
                        if frame.is_extended() {
                            tracing::debug!("ignoring extended CAN id 0x{:X}", frame.raw_id());
                            continue;
                        }
                        let data = CanFrameData::from_slice(frame.raw_id(), frame.data());
                        tracing::debug!("received {}", data);
                        snapshots.insert(
                            data.id(),
                            FrameSnapshot {
                                frame: data,
                                received_at: Utc::now(),
                            },
                        );
                        let _ = frame_tx.send(data);
                    }
                    // remote and error frames carry no payload for us
                    Ok(_) => continue,
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                    Err(e) => {
                        tracing::error!("CAN read error on {}: {}", interface, e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }

            tracing::info!("CAN receive task stopped on {}", interface);
        });

        self.receive_handle = Some(handle);
    }
}

impl CanLink for SocketCanLink {
    async fn open(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);

        let socket = CanSocket::open(&self.interface).map_err(|e| {
            self.set_state(ConnectionState::Error);
            BridgeError::connection(format!(
                "failed to open CAN interface {}: {}",
                self.interface, e
            ))
        })?;
        socket.set_nonblocking(true).map_err(|e| {
            self.set_state(ConnectionState::Error);
            BridgeError::connection(format!("failed to set non-blocking mode: {}", e))
        })?;

        if let Ok(mut tx) = self.tx_socket.lock() {
            *tx = Some(socket);
        }
        self.is_open.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
        self.spawn_receive_task();

        tracing::info!("CAN interface {} opened", self.interface);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.is_open.store(false, Ordering::SeqCst);
        if let Some(handle) = self.receive_handle.take() {
            handle.abort();
        }
        if let Ok(mut tx) = self.tx_socket.lock() {
            *tx = None;
        }
        self.set_state(ConnectionState::Disconnected);
        tracing::info!("CAN interface {} closed", self.interface);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Error)
    }

    async fn send_frame(&self, frame: CanFrameData) -> Result<()> {
        let id = u16::try_from(frame.id())
            .ok()
            .and_then(StandardId::new)
            .ok_or_else(|| {
                BridgeError::unsupported(format!("0x{:X} is not a standard CAN id", frame.id()))
            })?;
        let can_frame = CanFrame::new(id, frame.data()).ok_or_else(|| {
            BridgeError::Internal(format!("invalid frame payload of {} bytes", frame.dlc()))
        })?;

        let guard = self
            .tx_socket
            .lock()
            .map_err(|_| BridgeError::Internal("CAN socket lock poisoned".into()))?;
        let socket = guard.as_ref().ok_or(BridgeError::NotConnected)?;
        socket
            .write_frame(&can_frame)
            .map_err(|e| BridgeError::connection(format!("CAN write failed: {}", e)))?;
        tracing::debug!("sent {}", frame);
        Ok(())
    }

    fn subscribe(&self) -> FrameReceiver {
        self.frame_tx.subscribe()
    }
}
