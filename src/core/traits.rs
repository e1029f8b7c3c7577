//! Transport traits and runtime events.
//!
//! The translation core is pure and synchronous; everything that touches a
//! bus goes through the two link traits defined here. Concrete links live
//! in `transport` behind feature gates, and tests substitute their own.
//!
//! ```text
//! CanLink     // open/close, send frame, broadcast inbound frames
//! ModbusLink  // open/close, read/write holding registers
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::broadcast;

use crate::core::data::CanFrameData;
use crate::core::error::Result;

/// Connection state of a bus link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected to the bus.
    #[default]
    Disconnected,

    /// Attempting to connect.
    Connecting,

    /// Connected and operational.
    Connected,

    /// Connection error state.
    Error,
}

impl ConnectionState {
    /// Check if currently connected.
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if a new connection attempt is allowed.
    #[inline]
    pub const fn can_retry(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Error => "Error",
        };
        write!(f, "{}", s)
    }
}

/// The two buses a bridge connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusSide {
    /// The CAN bus.
    Can,

    /// The Modbus serial line.
    Modbus,
}

impl std::fmt::Display for BusSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Can => write!(f, "CAN"),
            Self::Modbus => write!(f, "Modbus"),
        }
    }
}

/// Inbound frame receiver (broadcast supports multiple subscribers).
pub type FrameReceiver = broadcast::Receiver<CanFrameData>;

/// Inbound frame sender.
pub type FrameSender = broadcast::Sender<CanFrameData>;

/// Asynchronous CAN bus access.
///
/// Outbound traffic goes through [`CanLink::send_frame`]; inbound frames
/// fan out over a broadcast channel so the bridge and any number of
/// observers can consume the same stream.
pub trait CanLink: Send + Sync {
    /// Open the CAN interface.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the CAN interface.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Send one data frame.
    fn send_frame(&self, frame: CanFrameData) -> impl Future<Output = Result<()>> + Send;

    /// Subscribe to inbound frames.
    fn subscribe(&self) -> FrameReceiver;
}

/// Asynchronous Modbus master access (holding registers only).
pub trait ModbusLink: Send + Sync {
    /// Open the serial line.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the serial line.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Read `count` holding registers starting at `address` (function 0x03).
    fn read_holding(
        &self,
        slave: u8,
        address: u16,
        count: u16,
    ) -> impl Future<Output = Result<Vec<u16>>> + Send;

    /// Write a single holding register (function 0x06).
    fn write_single(
        &self,
        slave: u8,
        address: u16,
        value: u16,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Write a block of holding registers (function 0x10).
    fn write_multiple(
        &self,
        slave: u8,
        address: u16,
        values: &[u16],
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Runtime event emitted by the bridge.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A CAN frame arrived on the bus.
    FrameReceived(CanFrameData),

    /// A frame was built from Modbus registers and sent.
    FrameSent {
        /// Label of the rule that produced the frame.
        rule: String,
        /// The frame as sent.
        frame: CanFrameData,
    },

    /// Registers were written to a Modbus resource.
    RegistersWritten {
        /// Label of the rule that produced the write.
        rule: String,
        /// Resource name on the Modbus side.
        resource: String,
        /// Register values as written.
        registers: Vec<u16>,
    },

    /// Connection state of one side changed.
    LinkStateChanged(BusSide, ConnectionState),

    /// A translation or I/O error occurred.
    Error(String),
}

/// Event receiver type (broadcast supports multiple subscribers).
pub type BridgeEventReceiver = broadcast::Receiver<BridgeEvent>;

/// Event sender type.
pub type BridgeEventSender = broadcast::Sender<BridgeEvent>;

/// Event handler trait.
///
/// Uses `async_trait` because it must be object-safe for `dyn BridgeEventHandler`.
#[async_trait]
pub trait BridgeEventHandler: Send + Sync {
    /// Handle a data-plane event (frame or register traffic).
    async fn on_traffic(&self, event: &BridgeEvent);

    /// Handle a link state change.
    async fn on_link_state(&self, side: BusSide, state: ConnectionState);

    /// Handle an error event.
    async fn on_error(&self, error: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Error.can_retry());
        assert!(!ConnectionState::Connecting.can_retry());
    }

    #[test]
    fn test_bus_side_display() {
        assert_eq!(BusSide::Can.to_string(), "CAN");
        assert_eq!(BusSide::Modbus.to_string(), "Modbus");
    }
}
