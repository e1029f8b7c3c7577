//! Modbus RTU master transport (feature `modbus-rtu`).

use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use voltage_modbus::{ModbusClient, ModbusRtuClient};

use crate::core::error::{BridgeError, Result};
use crate::core::traits::{ConnectionState, ModbusLink};
use crate::schema::model::RtuLineConfig;

/// Modbus RTU master over a serial device.
///
/// Wraps a [`voltage_modbus::ModbusRtuClient`]. The line always runs 8N1
/// at the configured baud rate; parity and stop bits from the schema are
/// carried but not applied, matching the original line setup.
pub struct RtuMasterLink {
    device: String,
    baud: u32,
    client: Option<Mutex<ModbusRtuClient>>,
    state: Arc<RwLock<ConnectionState>>,
}

impl RtuMasterLink {
    /// Create a link for the given serial device (e.g. `/dev/ttyUSB0`).
    pub fn new(device: impl Into<String>, rtu: &RtuLineConfig) -> Self {
        Self {
            device: device.into(),
            baud: rtu.baud,
            client: None,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut s) = self.state.write() {
            *s = state;
        }
    }

    fn client(&self) -> Result<&Mutex<ModbusRtuClient>> {
        self.client.as_ref().ok_or(BridgeError::NotConnected)
    }
}

impl ModbusLink for RtuMasterLink {
    async fn open(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);

        match ModbusRtuClient::new(&self.device, self.baud) {
            Ok(client) => {
                self.client = Some(Mutex::new(client));
                self.set_state(ConnectionState::Connected);
                tracing::info!("RTU line {} opened at {} baud", self.device, self.baud);
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Error);
                Err(BridgeError::connection(format!(
                    "failed to open RTU line {}: {}",
                    self.device, e
                )))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            let _ = client.into_inner().close().await;
        }
        self.set_state(ConnectionState::Disconnected);
        tracing::info!("RTU line {} closed", self.device);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Error)
    }

    async fn read_holding(&self, slave: u8, address: u16, count: u16) -> Result<Vec<u16>> {
        let mut client = self.client()?.lock().await;
        client
            .read_03(slave, address, count)
            .await
            .map_err(|e| BridgeError::connection(e.to_string()))
    }

    async fn write_single(&self, slave: u8, address: u16, value: u16) -> Result<()> {
        let mut client = self.client()?.lock().await;
        client
            .write_06(slave, address, value)
            .await
            .map_err(|e| BridgeError::connection(e.to_string()))
    }

    async fn write_multiple(&self, slave: u8, address: u16, values: &[u16]) -> Result<()> {
        let mut client = self.client()?.lock().await;
        client
            .write_10(slave, address, values)
            .await
            .map_err(|e| BridgeError::connection(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operations_require_open_line() {
        let link = RtuMasterLink::new("/dev/null", &RtuLineConfig::default());
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(matches!(
            link.read_holding(1, 0, 1).await,
            Err(BridgeError::NotConnected)
        ));
        assert!(matches!(
            link.write_single(1, 0, 0).await,
            Err(BridgeError::NotConnected)
        ));
    }
}
