//! Bus transport implementations.
//!
//! Concrete [`CanLink`](crate::core::traits::CanLink) and
//! [`ModbusLink`](crate::core::traits::ModbusLink) implementations, each
//! behind its own feature gate. The translation core never touches these;
//! only the bridge runtime and the `run` command do.

#[cfg(all(feature = "can", target_os = "linux"))]
#[cfg_attr(docsrs, doc(cfg(feature = "can")))]
pub mod socketcan;

#[cfg(feature = "modbus-rtu")]
#[cfg_attr(docsrs, doc(cfg(feature = "modbus-rtu")))]
pub mod rtu;

#[cfg(all(feature = "can", target_os = "linux"))]
pub use socketcan::SocketCanLink;

#[cfg(feature = "modbus-rtu")]
pub use rtu::RtuMasterLink;
