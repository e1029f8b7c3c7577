//! # canmb
//!
//! A configuration-driven CAN ⇄ Modbus-RTU protocol bridge.
//!
//! Three JSON documents describe a deployment: the CAN message schema, the
//! Modbus register schema, and the mapping rules that pair fields across
//! the two. The documents are resolved into a [`Translator`] up front, so
//! the data path runs on indices with no name lookups per frame.
//!
//! ## Features
//!
//! - **Pure translation core**: decode/encode and register conversion work
//!   without any bus attached
//! - **Pluggable transports**: `CanLink`/`ModbusLink` traits, with
//!   SocketCAN and serial RTU implementations behind feature gates
//! - **Hot-swappable plans**: the bridge replaces its translator atomically
//!   while running
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use canmb::prelude::*;
//! use canmb::gateway::{load_translator, Bridge, BridgeConfig, BridgePaths};
//! use canmb::transport::{RtuMasterLink, SocketCanLink};
//!
//! let translator = load_translator(&BridgePaths::new(
//!     "can.json", "modbus.json", "mapping.json",
//! ))?;
//! let rtu = translator.modbus_schema().rtu.clone();
//!
//! let mut bridge = Bridge::new(
//!     translator,
//!     SocketCanLink::new("can0"),
//!     RtuMasterLink::new("/dev/ttyUSB0", &rtu),
//!     &BridgeConfig::default(),
//! );
//! bridge.start().await?;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `can` | SocketCAN transport (Linux only) |
//! | `modbus-rtu` | Serial RTU master transport |
//! | `full` | Both transports |

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec;
pub mod core;
pub mod gateway;
pub mod mapping;
pub mod schema;

#[cfg(any(feature = "can", feature = "modbus-rtu"))]
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        data::*,
        error::{BridgeError, Result},
        traits::*,
    };
    pub use crate::mapping::{MappingRule, RuleDirection, Translator};
    pub use crate::schema::{CanSchema, ModbusSchema};
}

// Re-export core types at crate root for convenience
pub use crate::core::data::{CanFrameData, FieldValue};
pub use crate::core::error::{BridgeError, Result};
pub use crate::core::traits::{BridgeEvent, BusSide, CanLink, ConnectionState, ModbusLink};
pub use crate::mapping::{MappingRule, RuleDirection, Translator};
pub use crate::schema::{CanSchema, ModbusSchema};
