//! Core abstractions for the CAN / Modbus bridge.
//!
//! This module provides the error type, the shared data model and the
//! transport traits that the rest of the crate builds on.

pub mod data;
pub mod error;
pub mod traits;

pub use data::*;
pub use error::{BridgeError, Result};
pub use traits::*;
