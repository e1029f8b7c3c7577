//! Bridge configuration and runtime.
//!
//! [`config`] loads the three JSON documents from disk into a resolved
//! [`Translator`](crate::mapping::Translator); [`runtime`] wires a
//! translator to two bus links and runs the polling and frame-dispatch
//! loops.

pub mod config;
pub mod runtime;

pub use config::{load_translator, BridgeConfig, BridgePaths};
pub use runtime::Bridge;
