//! Configuration document loading.
//!
//! The three documents live as plain JSON files; this module reads them
//! and builds the resolved translation plan. File-level problems surface
//! as `Config` errors with the path in the message, document-level
//! problems keep their `Schema`/`Mapping` classification from the
//! parsers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{BridgeError, Result};
use crate::mapping::Translator;
use crate::schema::parser::{parse_can_document, parse_modbus_document};

/// Filesystem locations of the three configuration documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgePaths {
    /// CAN schema document.
    pub can: PathBuf,

    /// Modbus schema document.
    pub modbus: PathBuf,

    /// Mapping document.
    pub mapping: PathBuf,
}

impl BridgePaths {
    /// Bundle the three document paths.
    pub fn new(
        can: impl Into<PathBuf>,
        modbus: impl Into<PathBuf>,
        mapping: impl Into<PathBuf>,
    ) -> Self {
        Self {
            can: can.into(),
            modbus: modbus.into(),
            mapping: mapping.into(),
        }
    }
}

/// Runtime parameters of the bridge itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_event_buffer() -> usize {
    1024
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
        }
    }
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| BridgeError::config(format!("cannot read {}: {}", path.display(), e)))
}

/// Load all three documents and resolve them into a translation plan.
pub fn load_translator(paths: &BridgePaths) -> Result<Translator> {
    let can = parse_can_document(&read_document(&paths.can)?)?;
    let modbus = parse_modbus_document(&read_document(&paths.modbus)?)?;
    let mapping = read_document(&paths.mapping)?;

    let translator = Translator::resolve(can, modbus, &mapping)?;
    tracing::info!(
        "configuration loaded: {} CAN messages, {} Modbus resources, {} rules",
        translator.can_schema().messages.len(),
        translator.modbus_schema().resources.len(),
        translator.rules().len()
    );
    Ok(translator)
}
