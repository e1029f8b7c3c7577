//! Schema model and document parsers.
//!
//! The two schema documents (CAN message layouts, Modbus resource layouts)
//! are parsed here into the immutable typed model that the mapping
//! resolver and the translation engine work against.

pub mod model;
pub mod parser;

pub use model::*;
pub use parser::{parse_can_document, parse_modbus_document};
