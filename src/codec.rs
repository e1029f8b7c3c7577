//! Field encode/decode utilities.

pub mod field;
pub mod frame;

pub use field::*;
pub use frame::{decode_frame, encode_frame, DecodedField, DecodedFrame};
