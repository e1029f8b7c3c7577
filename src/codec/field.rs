//! Endian-aware field codec.
//!
//! Reads and writes typed values through byte windows of a CAN payload and
//! converts between f32 values and Modbus register pairs. Window widths are
//! 1, 2 or 4 bytes; a 1-byte window always carries the low-order byte of
//! the value, so narrow reads zero-extend and never sign-extend.

use crate::core::data::FieldValue;
use crate::core::error::{BridgeError, Result};
use crate::schema::model::{CanFieldSpec, Endian, FieldType};

/// Borrow the byte window a field occupies inside a payload.
pub fn field_window(payload: &[u8], offset: u16, size: u8) -> Result<&[u8]> {
    let start = offset as usize;
    let end = start + size as usize;
    if end > payload.len() {
        return Err(BridgeError::translation(format!(
            "field window {}..{} exceeds payload of {} bytes",
            start,
            end,
            payload.len()
        )));
    }
    Ok(&payload[start..end])
}

/// Mutable variant of [`field_window`].
pub fn field_window_mut(payload: &mut [u8], offset: u16, size: u8) -> Result<&mut [u8]> {
    let start = offset as usize;
    let end = start + size as usize;
    if end > payload.len() {
        return Err(BridgeError::translation(format!(
            "field window {}..{} exceeds payload of {} bytes",
            start,
            end,
            payload.len()
        )));
    }
    Ok(&mut payload[start..end])
}

/// Read an unsigned 16-bit value from a 1- or 2-byte window.
pub fn read_u16(window: &[u8], endian: Endian) -> Result<u16> {
    match window.len() {
        1 => Ok(u16::from(window[0])),
        2 => match endian {
            Endian::Little => Ok(u16::from_le_bytes([window[0], window[1]])),
            Endian::Big => Ok(u16::from_be_bytes([window[0], window[1]])),
        },
        n => Err(bad_window("u16", n)),
    }
}

/// Read a signed 16-bit value from a 1- or 2-byte window.
///
/// A 1-byte window zero-extends, so the result is always in `0..=255`.
pub fn read_i16(window: &[u8], endian: Endian) -> Result<i16> {
    read_u16(window, endian).map(|v| v as i16)
}

/// Read an IEEE-754 single from a 4-byte window.
pub fn read_f32(window: &[u8], endian: Endian) -> Result<f32> {
    if window.len() != 4 {
        return Err(bad_window("f32", window.len()));
    }
    let bytes = [window[0], window[1], window[2], window[3]];
    let value = match endian {
        Endian::Little => f32::from_le_bytes(bytes),
        Endian::Big => f32::from_be_bytes(bytes),
    };
    Ok(value)
}

/// Read a boolean flag from a 1- or 2-byte window.
///
/// Only the low-order byte of the window is inspected; any non-zero
/// content there reads as `true`.
pub fn read_flag(window: &[u8], endian: Endian) -> Result<bool> {
    let low = match window.len() {
        1 => window[0],
        2 => match endian {
            Endian::Little => window[0],
            Endian::Big => window[1],
        },
        n => return Err(bad_window("bool", n)),
    };
    Ok(low != 0)
}

/// Write an unsigned 16-bit value into a 1- or 2-byte window.
///
/// A 1-byte window receives the low-order byte of the value.
pub fn write_u16(window: &mut [u8], value: u16, endian: Endian) -> Result<()> {
    match window.len() {
        1 => {
            window[0] = value as u8;
            Ok(())
        }
        2 => {
            let bytes = match endian {
                Endian::Little => value.to_le_bytes(),
                Endian::Big => value.to_be_bytes(),
            };
            window.copy_from_slice(&bytes);
            Ok(())
        }
        n => Err(bad_window("u16", n)),
    }
}

/// Write a signed 16-bit value into a 1- or 2-byte window.
pub fn write_i16(window: &mut [u8], value: i16, endian: Endian) -> Result<()> {
    write_u16(window, value as u16, endian)
}

/// Write an IEEE-754 single into a 4-byte window.
pub fn write_f32(window: &mut [u8], value: f32, endian: Endian) -> Result<()> {
    if window.len() != 4 {
        return Err(bad_window("f32", window.len()));
    }
    let bytes = match endian {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    };
    window.copy_from_slice(&bytes);
    Ok(())
}

/// Write a boolean flag into a 1- or 2-byte window, zero-extended.
pub fn write_flag(window: &mut [u8], value: bool, endian: Endian) -> Result<()> {
    write_u16(window, u16::from(value), endian)
}

fn bad_window(kind: &str, len: usize) -> BridgeError {
    BridgeError::translation(format!("invalid {} window of {} bytes", kind, len))
}

/// Decode a typed field value out of a CAN payload.
pub fn decode_field(field: &CanFieldSpec, payload: &[u8]) -> Result<FieldValue> {
    let window = field_window(payload, field.offset, field.size)?;
    let value = match field.field_type {
        FieldType::Uint16 => read_u16(window, field.endian)?.into(),
        FieldType::Int16 => read_i16(window, field.endian)?.into(),
        FieldType::Float32 => read_f32(window, field.endian)?.into(),
        FieldType::Bool => read_flag(window, field.endian)?.into(),
    };
    Ok(value)
}

/// Encode a typed value into a CAN payload at the field's window.
///
/// The value is coerced to the field's declared type first, so a float
/// handed to an integer field is truncated and clamped.
pub fn encode_field(field: &CanFieldSpec, payload: &mut [u8], value: FieldValue) -> Result<()> {
    let window = field_window_mut(payload, field.offset, field.size)?;
    match field.field_type {
        FieldType::Uint16 => write_u16(window, value.as_f64() as u16, field.endian),
        FieldType::Int16 => write_i16(window, value.as_f64() as i16, field.endian),
        FieldType::Float32 => write_f32(window, value.as_f64() as f32, field.endian),
        FieldType::Bool => write_flag(window, value.as_bool(), field.endian),
    }
}

/// Assemble an f32 from a Modbus register pair, low word first.
pub fn f32_from_registers(lo: u16, hi: u16) -> f32 {
    f32::from_bits((u32::from(hi) << 16) | u32::from(lo))
}

/// Split an f32 into a Modbus register pair, low word first.
pub fn f32_to_registers(value: f32) -> (u16, u16) {
    let bits = value.to_bits();
    ((bits & 0xFFFF) as u16, (bits >> 16) as u16)
}
