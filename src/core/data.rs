//! Data types shared across the bridge.
//!
//! The bridge moves two shapes of data: CAN frames (identifier plus up to
//! 8 payload bytes) and Modbus register blocks (`&[u16]` slices). This
//! module defines the frame type and the typed value produced when a
//! schema field is decoded out of either side.

use serde::{Deserialize, Serialize};

/// A CAN data frame: identifier plus a stack-allocated payload.
///
/// The payload buffer is always 8 bytes; `dlc` marks how many of them are
/// meaningful. Bytes past `dlc` stay zero, so a freshly built frame can be
/// handed to the transport without masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanFrameData {
    id: u32,
    dlc: u8,
    data: [u8; 8],
}

impl CanFrameData {
    /// Create a zero-filled frame with the given identifier and length.
    pub fn new(id: u32, dlc: u8) -> Self {
        Self {
            id,
            dlc: dlc.min(8),
            data: [0u8; 8],
        }
    }

    /// Create a frame from received bytes (copies up to 8 bytes).
    pub fn from_slice(id: u32, bytes: &[u8]) -> Self {
        let mut data = [0u8; 8];
        let dlc = bytes.len().min(8) as u8;
        data[..dlc as usize].copy_from_slice(&bytes[..dlc as usize]);
        Self { id, dlc, data }
    }

    /// CAN identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Payload length (0-8).
    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    /// Meaningful payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }

    /// Mutable view of the meaningful payload bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.dlc as usize]
    }
}

impl std::fmt::Display for CanFrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "id=0x{:X} dlc={} data:", self.id, self.dlc)?;
        for b in self.data() {
            write!(f, " {:02X}", b)?;
        }
        Ok(())
    }
}

/// A typed value decoded from a schema field.
///
/// The variant follows the field's declared type, so width and signedness
/// survive the trip through the codec. No scaling has been applied yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Unsigned 16-bit quantity.
    Unsigned(u16),

    /// Signed 16-bit quantity.
    Signed(i16),

    /// IEEE-754 single-precision float.
    Float(f32),

    /// Boolean flag.
    Bool(bool),
}

impl FieldValue {
    /// Numeric view of the value (bool maps to 1.0 / 0.0).
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Unsigned(v) => f64::from(*v),
            Self::Signed(v) => f64::from(*v),
            Self::Float(v) => f64::from(*v),
            Self::Bool(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Boolean view (numerics are true when non-zero).
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Unsigned(v) => *v != 0,
            Self::Signed(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::Bool(v) => *v,
        }
    }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        Self::Unsigned(v)
    }
}

impl From<i16> for FieldValue {
    fn from(v: i16) -> Self {
        Self::Signed(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{}", v),
            Self::Signed(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{:.3}", v),
            Self::Bool(v) => write!(f, "{}", if *v { "true" } else { "false" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_slice_caps_at_eight() {
        let frame = CanFrameData::from_slice(0x351, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(frame.dlc(), 8);
        assert_eq!(frame.data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_frame_zero_filled() {
        let mut frame = CanFrameData::new(0x100, 4);
        assert_eq!(frame.data(), &[0, 0, 0, 0]);
        frame.data_mut()[2] = 0xAB;
        assert_eq!(frame.data(), &[0, 0, 0xAB, 0]);
    }

    #[test]
    fn test_frame_display() {
        let frame = CanFrameData::from_slice(0x351, &[0x0F, 0xA0]);
        assert_eq!(frame.to_string(), "id=0x351 dlc=2 data: 0F A0");
    }

    #[test]
    fn test_field_value_views() {
        assert_eq!(FieldValue::Signed(-5).as_f64(), -5.0);
        assert!(FieldValue::Unsigned(1).as_bool());
        assert!(!FieldValue::Float(0.0).as_bool());
        assert_eq!(FieldValue::Bool(true).as_f64(), 1.0);
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Unsigned(1200).to_string(), "1200");
        assert_eq!(FieldValue::Float(2.5).to_string(), "2.500");
        assert_eq!(FieldValue::Bool(false).to_string(), "false");
    }
}
