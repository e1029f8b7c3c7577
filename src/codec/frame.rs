//! Frame inspection and construction against a CAN schema.
//!
//! [`decode_frame`] turns a received frame into named engineering-unit
//! values for display; [`encode_frame`] builds a transmittable frame from
//! a message name and `field=value` assignments. Both use the display
//! convention of the register side: a scale factor divides on decode and
//! multiplies on encode.

use serde::Serialize;

use crate::codec::field::{decode_field, encode_field};
use crate::core::data::{CanFrameData, FieldValue};
use crate::core::error::{BridgeError, Result};
use crate::schema::model::{CanSchema, FieldType};
use crate::schema::parser::parse_bool_token;

/// One decoded field of a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedField {
    /// Field name.
    pub name: String,

    /// Raw value as carried in the payload.
    pub raw: FieldValue,

    /// Scale factor of the field.
    pub scale: f64,
}

impl DecodedField {
    /// Engineering-unit value: the raw value divided by the scale.
    pub fn value(&self) -> f64 {
        self.raw.as_f64() / self.scale
    }
}

impl std::fmt::Display for DecodedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.scale != 1.0 {
            write!(f, "{}={:.3}", self.name, self.value())
        } else {
            write!(f, "{}={}", self.name, self.raw)
        }
    }
}

/// A frame decoded against its message spec.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedFrame {
    /// Name of the matched message spec.
    pub message: String,

    /// Decoded fields, in declaration order. Fields whose window does not
    /// fit the actual payload length are left out.
    pub fields: Vec<DecodedField>,
}

impl std::fmt::Display for DecodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> ", self.message)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}

/// Decode a received payload against the message spec with the given id.
///
/// Returns `None` when no spec matches the id; the frame is then simply
/// not decodable, which is not an error.
pub fn decode_frame(schema: &CanSchema, id: u32, payload: &[u8]) -> Option<DecodedFrame> {
    let index = schema.message_index_by_id(id)?;
    let message = &schema.messages[index];

    let mut fields = Vec::new();
    for field in &message.fields {
        if usize::from(field.offset) + usize::from(field.size) > payload.len() {
            continue;
        }
        let Ok(raw) = decode_field(field, payload) else {
            continue;
        };
        fields.push(DecodedField {
            name: field.name.clone(),
            raw,
            scale: field.scale,
        });
    }

    Some(DecodedFrame {
        message: message.name.clone(),
        fields,
    })
}

/// Build a frame for the named message from `field=value` assignments.
///
/// Numeric values are multiplied by the field's scale before encoding
/// (the inverse of the decode convention); bool fields take the tokens
/// `1`/`true`/`on` and `0`/`false`/`off`.
pub fn encode_frame(
    schema: &CanSchema,
    name: &str,
    assignments: &[(String, String)],
) -> Result<CanFrameData> {
    let index = schema
        .message_index_by_name(name)
        .ok_or_else(|| BridgeError::translation(format!("unknown CAN message '{}'", name)))?;
    let message = &schema.messages[index];

    let mut frame = CanFrameData::new(message.id, message.dlc);

    for (field_name, raw) in assignments {
        let field = message
            .field_index(field_name)
            .map(|i| &message.fields[i])
            .ok_or_else(|| {
                BridgeError::translation(format!(
                    "message '{}' has no field '{}'",
                    name, field_name
                ))
            })?;

        let value = match field.field_type {
            FieldType::Bool => FieldValue::Bool(parse_bool_token(raw).ok_or_else(|| {
                BridgeError::translation(format!("'{}' is not a bool value", raw))
            })?),
            other => {
                let v: f64 = raw.parse().map_err(|_| {
                    BridgeError::translation(format!("'{}' is not a number", raw))
                })?;
                let scaled = v * field.scale;
                match other {
                    FieldType::Uint16 => FieldValue::Unsigned(scaled as u16),
                    FieldType::Int16 => FieldValue::Signed(scaled as i16),
                    FieldType::Float32 => FieldValue::Float(scaled as f32),
                    FieldType::Bool => unreachable!(),
                }
            }
        };
        encode_field(field, frame.data_mut(), value)?;
    }

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parser::parse_can_document;

    fn schema() -> CanSchema {
        parse_can_document(
            r#"{"messages": [{
                "name": "status", "id": "0x351", "dlc": 8, "dir": "BOTH",
                "fields": [
                    {"name": "speed", "type": "uint16", "offset": 0, "size": 2, "scale": 10},
                    {"name": "temp", "type": "float", "offset": 2, "size": 4, "endian": "big"},
                    {"name": "on", "type": "bool", "offset": 6, "size": 1}
                ]
            }]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_decode_frame_applies_display_scale() {
        let schema = schema();
        let mut payload = [0u8; 8];
        payload[..2].copy_from_slice(&1200u16.to_le_bytes());
        payload[2..6].copy_from_slice(&23.5f32.to_be_bytes());
        payload[6] = 1;

        let decoded = decode_frame(&schema, 0x351, &payload).unwrap();
        assert_eq!(decoded.message, "status");
        assert_eq!(decoded.fields.len(), 3);
        assert_eq!(decoded.fields[0].value(), 120.0);
        assert_eq!(decoded.fields[1].raw, FieldValue::Float(23.5));
        assert_eq!(decoded.fields[2].raw, FieldValue::Bool(true));
        assert_eq!(decoded.fields[0].to_string(), "speed=120.000");
        assert_eq!(decoded.fields[2].to_string(), "on=true");
    }

    #[test]
    fn test_decode_skips_fields_past_payload() {
        let schema = schema();
        // only 2 bytes received: temp and on do not fit
        let decoded = decode_frame(&schema, 0x351, &[0x78, 0x00]).unwrap();
        assert_eq!(decoded.fields.len(), 1);
        assert_eq!(decoded.fields[0].name, "speed");
    }

    #[test]
    fn test_decode_unknown_id() {
        assert!(decode_frame(&schema(), 0x999, &[0u8; 8]).is_none());
    }

    #[test]
    fn test_encode_frame_by_name() {
        let schema = schema();
        let frame = encode_frame(
            &schema,
            "status",
            &[
                ("speed".into(), "120".into()),
                ("temp".into(), "23.5".into()),
                ("on".into(), "true".into()),
            ],
        )
        .unwrap();

        assert_eq!(frame.id(), 0x351);
        assert_eq!(frame.dlc(), 8);
        // 120 * scale 10 = 1200 raw
        assert_eq!(u16::from_le_bytes(frame.data()[..2].try_into().unwrap()), 1200);
        assert_eq!(
            f32::from_be_bytes(frame.data()[2..6].try_into().unwrap()),
            23.5
        );
        assert_eq!(frame.data()[6], 1);
    }

    #[test]
    fn test_encode_rejects_bad_input() {
        let schema = schema();
        assert!(encode_frame(&schema, "missing", &[]).is_err());
        assert!(encode_frame(&schema, "status", &[("rpm".into(), "1".into())]).is_err());
        assert!(encode_frame(&schema, "status", &[("speed".into(), "fast".into())]).is_err());
        assert!(encode_frame(&schema, "status", &[("on".into(), "maybe".into())]).is_err());
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let schema = schema();
        let frame = encode_frame(&schema, "status", &[("speed".into(), "120".into())]).unwrap();
        let decoded = decode_frame(&schema, frame.id(), frame.data()).unwrap();
        assert_eq!(decoded.fields[0].value(), 120.0);
    }
}
