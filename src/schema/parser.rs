//! Tolerant JSON parsers for the CAN and Modbus schema documents.
//!
//! Parsing is tolerant at the entry level and strict at the document
//! level: a malformed message, resource or field is skipped with a
//! warning, but an unreadable document, a missing top-level array or a
//! document whose entries were all skipped is an error. A message whose
//! fields were all skipped is still accepted; it simply cannot be
//! referenced by mapping rules in a useful way.

use serde_json::{Map, Value};

use crate::core::error::{BridgeError, Result};
use crate::schema::model::{
    CanDirection, CanFieldSpec, CanMessageSpec, CanSchema, Endian, FieldType, ModbusFieldSpec,
    ModbusFunction, ModbusResourceSpec, ModbusSchema, RtuLineConfig,
};

/// Bitrate assumed when the CAN document does not specify one.
pub const DEFAULT_CAN_BITRATE: u32 = 500_000;

/// Parse an unsigned integer the way `strtoul` with base 0 does.
///
/// Leading whitespace is skipped. A `0x`/`0X` prefix selects hex, a bare
/// leading zero selects octal, anything else is decimal. Parsing stops at
/// the first character that is not a digit of the selected base and
/// succeeds as long as at least one digit was consumed, so `"0x"` parses
/// as 0 (the zero counts) and `"123abc"` parses as 123. Accumulation
/// saturates at `u32::MAX` instead of overflowing.
pub fn parse_uint_flexible(s: &str) -> Option<u32> {
    let b = s.trim_start().as_bytes();
    if b.len() >= 3 && b[0] == b'0' && (b[1] == b'x' || b[1] == b'X') && b[2].is_ascii_hexdigit() {
        return Some(accumulate(&b[2..], 16));
    }
    if b.first() == Some(&b'0') {
        // the leading zero is itself a consumed digit
        return Some(accumulate(&b[1..], 8));
    }
    if b.first().is_some_and(|c| c.is_ascii_digit()) {
        return Some(accumulate(b, 10));
    }
    None
}

fn accumulate(digits: &[u8], base: u32) -> u32 {
    let mut v: u32 = 0;
    for &c in digits {
        let d = match (c as char).to_digit(base) {
            Some(d) => d,
            None => break,
        };
        v = v.saturating_mul(base).saturating_add(d);
    }
    v
}

/// Parse a boolean token: `1`/`true`/`on` or `0`/`false`/`off`,
/// case-insensitive.
pub fn parse_bool_token(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("1") || s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("on")
    {
        Some(true)
    } else if s.eq_ignore_ascii_case("0")
        || s.eq_ignore_ascii_case("false")
        || s.eq_ignore_ascii_case("off")
    {
        Some(false)
    } else {
        None
    }
}

// ============================================================================
// CAN document
// ============================================================================

/// Parse the CAN schema document.
pub fn parse_can_document(json: &str) -> Result<CanSchema> {
    let root: Value = serde_json::from_str(json)
        .map_err(|e| BridgeError::schema(format!("CAN document is not valid JSON: {}", e)))?;

    let mut bitrate = DEFAULT_CAN_BITRATE;
    if let Some(v) = root.get("bitrate") {
        match v.as_u64() {
            Some(b) if b > 0 && b <= u64::from(u32::MAX) => bitrate = b as u32,
            _ => tracing::warn!(
                "CAN bitrate is not a usable number, keeping {}",
                DEFAULT_CAN_BITRATE
            ),
        }
    }

    let entries = root
        .get("messages")
        .and_then(|v| v.as_array())
        .ok_or_else(|| BridgeError::schema("CAN document has no 'messages' array"))?;

    let mut messages = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        match parse_can_message(entry) {
            Ok(msg) => messages.push(msg),
            Err(reason) => tracing::warn!("CAN message {} skipped: {}", idx, reason),
        }
    }

    if messages.is_empty() {
        return Err(BridgeError::schema(
            "CAN document contains no usable messages",
        ));
    }
    Ok(CanSchema { bitrate, messages })
}

fn parse_can_message(entry: &Value) -> std::result::Result<CanMessageSpec, String> {
    let obj = entry.as_object().ok_or("entry is not an object")?;
    let name = string_field(obj, "name").unwrap_or_default().to_string();

    let id = match obj.get("id") {
        Some(Value::String(s)) => parse_uint_flexible(s),
        Some(v) => v
            .as_u64()
            .filter(|n| *n <= u64::from(u32::MAX))
            .map(|n| n as u32),
        None => None,
    }
    .ok_or("invalid or missing id")?;

    let dlc = obj
        .get("dlc")
        .ok_or("missing dlc")?
        .as_i64()
        .ok_or("dlc is not an integer")?;
    if !(0..=8).contains(&dlc) {
        return Err(format!("dlc {} out of range", dlc));
    }
    let dlc = dlc as u8;

    let dir = string_field(obj, "dir").ok_or("missing dir")?;
    let direction = CanDirection::parse(dir).ok_or_else(|| format!("invalid dir '{}'", dir))?;

    let entries = obj
        .get("fields")
        .and_then(|v| v.as_array())
        .ok_or("'fields' is missing or not an array")?;

    let mut fields = Vec::new();
    for (idx, field) in entries.iter().enumerate() {
        match parse_can_field(field, dlc) {
            Ok(spec) => fields.push(spec),
            Err(reason) => tracing::warn!(
                "field {} of CAN message '{}' skipped: {}",
                idx,
                name,
                reason
            ),
        }
    }

    Ok(CanMessageSpec {
        name,
        id,
        dlc,
        direction,
        fields,
    })
}

fn parse_can_field(entry: &Value, dlc: u8) -> std::result::Result<CanFieldSpec, String> {
    let obj = entry.as_object().ok_or("entry is not an object")?;
    let name = string_field(obj, "name").unwrap_or_default().to_string();

    let field_type = string_field(obj, "type")
        .and_then(FieldType::parse)
        .ok_or("unknown type")?;

    let offset = integer_field(obj, "offset", u64::from(u16::MAX))? as u16;
    let size = integer_field(obj, "size", u64::from(u8::MAX))? as u8;
    if size == 0 {
        return Err("zero size".to_string());
    }
    if !field_type.valid_can_size(size) {
        return Err(format!(
            "size {} inconsistent with type {}",
            size, field_type
        ));
    }
    if u32::from(offset) + u32::from(size) > u32::from(dlc) {
        return Err(format!(
            "window {}+{} exceeds dlc {}",
            offset, size, dlc
        ));
    }

    let endian = Endian::parse(string_field(obj, "endian").unwrap_or("little"));
    let scale = obj.get("scale").and_then(|v| v.as_f64()).unwrap_or(1.0);

    Ok(CanFieldSpec {
        name,
        field_type,
        offset,
        size,
        endian,
        scale,
    })
}

// ============================================================================
// Modbus document
// ============================================================================

/// Parse the Modbus schema document.
pub fn parse_modbus_document(json: &str) -> Result<ModbusSchema> {
    let root: Value = serde_json::from_str(json)
        .map_err(|e| BridgeError::schema(format!("Modbus document is not valid JSON: {}", e)))?;

    let rtu = parse_rtu_block(root.get("rtu"));

    let entries = root
        .get("resources")
        .and_then(|v| v.as_array())
        .ok_or_else(|| BridgeError::schema("Modbus document has no 'resources' array"))?;

    let mut resources = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        match parse_modbus_resource(entry) {
            Ok(res) => resources.push(res),
            Err(reason) => tracing::warn!("Modbus resource {} skipped: {}", idx, reason),
        }
    }

    if resources.is_empty() {
        return Err(BridgeError::schema(
            "Modbus document contains no usable resources",
        ));
    }
    Ok(ModbusSchema { rtu, resources })
}

/// The rtu block and every parameter in it are optional; unusable values
/// keep their defaults.
fn parse_rtu_block(block: Option<&Value>) -> RtuLineConfig {
    let mut rtu = RtuLineConfig::default();
    let Some(obj) = block.and_then(|v| v.as_object()) else {
        return rtu;
    };

    if let Some(v) = obj.get("baud") {
        match v.as_u64() {
            Some(b) if b > 0 && b <= u64::from(u32::MAX) => rtu.baud = b as u32,
            _ => tracing::warn!("rtu baud is not a usable number, keeping {}", rtu.baud),
        }
    }
    if let Some(v) = obj.get("parity") {
        match v.as_str().and_then(|s| s.chars().next()) {
            Some(c) => rtu.parity = c,
            None => tracing::warn!("rtu parity is not a usable string, keeping {}", rtu.parity),
        }
    }
    if let Some(v) = obj.get("stop_bits") {
        match v.as_u64().filter(|n| *n <= u64::from(u8::MAX)) {
            Some(n) => rtu.stop_bits = n as u8,
            None => tracing::warn!("rtu stop_bits is not a usable number, keeping {}", rtu.stop_bits),
        }
    }
    if let Some(v) = obj.get("slave_id") {
        match v.as_u64().filter(|n| *n <= u64::from(u8::MAX)) {
            Some(n) => rtu.slave_id = n as u8,
            None => tracing::warn!("rtu slave_id is not a usable number, keeping {}", rtu.slave_id),
        }
    }
    rtu
}

fn parse_modbus_resource(entry: &Value) -> std::result::Result<ModbusResourceSpec, String> {
    let obj = entry.as_object().ok_or("entry is not an object")?;
    let name = string_field(obj, "name").unwrap_or_default().to_string();

    let function = string_field(obj, "fn")
        .and_then(ModbusFunction::parse)
        .ok_or("unknown fn")?;

    let address = integer_field(obj, "address", u64::from(u16::MAX))? as u16;
    let count = integer_field(obj, "count", u64::from(u16::MAX))? as u16;
    let period_ms = integer_field(obj, "period_ms", u64::from(u32::MAX))? as u32;

    let entries = obj
        .get("fields")
        .and_then(|v| v.as_array())
        .ok_or("'fields' is missing or not an array")?;

    let mut fields = Vec::new();
    for (idx, field) in entries.iter().enumerate() {
        match parse_modbus_field(field) {
            Ok(spec) => fields.push(spec),
            Err(reason) => tracing::warn!(
                "field {} of Modbus resource '{}' skipped: {}",
                idx,
                name,
                reason
            ),
        }
    }

    Ok(ModbusResourceSpec {
        name,
        function,
        address,
        count,
        period_ms,
        fields,
    })
}

fn parse_modbus_field(entry: &Value) -> std::result::Result<ModbusFieldSpec, String> {
    let obj = entry.as_object().ok_or("entry is not an object")?;
    let name = string_field(obj, "name").unwrap_or_default().to_string();

    let field_type = string_field(obj, "type")
        .and_then(FieldType::parse)
        .ok_or("unknown type")?;

    let index = integer_field(obj, "index", u64::from(u16::MAX))? as u16;
    let scale = obj.get("scale").and_then(|v| v.as_f64()).unwrap_or(1.0);

    Ok(ModbusFieldSpec {
        name,
        field_type,
        index,
        scale,
    })
}

// ============================================================================
// Entry-level helpers
// ============================================================================

fn string_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(|v| v.as_str())
}

/// A missing key is 0; a present key must be a non-negative integer not
/// above `max`, otherwise the entry is rejected.
fn integer_field(
    obj: &Map<String, Value>,
    key: &str,
    max: u64,
) -> std::result::Result<u64, String> {
    match obj.get(key) {
        None => Ok(0),
        Some(v) => v
            .as_u64()
            .filter(|n| *n <= max)
            .ok_or_else(|| format!("invalid {}", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uint_flexible() {
        assert_eq!(parse_uint_flexible("849"), Some(849));
        assert_eq!(parse_uint_flexible("0x351"), Some(0x351));
        assert_eq!(parse_uint_flexible("0X1f"), Some(31));
        assert_eq!(parse_uint_flexible("0755"), Some(0o755));
        assert_eq!(parse_uint_flexible("  42"), Some(42));
        // stops at the first invalid digit, keeping what was consumed
        assert_eq!(parse_uint_flexible("123abc"), Some(123));
        assert_eq!(parse_uint_flexible("09"), Some(0));
        // a bare "0x" still consumed the zero
        assert_eq!(parse_uint_flexible("0x"), Some(0));
        assert_eq!(parse_uint_flexible("0xZZ"), Some(0));
        // saturates instead of overflowing
        assert_eq!(parse_uint_flexible("99999999999"), Some(u32::MAX));
        assert_eq!(parse_uint_flexible(""), None);
        assert_eq!(parse_uint_flexible("abc"), None);
        assert_eq!(parse_uint_flexible("-5"), None);
    }

    #[test]
    fn test_parse_bool_token() {
        assert_eq!(parse_bool_token("1"), Some(true));
        assert_eq!(parse_bool_token("TRUE"), Some(true));
        assert_eq!(parse_bool_token("on"), Some(true));
        assert_eq!(parse_bool_token("0"), Some(false));
        assert_eq!(parse_bool_token("False"), Some(false));
        assert_eq!(parse_bool_token("OFF"), Some(false));
        assert_eq!(parse_bool_token("yes"), None);
    }

    #[test]
    fn test_can_document_minimal() {
        let json = r#"{
            "bitrate": 250000,
            "messages": [{
                "name": "status",
                "id": "0x351",
                "dlc": 8,
                "dir": "BOTH",
                "fields": [
                    {"name": "speed", "type": "uint16", "offset": 0, "size": 2, "scale": 10},
                    {"name": "temp", "type": "float", "offset": 2, "size": 4, "endian": "big"}
                ]
            }]
        }"#;
        let schema = parse_can_document(json).unwrap();
        assert_eq!(schema.bitrate, 250_000);
        assert_eq!(schema.messages.len(), 1);

        let msg = &schema.messages[0];
        assert_eq!(msg.id, 0x351);
        assert_eq!(msg.fields.len(), 2);
        assert_eq!(msg.fields[0].scale, 10.0);
        assert_eq!(msg.fields[1].endian, Endian::Big);
        assert_eq!(msg.fields[1].field_type, FieldType::Float32);
    }

    #[test]
    fn test_can_bitrate_defaults() {
        let json = r#"{"messages": [
            {"name": "a", "id": 16, "dlc": 2, "dir": "NET2INT", "fields": []}
        ]}"#;
        let schema = parse_can_document(json).unwrap();
        assert_eq!(schema.bitrate, DEFAULT_CAN_BITRATE);
    }

    #[test]
    fn test_can_skips_bad_entries() {
        let json = r#"{"messages": [
            {"name": "bad_id", "id": "nope", "dlc": 8, "dir": "BOTH", "fields": []},
            {"name": "no_dlc", "id": 1, "dir": "BOTH", "fields": []},
            {"name": "dlc_range", "id": 2, "dlc": 9, "dir": "BOTH", "fields": []},
            {"name": "bad_dir", "id": 3, "dlc": 8, "dir": "sideways", "fields": []},
            {"name": "no_fields", "id": 4, "dlc": 8, "dir": "BOTH"},
            {"name": "good", "id": 5, "dlc": 8, "dir": "BOTH", "fields": []}
        ]}"#;
        let schema = parse_can_document(json).unwrap();
        assert_eq!(schema.messages.len(), 1);
        assert_eq!(schema.messages[0].name, "good");
    }

    #[test]
    fn test_can_field_skip_rules() {
        let json = r#"{"messages": [{
            "name": "m", "id": 1, "dlc": 4, "dir": "BOTH",
            "fields": [
                {"name": "ok", "type": "uint16", "offset": 0, "size": 2},
                {"name": "unknown_type", "type": "double", "offset": 0, "size": 2},
                {"name": "zero_size", "type": "uint16", "offset": 0, "size": 0},
                {"name": "bad_width", "type": "float", "offset": 0, "size": 2},
                {"name": "past_dlc", "type": "uint16", "offset": 3, "size": 2}
            ]
        }]}"#;
        let schema = parse_can_document(json).unwrap();
        let msg = &schema.messages[0];
        assert_eq!(msg.fields.len(), 1);
        assert_eq!(msg.fields[0].name, "ok");
    }

    #[test]
    fn test_can_message_without_valid_fields_is_kept() {
        let json = r#"{"messages": [{
            "name": "m", "id": 1, "dlc": 2, "dir": "BOTH",
            "fields": [{"name": "broken", "type": "wat", "offset": 0, "size": 2}]
        }]}"#;
        let schema = parse_can_document(json).unwrap();
        assert_eq!(schema.messages.len(), 1);
        assert!(schema.messages[0].fields.is_empty());
    }

    #[test]
    fn test_can_document_failures() {
        assert!(matches!(
            parse_can_document("not json"),
            Err(BridgeError::Schema(_))
        ));
        assert!(matches!(
            parse_can_document(r#"{"bitrate": 500000}"#),
            Err(BridgeError::Schema(_))
        ));
        assert!(matches!(
            parse_can_document(r#"{"messages": "x"}"#),
            Err(BridgeError::Schema(_))
        ));
        // all entries skipped -> document rejected
        assert!(matches!(
            parse_can_document(r#"{"messages": [{"id": "bad"}]}"#),
            Err(BridgeError::Schema(_))
        ));
    }

    #[test]
    fn test_modbus_document_minimal() {
        let json = r#"{
            "rtu": {"baud": 19200, "parity": "E", "stop_bits": 2, "slave_id": 7},
            "resources": [{
                "name": "drive",
                "fn": "read_holding",
                "address": 100,
                "count": 4,
                "period_ms": 500,
                "fields": [
                    {"name": "speed", "type": "uint16", "index": 0, "scale": 10},
                    {"name": "power", "type": "float", "index": 2}
                ]
            }]
        }"#;
        let schema = parse_modbus_document(json).unwrap();
        assert_eq!(schema.rtu.baud, 19_200);
        assert_eq!(schema.rtu.parity, 'E');
        assert_eq!(schema.rtu.stop_bits, 2);
        assert_eq!(schema.rtu.slave_id, 7);

        let res = &schema.resources[0];
        assert_eq!(res.function, ModbusFunction::ReadHolding);
        assert_eq!(res.period_ms, 500);
        assert_eq!(res.fields[1].field_type, FieldType::Float32);
        assert_eq!(res.fields[1].scale, 1.0);
    }

    #[test]
    fn test_modbus_rtu_block_optional_and_partial() {
        let json = r#"{"resources": [
            {"name": "r", "fn": "write_single", "address": 1, "count": 1, "fields": []}
        ]}"#;
        let schema = parse_modbus_document(json).unwrap();
        assert_eq!(schema.rtu, RtuLineConfig::default());

        let json = r#"{
            "rtu": {"baud": 38400},
            "resources": [
                {"name": "r", "fn": "write_single", "address": 1, "count": 1, "fields": []}
            ]
        }"#;
        let schema = parse_modbus_document(json).unwrap();
        assert_eq!(schema.rtu.baud, 38_400);
        assert_eq!(schema.rtu.parity, 'N');
        assert_eq!(schema.rtu.slave_id, 1);
    }

    #[test]
    fn test_modbus_skip_rules() {
        let json = r#"{"resources": [
            {"name": "bad_fn", "fn": "read_input", "address": 0, "count": 1, "fields": []},
            {"name": "no_fields", "fn": "read_holding", "address": 0, "count": 1},
            {"name": "good", "fn": "write_multiple", "address": 10, "count": 3, "fields": [
                {"name": "ok", "type": "int16", "index": 1},
                {"name": "bad_type", "type": "ascii", "index": 2}
            ]}
        ]}"#;
        let schema = parse_modbus_document(json).unwrap();
        assert_eq!(schema.resources.len(), 1);

        let res = &schema.resources[0];
        assert_eq!(res.name, "good");
        assert_eq!(res.fields.len(), 1);
        assert_eq!(res.fields[0].name, "ok");
    }

    #[test]
    fn test_modbus_document_failures() {
        assert!(parse_modbus_document("{}").is_err());
        assert!(parse_modbus_document(r#"{"resources": []}"#).is_err());
        assert!(parse_modbus_document(r#"{"resources": [{"fn": "bogus", "fields": []}]}"#).is_err());
    }

    #[test]
    fn test_missing_numbers_default_to_zero() {
        let json = r#"{"resources": [
            {"name": "r", "fn": "read_holding", "fields": [
                {"name": "f", "type": "bool"}
            ]}
        ]}"#;
        let schema = parse_modbus_document(json).unwrap();
        let res = &schema.resources[0];
        assert_eq!(res.address, 0);
        assert_eq!(res.count, 0);
        assert_eq!(res.period_ms, 0);
        assert_eq!(res.fields[0].index, 0);
    }
}
