//! Mapping-rule resolver.
//!
//! Takes the raw mapping document plus the two already-parsed schema sets
//! and produces the ordered rule list. Unlike schema parsing, resolution
//! is all-or-nothing: a rule with a bad direction, an unknown endpoint
//! name or an unknown field name rejects the whole document, because a
//! half-loaded rule set could silently write to the wrong register bank.
//! Only structurally malformed `map` entries (not an object, missing
//! `src`/`dst`) are skipped, and a rule left with no pairs at all is also
//! a document-level failure.
//!
//! Resolved rules hold indices into the schema sets, never references;
//! they stay valid exactly as long as the schemas they were resolved
//! against, which the [`Translator`](crate::mapping::Translator) owns
//! together with them.

use serde::Serialize;
use serde_json::Value;

use crate::core::error::{BridgeError, Result};
use crate::schema::model::{CanSchema, ModbusSchema};

/// Direction of a mapping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleDirection {
    /// Modbus registers feed a CAN frame.
    Mb2Can,

    /// A received CAN frame feeds Modbus registers.
    Can2Mb,
}

impl RuleDirection {
    /// Parse a direction token (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("MB2CAN") {
            Some(Self::Mb2Can)
        } else if s.eq_ignore_ascii_case("CAN2MB") {
            Some(Self::Can2Mb)
        } else {
            None
        }
    }

    /// Canonical token for display.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mb2Can => "MB2CAN",
            Self::Can2Mb => "CAN2MB",
        }
    }
}

impl std::fmt::Display for RuleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One resolved source→destination field correspondence.
///
/// `src` indexes into the source endpoint's field list and `dst` into the
/// destination endpoint's; which endpoint is which follows the rule
/// direction. The names are kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPair {
    /// Index of the source field.
    pub src: usize,

    /// Index of the destination field.
    pub dst: usize,

    /// Source field name as written in the document.
    pub src_name: String,

    /// Destination field name as written in the document.
    pub dst_name: String,
}

/// One resolved mapping rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingRule {
    /// Conversion direction.
    pub direction: RuleDirection,

    /// Name of the source endpoint (Modbus resource for MB2CAN, CAN
    /// message for CAN2MB).
    pub source: String,

    /// Name of the destination endpoint.
    pub dest: String,

    /// Index of the CAN message endpoint in the CAN schema.
    pub can_index: usize,

    /// Index of the Modbus resource endpoint in the Modbus schema.
    pub modbus_index: usize,

    /// Resolved field pairs, in document order.
    pub pairs: Vec<FieldPair>,
}

impl MappingRule {
    /// `source→dest` label for logs and events.
    pub fn label(&self) -> String {
        format!("{}→{}", self.source, self.dest)
    }
}

/// Parse and resolve the mapping document against the loaded schemas.
pub fn parse_mapping_document(
    json: &str,
    can: &CanSchema,
    modbus: &ModbusSchema,
) -> Result<Vec<MappingRule>> {
    let root: Value = serde_json::from_str(json)
        .map_err(|e| BridgeError::mapping(format!("mapping document is not valid JSON: {}", e)))?;

    let entries = root
        .get("rules")
        .and_then(|v| v.as_array())
        .ok_or_else(|| BridgeError::mapping("mapping document has no 'rules' array"))?;

    let mut rules = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        rules.push(resolve_rule(entry, idx, can, modbus)?);
    }

    if rules.is_empty() {
        return Err(BridgeError::mapping("mapping document contains no rules"));
    }
    Ok(rules)
}

fn resolve_rule(
    entry: &Value,
    idx: usize,
    can: &CanSchema,
    modbus: &ModbusSchema,
) -> Result<MappingRule> {
    let dir = entry
        .get("dir")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BridgeError::mapping(format!("rule {}: missing 'dir'", idx)))?;
    let direction = RuleDirection::parse(dir)
        .ok_or_else(|| BridgeError::mapping(format!("rule {}: invalid dir '{}'", idx, dir)))?;

    // Endpoint keys flip with direction: MB2CAN reads from_modbus.resource /
    // to_can.message, CAN2MB reads from_can.message / to_modbus.resource.
    let (source, dest) = match direction {
        RuleDirection::Mb2Can => (
            endpoint_name(entry, idx, "from_modbus", "resource")?,
            endpoint_name(entry, idx, "to_can", "message")?,
        ),
        RuleDirection::Can2Mb => (
            endpoint_name(entry, idx, "from_can", "message")?,
            endpoint_name(entry, idx, "to_modbus", "resource")?,
        ),
    };

    let (resource_name, message_name) = match direction {
        RuleDirection::Mb2Can => (&source, &dest),
        RuleDirection::Can2Mb => (&dest, &source),
    };
    let modbus_index = modbus.resource_index_by_name(resource_name).ok_or_else(|| {
        BridgeError::mapping(format!(
            "rule {}: Modbus resource '{}' not found",
            idx, resource_name
        ))
    })?;
    let can_index = can.message_index_by_name(message_name).ok_or_else(|| {
        BridgeError::mapping(format!(
            "rule {}: CAN message '{}' not found",
            idx, message_name
        ))
    })?;

    let map = entry
        .get("map")
        .and_then(|v| v.as_array())
        .ok_or_else(|| BridgeError::mapping(format!("rule {}: missing 'map' array", idx)))?;

    let message = &can.messages[can_index];
    let resource = &modbus.resources[modbus_index];

    let mut pairs = Vec::new();
    for pair in map {
        // Malformed pair entries are skipped, not fatal.
        let Some(obj) = pair.as_object() else { continue };
        let (Some(src_name), Some(dst_name)) = (
            obj.get("src").and_then(|v| v.as_str()),
            obj.get("dst").and_then(|v| v.as_str()),
        ) else {
            continue;
        };

        let (src, dst) = match direction {
            RuleDirection::Mb2Can => (
                resource.field_index(src_name),
                message.field_index(dst_name),
            ),
            RuleDirection::Can2Mb => (
                message.field_index(src_name),
                resource.field_index(dst_name),
            ),
        };
        let src = src.ok_or_else(|| {
            BridgeError::mapping(format!(
                "rule {}: source field '{}' not found in '{}'",
                idx, src_name, source
            ))
        })?;
        let dst = dst.ok_or_else(|| {
            BridgeError::mapping(format!(
                "rule {}: destination field '{}' not found in '{}'",
                idx, dst_name, dest
            ))
        })?;

        pairs.push(FieldPair {
            src,
            dst,
            src_name: src_name.to_string(),
            dst_name: dst_name.to_string(),
        });
    }

    if pairs.is_empty() {
        return Err(BridgeError::mapping(format!(
            "rule {} ({}→{}): no usable field pairs",
            idx, source, dest
        )));
    }

    tracing::debug!(
        "resolved rule {} {} {}→{} with {} pairs",
        idx,
        direction,
        source,
        dest,
        pairs.len()
    );

    Ok(MappingRule {
        direction,
        source,
        dest,
        can_index,
        modbus_index,
        pairs,
    })
}

/// Read `entry[key][field]` as a string, e.g. `from_modbus.resource`.
fn endpoint_name(entry: &Value, idx: usize, key: &str, field: &str) -> Result<String> {
    entry
        .get(key)
        .and_then(|v| v.get(field))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| BridgeError::mapping(format!("rule {}: missing {}.{}", idx, key, field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parser::{parse_can_document, parse_modbus_document};

    fn schemas() -> (CanSchema, ModbusSchema) {
        let can = parse_can_document(
            r#"{"messages": [{
                "name": "status", "id": "0x100", "dlc": 8, "dir": "BOTH",
                "fields": [
                    {"name": "speed", "type": "uint16", "offset": 0, "size": 2},
                    {"name": "power", "type": "float", "offset": 2, "size": 4}
                ]
            }]}"#,
        )
        .unwrap();
        let modbus = parse_modbus_document(
            r#"{"resources": [{
                "name": "drive", "fn": "read_holding", "address": 0, "count": 3,
                "fields": [
                    {"name": "speed_raw", "type": "uint16", "index": 0, "scale": 10},
                    {"name": "power_raw", "type": "float", "index": 1}
                ]
            }]}"#,
        )
        .unwrap();
        (can, modbus)
    }

    #[test]
    fn test_resolves_both_directions() {
        let (can, modbus) = schemas();
        let json = r#"{"rules": [
            {"dir": "MB2CAN",
             "from_modbus": {"resource": "drive"}, "to_can": {"message": "status"},
             "map": [{"src": "speed_raw", "dst": "speed"}]},
            {"dir": "can2mb",
             "from_can": {"message": "status"}, "to_modbus": {"resource": "drive"},
             "map": [{"src": "power", "dst": "power_raw"}]}
        ]}"#;
        let rules = parse_mapping_document(json, &can, &modbus).unwrap();
        assert_eq!(rules.len(), 2);

        assert_eq!(rules[0].direction, RuleDirection::Mb2Can);
        assert_eq!(rules[0].source, "drive");
        assert_eq!(rules[0].dest, "status");
        assert_eq!(rules[0].can_index, 0);
        assert_eq!(rules[0].modbus_index, 0);
        assert_eq!(rules[0].pairs, vec![FieldPair {
            src: 0,
            dst: 0,
            src_name: "speed_raw".into(),
            dst_name: "speed".into(),
        }]);

        assert_eq!(rules[1].direction, RuleDirection::Can2Mb);
        assert_eq!(rules[1].label(), "status→drive");
        // source index is into the CAN message, destination into the resource
        assert_eq!(rules[1].pairs[0].src, 1);
        assert_eq!(rules[1].pairs[0].dst, 1);
    }

    #[test]
    fn test_invalid_dir_fails_whole_document() {
        let (can, modbus) = schemas();
        let json = r#"{"rules": [
            {"dir": "MB2CAN",
             "from_modbus": {"resource": "drive"}, "to_can": {"message": "status"},
             "map": [{"src": "speed_raw", "dst": "speed"}]},
            {"dir": "sideways",
             "from_modbus": {"resource": "drive"}, "to_can": {"message": "status"},
             "map": [{"src": "speed_raw", "dst": "speed"}]}
        ]}"#;
        assert!(matches!(
            parse_mapping_document(json, &can, &modbus),
            Err(BridgeError::Mapping(_))
        ));
    }

    #[test]
    fn test_unknown_endpoint_fails() {
        let (can, modbus) = schemas();
        let json = r#"{"rules": [
            {"dir": "MB2CAN",
             "from_modbus": {"resource": "missing"}, "to_can": {"message": "status"},
             "map": [{"src": "speed_raw", "dst": "speed"}]}
        ]}"#;
        assert!(parse_mapping_document(json, &can, &modbus).is_err());
    }

    #[test]
    fn test_unknown_field_fails_whole_document() {
        let (can, modbus) = schemas();
        let json = r#"{"rules": [
            {"dir": "MB2CAN",
             "from_modbus": {"resource": "drive"}, "to_can": {"message": "status"},
             "map": [{"src": "speed_raw", "dst": "rpm"}]}
        ]}"#;
        let err = parse_mapping_document(json, &can, &modbus).unwrap_err();
        assert!(err.to_string().contains("rpm"));
    }

    #[test]
    fn test_malformed_pairs_skipped_silently() {
        let (can, modbus) = schemas();
        let json = r#"{"rules": [
            {"dir": "MB2CAN",
             "from_modbus": {"resource": "drive"}, "to_can": {"message": "status"},
             "map": [
                "not an object",
                {"src": "speed_raw"},
                {"dst": "speed"},
                {"src": "speed_raw", "dst": "speed"}
             ]}
        ]}"#;
        let rules = parse_mapping_document(json, &can, &modbus).unwrap();
        assert_eq!(rules[0].pairs.len(), 1);
    }

    #[test]
    fn test_rule_without_pairs_fails() {
        let (can, modbus) = schemas();
        let json = r#"{"rules": [
            {"dir": "MB2CAN",
             "from_modbus": {"resource": "drive"}, "to_can": {"message": "status"},
             "map": [{"src": "speed_raw"}]}
        ]}"#;
        assert!(parse_mapping_document(json, &can, &modbus).is_err());
    }

    #[test]
    fn test_structural_failures() {
        let (can, modbus) = schemas();
        assert!(parse_mapping_document("not json", &can, &modbus).is_err());
        assert!(parse_mapping_document("{}", &can, &modbus).is_err());
        assert!(parse_mapping_document(r#"{"rules": "x"}"#, &can, &modbus).is_err());
        // no rules at all is a failure too
        assert!(parse_mapping_document(r#"{"rules": []}"#, &can, &modbus).is_err());
    }

    #[test]
    fn test_missing_map_array_fails() {
        let (can, modbus) = schemas();
        let json = r#"{"rules": [
            {"dir": "MB2CAN",
             "from_modbus": {"resource": "drive"}, "to_can": {"message": "status"}}
        ]}"#;
        assert!(parse_mapping_document(json, &can, &modbus).is_err());
    }
}
