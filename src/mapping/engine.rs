//! Translation engine.
//!
//! A [`Translator`] is the executable form of one loaded configuration:
//! it owns the two schema sets and the resolved rules, and performs the
//! per-frame / per-poll conversions. It does no I/O and holds no interior
//! mutability; configuration reload replaces the whole object behind an
//! `Arc`, so a rule can never observe a half-updated schema.
//!
//! Translation is fail-fast: the first bounds violation or stale rule
//! index aborts the whole call, and the caller must discard any output
//! it handed in. This is deliberately stricter than schema parsing,
//! where a bad entry is merely skipped.

use crate::codec::field::{
    f32_from_registers, f32_to_registers, field_window, field_window_mut, read_f32, read_flag,
    read_i16, read_u16, write_f32, write_u16,
};
use crate::core::data::CanFrameData;
use crate::core::error::{BridgeError, Result};
use crate::mapping::resolver::{self, MappingRule, RuleDirection};
use crate::schema::model::{CanMessageSpec, CanSchema, FieldType, ModbusResourceSpec, ModbusSchema};

/// An immutable translation plan: schemas plus resolved rules.
#[derive(Debug, Clone)]
pub struct Translator {
    can: CanSchema,
    modbus: ModbusSchema,
    rules: Vec<MappingRule>,
}

impl Translator {
    /// Resolve the mapping document against the two schemas.
    pub fn resolve(can: CanSchema, modbus: ModbusSchema, mapping_json: &str) -> Result<Self> {
        let rules = resolver::parse_mapping_document(mapping_json, &can, &modbus)?;
        Ok(Self { can, modbus, rules })
    }

    /// The CAN schema this plan was resolved against.
    pub fn can_schema(&self) -> &CanSchema {
        &self.can
    }

    /// The Modbus schema this plan was resolved against.
    pub fn modbus_schema(&self) -> &ModbusSchema {
        &self.modbus
    }

    /// Resolved rules, in document order.
    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    /// The CAN message endpoint of a rule.
    pub fn message(&self, rule: &MappingRule) -> Result<&CanMessageSpec> {
        self.can.messages.get(rule.can_index).ok_or_else(|| {
            BridgeError::translation(format!("rule {}: stale CAN message index", rule.label()))
        })
    }

    /// The Modbus resource endpoint of a rule.
    pub fn resource(&self, rule: &MappingRule) -> Result<&ModbusResourceSpec> {
        self.modbus.resources.get(rule.modbus_index).ok_or_else(|| {
            BridgeError::translation(format!("rule {}: stale Modbus resource index", rule.label()))
        })
    }

    /// Build a CAN frame from a block of Modbus registers (MB2CAN).
    ///
    /// The frame header comes from the destination message spec and the
    /// payload is zero-filled up to its declared length before the field
    /// pairs are applied in rule order.
    pub fn build_can_frame(&self, rule: &MappingRule, regs: &[u16]) -> Result<CanFrameData> {
        if rule.direction != RuleDirection::Mb2Can {
            return Err(BridgeError::translation(format!(
                "rule {} is {}, not MB2CAN",
                rule.label(),
                rule.direction
            )));
        }
        let resource = self.resource(rule)?;
        let message = self.message(rule)?;

        let mut frame = CanFrameData::new(message.id, message.dlc);

        for pair in &rule.pairs {
            let src = resource.fields.get(pair.src).ok_or_else(|| {
                stale_field(rule, &pair.src_name)
            })?;
            let dst = message.fields.get(pair.dst).ok_or_else(|| {
                stale_field(rule, &pair.dst_name)
            })?;

            let window = field_window_mut(frame.data_mut(), dst.offset, dst.size)?;

            match src.field_type {
                FieldType::Bool => {
                    let reg = register(regs, src.index)?;
                    write_u16(window, reg & 0x0001, dst.endian)?;
                }
                FieldType::Uint16 => {
                    let u = register(regs, src.index)?;
                    if dst.field_type == FieldType::Float32 {
                        write_f32(window, f32::from(u) / src.scale as f32, dst.endian)?;
                    } else {
                        write_u16(window, (f64::from(u) / src.scale) as u16, dst.endian)?;
                    }
                }
                FieldType::Int16 => {
                    let s = register(regs, src.index)? as i16;
                    if dst.field_type == FieldType::Float32 {
                        write_f32(window, f32::from(s) / src.scale as f32, dst.endian)?;
                    } else {
                        write_u16(window, (f64::from(s) / src.scale) as i16 as u16, dst.endian)?;
                    }
                }
                FieldType::Float32 => {
                    let lo = register(regs, src.index)?;
                    let hi = register(regs, src.index + 1)?;
                    let f = f32_from_registers(lo, hi) / src.scale as f32;
                    write_f32(window, f, dst.endian)?;
                }
            }
        }

        Ok(frame)
    }

    /// Fill Modbus registers from a received CAN payload (CAN2MB).
    ///
    /// `regs` is the caller's register image for the destination resource;
    /// Bool pairs modify only bit 0 of their register and leave the rest
    /// of that register intact. On failure the image contents are
    /// unspecified and the caller must discard them.
    pub fn extract_registers(
        &self,
        rule: &MappingRule,
        payload: &[u8],
        regs: &mut [u16],
    ) -> Result<()> {
        if rule.direction != RuleDirection::Can2Mb {
            return Err(BridgeError::translation(format!(
                "rule {} is {}, not CAN2MB",
                rule.label(),
                rule.direction
            )));
        }
        let message = self.message(rule)?;
        let resource = self.resource(rule)?;

        for pair in &rule.pairs {
            let src = message.fields.get(pair.src).ok_or_else(|| {
                stale_field(rule, &pair.src_name)
            })?;
            let dst = resource.fields.get(pair.dst).ok_or_else(|| {
                stale_field(rule, &pair.dst_name)
            })?;

            let window = field_window(payload, src.offset, src.size)?;
            let index = dst.index as usize;

            match dst.field_type {
                FieldType::Bool => {
                    let v = read_flag(window, src.endian)?;
                    let slot = register_mut(regs, dst.index)?;
                    *slot = (*slot & !0x0001) | u16::from(v);
                }
                FieldType::Uint16 => {
                    let u = read_u16(window, src.endian)?;
                    *register_mut(regs, dst.index)? = (f64::from(u) * dst.scale) as u16;
                }
                FieldType::Int16 => {
                    let s = read_i16(window, src.endian)?;
                    *register_mut(regs, dst.index)? = (f64::from(s) * dst.scale) as i16 as u16;
                }
                FieldType::Float32 => {
                    let f = read_f32(window, src.endian)?;
                    let (lo, hi) = f32_to_registers(f * dst.scale as f32);
                    if index + 1 >= regs.len() {
                        return Err(BridgeError::translation(format!(
                            "register pair {}..{} outside buffer of {}",
                            index,
                            index + 2,
                            regs.len()
                        )));
                    }
                    regs[index] = lo;
                    regs[index + 1] = hi;
                }
            }
        }

        Ok(())
    }
}

fn register(regs: &[u16], index: u16) -> Result<u16> {
    regs.get(index as usize).copied().ok_or_else(|| {
        BridgeError::translation(format!(
            "register index {} outside buffer of {}",
            index,
            regs.len()
        ))
    })
}

fn register_mut(regs: &mut [u16], index: u16) -> Result<&mut u16> {
    let len = regs.len();
    regs.get_mut(index as usize).ok_or_else(|| {
        BridgeError::translation(format!(
            "register index {} outside buffer of {}",
            index, len
        ))
    })
}

fn stale_field(rule: &MappingRule, name: &str) -> BridgeError {
    BridgeError::translation(format!(
        "rule {}: stale field index for '{}'",
        rule.label(),
        name
    ))
}
