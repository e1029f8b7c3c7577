//! Typed schema model.
//!
//! These types are the validated form of the three JSON documents the
//! bridge is configured with: CAN message layouts, Modbus resource layouts
//! and the RTU line parameters. They are produced by the tolerant parser
//! in [`crate::schema::parser`] and are immutable from then on; everything
//! downstream refers to entries by index into these collections.

use serde::Serialize;

/// Value type a field can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Unsigned 16-bit integer.
    Uint16,

    /// Signed 16-bit integer.
    Int16,

    /// IEEE-754 single-precision float.
    Float32,

    /// Boolean flag (bit 0 of a register, low byte of a CAN window).
    Bool,
}

impl FieldType {
    /// Parse a type token (case-insensitive). Note the float token is
    /// `"float"`, not `"float32"`.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("uint16") {
            Some(Self::Uint16)
        } else if s.eq_ignore_ascii_case("int16") {
            Some(Self::Int16)
        } else if s.eq_ignore_ascii_case("float") {
            Some(Self::Float32)
        } else if s.eq_ignore_ascii_case("bool") {
            Some(Self::Bool)
        } else {
            None
        }
    }

    /// Number of Modbus registers a field of this type occupies.
    pub const fn register_count(&self) -> u16 {
        match self {
            Self::Float32 => 2,
            _ => 1,
        }
    }

    /// Check whether a CAN byte window of `size` bytes can carry this type.
    pub const fn valid_can_size(&self, size: u8) -> bool {
        match self {
            Self::Float32 => size == 4,
            _ => size == 1 || size == 2,
        }
    }

    /// Canonical token for display.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Float32 => "float",
            Self::Bool => "bool",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Byte order of a multi-byte CAN field window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endian {
    /// Least significant byte first.
    #[default]
    Little,

    /// Most significant byte first.
    Big,
}

impl Endian {
    /// Parse an endian token. Only `"big"` (case-insensitive) selects
    /// big-endian; every other string falls back to little-endian.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("big") {
            Self::Big
        } else {
            Self::Little
        }
    }
}

/// Declared traffic direction of a CAN message, relative to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CanDirection {
    /// Message flows from the CAN network into the bridge.
    Net2Int,

    /// Message flows from the bridge onto the CAN network.
    Int2Net,

    /// Message flows both ways.
    Both,
}

impl CanDirection {
    /// Parse a direction token (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("NET2INT") {
            Some(Self::Net2Int)
        } else if s.eq_ignore_ascii_case("INT2NET") {
            Some(Self::Int2Net)
        } else if s.eq_ignore_ascii_case("BOTH") {
            Some(Self::Both)
        } else {
            None
        }
    }

    /// Canonical token for display.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Net2Int => "NET2INT",
            Self::Int2Net => "INT2NET",
            Self::Both => "BOTH",
        }
    }
}

/// Modbus function a resource is accessed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModbusFunction {
    /// Read Holding Registers (0x03).
    ReadHolding,

    /// Write Single Register (0x06).
    WriteSingle,

    /// Write Multiple Registers (0x10).
    WriteMultiple,
}

impl ModbusFunction {
    /// Parse a function token (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("read_holding") {
            Some(Self::ReadHolding)
        } else if s.eq_ignore_ascii_case("write_single") {
            Some(Self::WriteSingle)
        } else if s.eq_ignore_ascii_case("write_multiple") {
            Some(Self::WriteMultiple)
        } else {
            None
        }
    }

    /// Check whether the resource is read from the remote device.
    pub const fn is_read(&self) -> bool {
        matches!(self, Self::ReadHolding)
    }

    /// Canonical token for display.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReadHolding => "read_holding",
            Self::WriteSingle => "write_single",
            Self::WriteMultiple => "write_multiple",
        }
    }
}

/// One field inside a CAN message payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanFieldSpec {
    /// Field name, referenced by mapping rules. May be empty.
    pub name: String,

    /// Value type.
    pub field_type: FieldType,

    /// Byte offset inside the payload.
    pub offset: u16,

    /// Window width in bytes (1, 2 or 4, consistent with the type).
    pub size: u8,

    /// Byte order of the window.
    pub endian: Endian,

    /// Scale factor used on the Modbus side of a conversion.
    pub scale: f64,
}

/// One CAN message layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanMessageSpec {
    /// Message name, referenced by mapping rules.
    pub name: String,

    /// CAN identifier.
    pub id: u32,

    /// Payload length in bytes (0-8).
    pub dlc: u8,

    /// Declared traffic direction.
    pub direction: CanDirection,

    /// Fields laid out inside the payload.
    pub fields: Vec<CanFieldSpec>,
}

impl CanMessageSpec {
    /// Index of the first field with the given name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// One field inside a Modbus register block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModbusFieldSpec {
    /// Field name, referenced by mapping rules. May be empty.
    pub name: String,

    /// Value type. Float32 occupies two registers, low word first.
    pub field_type: FieldType,

    /// Register index inside the resource block.
    pub index: u16,

    /// Scale factor applied on this side of a conversion.
    pub scale: f64,
}

/// One Modbus resource: a contiguous block of holding registers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModbusResourceSpec {
    /// Resource name, referenced by mapping rules.
    pub name: String,

    /// Function the resource is accessed with.
    pub function: ModbusFunction,

    /// Starting register address.
    pub address: u16,

    /// Number of registers in the block.
    pub count: u16,

    /// Polling period in milliseconds. Zero disables polling.
    pub period_ms: u32,

    /// Fields laid out inside the block.
    pub fields: Vec<ModbusFieldSpec>,
}

impl ModbusResourceSpec {
    /// Index of the first field with the given name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Serial line parameters for the Modbus RTU side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RtuLineConfig {
    /// Baud rate.
    pub baud: u32,

    /// Parity character: 'N', 'E' or 'O'.
    pub parity: char,

    /// Number of stop bits.
    pub stop_bits: u8,

    /// Slave address of the remote device.
    pub slave_id: u8,
}

impl Default for RtuLineConfig {
    fn default() -> Self {
        Self {
            baud: 9600,
            parity: 'N',
            stop_bits: 1,
            slave_id: 1,
        }
    }
}

/// The parsed CAN document: bitrate plus accepted message layouts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanSchema {
    /// Bus bitrate in bits per second.
    pub bitrate: u32,

    /// Accepted message layouts, in document order.
    pub messages: Vec<CanMessageSpec>,
}

impl CanSchema {
    /// Index of the first message with the given name.
    pub fn message_index_by_name(&self, name: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.name == name)
    }

    /// Index of the first message with the given CAN identifier.
    pub fn message_index_by_id(&self, id: u32) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }
}

/// The parsed Modbus document: line parameters plus accepted resources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModbusSchema {
    /// Serial line parameters.
    pub rtu: RtuLineConfig,

    /// Accepted resources, in document order.
    pub resources: Vec<ModbusResourceSpec>,
}

impl ModbusSchema {
    /// Index of the first resource with the given name.
    pub fn resource_index_by_name(&self, name: &str) -> Option<usize> {
        self.resources.iter().position(|r| r.name == name)
    }
}
