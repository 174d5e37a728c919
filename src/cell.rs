//! Registry cells and the type tags they carry.
//!
//! Cells are the fundamental allocation unit within hive bins. A cell starts
//! with a signed 32-bit length (negative when allocated) followed by its
//! payload; most payloads begin with a 2-byte signature identifying their
//! type.

use crate::error::{RegistryError, Result};
use crate::hbin::BinMap;
use crate::utils::{cell_offset_to_absolute, read_i32_le};

/// Size of the length prefix of every cell.
pub const CELL_HEADER_SIZE: usize = 4;

/// A cell read from the hive. The payload borrows the hive data.
#[derive(Debug, Clone, Copy)]
pub struct Cell<'a> {
    /// Offset of this cell relative to the first hbin.
    pub offset: u32,

    /// Declared length, including the length field itself. Negative when allocated.
    pub length: i32,

    /// Cell data (excluding the length field).
    pub payload: &'a [u8],
}

impl<'a> Cell<'a> {
    /// Reads the cell at `offset` from the full hive data.
    ///
    /// # Errors
    ///
    /// Returns `CorruptHive` if the offset does not fall inside a bin's cell
    /// area, the length is zero or smaller than its own prefix, or the cell
    /// extends past its bin or the end of the file.
    pub fn read(data: &'a [u8], bins: &BinMap, offset: u32) -> Result<Self> {
        let bin = bins
            .locate(offset)
            .ok_or_else(|| RegistryError::corrupt(offset, "cell offset is outside every hive bin"))?;
        let bin_end = bin.offset as usize + bin.size as usize;

        let abs_offset = cell_offset_to_absolute(offset)? as usize;
        if abs_offset + CELL_HEADER_SIZE > data.len() {
            return Err(RegistryError::corrupt(offset, "cell offset is past the end of the file"));
        }

        let length = read_i32_le(data, abs_offset)?;
        let abs_size = length.unsigned_abs() as usize;

        if abs_size == 0 {
            return Err(RegistryError::corrupt(offset, "cell length is zero"));
        }
        if abs_size < CELL_HEADER_SIZE {
            return Err(RegistryError::corrupt(
                offset,
                format!("cell length {} is smaller than its header", length),
            ));
        }

        let data_end = abs_offset + abs_size;
        if data_end > data.len() || offset as usize + abs_size > bin_end {
            return Err(RegistryError::corrupt(
                offset,
                format!(
                    "cell length {} extends past the end of its hive bin at {:#x}",
                    length, bin_end
                ),
            ));
        }

        Ok(Cell {
            offset,
            length,
            payload: &data[abs_offset + CELL_HEADER_SIZE..data_end],
        })
    }

    /// Returns true if this cell is allocated (negative length).
    pub fn is_allocated(&self) -> bool {
        self.length < 0
    }
}

/// Returns the leading two-byte signature of a payload, or less if the
/// payload is shorter.
pub(crate) fn leading_signature(payload: &[u8]) -> &[u8] {
    &payload[..payload.len().min(2)]
}

/// Fails with `TypeMismatch` unless `payload` starts with `expected`.
pub(crate) fn expect_signature(payload: &[u8], offset: u32, expected: &'static str) -> Result<()> {
    let found = leading_signature(payload);
    if found == expected.as_bytes() {
        Ok(())
    } else {
        Err(RegistryError::type_mismatch(offset, expected, found))
    }
}

/// Flags for key nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyNodeFlags(pub u16);

impl KeyNodeFlags {
    /// Key is volatile (not stored on disk).
    pub const VOLATILE: u16 = 0x0001;

    /// Key is a mount point for another hive.
    pub const HIVE_EXIT: u16 = 0x0002;

    /// Key is the root key.
    pub const ROOT_KEY: u16 = 0x0004;

    /// Key cannot be deleted.
    pub const NO_DELETE: u16 = 0x0008;

    /// Key is a symbolic link.
    pub const SYM_LINK: u16 = 0x0010;

    /// Key name is stored with 8-bit code units.
    pub const COMP_NAME: u16 = 0x0020;

    /// Creates a new KeyNodeFlags from a u16 value.
    pub fn new(flags: u16) -> Self {
        Self(flags)
    }

    /// Returns true if the specified flag is set.
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// Returns true if the key name is compressed (8-bit).
    pub fn is_compressed(&self) -> bool {
        self.has_flag(Self::COMP_NAME)
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.has_flag(Self::ROOT_KEY)
    }
}

/// Registry value data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ValueType {
    /// No value type.
    None,

    /// String (null-terminated).
    String,

    /// String with environment variables.
    ExpandString,

    /// Binary data.
    Binary,

    /// 32-bit little-endian integer.
    Dword,

    /// 32-bit big-endian integer.
    DwordBigEndian,

    /// Symbolic link (Unicode).
    Link,

    /// Multiple strings.
    MultiString,

    /// Resource list.
    ResourceList,

    /// Full resource descriptor.
    FullResourceDescriptor,

    /// Resource requirements list.
    ResourceRequirementsList,

    /// 64-bit little-endian integer.
    Qword,

    /// Any other type tag. Applications may store arbitrary tags.
    Unknown(u32),
}

impl ValueType {
    /// Maps a raw type tag to a value type. Never fails.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => ValueType::None,
            1 => ValueType::String,
            2 => ValueType::ExpandString,
            3 => ValueType::Binary,
            4 => ValueType::Dword,
            5 => ValueType::DwordBigEndian,
            6 => ValueType::Link,
            7 => ValueType::MultiString,
            8 => ValueType::ResourceList,
            9 => ValueType::FullResourceDescriptor,
            10 => ValueType::ResourceRequirementsList,
            11 => ValueType::Qword,
            _ => ValueType::Unknown(value),
        }
    }

    /// Returns the raw type tag.
    pub fn as_u32(&self) -> u32 {
        match self {
            ValueType::None => 0,
            ValueType::String => 1,
            ValueType::ExpandString => 2,
            ValueType::Binary => 3,
            ValueType::Dword => 4,
            ValueType::DwordBigEndian => 5,
            ValueType::Link => 6,
            ValueType::MultiString => 7,
            ValueType::ResourceList => 8,
            ValueType::FullResourceDescriptor => 9,
            ValueType::ResourceRequirementsList => 10,
            ValueType::Qword => 11,
            ValueType::Unknown(value) => *value,
        }
    }

    /// Returns the name of this value type.
    pub fn name(&self) -> String {
        match self {
            ValueType::None => "REG_NONE".to_string(),
            ValueType::String => "REG_SZ".to_string(),
            ValueType::ExpandString => "REG_EXPAND_SZ".to_string(),
            ValueType::Binary => "REG_BINARY".to_string(),
            ValueType::Dword => "REG_DWORD".to_string(),
            ValueType::DwordBigEndian => "REG_DWORD_BIG_ENDIAN".to_string(),
            ValueType::Link => "REG_LINK".to_string(),
            ValueType::MultiString => "REG_MULTI_SZ".to_string(),
            ValueType::ResourceList => "REG_RESOURCE_LIST".to_string(),
            ValueType::FullResourceDescriptor => "REG_FULL_RESOURCE_DESCRIPTOR".to_string(),
            ValueType::ResourceRequirementsList => "REG_RESOURCE_REQUIREMENTS_LIST".to_string(),
            ValueType::Qword => "REG_QWORD".to_string(),
            ValueType::Unknown(value) => format!("REG_UNKNOWN_{:#010x}", value),
        }
    }
}
