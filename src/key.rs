//! Registry key node (nk) parsing and representation.

use crate::cell::{expect_signature, KeyNodeFlags};
use crate::error::{RegistryError, Result};
use crate::utils::{
    filetime_to_datetime, optional_offset, read_latin1_string, read_u16_le, read_u32_le,
    read_u64_le, read_utf16_string,
};
use chrono::{DateTime, Utc};

/// Minimum size of a key node structure in bytes.
const KEY_NODE_MIN_SIZE: usize = 0x4C;

/// Offset of the key name in the key node structure.
const KEY_NAME_OFFSET: usize = 0x4C;

/// Key node (nk) structure.
///
/// Holds the decoded fixed fields and name of a key. Subkeys and values are
/// only referenced by offset and resolved on demand.
#[derive(Debug, Clone)]
pub struct KeyNode {
    /// Offset of this key node cell.
    pub offset: u32,

    /// Flags for this key.
    pub flags: KeyNodeFlags,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Offset to parent key node.
    pub parent_offset: u32,

    /// Number of stable subkeys.
    pub subkey_count: u32,

    /// Offset to the subkey index, `None` when the key has no children.
    pub subkey_list_offset: Option<u32>,

    /// Number of values.
    pub value_count: u32,

    /// Offset to value list, `None` when the key has no values.
    pub value_list_offset: Option<u32>,

    /// Offset to security descriptor.
    pub security_offset: Option<u32>,

    /// Offset to class name.
    pub class_name_offset: Option<u32>,

    /// Length of class name in bytes.
    pub class_name_length: u16,

    /// Key name.
    pub name: String,
}

impl KeyNode {
    /// Parses a key node from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell payload (excluding size field, starting with "nk" signature).
    /// * `offset` - Offset of this cell for error reporting.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the signature is not `nk`, and `CorruptHive`
    /// if the structure or its name is truncated.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        expect_signature(data, offset, "nk")?;

        if data.len() < KEY_NODE_MIN_SIZE {
            return Err(RegistryError::truncated(offset, KEY_NODE_MIN_SIZE, data.len()));
        }

        let flags = KeyNodeFlags::new(read_u16_le(data, 0x02)?);
        let name_length = read_u16_le(data, 0x48)? as usize;

        let name_end = KEY_NAME_OFFSET + name_length;
        if name_end > data.len() {
            return Err(RegistryError::corrupt(
                offset,
                format!("key name length {} exceeds the cell", name_length),
            ));
        }

        let name_data = &data[KEY_NAME_OFFSET..name_end];
        let name = if flags.is_compressed() {
            read_latin1_string(name_data)
        } else {
            read_utf16_string(name_data, offset)?
        };

        Ok(KeyNode {
            offset,
            flags,
            last_written: read_u64_le(data, 0x04)?,
            parent_offset: read_u32_le(data, 0x10)?,
            subkey_count: read_u32_le(data, 0x14)?,
            subkey_list_offset: optional_offset(read_u32_le(data, 0x1C)?),
            value_count: read_u32_le(data, 0x24)?,
            value_list_offset: optional_offset(read_u32_le(data, 0x28)?),
            security_offset: optional_offset(read_u32_le(data, 0x2C)?),
            class_name_offset: optional_offset(read_u32_le(data, 0x30)?),
            class_name_length: read_u16_le(data, 0x4A)?,
            name,
        })
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.flags.is_root()
    }

    /// Last write time as UTC.
    pub fn last_written_datetime(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.last_written)
    }
}
