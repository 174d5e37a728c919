//! Registry value (vk) parsing and data extraction.

use crate::cell::{expect_signature, ValueType};
use crate::error::{RegistryError, Result};
use crate::utils::{read_latin1_string, read_u16_le, read_u32_le, read_utf16_string, read_utf16_value};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

/// Minimum size of a value key structure in bytes.
const VALUE_KEY_MIN_SIZE: usize = 0x14;

/// Offset of the value name in the value key structure.
const VALUE_NAME_OFFSET: usize = 0x14;

/// High bit of the data size: data lives in the offset field.
pub const DATA_INLINE_FLAG: u32 = 0x8000_0000;

/// Value flag: name is stored with 8-bit code units.
pub const VALUE_COMP_NAME: u16 = 0x0001;

/// Value key (vk) structure.
///
/// Describes a value: its name, type and where its data lives.
#[derive(Debug, Clone)]
pub struct ValueKey {
    /// Offset of this value key cell.
    pub offset: u32,

    /// Data size as stored, including the inline flag.
    pub raw_data_size: u32,

    /// Offset to value data, or the data itself when inline.
    pub data_offset: u32,

    /// Value data type.
    pub data_type: ValueType,

    /// Flags (0x0001 = name is 8-bit).
    pub flags: u16,

    /// Value name. Empty for the key's default value.
    pub name: String,
}

impl ValueKey {
    /// Parses a value key from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell payload (excluding size field, starting with "vk" signature).
    /// * `offset` - Offset of this cell for error reporting.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the signature is not `vk`, and `CorruptHive`
    /// if the structure or its name is truncated.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        expect_signature(data, offset, "vk")?;

        if data.len() < VALUE_KEY_MIN_SIZE {
            return Err(RegistryError::truncated(offset, VALUE_KEY_MIN_SIZE, data.len()));
        }

        let name_length = read_u16_le(data, 0x02)? as usize;
        let flags = read_u16_le(data, 0x10)?;

        let name_end = VALUE_NAME_OFFSET + name_length;
        if name_end > data.len() {
            return Err(RegistryError::corrupt(
                offset,
                format!("value name length {} exceeds the cell", name_length),
            ));
        }

        let name_data = &data[VALUE_NAME_OFFSET..name_end];
        let name = if (flags & VALUE_COMP_NAME) != 0 {
            read_latin1_string(name_data)
        } else {
            read_utf16_string(name_data, offset)?
        };

        Ok(ValueKey {
            offset,
            raw_data_size: read_u32_le(data, 0x04)?,
            data_offset: read_u32_le(data, 0x08)?,
            data_type: ValueType::from_u32(read_u32_le(data, 0x0C)?),
            flags,
            name,
        })
    }

    /// Returns true if the data is stored in the data offset field itself.
    pub fn is_inline_data(&self) -> bool {
        (self.raw_data_size & DATA_INLINE_FLAG) != 0
    }

    /// Declared data length in bytes, without the inline flag.
    pub fn data_length(&self) -> u32 {
        self.raw_data_size & !DATA_INLINE_FLAG
    }

    /// Returns true for the key's unnamed default value.
    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }

    /// Extracts inline data.
    ///
    /// # Errors
    ///
    /// Returns `CorruptHive` if the declared inline length is larger than the
    /// four bytes of the offset field.
    pub fn inline_data(&self) -> Result<Vec<u8>> {
        let length = self.data_length() as usize;
        if length > 4 {
            return Err(RegistryError::corrupt(
                self.offset,
                format!("inline data length {} exceeds 4 bytes", length),
            ));
        }
        Ok(self.data_offset.to_le_bytes()[..length].to_vec())
    }
}

/// Decoded registry value data.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ValueData {
    /// REG_NONE without data.
    None,

    /// String value.
    String(String),

    /// Expandable string value. Placeholders such as `%SystemRoot%` are left as is.
    ExpandString(String),

    /// Binary data (REG_BINARY, or REG_NONE carrying bytes).
    Binary(Vec<u8>),

    /// 32-bit little-endian integer.
    Dword(u32),

    /// 32-bit big-endian integer.
    DwordBigEndian(u32),

    /// Symbolic link target.
    Link(String),

    /// Multiple strings.
    MultiString(Vec<String>),

    /// 64-bit little-endian integer.
    Qword(u64),

    /// Data of a type without a typed decoding, tagged with its raw type.
    Unknown {
        /// Raw type tag.
        tag: u32,
        /// Data bytes.
        data: Vec<u8>,
    },
}

impl ValueData {
    /// Decodes raw value bytes according to the value type.
    ///
    /// # Arguments
    ///
    /// * `data` - Raw value data bytes, already trimmed to the declared length.
    /// * `value_type` - Type of the value.
    /// * `offset` - Offset of the value key for error reporting.
    ///
    /// # Errors
    ///
    /// Returns `CorruptHive` if an integer type carries fewer bytes than it
    /// needs. Unrecognized type tags never fail.
    pub fn parse(data: &[u8], value_type: ValueType, offset: u32) -> Result<Self> {
        match value_type {
            ValueType::None if data.is_empty() => Ok(ValueData::None),
            ValueType::None | ValueType::Binary => Ok(ValueData::Binary(data.to_vec())),

            ValueType::String => Ok(ValueData::String(read_utf16_value(data))),
            ValueType::ExpandString => Ok(ValueData::ExpandString(read_utf16_value(data))),
            ValueType::Link => Ok(ValueData::Link(read_utf16_value(data))),

            ValueType::Dword => {
                let mut cursor = Cursor::new(Self::require(data, 4, offset)?);
                Ok(ValueData::Dword(cursor.read_u32::<LittleEndian>()?))
            }

            ValueType::DwordBigEndian => {
                let mut cursor = Cursor::new(Self::require(data, 4, offset)?);
                Ok(ValueData::DwordBigEndian(cursor.read_u32::<BigEndian>()?))
            }

            ValueType::Qword => {
                let mut cursor = Cursor::new(Self::require(data, 8, offset)?);
                Ok(ValueData::Qword(cursor.read_u64::<LittleEndian>()?))
            }

            ValueType::MultiString => Ok(ValueData::MultiString(split_multi_string(data))),

            other => Ok(ValueData::Unknown {
                tag: other.as_u32(),
                data: data.to_vec(),
            }),
        }
    }

    fn require(data: &[u8], needed: usize, offset: u32) -> Result<&[u8]> {
        if data.len() < needed {
            return Err(RegistryError::corrupt(
                offset,
                format!("value data is {} bytes, type needs {}", data.len(), needed),
            ));
        }
        Ok(&data[..needed])
    }

    /// Returns the string for `String`, `ExpandString` and `Link` data.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ValueData::String(s) | ValueData::ExpandString(s) | ValueData::Link(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer for either DWORD flavour.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            ValueData::Dword(d) | ValueData::DwordBigEndian(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the integer for QWORD data, widening DWORDs.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ValueData::Qword(q) => Some(*q),
            other => other.as_u32().map(u64::from),
        }
    }

    /// Returns the list for `MultiString` data.
    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            ValueData::MultiString(strings) => Some(strings),
            _ => None,
        }
    }
}

/// Splits REG_MULTI_SZ data on null terminators.
///
/// Empty entries in the middle are kept; trailing empty entries (the list
/// terminator and any padding) are dropped.
fn split_multi_string(data: &[u8]) -> Vec<String> {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let mut strings: Vec<String> = units
        .split(|&unit| unit == 0)
        .map(String::from_utf16_lossy)
        .collect();

    while strings.last().is_some_and(|s| s.is_empty()) {
        strings.pop();
    }
    strings
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueData::None => write!(f, "(none)"),
            ValueData::String(s) | ValueData::ExpandString(s) | ValueData::Link(s) => {
                write!(f, "{}", s)
            }
            ValueData::Binary(b) => write!(f, "{}", hex::encode(b)),
            ValueData::Dword(d) | ValueData::DwordBigEndian(d) => write!(f, "{} (0x{:08X})", d, d),
            ValueData::Qword(q) => write!(f, "{} (0x{:016X})", q, q),
            ValueData::MultiString(strings) => write!(f, "{}", strings.join(", ")),
            ValueData::Unknown { tag, data } => write!(f, "[{:#x}] {}", tag, hex::encode(data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn test_value_key_minimum_size() {
        let mut data = vec![0u8; 19];
        data[0..2].copy_from_slice(b"vk");
        let result = ValueKey::parse(&data, 0);
        assert!(matches!(result, Err(RegistryError::CorruptHive { .. })));
    }

    #[test]
    fn test_value_key_invalid_signature() {
        let mut data = vec![0u8; 24];
        data[0..2].copy_from_slice(b"nk");
        let result = ValueKey::parse(&data, 0);
        assert!(matches!(result, Err(RegistryError::TypeMismatch { .. })));
    }

    #[test]
    fn test_inline_data() {
        let mut data = vec![0u8; 24];
        data[0..2].copy_from_slice(b"vk");
        data[4..8].copy_from_slice(&(DATA_INLINE_FLAG | 4).to_le_bytes());
        data[8..12].copy_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        data[12..16].copy_from_slice(&4u32.to_le_bytes());

        let vk = ValueKey::parse(&data, 0).unwrap();
        assert!(vk.is_inline_data());
        assert!(vk.is_default());
        assert_eq!(vk.data_length(), 4);
        assert_eq!(vk.data_type, ValueType::Dword);
        assert_eq!(vk.inline_data().unwrap(), vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_inline_length_over_four() {
        let mut data = vec![0u8; 24];
        data[0..2].copy_from_slice(b"vk");
        data[4..8].copy_from_slice(&(DATA_INLINE_FLAG | 5).to_le_bytes());

        let vk = ValueKey::parse(&data, 0x40).unwrap();
        assert!(matches!(
            vk.inline_data(),
            Err(RegistryError::CorruptHive { offset: 0x40, .. })
        ));
    }

    #[test]
    fn test_ascii_name() {
        let mut data = vec![0u8; VALUE_NAME_OFFSET];
        data[0..2].copy_from_slice(b"vk");
        data[2..4].copy_from_slice(&11u16.to_le_bytes());
        data[0x10..0x12].copy_from_slice(&VALUE_COMP_NAME.to_le_bytes());
        data.extend_from_slice(b"DisplayName");

        let vk = ValueKey::parse(&data, 0).unwrap();
        assert_eq!(vk.name, "DisplayName");
        assert!(!vk.is_inline_data());
    }

    #[test]
    fn test_parse_strings() {
        let mut raw = utf16("C:\\Windows");
        raw.extend_from_slice(&[0, 0, 0xAB, 0xCD]);
        assert_eq!(
            ValueData::parse(&raw, ValueType::String, 0).unwrap(),
            ValueData::String("C:\\Windows".into())
        );
        assert_eq!(
            ValueData::parse(&utf16("%SystemRoot%\0"), ValueType::ExpandString, 0).unwrap(),
            ValueData::ExpandString("%SystemRoot%".into())
        );
        assert_eq!(
            ValueData::parse(&[], ValueType::String, 0).unwrap(),
            ValueData::String(String::new())
        );
    }

    #[test]
    fn test_parse_integers() {
        let raw = [0x78, 0x56, 0x34, 0x12];
        assert_eq!(
            ValueData::parse(&raw, ValueType::Dword, 0).unwrap(),
            ValueData::Dword(0x12345678)
        );
        assert_eq!(
            ValueData::parse(&raw, ValueType::DwordBigEndian, 0).unwrap(),
            ValueData::DwordBigEndian(0x78563412)
        );
        let raw = 0x0102_0304_0506_0708u64.to_le_bytes();
        assert_eq!(
            ValueData::parse(&raw, ValueType::Qword, 0).unwrap().as_u64(),
            Some(0x0102_0304_0506_0708)
        );
        assert!(ValueData::parse(&[1, 2], ValueType::Dword, 0).is_err());
        assert!(ValueData::parse(&[1, 2, 3, 4], ValueType::Qword, 0).is_err());
    }

    #[test]
    fn test_multi_string_drops_trailing_empties_only() {
        let raw = utf16("one\0\0three\0\0");
        let data = ValueData::parse(&raw, ValueType::MultiString, 0).unwrap();
        assert_eq!(
            data.as_strings().unwrap(),
            &["one".to_string(), String::new(), "three".to_string()]
        );

        let empty = ValueData::parse(&utf16("\0\0"), ValueType::MultiString, 0).unwrap();
        assert_eq!(empty, ValueData::MultiString(Vec::new()));
    }

    #[test]
    fn test_unknown_type_keeps_tag() {
        let data = ValueData::parse(&[9, 8, 7], ValueType::from_u32(0x1234), 0).unwrap();
        assert_eq!(
            data,
            ValueData::Unknown {
                tag: 0x1234,
                data: vec![9, 8, 7]
            }
        );

        let resource = ValueData::parse(&[1], ValueType::ResourceList, 0).unwrap();
        assert!(matches!(resource, ValueData::Unknown { tag: 8, .. }));
    }

    #[test]
    fn test_none_type() {
        assert_eq!(ValueData::parse(&[], ValueType::None, 0).unwrap(), ValueData::None);
        assert_eq!(
            ValueData::parse(&[0xFF], ValueType::None, 0).unwrap(),
            ValueData::Binary(vec![0xFF])
        );
    }

    #[test]
    fn test_value_data_display() {
        assert_eq!(ValueData::None.to_string(), "(none)");
        assert_eq!(ValueData::String("Hello".into()).to_string(), "Hello");
        assert!(ValueData::Dword(0x12345678).to_string().contains("0x12345678"));
        assert_eq!(ValueData::Binary(vec![0x01, 0xAB]).to_string(), "01ab");
    }
}
