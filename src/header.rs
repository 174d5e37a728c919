//! Registry hive base block (header) parsing.
//!
//! The base block is the first 4096 bytes (0x1000) of a registry hive file.
//! It contains metadata about the hive including version, timestamps, and
//! the root key cell offset.

use crate::error::{RegistryError, Result};
use crate::utils::{calculate_checksum, filetime_to_datetime, read_fixed_utf16, read_u32_le, read_u64_le};
use std::fmt;

/// Size of the base block in bytes.
pub const BASE_BLOCK_SIZE: usize = 4096;

/// Expected signature for a valid registry hive ("regf").
pub const REGF_SIGNATURE: &[u8; 4] = b"regf";

/// Offset of the file name in the base block.
const FILE_NAME_OFFSET: usize = 0x30;

/// Length of the file name field (64 UTF-16LE characters = 128 bytes).
const FILE_NAME_LENGTH: usize = 128;

/// Offset of the checksum field in the base block.
pub const CHECKSUM_OFFSET: usize = 0x1FC;

/// Registry hive base block header.
#[derive(Debug, Clone)]
pub struct BaseBlock {
    /// Signature, always "regf" once parsed.
    pub signature: [u8; 4],

    /// Primary sequence number.
    pub primary_sequence: u32,

    /// Secondary sequence number.
    pub secondary_sequence: u32,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Major version of the hive format.
    pub major_version: u32,

    /// Minor version of the hive format.
    pub minor_version: u32,

    /// File type (0 = primary file, 1/2/6 = transaction logs).
    pub file_type: u32,

    /// File format (1 = direct memory load).
    pub file_format: u32,

    /// Offset to root key cell (relative to first hbin).
    pub root_cell_offset: u32,

    /// Length of the hive bins data in bytes.
    pub hive_length: u32,

    /// Clustering factor (always 1).
    pub clustering_factor: u32,

    /// File name embedded by the kernel (may be empty or partial).
    pub file_name: String,

    /// Stored checksum (XOR of first 508 bytes).
    pub checksum: u32,
}

impl BaseBlock {
    /// Parses a base block from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHeader` if the data is smaller than a base block, the
    /// signature is not `regf`, the checksum does not match, or the version is
    /// not 1.3 through 1.6.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BASE_BLOCK_SIZE {
            return Err(RegistryError::invalid_header(format!(
                "hive too small: {} bytes (minimum: {} bytes)",
                data.len(),
                BASE_BLOCK_SIZE
            )));
        }

        let mut signature = [0u8; 4];
        signature.copy_from_slice(&data[0..4]);

        if &signature != REGF_SIGNATURE {
            return Err(RegistryError::invalid_header(format!(
                "expected signature \"regf\", found \"{}\"",
                signature.escape_ascii()
            )));
        }

        let checksum = read_u32_le(data, CHECKSUM_OFFSET)?;
        let calculated = calculate_checksum(data);
        if checksum != calculated {
            return Err(RegistryError::invalid_header(format!(
                "checksum mismatch: stored {:#x}, calculated {:#x}",
                checksum, calculated
            )));
        }

        let major_version = read_u32_le(data, 0x14)?;
        let minor_version = read_u32_le(data, 0x18)?;
        if major_version != 1 || !(3..=6).contains(&minor_version) {
            return Err(RegistryError::invalid_header(format!(
                "unsupported hive version {}.{}",
                major_version, minor_version
            )));
        }

        let file_name =
            read_fixed_utf16(&data[FILE_NAME_OFFSET..FILE_NAME_OFFSET + FILE_NAME_LENGTH]);

        Ok(BaseBlock {
            signature,
            primary_sequence: read_u32_le(data, 0x04)?,
            secondary_sequence: read_u32_le(data, 0x08)?,
            last_written: read_u64_le(data, 0x0C)?,
            major_version,
            minor_version,
            file_type: read_u32_le(data, 0x1C)?,
            file_format: read_u32_le(data, 0x20)?,
            root_cell_offset: read_u32_le(data, 0x24)?,
            hive_length: read_u32_le(data, 0x28)?,
            clustering_factor: read_u32_le(data, 0x2C)?,
            file_name,
            checksum,
        })
    }

    /// Returns true if the hive is in a consistent state.
    ///
    /// The hive is consistent when primary and secondary sequence numbers match.
    pub fn is_consistent(&self) -> bool {
        self.primary_sequence == self.secondary_sequence
    }

    /// Returns true if values larger than one cell are stored as big data.
    ///
    /// Big data (`db`) records were introduced with format 1.4.
    pub fn supports_big_data(&self) -> bool {
        self.minor_version >= 4
    }

    /// Converts the last written timestamp to UTC.
    pub fn last_written_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        filetime_to_datetime(self.last_written)
    }
}

impl fmt::Display for BaseBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Registry Hive Header:\n\
             - Version: {}.{}\n\
             - Root Cell Offset: {:#x}\n\
             - Hive Length: {} bytes\n\
             - Consistent: {}\n\
             - File Name: {}",
            self.major_version,
            self.minor_version,
            self.root_cell_offset,
            self.hive_length,
            self.is_consistent(),
            self.file_name
        )
    }
}
