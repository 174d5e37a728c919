//! Big data block (db) parsing.
//!
//! Registry values larger than 16,344 bytes are stored in big data blocks,
//! which consist of a header cell, a segment list cell, and the data
//! segments it points to.

use crate::cell::expect_signature;
use crate::error::{RegistryError, Result};
use crate::utils::{read_u16_le, read_u32_le};

/// Largest value that fits in a single data cell. Larger values use big data.
pub const MAX_DIRECT_DATA_SIZE: u32 = 16344;

/// Maximum number of data bytes each big data segment contributes.
pub const BIG_DATA_SEGMENT_SIZE: usize = 16344;

/// Big data block header structure.
///
/// Format:
/// ```text
/// Offset  Size  Description
/// 0x00    2     Signature ("db")
/// 0x02    2     Number of segments
/// 0x04    4     Offset to segment list
/// ```
#[derive(Debug, Clone)]
pub struct BigDataBlock {
    /// Number of data segments
    pub segment_count: u16,

    /// Offset to the list of segment offsets
    pub segment_list_offset: u32,
}

impl BigDataBlock {
    /// Minimum size of a big data block header
    const MIN_SIZE: usize = 8;

    /// Parses a big data block header from cell data.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the signature is not `db`, `CorruptHive` if
    /// the header is truncated or declares no segments.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        expect_signature(data, offset, "db")?;

        if data.len() < Self::MIN_SIZE {
            return Err(RegistryError::truncated(offset, Self::MIN_SIZE, data.len()));
        }

        let segment_count = read_u16_le(data, 0x02)?;
        if segment_count == 0 {
            return Err(RegistryError::corrupt(offset, "big data block has no segments"));
        }

        Ok(BigDataBlock {
            segment_count,
            segment_list_offset: read_u32_le(data, 0x04)?,
        })
    }

    /// Reads the segment offsets out of the segment list cell payload.
    ///
    /// # Errors
    ///
    /// Returns `CorruptHive` if the list is shorter than `segment_count` entries.
    pub fn segment_offsets(&self, list: &[u8]) -> Result<Vec<u32>> {
        let count = self.segment_count as usize;
        if list.len() < count * 4 {
            return Err(RegistryError::truncated(
                self.segment_list_offset,
                count * 4,
                list.len(),
            ));
        }

        (0..count).map(|i| read_u32_le(list, i * 4)).collect()
    }
}
