//! Hive bin (hbin) block parsing.
//!
//! Hive bins are 4KB-aligned blocks that contain registry cells. Each hbin
//! has a header followed by a sequence of cells. The [`BinMap`] records the
//! cell area of every bin so the cell reader can reject offsets that fall
//! outside of one.

use crate::error::{RegistryError, Result};
use crate::header::BASE_BLOCK_SIZE;
use crate::utils::{read_u32_le, read_u64_le};
use std::ops::Range;
use tracing::debug;

/// Expected signature for hive bins ("hbin").
pub const HBIN_SIGNATURE: &[u8; 4] = b"hbin";

/// Size of an hbin header.
pub const HBIN_HEADER_SIZE: usize = 0x20;

/// Hive bins are sized in multiples of this.
pub const HBIN_ALIGNMENT: u32 = 0x1000;

/// Hive bin header structure.
#[derive(Debug, Clone)]
pub struct HbinHeader {
    /// Offset of this hbin relative to the first hbin.
    pub offset: u32,

    /// Size of this hbin in bytes (including header).
    pub size: u32,

    /// Timestamp (Windows FILETIME), only meaningful in the first bin.
    pub timestamp: u64,
}

impl HbinHeader {
    /// Parses an hbin header from raw bytes.
    ///
    /// # Arguments
    ///
    /// * `data` - Raw bytes starting at the hbin header.
    /// * `expected_offset` - Offset of this bin relative to the first hbin.
    ///
    /// # Errors
    ///
    /// Returns `CorruptHive` if the header is truncated, the signature is not
    /// `hbin`, the stored offset disagrees with its position, or the size is
    /// not a non-zero multiple of 4096.
    pub fn parse(data: &[u8], expected_offset: u32) -> Result<Self> {
        if data.len() < HBIN_HEADER_SIZE {
            return Err(RegistryError::truncated(
                expected_offset,
                HBIN_HEADER_SIZE,
                data.len(),
            ));
        }

        if &data[0..4] != HBIN_SIGNATURE {
            return Err(RegistryError::type_mismatch(expected_offset, "hbin", &data[0..4]));
        }

        let offset = read_u32_le(data, 0x04)?;
        let size = read_u32_le(data, 0x08)?;

        if offset != expected_offset {
            return Err(RegistryError::corrupt(
                expected_offset,
                format!("hbin offset mismatch: stored {:#x}", offset),
            ));
        }

        if size == 0 || size % HBIN_ALIGNMENT != 0 {
            return Err(RegistryError::corrupt(
                expected_offset,
                format!("invalid hbin size {:#x}", size),
            ));
        }

        Ok(HbinHeader {
            offset,
            size,
            timestamp: read_u64_le(data, 0x14)?,
        })
    }

    /// Range of cell offsets that belong to this bin's cell area.
    pub fn cell_range(&self) -> Range<u32> {
        self.offset + HBIN_HEADER_SIZE as u32..self.offset + self.size
    }
}

/// Sorted list of hive bins, built once when a hive is opened.
#[derive(Debug, Clone, Default)]
pub struct BinMap {
    bins: Vec<HbinHeader>,
}

impl BinMap {
    /// Walks the chain of hbin headers that follows the base block.
    ///
    /// Only bin headers are read. The walk stops at the end of the declared
    /// hive length (or the file, whichever is shorter) or at the first header
    /// that does not parse; bins after that point are treated as absent.
    pub fn scan(data: &[u8], hive_length: u32) -> Self {
        let available = data.len().saturating_sub(BASE_BLOCK_SIZE);
        let limit = if hive_length == 0 {
            available
        } else {
            available.min(hive_length as usize)
        };

        let mut bins = Vec::new();
        let mut position = 0usize;

        while position + HBIN_HEADER_SIZE <= limit {
            let start = BASE_BLOCK_SIZE + position;
            let header = match HbinHeader::parse(&data[start..], position as u32) {
                Ok(header) => header,
                Err(e) => {
                    debug!(offset = %format!("{:#x}", position), error = %e, "Stopping hbin scan");
                    break;
                }
            };

            let end = position + header.size as usize;
            if end > limit {
                debug!(offset = %format!("{:#x}", position), "Hbin extends past hive data, stopping scan");
                break;
            }

            position = end;
            bins.push(header);
        }

        debug!(count = bins.len(), "Scanned hive bins");
        BinMap { bins }
    }

    /// Returns the bin whose cell area contains `offset`.
    pub fn locate(&self, offset: u32) -> Option<&HbinHeader> {
        let index = self.bins.partition_point(|bin| bin.offset + bin.size <= offset);
        self.bins
            .get(index)
            .filter(|bin| bin.cell_range().contains(&offset))
    }

    /// All bins in file order.
    pub fn bins(&self) -> &[HbinHeader] {
        &self.bins
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Returns true if no bins were found.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin_header(offset: u32, size: u32) -> Vec<u8> {
        let mut data = vec![0u8; size as usize];
        data[0..4].copy_from_slice(HBIN_SIGNATURE);
        data[4..8].copy_from_slice(&offset.to_le_bytes());
        data[8..12].copy_from_slice(&size.to_le_bytes());
        data
    }

    #[test]
    fn test_invalid_signature() {
        let mut data = vec![0u8; HBIN_HEADER_SIZE];
        data[0..4].copy_from_slice(b"XXXX");

        let result = HbinHeader::parse(&data, 0);
        assert!(matches!(result, Err(RegistryError::TypeMismatch { .. })));
    }

    #[test]
    fn test_offset_mismatch() {
        let data = bin_header(0x1000, 0x1000);
        assert!(HbinHeader::parse(&data, 0).is_err());
    }

    #[test]
    fn test_scan_and_locate() {
        let mut data = vec![0u8; BASE_BLOCK_SIZE];
        data.extend(bin_header(0, 0x1000));
        data.extend(bin_header(0x1000, 0x2000));
        // Trailing garbage is not a bin.
        data.extend(vec![0xAAu8; 0x1000]);

        let map = BinMap::scan(&data, 0);
        assert_eq!(map.len(), 2);

        assert!(map.locate(0x10).is_none(), "inside the first bin header");
        assert_eq!(map.locate(0x20).unwrap().offset, 0);
        assert_eq!(map.locate(0xFFF).unwrap().offset, 0);
        assert!(map.locate(0x1010).is_none());
        assert_eq!(map.locate(0x1020).unwrap().offset, 0x1000);
        assert_eq!(map.locate(0x2FFF).unwrap().offset, 0x1000);
        assert!(map.locate(0x3000).is_none());
    }

    #[test]
    fn test_scan_respects_hive_length() {
        let mut data = vec![0u8; BASE_BLOCK_SIZE];
        data.extend(bin_header(0, 0x1000));
        data.extend(bin_header(0x1000, 0x1000));

        let map = BinMap::scan(&data, 0x1000);
        assert_eq!(map.len(), 1);
    }
}
