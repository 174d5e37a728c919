//! Utility functions for binary parsing and string conversion.

use crate::error::{RegistryError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use encoding_rs::UTF_16LE;
use std::io::Cursor;

/// Offset where hive bins start (after base block)
pub const HBIN_START_OFFSET: u32 = 0x1000;

/// The "no pointer" value used by every offset field in a hive.
pub const NULL_OFFSET: u32 = 0xFFFF_FFFF;

/// Converts an offset field to `None` when it holds the null sentinel.
#[inline]
pub fn optional_offset(raw: u32) -> Option<u32> {
    if raw == NULL_OFFSET {
        None
    } else {
        Some(raw)
    }
}

/// Reads an 8-bit ("compressed") name.
///
/// Each byte is one code unit, so Latin-1 maps directly onto `char`.
pub fn read_latin1_string(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

/// Reads a UTF-16LE string from a byte slice, trimming null terminators.
///
/// # Errors
///
/// Returns `CorruptHive` if the data length is odd or the code units are not
/// valid UTF-16.
pub fn read_utf16_string(data: &[u8], offset: u32) -> Result<String> {
    if data.is_empty() {
        return Ok(String::new());
    }

    if data.len() % 2 != 0 {
        return Err(RegistryError::corrupt(
            offset,
            format!("UTF-16 data has odd length {}", data.len()),
        ));
    }

    let (decoded, had_errors) = UTF_16LE.decode_without_bom_handling(data);
    if had_errors {
        return Err(RegistryError::corrupt(offset, "invalid UTF-16 data"));
    }

    Ok(decoded.trim_end_matches('\0').to_string())
}

/// Decodes UTF-16LE value data, stopping at the first null terminator.
///
/// A dangling odd byte is ignored and unpaired surrogates are replaced, so
/// string values never fail to decode.
pub fn read_utf16_value(data: &[u8]) -> String {
    let even = &data[..data.len() & !1];
    let (decoded, _) = UTF_16LE.decode_without_bom_handling(even);
    match decoded.find('\0') {
        Some(end) => decoded[..end].to_string(),
        None => decoded.into_owned(),
    }
}

/// Reads a fixed-length UTF-16LE field such as the base block file name.
pub fn read_fixed_utf16(data: &[u8]) -> String {
    read_utf16_value(data).trim().to_string()
}

/// Reads a u32 from a byte slice at the given offset.
pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    if offset + 4 > data.len() {
        return Err(RegistryError::truncated(
            offset as u32,
            4,
            data.len().saturating_sub(offset),
        ));
    }

    let mut cursor = Cursor::new(&data[offset..offset + 4]);
    Ok(cursor.read_u32::<LittleEndian>()?)
}

/// Reads a u16 from a byte slice at the given offset.
pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    if offset + 2 > data.len() {
        return Err(RegistryError::truncated(
            offset as u32,
            2,
            data.len().saturating_sub(offset),
        ));
    }

    let mut cursor = Cursor::new(&data[offset..offset + 2]);
    Ok(cursor.read_u16::<LittleEndian>()?)
}

/// Reads an i32 from a byte slice at the given offset.
pub fn read_i32_le(data: &[u8], offset: usize) -> Result<i32> {
    if offset + 4 > data.len() {
        return Err(RegistryError::truncated(
            offset as u32,
            4,
            data.len().saturating_sub(offset),
        ));
    }

    let mut cursor = Cursor::new(&data[offset..offset + 4]);
    Ok(cursor.read_i32::<LittleEndian>()?)
}

/// Reads a u64 from a byte slice at the given offset.
pub fn read_u64_le(data: &[u8], offset: usize) -> Result<u64> {
    if offset + 8 > data.len() {
        return Err(RegistryError::truncated(
            offset as u32,
            8,
            data.len().saturating_sub(offset),
        ));
    }

    let mut cursor = Cursor::new(&data[offset..offset + 8]);
    Ok(cursor.read_u64::<LittleEndian>()?)
}

/// Calculates the XOR checksum of the first 508 bytes of the base block.
///
/// The stored value is never 0 or 0xFFFFFFFF; those results are mapped to 1
/// and 0xFFFFFFFE respectively.
pub fn calculate_checksum(data: &[u8]) -> u32 {
    let mut checksum: u32 = 0;

    for i in (0..0x1FC).step_by(4) {
        if let Ok(dword) = read_u32_le(data, i) {
            checksum ^= dword;
        }
    }

    match checksum {
        0 => 1,
        0xFFFF_FFFF => 0xFFFF_FFFE,
        other => other,
    }
}

/// Converts a relative cell offset to an absolute file offset.
///
/// Cell offsets are relative to the first hbin (at 0x1000).
///
/// # Errors
///
/// Returns `CorruptHive` if the addition would overflow.
#[inline]
pub fn cell_offset_to_absolute(cell_offset: u32) -> Result<u32> {
    cell_offset
        .checked_add(HBIN_START_OFFSET)
        .ok_or_else(|| RegistryError::corrupt(cell_offset, "cell offset overflows the file"))
}

/// Converts a Windows FILETIME (100ns ticks since 1601-01-01) to UTC.
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    const FILETIME_UNIX_DIFF: i64 = 11_644_473_600;

    let seconds = (filetime / 10_000_000) as i64 - FILETIME_UNIX_DIFF;
    let nanos = ((filetime % 10_000_000) * 100) as u32;

    DateTime::from_timestamp(seconds, nanos)
}

/// Compares two registry names case-insensitively, one character at a time.
///
/// Names must have the same number of characters. A character whose
/// uppercase form is more than one character (`ß`) is compared as is.
pub fn names_equal(a: &str, b: &str) -> bool {
    if a.len() == b.len() && a.eq_ignore_ascii_case(b) {
        return true;
    }
    a.chars().count() == b.chars().count()
        && a.chars().zip(b.chars()).all(|(x, y)| upcase(x) == upcase(y))
}

fn upcase(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(single), None) => single,
        _ => c,
    }
}
