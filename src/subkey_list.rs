//! Subkey list parsing (lf, lh, li, ri) and the index walker.
//!
//! A key's children are listed in one of several index structures. Leaf
//! lists hold key offsets directly; an index root holds offsets of further
//! lists. [`SubkeyOffsets`] flattens either shape into the sequence of child
//! key offsets, in stored order.

use crate::cell::leading_signature;
use crate::error::{RegistryError, Result};
use crate::hive::Hive;
use crate::utils::read_u32_le;
use std::collections::HashSet;
use tracing::trace;

/// Subkey list types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubkeyListType {
    /// Index leaf (li) - simple list of offsets.
    IndexLeaf,

    /// Fast leaf (lf) - list with 4-byte name hints.
    FastLeaf,

    /// Hash leaf (lh) - list with name hash hints.
    HashLeaf,

    /// Index root (ri) - list of subkey list offsets.
    IndexRoot,
}

impl SubkeyListType {
    /// Parses a subkey list type from a 2-byte signature.
    pub fn from_signature(sig: &[u8]) -> Option<Self> {
        match sig {
            b"li" => Some(SubkeyListType::IndexLeaf),
            b"lf" => Some(SubkeyListType::FastLeaf),
            b"lh" => Some(SubkeyListType::HashLeaf),
            b"ri" => Some(SubkeyListType::IndexRoot),
            _ => None,
        }
    }

    /// Size of one list element in bytes.
    fn entry_size(&self) -> usize {
        match self {
            SubkeyListType::FastLeaf | SubkeyListType::HashLeaf => 8,
            SubkeyListType::IndexLeaf | SubkeyListType::IndexRoot => 4,
        }
    }
}

/// Subkey list entry (for lf/lh lists).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubkeyListEntry {
    /// Offset to the key node.
    pub key_offset: u32,

    /// Name hint (first 4 chars for lf, hash for lh).
    pub name_hint: u32,
}

/// Parsed subkey list.
#[derive(Debug, Clone)]
pub enum SubkeyList {
    /// Index leaf - simple list of key offsets.
    IndexLeaf(Vec<u32>),

    /// Fast leaf or hash leaf - list with hints.
    LeafWithHints(Vec<SubkeyListEntry>),

    /// Index root - list of sublist offsets.
    IndexRoot(Vec<u32>),
}

impl SubkeyList {
    /// Parses a subkey list from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell payload (excluding size field).
    /// * `offset` - Offset of this cell for error reporting.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` for an unknown signature and `CorruptHive` if
    /// the declared count does not fit in the cell.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        let signature = leading_signature(data);
        let list_type = SubkeyListType::from_signature(signature)
            .ok_or_else(|| RegistryError::type_mismatch(offset, "lf|lh|li|ri", signature))?;

        if data.len() < 4 {
            return Err(RegistryError::truncated(offset, 4, data.len()));
        }

        let count = u16::from_le_bytes([data[2], data[3]]) as usize;
        let expected_size = 4 + count * list_type.entry_size();
        if data.len() < expected_size {
            return Err(RegistryError::truncated(offset, expected_size, data.len()));
        }

        let read_offsets = || -> Result<Vec<u32>> {
            (0..count).map(|i| read_u32_le(data, 4 + i * 4)).collect()
        };

        match list_type {
            SubkeyListType::IndexLeaf => Ok(SubkeyList::IndexLeaf(read_offsets()?)),
            SubkeyListType::IndexRoot => Ok(SubkeyList::IndexRoot(read_offsets()?)),
            SubkeyListType::FastLeaf | SubkeyListType::HashLeaf => {
                let entries = (0..count)
                    .map(|i| {
                        let entry_pos = 4 + i * 8;
                        Ok(SubkeyListEntry {
                            key_offset: read_u32_le(data, entry_pos)?,
                            name_hint: read_u32_le(data, entry_pos + 4)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(SubkeyList::LeafWithHints(entries))
            }
        }
    }

    /// Returns the offset stored at `index`: a key offset for leaves, a
    /// sublist offset for index roots.
    pub fn get(&self, index: usize) -> Option<u32> {
        match self {
            SubkeyList::IndexLeaf(offsets) | SubkeyList::IndexRoot(offsets) => {
                offsets.get(index).copied()
            }
            SubkeyList::LeafWithHints(entries) => entries.get(index).map(|e| e.key_offset),
        }
    }

    /// Returns the number of entries in this list.
    pub fn len(&self) -> usize {
        match self {
            SubkeyList::IndexLeaf(offsets) => offsets.len(),
            SubkeyList::LeafWithHints(entries) => entries.len(),
            SubkeyList::IndexRoot(offsets) => offsets.len(),
        }
    }

    /// Returns true if this list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if this is an index root (contains sublists).
    pub fn is_index_root(&self) -> bool {
        matches!(self, SubkeyList::IndexRoot(_))
    }
}

struct ListCursor {
    list: SubkeyList,
    position: usize,
}

/// Lazy sequence of child key offsets under one subkey index.
///
/// Index cells are parsed one at a time as the walk reaches them. Every
/// index cell may be entered once; meeting one again means the index is
/// cyclic, which yields `CorruptHive` and ends the sequence. Any other
/// failure to read an index cell also ends it.
pub struct SubkeyOffsets<'h> {
    hive: &'h Hive,
    pending: Option<u32>,
    stack: Vec<ListCursor>,
    visited: HashSet<u32>,
    finished: bool,
}

impl<'h> SubkeyOffsets<'h> {
    /// Starts a walk at `list_offset`; `None` gives an empty sequence.
    pub fn new(hive: &'h Hive, list_offset: Option<u32>) -> Self {
        Self {
            hive,
            pending: list_offset,
            stack: Vec::new(),
            visited: HashSet::new(),
            finished: false,
        }
    }

    fn enter(&mut self, offset: u32) -> Result<()> {
        if !self.visited.insert(offset) {
            return Err(RegistryError::corrupt(
                offset,
                "subkey index refers back to an index already being walked",
            ));
        }

        let cell = self.hive.cell(offset)?;
        let list = SubkeyList::parse(cell.payload, offset)?;
        trace!(offset = %format!("{:#x}", offset), entries = list.len(), "Entering subkey index");
        self.stack.push(ListCursor { list, position: 0 });
        Ok(())
    }
}

impl<'h> Iterator for SubkeyOffsets<'h> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(offset) = self.pending.take() {
                if let Err(e) = self.enter(offset) {
                    self.finished = true;
                    return Some(Err(e));
                }
                continue;
            }

            let top = self.stack.last_mut()?;
            match top.list.get(top.position) {
                None => {
                    self.stack.pop();
                }
                Some(entry) => {
                    top.position += 1;
                    if top.list.is_index_root() {
                        self.pending = Some(entry);
                    } else {
                        return Some(Ok(entry));
                    }
                }
            }
        }
    }
}

impl std::iter::FusedIterator for SubkeyOffsets<'_> {}
