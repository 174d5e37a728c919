//! Main registry hive parser with memory-mapped file support.

use crate::bigdata::{BigDataBlock, BIG_DATA_SEGMENT_SIZE, MAX_DIRECT_DATA_SIZE};
use crate::cell::{Cell, ValueType};
use crate::error::{RegistryError, Result};
use crate::hbin::{BinMap, HbinHeader};
use crate::header::BaseBlock;
use crate::key::KeyNode;
use crate::subkey_list::SubkeyOffsets;
use crate::utils::{names_equal, read_u32_le, read_utf16_value};
use crate::value::{ValueData, ValueKey};
use chrono::{DateTime, Utc};
use memmap2::Mmap;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::{debug, instrument, trace};

/// Main registry hive parser.
///
/// A `Hive` owns the raw bytes of one hive file and decodes structures from
/// them on demand. Nothing is cached between calls and the bytes are never
/// modified, so a `Hive` can be shared between threads by reference.
#[derive(Debug)]
pub struct Hive {
    /// Hive data - either memory-mapped or owned.
    data: HiveData,

    /// Parsed base block header.
    base_block: BaseBlock,

    /// Cell areas of every hive bin.
    bins: BinMap,
}

/// Represents hive data storage.
#[derive(Debug)]
enum HiveData {
    /// Memory-mapped file data.
    Mapped(Mmap),
    /// Owned data.
    Owned(Vec<u8>),
}

impl HiveData {
    /// Returns a slice of the hive data.
    fn as_slice(&self) -> &[u8] {
        match self {
            HiveData::Mapped(mmap) => mmap,
            HiveData::Owned(data) => data,
        }
    }
}

impl Hive {
    /// Opens a registry hive file.
    ///
    /// The file is memory-mapped read-only. Only the base block and the chain
    /// of hbin headers are validated here; everything else is decoded lazily.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be opened or mapped, and
    /// `InvalidHeader` if it is not a valid hive.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use reg_hive::Hive;
    ///
    /// let hive = Hive::open("SOFTWARE").unwrap();
    /// let uninstall = hive.open_key(r"Microsoft\Windows\CurrentVersion\Uninstall").unwrap();
    /// for app in uninstall.subkeys().flatten() {
    ///     println!("{}", app.name());
    /// }
    /// ```
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();
        debug!(size = file_size, "Opening registry hive");

        if file_size == 0 {
            // Mapping an empty file fails on some platforms.
            return Err(RegistryError::invalid_header("hive file is empty"));
        }

        // SAFETY: the mapping is read-only and lives as long as the Hive. All
        // reads go through bounds-checked slices. Concurrent modification of
        // the file by another process is outside the supported model.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_data(HiveData::Mapped(mmap))
    }

    /// Creates a hive parser from an owned buffer.
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        Self::from_data(HiveData::Owned(data))
    }

    fn from_data(data: HiveData) -> Result<Self> {
        let base_block = BaseBlock::parse(data.as_slice())?;
        let bins = BinMap::scan(data.as_slice(), base_block.hive_length);

        if bins.is_empty() {
            return Err(RegistryError::invalid_header("no hive bins follow the base block"));
        }

        debug!(
            version = %format!("{}.{}", base_block.major_version, base_block.minor_version),
            bins = bins.len(),
            root = %format!("{:#x}", base_block.root_cell_offset),
            "Hive opened"
        );

        Ok(Self {
            data,
            base_block,
            bins,
        })
    }

    /// Returns a reference to the base block header.
    pub fn base_block(&self) -> &BaseBlock {
        &self.base_block
    }

    /// Returns the hive bin headers, in file order.
    pub fn bins(&self) -> &[HbinHeader] {
        self.bins.bins()
    }

    /// Reads the cell at `offset` (relative to the first hbin).
    ///
    /// # Errors
    ///
    /// Returns `CorruptHive` if the offset or the cell length is invalid.
    pub fn cell(&self, offset: u32) -> Result<Cell<'_>> {
        Cell::read(self.data.as_slice(), &self.bins, offset)
    }

    /// Returns the root key of the hive.
    pub fn root_key(&self) -> Result<RegistryKey<'_>> {
        self.get_key(self.base_block.root_cell_offset)
    }

    /// Decodes the key node at the given cell offset.
    pub fn get_key(&self, offset: u32) -> Result<RegistryKey<'_>> {
        let cell = self.cell(offset)?;
        let node = KeyNode::parse(cell.payload, offset)?;
        Ok(RegistryKey {
            hive: self,
            node,
        })
    }

    /// Decodes the value key at the given cell offset.
    pub fn get_value(&self, offset: u32) -> Result<RegistryValue<'_>> {
        let cell = self.cell(offset)?;
        let value_key = ValueKey::parse(cell.payload, offset)?;
        Ok(RegistryValue {
            hive: self,
            value_key,
        })
    }

    /// Resolves a sequence of key names, starting at the root.
    ///
    /// Each segment is matched case-insensitively against the children of the
    /// current key in index order, and the first match wins. An empty
    /// sequence resolves to the root key.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if a segment has no match among the children
    /// that decode; children that fail to decode are skipped. A subkey index
    /// that cannot be walked is returned as its own error.
    #[instrument(skip_all)]
    pub fn resolve<I, S>(&self, segments: I) -> Result<RegistryKey<'_>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut current = self.root_key()?;
        let mut walked = String::new();

        for segment in segments {
            let segment = segment.as_ref();
            if !walked.is_empty() {
                walked.push('\\');
            }
            walked.push_str(segment);

            current = current.find_subkey(segment, &walked)?;
        }

        debug!(path = %walked, offset = %format!("{:#x}", current.offset()), "Resolved key");
        Ok(current)
    }

    /// Resolves a path such as `Microsoft\Windows\CurrentVersion`.
    ///
    /// Both `\` and `/` separate segments; empty segments are ignored.
    pub fn open_key(&self, path: &str) -> Result<RegistryKey<'_>> {
        self.resolve(path.split(|c: char| c == '\\' || c == '/').filter(|segment| !segment.is_empty()))
    }

    /// Reads the bytes a value key refers to, trimmed to the declared length.
    fn read_value_data(&self, value_key: &ValueKey) -> Result<Vec<u8>> {
        if value_key.is_inline_data() {
            return value_key.inline_data();
        }

        let length = value_key.data_length();
        if length == 0 {
            return Ok(Vec::new());
        }

        if length > MAX_DIRECT_DATA_SIZE && self.base_block.supports_big_data() {
            return self.read_big_data(value_key.data_offset, length);
        }

        let cell = self.cell(value_key.data_offset)?;
        let length = length as usize;
        if cell.payload.len() < length {
            return Err(RegistryError::corrupt(
                value_key.data_offset,
                format!(
                    "data cell holds {} bytes, value declares {}",
                    cell.payload.len(),
                    length
                ),
            ));
        }

        Ok(cell.payload[..length].to_vec())
    }

    /// Reads a big data value by concatenating its segments in listed order.
    ///
    /// Every segment but the last contributes exactly 16344 bytes; the last
    /// one is cut so the result is exactly `expected_length` bytes long. A
    /// segment holding fewer bytes than its share is `CorruptHive`.
    fn read_big_data(&self, offset: u32, expected_length: u32) -> Result<Vec<u8>> {
        let header = BigDataBlock::parse(self.cell(offset)?.payload, offset)?;
        let list = self.cell(header.segment_list_offset)?;
        let segments = header.segment_offsets(list.payload)?;

        trace!(
            offset = %format!("{:#x}", offset),
            segments = segments.len(),
            length = expected_length,
            "Reading big data"
        );

        let expected_length = expected_length as usize;
        let mut data = Vec::with_capacity(expected_length);

        for segment_offset in segments {
            let remaining = expected_length - data.len();
            if remaining == 0 {
                break;
            }

            let segment = self.cell(segment_offset)?;
            let take = BIG_DATA_SEGMENT_SIZE.min(remaining);
            if segment.payload.len() < take {
                return Err(RegistryError::corrupt(
                    segment_offset,
                    format!(
                        "big data segment holds {} bytes, needs {}",
                        segment.payload.len(),
                        take
                    ),
                ));
            }
            data.extend_from_slice(&segment.payload[..take]);
        }

        if data.len() < expected_length {
            return Err(RegistryError::corrupt(
                offset,
                format!(
                    "big data segments hold {} bytes, value declares {}",
                    data.len(),
                    expected_length
                ),
            ));
        }

        Ok(data)
    }
}

/// A registry key with access to its hive.
#[derive(Clone)]
pub struct RegistryKey<'h> {
    hive: &'h Hive,
    node: KeyNode,
}

impl<'h> RegistryKey<'h> {
    /// Returns the decoded key node.
    pub fn key_node(&self) -> &KeyNode {
        &self.node
    }

    /// Returns the key name.
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Cell offset of this key (relative to first hbin).
    pub fn offset(&self) -> u32 {
        self.node.offset
    }

    /// Returns the number of subkeys recorded in the key node.
    pub fn subkey_count(&self) -> u32 {
        self.node.subkey_count
    }

    /// Returns the number of values recorded in the key node.
    pub fn value_count(&self) -> u32 {
        self.node.value_count
    }

    /// Last write time of the key.
    pub fn last_written(&self) -> Option<DateTime<Utc>> {
        self.node.last_written_datetime()
    }

    /// Returns a lazy iterator over the child keys.
    ///
    /// Each call walks the subkey index again from the start. A child whose
    /// key node cannot be decoded is yielded as an error and the walk moves on
    /// to the next sibling; a broken index ends the walk after its error.
    pub fn subkeys(&self) -> Subkeys<'h> {
        Subkeys {
            hive: self.hive,
            offsets: SubkeyOffsets::new(self.hive, self.node.subkey_list_offset),
        }
    }

    /// Finds a direct child by name, case-insensitively.
    pub fn subkey(&self, name: &str) -> Result<RegistryKey<'h>> {
        self.find_subkey(name, name)
    }

    fn find_subkey(&self, name: &str, path: &str) -> Result<RegistryKey<'h>> {
        for offset in SubkeyOffsets::new(self.hive, self.node.subkey_list_offset) {
            let offset = offset?;
            match self.hive.get_key(offset) {
                Ok(child) if names_equal(child.name(), name) => return Ok(child),
                Ok(_) => {}
                Err(e) => {
                    debug!(offset = %format!("{:#x}", offset), error = %e, "Skipping unreadable subkey");
                }
            }
        }

        Err(RegistryError::key_not_found(path))
    }

    /// Returns a lazy iterator over the values of this key.
    ///
    /// A value that cannot be decoded is yielded as an error and the walk
    /// moves on; an unreadable value list ends the walk after its error.
    pub fn values(&self) -> Values<'h> {
        Values {
            key: self.clone(),
            offsets: None,
            index: 0,
            finished: false,
        }
    }

    /// Gets a value by name, case-insensitively. The empty name selects the
    /// default value.
    ///
    /// Values whose descriptors cannot be decoded are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ValueNotFound` if no readable value has that name, and
    /// `CorruptHive` if the value list itself cannot be read.
    pub fn value(&self, name: &str) -> Result<RegistryValue<'h>> {
        let list = match self.value_list()? {
            Some(list) => list,
            None => return Err(RegistryError::value_not_found(name)),
        };

        for position in (0..list.len()).step_by(4) {
            let offset = read_u32_le(list, position)?;
            match self.hive.get_value(offset) {
                Ok(value) if names_equal(value.name(), name) => return Ok(value),
                Ok(_) => {}
                Err(e) => {
                    debug!(offset = %format!("{:#x}", offset), error = %e, "Skipping unreadable value");
                }
            }
        }

        Err(RegistryError::value_not_found(name))
    }

    /// Reads the value offset list, trimmed to the value count.
    fn value_list(&self) -> Result<Option<&'h [u8]>> {
        let list_offset = match self.node.value_list_offset {
            Some(offset) if self.node.value_count > 0 => offset,
            _ => return Ok(None),
        };

        let cell = self.hive.cell(list_offset)?;
        let needed = self.node.value_count as usize * 4;
        if cell.payload.len() < needed {
            return Err(RegistryError::truncated(list_offset, needed, cell.payload.len()));
        }
        Ok(Some(&cell.payload[..needed]))
    }

    /// Looks up an optional value: a missing value is `Ok(None)`, while an
    /// unreadable value list is still an error.
    ///
    /// ```no_run
    /// # use reg_hive::Hive;
    /// # let hive = Hive::open("SOFTWARE").unwrap();
    /// # let app = hive.root_key().unwrap();
    /// let version = app
    ///     .try_value("DisplayVersion")?
    ///     .map(|v| v.data())
    ///     .transpose()?
    ///     .map(|d| d.to_string())
    ///     .unwrap_or_else(|| "N/A".to_string());
    /// # Ok::<(), reg_hive::RegistryError>(())
    /// ```
    pub fn try_value(&self, name: &str) -> Result<Option<RegistryValue<'h>>> {
        match self.value(name) {
            Ok(value) => Ok(Some(value)),
            Err(RegistryError::ValueNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns the parent key, or `None` for the root key.
    pub fn parent(&self) -> Result<Option<RegistryKey<'h>>> {
        if self.node.is_root() {
            return Ok(None);
        }
        self.hive.get_key(self.node.parent_offset).map(Some)
    }

    /// Returns the path of this key below the root, segments joined by `\`.
    ///
    /// The root key itself has an empty path, so the result can be passed
    /// back to [`Hive::open_key`].
    ///
    /// # Errors
    ///
    /// Returns `CorruptHive` if the parent chain loops.
    pub fn path(&self) -> Result<String> {
        let mut segments = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.clone();

        while !current.node.is_root() {
            if !visited.insert(current.offset()) {
                return Err(RegistryError::corrupt(current.offset(), "parent chain is cyclic"));
            }
            segments.push(current.node.name.clone());
            current = match current.parent()? {
                Some(parent) => parent,
                None => break,
            };
        }

        segments.reverse();
        Ok(segments.join("\\"))
    }

    /// Reads the class name of this key, if it has one.
    pub fn class_name(&self) -> Result<Option<String>> {
        let offset = match self.node.class_name_offset {
            Some(offset) if self.node.class_name_length > 0 => offset,
            _ => return Ok(None),
        };

        let cell = self.hive.cell(offset)?;
        let length = self.node.class_name_length as usize;
        if cell.payload.len() < length {
            return Err(RegistryError::truncated(offset, length, cell.payload.len()));
        }
        Ok(Some(read_utf16_value(&cell.payload[..length])))
    }
}

impl std::fmt::Debug for RegistryKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryKey")
            .field("name", &self.node.name)
            .field("offset", &format_args!("{:#x}", self.node.offset))
            .finish()
    }
}

/// Lazy iterator over the child keys of a key.
pub struct Subkeys<'h> {
    hive: &'h Hive,
    offsets: SubkeyOffsets<'h>,
}

impl<'h> Iterator for Subkeys<'h> {
    type Item = Result<RegistryKey<'h>>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = match self.offsets.next()? {
            Ok(offset) => offset,
            Err(e) => return Some(Err(e)),
        };
        Some(self.hive.get_key(offset))
    }
}

/// Lazy iterator over the values of a key.
pub struct Values<'h> {
    key: RegistryKey<'h>,
    offsets: Option<&'h [u8]>,
    index: usize,
    finished: bool,
}

impl<'h> Iterator for Values<'h> {
    type Item = Result<RegistryValue<'h>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let list = match self.offsets {
            Some(list) => list,
            None => match self.key.value_list() {
                Ok(Some(list)) => {
                    self.offsets = Some(list);
                    list
                }
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            },
        };

        let position = self.index * 4;
        if position >= list.len() {
            self.finished = true;
            return None;
        }

        self.index += 1;
        Some(read_u32_le(list, position).and_then(|offset| self.key.hive.get_value(offset)))
    }
}

/// A registry value with access to its hive.
#[derive(Clone)]
pub struct RegistryValue<'h> {
    hive: &'h Hive,
    value_key: ValueKey,
}

impl<'h> RegistryValue<'h> {
    /// Returns the value name. Empty for the default value.
    pub fn name(&self) -> &str {
        &self.value_key.name
    }

    /// Returns the decoded value descriptor.
    pub fn value_key(&self) -> &ValueKey {
        &self.value_key
    }

    /// Returns the value data type.
    pub fn data_type(&self) -> ValueType {
        self.value_key.data_type
    }

    /// Resolves the value to typed data.
    pub fn data(&self) -> Result<ValueData> {
        let raw = self.hive.read_value_data(&self.value_key)?;
        ValueData::parse(&raw, self.value_key.data_type, self.value_key.offset)
    }

    /// Returns the raw value bytes, exactly as long as the declared size.
    pub fn raw_data(&self) -> Result<Vec<u8>> {
        self.hive.read_value_data(&self.value_key)
    }
}

impl std::fmt::Debug for RegistryValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryValue")
            .field("name", &self.value_key.name)
            .field("type", &self.value_key.data_type)
            .finish()
    }
}
