//! In-memory hive builder shared by the integration tests.
//!
//! Cells are appended to a single hive bin in allocation order. Keys are
//! built bottom-up: children first, then their index, then the parent, and
//! parent pointers are patched afterwards with [`HiveBuilder::set_parent`].

#![allow(dead_code)]

use reg_hive::utils::calculate_checksum;

pub const NONE: u32 = 0xFFFF_FFFF;
pub const KEY_COMP_NAME: u16 = 0x0020;
pub const KEY_ROOT: u16 = 0x0004;
pub const REG_SZ: u32 = 1;
pub const REG_BINARY: u32 = 3;
pub const REG_DWORD: u32 = 4;
pub const REG_MULTI_SZ: u32 = 7;
pub const INLINE: u32 = 0x8000_0000;

pub fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

pub fn utf16z(s: &str) -> Vec<u8> {
    let mut data = utf16(s);
    data.extend_from_slice(&[0, 0]);
    data
}

#[derive(Default)]
pub struct HiveBuilder {
    cells: Vec<u8>,
    minor_version: u32,
}

impl HiveBuilder {
    pub fn new() -> Self {
        Self {
            cells: Vec::new(),
            minor_version: 5,
        }
    }

    pub fn minor_version(mut self, minor: u32) -> Self {
        self.minor_version = minor;
        self
    }

    /// Appends an allocated cell holding exactly `payload`; returns its offset.
    pub fn cell(&mut self, payload: &[u8]) -> u32 {
        let length = -((payload.len() + 4) as i32);
        self.raw_cell(length, payload)
    }

    /// Appends a cell with an arbitrary declared length.
    pub fn raw_cell(&mut self, length: i32, payload: &[u8]) -> u32 {
        let offset = 0x20 + self.cells.len() as u32;
        self.cells.extend_from_slice(&length.to_le_bytes());
        self.cells.extend_from_slice(payload);
        offset
    }

    /// Overwrites four bytes inside an already allocated cell's payload.
    pub fn patch_u32(&mut self, cell_offset: u32, field: usize, value: u32) {
        let at = (cell_offset - 0x20) as usize + 4 + field;
        self.cells[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn key(&mut self, name: &str, subkeys: Option<u32>, subkey_count: u32, values: &[u32]) -> u32 {
        self.key_with_flags(name, KEY_COMP_NAME, subkeys, subkey_count, values)
    }

    pub fn key_with_flags(
        &mut self,
        name: &str,
        flags: u16,
        subkeys: Option<u32>,
        subkey_count: u32,
        values: &[u32],
    ) -> u32 {
        let value_list = if values.is_empty() {
            NONE
        } else {
            let list: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            self.cell(&list)
        };

        let name_bytes = if flags & KEY_COMP_NAME != 0 {
            name.as_bytes().to_vec()
        } else {
            utf16(name)
        };

        let mut nk = vec![0u8; 0x4C];
        nk[0..2].copy_from_slice(b"nk");
        nk[0x02..0x04].copy_from_slice(&flags.to_le_bytes());
        nk[0x04..0x0C].copy_from_slice(&132_000_000_000_000_000u64.to_le_bytes());
        nk[0x10..0x14].copy_from_slice(&NONE.to_le_bytes());
        nk[0x14..0x18].copy_from_slice(&subkey_count.to_le_bytes());
        nk[0x1C..0x20].copy_from_slice(&subkeys.unwrap_or(NONE).to_le_bytes());
        nk[0x20..0x24].copy_from_slice(&NONE.to_le_bytes());
        nk[0x24..0x28].copy_from_slice(&(values.len() as u32).to_le_bytes());
        nk[0x28..0x2C].copy_from_slice(&value_list.to_le_bytes());
        nk[0x2C..0x30].copy_from_slice(&NONE.to_le_bytes());
        nk[0x30..0x34].copy_from_slice(&NONE.to_le_bytes());
        nk[0x48..0x4A].copy_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        nk.extend_from_slice(&name_bytes);
        self.cell(&nk)
    }

    pub fn root(&mut self, subkeys: Option<u32>, subkey_count: u32, values: &[u32]) -> u32 {
        self.key_with_flags("ROOT", KEY_COMP_NAME | KEY_ROOT, subkeys, subkey_count, values)
    }

    pub fn set_parent(&mut self, key: u32, parent: u32) {
        self.patch_u32(key, 0x10, parent);
    }

    pub fn set_class_name(&mut self, key: u32, class: &str) {
        let bytes = utf16(class);
        let cell = self.cell(&bytes);
        self.patch_u32(key, 0x30, cell);
        let at = (key - 0x20) as usize + 4 + 0x4A;
        self.cells[at..at + 2].copy_from_slice(&(bytes.len() as u16).to_le_bytes());
    }

    /// Adds a hash leaf ("lh") listing `keys` in the given order.
    pub fn hash_leaf(&mut self, keys: &[u32]) -> u32 {
        let mut data = b"lh".to_vec();
        data.extend_from_slice(&(keys.len() as u16).to_le_bytes());
        for &key in keys {
            data.extend_from_slice(&key.to_le_bytes());
            data.extend_from_slice(&0u32.to_le_bytes());
        }
        self.cell(&data)
    }

    /// Adds an index leaf ("li").
    pub fn index_leaf(&mut self, keys: &[u32]) -> u32 {
        self.offset_list(b"li", keys)
    }

    /// Adds an index root ("ri") pointing at other lists.
    pub fn index_root(&mut self, lists: &[u32]) -> u32 {
        self.offset_list(b"ri", lists)
    }

    fn offset_list(&mut self, signature: &[u8; 2], offsets: &[u32]) -> u32 {
        let mut data = signature.to_vec();
        data.extend_from_slice(&(offsets.len() as u16).to_le_bytes());
        for &offset in offsets {
            data.extend_from_slice(&offset.to_le_bytes());
        }
        self.cell(&data)
    }

    /// Adds a value key with an explicit size field and data offset.
    pub fn value_raw(&mut self, name: &str, value_type: u32, size: u32, data_offset: u32) -> u32 {
        let mut vk = vec![0u8; 0x14];
        vk[0..2].copy_from_slice(b"vk");
        vk[0x02..0x04].copy_from_slice(&(name.len() as u16).to_le_bytes());
        vk[0x04..0x08].copy_from_slice(&size.to_le_bytes());
        vk[0x08..0x0C].copy_from_slice(&data_offset.to_le_bytes());
        vk[0x0C..0x10].copy_from_slice(&value_type.to_le_bytes());
        vk[0x10..0x12].copy_from_slice(&1u16.to_le_bytes());
        vk.extend_from_slice(name.as_bytes());
        self.cell(&vk)
    }

    /// Adds a value whose data lives in its own cell.
    pub fn value(&mut self, name: &str, value_type: u32, data: &[u8]) -> u32 {
        if data.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..data.len()].copy_from_slice(data);
            return self.value_raw(
                name,
                value_type,
                INLINE | data.len() as u32,
                u32::from_le_bytes(inline),
            );
        }
        let data_cell = self.cell(data);
        self.value_raw(name, value_type, data.len() as u32, data_cell)
    }

    pub fn string_value(&mut self, name: &str, data: &str) -> u32 {
        self.value(name, REG_SZ, &utf16z(data))
    }

    pub fn dword_value(&mut self, name: &str, data: u32) -> u32 {
        self.value(name, REG_DWORD, &data.to_le_bytes())
    }

    /// Adds a big data value whose segments are the given payloads.
    pub fn big_data_value(&mut self, name: &str, value_type: u32, size: u32, segments: &[Vec<u8>]) -> u32 {
        let offsets: Vec<u32> = segments.iter().map(|s| self.cell(s)).collect();
        let list: Vec<u8> = offsets.iter().flat_map(|o| o.to_le_bytes()).collect();
        let list_cell = self.cell(&list);

        let mut db = b"db".to_vec();
        db.extend_from_slice(&(segments.len() as u16).to_le_bytes());
        db.extend_from_slice(&list_cell.to_le_bytes());
        let db_cell = self.cell(&db);

        self.value_raw(name, value_type, size, db_cell)
    }

    /// Serializes the base block and a single hive bin.
    pub fn build(self, root: u32) -> Vec<u8> {
        let used = 0x20 + self.cells.len();
        let bin_size = (used + 0xFFF) / 0x1000 * 0x1000;

        let mut data = vec![0u8; 0x1000 + bin_size];
        data[0..4].copy_from_slice(b"regf");
        data[0x04..0x08].copy_from_slice(&1u32.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&1u32.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&1u32.to_le_bytes());
        data[0x18..0x1C].copy_from_slice(&self.minor_version.to_le_bytes());
        data[0x20..0x24].copy_from_slice(&1u32.to_le_bytes());
        data[0x24..0x28].copy_from_slice(&root.to_le_bytes());
        data[0x28..0x2C].copy_from_slice(&(bin_size as u32).to_le_bytes());
        data[0x2C..0x30].copy_from_slice(&1u32.to_le_bytes());
        let checksum = calculate_checksum(&data);
        data[0x1FC..0x200].copy_from_slice(&checksum.to_le_bytes());

        let bin = &mut data[0x1000..];
        bin[0..4].copy_from_slice(b"hbin");
        bin[0x08..0x0C].copy_from_slice(&(bin_size as u32).to_le_bytes());
        bin[0x20..used].copy_from_slice(&self.cells);

        let free = bin_size - used;
        if free >= 8 {
            bin[used..used + 4].copy_from_slice(&(free as i32).to_le_bytes());
        }

        data
    }
}

/// A small SOFTWARE-like hive:
///
/// ```text
/// ROOT
///   Microsoft
///     Windows
///       CurrentVersion
///         Uninstall
///           App1   DisplayName, DisplayVersion, Publisher
///           App2   (no values)
///           App3   DisplayName only
///   Classes        (default) = "classes root"
/// ```
pub fn software_hive() -> Vec<u8> {
    let mut b = HiveBuilder::new();

    let v1 = b.string_value("DisplayName", "Seven Zip");
    let v2 = b.string_value("DisplayVersion", "23.01");
    let v3 = b.string_value("Publisher", "Igor Pavlov");
    let app1 = b.key("App1", None, 0, &[v1, v2, v3]);
    let app2 = b.key("App2", None, 0, &[]);
    let v4 = b.string_value("DisplayName", "Notepad Plus");
    let app3 = b.key("App3", None, 0, &[v4]);

    let apps = b.hash_leaf(&[app1, app2, app3]);
    let uninstall = b.key("Uninstall", Some(apps), 3, &[]);
    let list = b.hash_leaf(&[uninstall]);
    let current = b.key("CurrentVersion", Some(list), 1, &[]);
    let list = b.hash_leaf(&[current]);
    let windows = b.key("Windows", Some(list), 1, &[]);
    let list = b.hash_leaf(&[windows]);
    let microsoft = b.key("Microsoft", Some(list), 1, &[]);

    let default = b.string_value("", "classes root");
    let classes = b.key("Classes", None, 0, &[default]);

    let top = b.hash_leaf(&[microsoft, classes]);
    let root = b.root(Some(top), 2, &[]);

    for (child, parent) in [
        (app1, uninstall),
        (app2, uninstall),
        (app3, uninstall),
        (uninstall, current),
        (current, windows),
        (windows, microsoft),
        (microsoft, root),
        (classes, root),
    ] {
        b.set_parent(child, parent);
    }

    b.build(root)
}
