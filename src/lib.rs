//! # Windows Registry Hive Parser
//!
//! A read-only parser for Windows registry hive files (SYSTEM, SOFTWARE, SAM,
//! NTUSER.DAT, ...), decoding the binary format directly.
//!
//! ## Features
//!
//! - **Lazy**: opening a hive only checks the base block and hive bin chain;
//!   keys, values and indexes are decoded when they are reached
//! - **Memory-mapped**: hive files are mapped read-only, cells borrow the map
//! - **Typed values**: strings, integers, multi-strings, binary, and tagged
//!   raw data for unrecognized types
//! - **Big data**: values larger than one cell are reassembled from segments
//! - **Shareable**: a [`Hive`] holds no mutable state and is `Send + Sync`
//!
//! ## Architecture
//!
//! 1. **Base Block** ([`header`]): signature, checksum, root key offset
//! 2. **Hive Bins** ([`hbin`]): 4KB-aligned blocks containing cells
//! 3. **Cells** ([`cell`]): length-prefixed allocation units
//! 4. **Key Nodes** ([`key`]): names, timestamps, pointers to children and values
//! 5. **Value Keys** ([`value`], [`bigdata`]): names, types and data location
//! 6. **Subkey Lists** ([`subkey_list`]): lf/lh/li/ri indexes of child keys
//!
//! ## Binary Layout
//!
//! ```text
//! [Base Block - 4KB]
//!   - Signature: "regf"
//!   - Sequence numbers, timestamp, version, root offset
//!   - Checksum
//!
//! [Hive Bins - variable size, 4KB aligned]
//!   [Hbin Header - 32 bytes]
//!   [Cells - variable size]
//!     [Cell Size - 4 bytes, negative if allocated]
//!     [Cell Data: nk / vk / lf / lh / li / ri / db / sk / raw data]
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use reg_hive::{Hive, RegistryError};
//!
//! # fn main() -> Result<(), RegistryError> {
//! let hive = Hive::open("SAM")?;
//! let names = hive.open_key(r"SAM\Domains\Account\Users\Names")?;
//!
//! for user in names.subkeys() {
//!     let user = user?;
//!     let rid = user.value("")?.value_key().data_type.as_u32();
//!     println!("{} (RID: {})", user.name(), rid);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bigdata;
pub mod cell;
pub mod error;
pub mod hbin;
pub mod header;
pub mod hive;
pub mod key;
pub mod subkey_list;
pub mod utils;
pub mod value;

// Re-export main types for convenience
pub use cell::{Cell, KeyNodeFlags, ValueType};
pub use error::{RegistryError, Result};
pub use hbin::HbinHeader;
pub use header::BaseBlock;
pub use hive::{Hive, RegistryKey, RegistryValue, Subkeys, Values};
pub use key::KeyNode;
pub use subkey_list::{SubkeyList, SubkeyListEntry, SubkeyListType, SubkeyOffsets};
pub use value::{ValueData, ValueKey};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
