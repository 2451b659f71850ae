// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
// - 'file/physical.rs' and 'file/output.rs' use mmap to map files into memory

//! # dexscope
//!
//! A bit-exact codec for Dalvik executable (DEX) containers. `dexscope` parses existing
//! containers into an in-memory item graph, lets new content be interned into it, lays the
//! result out again and writes a container whose header, map, signature and checksum are
//! all consistent.
//!
//! ## Features
//!
//! - **Round-trip fidelity** - In-place layout reproduces a parsed container byte for byte
//! - **Deduplicating construction** - Every item enters its section through interning
//! - **Deterministic output** - Canonical layout sorts every section for diffable results
//! - **Fail-fast placement** - Offsets and indices cannot be read before they exist
//! - **Diagnosable errors** - Failures carry the identity of every item they passed through
//!
//! ## Quick Start
//!
//! ```rust
//! use dexscope::prelude::*;
//!
//! let mut dex = DexFile::with_options(DexOptions::canonical());
//! let main = dex.intern_method("LMain;", "main", "V", &["[Ljava/lang/String;"])?;
//! dex.place()?;
//! let bytes = dex.encode()?;
//!
//! let parsed = DexFile::from_bytes(&bytes)?;
//! assert_eq!(parsed.methods().len(), 1);
//! assert_eq!(parsed.index_of(parsed.methods().ids()[0])?, dex.index_of(main)?);
//! # Ok::<(), dexscope::Error>(())
//! ```
//!
//! ### Re-writing an existing file
//!
//! ```rust,no_run
//! use dexscope::{file::Input, DexFile, DexOptions};
//!
//! let input = Input::from_file("classes.dex")?;
//! let mut dex = DexFile::from_input(&input, DexOptions::in_place())?;
//! dex.place()?;
//! let bytes = dex.encode()?;
//! assert_eq!(bytes.len() as u32, dex.header().map_or(0, |header| header.file_size));
//! # Ok::<(), dexscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`dex`] - The container, its item kinds, placement and encoding
//! - [`file`] - Input backends, the byte-level [`Parser`] and [`file::writer::Writer`]
//! - [`utils`] - Checked arithmetic, MUTF-8 and checksum helpers
//! - [`Error`] and [`Result`] - Error handling
//!
//! ### Pipeline
//!
//! Parsing reads the header, then the map, then every section in dependency order. Items
//! referenced by offset before their own section is reached are decoded on demand and reused
//! when the section is traversed. Placement assigns each item its offset and index in one of
//! three layout modes ([`dex::LayoutMode`]), ordering class definitions after their
//! superclasses and interfaces. Encoding writes header, sections and map in placement order
//! and finishes with the SHA-1 signature and Adler-32 checksum.
//!
//! ### Logging
//!
//! The crate emits `tracing` events (section parsed, container placed, container encoded,
//! non-fatal anomalies) and never installs a subscriber itself.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use dexscope::prelude::*;
///
/// let mut dex = DexFile::new();
/// let ty: Id<TypeIdItem> = dex.intern_type("LFoo;")?;
/// dex.place()?;
/// assert_eq!(dex.index_of(ty)?, 0);
/// # Ok::<(), dexscope::Error>(())
/// ```
pub mod prelude;

pub mod dex;
pub mod file;
pub mod utils;

/// `dexscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use dexscope::{DexFile, Result};
///
/// fn load(path: &str) -> Result<DexFile> {
///     DexFile::from_file(path)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `dexscope` Error type
///
/// The main error type for all operations in this crate.
///
/// # Example
///
/// ```rust,no_run
/// use dexscope::{DexFile, Error};
///
/// match DexFile::from_file("classes.dex") {
///     Ok(dex) => println!("{} classes", dex.class_defs().len()),
///     Err(Error::Format(message)) => println!("Not a supported container: {message}"),
///     Err(e) => println!("Error: {}", e.root()),
/// }
/// ```
pub use error::Error;

/// The container and its options.
///
/// See [`dex::DexFile`] for the parse / place / encode pipeline.
pub use dex::{DexFile, DexOptions};

/// Low-level reader used by every item codec.
///
/// # Example
///
/// ```rust
/// use dexscope::Parser;
///
/// let data = [0xE5, 0x8E, 0x26];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_uleb128()?, 624_485);
/// # Ok::<(), dexscope::Error>(())
/// ```
pub use file::parser::Parser;
