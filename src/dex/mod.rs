//! The DEX container model and its codec.
//!
//! This module holds everything needed to read, build, lay out and write a DEX container:
//! the item kinds, their sections, the parse-time reference resolver, the placement pass and
//! the encoder.
//!
//! # Key Components
//!
//! ## Container
//! - [`crate::dex::DexFile`] - All sections of one container plus the parse / place / encode pipeline
//! - [`crate::dex::DexOptions`] - Layout mode, output version and diagnostics switches
//!
//! ## Item Model
//! - [`crate::dex::Item`] - The per-kind codec contract
//! - [`crate::dex::Section`] - Arena storage with interning and placement state
//! - [`crate::dex::Id`] - Stable, typed handle to an item
//! - [`crate::dex::items`] - The concrete record kinds
//! - [`crate::dex::value`] - `encoded_value` trees used by annotations and static values
//!
//! ## Layout
//! - [`crate::dex::ItemKind`] - Map codes, alignment and section orders
//! - [`crate::dex::ClassDefPlacer`] - Superclass-first ordering of class definitions
//! - [`crate::dex::Layout`] - The derived map and header fields of a placement
//!
//! # Examples
//!
//! ```rust
//! use dexscope::dex::{DexFile, DexOptions};
//!
//! let mut dex = DexFile::with_options(DexOptions::canonical());
//! let run = dex.intern_method("LMain;", "run", "V", &["I"])?;
//! dex.place()?;
//! assert_eq!(dex.index_of(run)?, 0);
//! # Ok::<(), dexscope::Error>(())
//! ```

mod config;
mod container;
mod context;
mod header;
mod item;
mod kind;
mod map;
mod odex;
mod placer;
mod section;

pub mod instruction;
pub mod items;
pub mod value;

pub use config::{DexOptions, LayoutMode};
pub use container::{DexFile, DexState};
pub use context::{ReadContext, NO_INDEX};
pub use header::{DexVersion, HeaderItem, SectionRef, HEADER_SIZE};
pub use item::{Item, SortContext};
pub use kind::{ItemKind, INDEXED_ORDER, OFFSETTED_ORDER, PARSE_ORDER};
pub use map::{Layout, MapEntry};
pub use odex::OdexHeader;
pub use placer::ClassDefPlacer;
pub use section::{Id, Placement, Section};
