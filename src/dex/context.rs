//! Parse-scoped reference resolution.
//!
//! Sections are parsed in dependency order so that an index reference always lands in a
//! section that has already been read in full. Offset references can still point forward,
//! e.g. into a section the map lists before its referrers are reached; such targets are
//! decoded on demand, cached by `(kind, offset)`, and reused when their own section is
//! traversed later.
//!
//! # Architecture
//!
//! A [`ReadContext`] wraps the [`crate::DexFile`] under construction and tracks, per kind:
//!
//! - the declared extent of the section, taken from the map and checked against the header,
//! - the items already decoded, keyed by the offset they were read from,
//! - the keys currently being decoded, which turns a reference cycle into an error instead of
//!   unbounded recursion.
//!
//! Resolving an offset reference checks that it lies inside the declared section of its kind.
//! When the section walk later reaches that section, every cached item must turn up on an
//! item boundary of the walk. The context is then consumed by `finish` and the container is
//! handed back.
//!
//! # Error Handling
//!
//! - [`crate::Error::Format`] for a declared section that cannot fit in the input
//! - [`crate::Error::Consistency`] when the header and the map disagree
//! - [`crate::Error::Resolution`] for a dangling index or offset, or an item that refers back
//!   to itself while being decoded

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::{
    dex::{
        header::{HeaderItem, SectionRef},
        item::Item,
        kind::ItemKind,
        map::MapEntry,
        section::{Id, Placement},
        DexFile,
    },
    file::parser::Parser,
    utils::math::to_u32,
    Result,
};

/// Index value meaning "no reference".
pub const NO_INDEX: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy)]
struct Cached {
    raw: u32,
    end: usize,
}

/// Lookup state for one parse.
///
/// Owns the container under construction; [`ReadContext::finish`] hands it back once every
/// section has been read.
pub struct ReadContext<'a> {
    data: &'a [u8],
    dex: DexFile,
    declared: HashMap<ItemKind, SectionRef>,
    cached: HashMap<(ItemKind, u32), Cached>,
    decoding: HashSet<(ItemKind, u32)>,
    traversed: HashSet<ItemKind>,
    signed_registers: usize,
}

impl<'a> ReadContext<'a> {
    /// Creates a context reading `data` into `dex`.
    pub(crate) fn new(data: &'a [u8], dex: DexFile) -> Self {
        ReadContext {
            data,
            dex,
            declared: HashMap::new(),
            cached: HashMap::new(),
            decoding: HashSet::new(),
            traversed: HashSet::new(),
            signed_registers: 0,
        }
    }

    /// The container under construction.
    #[must_use]
    pub fn dex(&self) -> &DexFile {
        &self.dex
    }

    /// Records the map's directory after cross-checking it against the header.
    ///
    /// # Errors
    /// - [`crate::Error::Format`] if a section cannot fit its declared count between its
    ///   offset and the end of the input
    /// - [`crate::Error::Consistency`] naming the section and both declarations when the
    ///   header and the map disagree
    pub(crate) fn declare(&mut self, header: &HeaderItem, entries: &[MapEntry]) -> Result<()> {
        for entry in entries {
            if entry.count == 0 {
                warn!(kind = %entry.kind, offset = entry.offset, "map declares an empty section");
            }
            let needed = u64::from(entry.count) * u64::from(entry.kind.min_size());
            let available = (self.data.len() as u64).saturating_sub(u64::from(entry.offset));
            if needed > available {
                return Err(format_error!(
                    "{}: {} items at 0x{:x} need at least 0x{:x} bytes, 0x{:x} available",
                    entry.kind,
                    entry.count,
                    entry.offset,
                    needed,
                    available
                ));
            }
            self.declared.insert(
                entry.kind,
                SectionRef {
                    count: entry.count,
                    offset: entry.offset,
                },
            );
        }

        let expected = [
            (ItemKind::Header, SectionRef { count: 1, offset: 0 }),
            (
                ItemKind::MapList,
                SectionRef {
                    count: 1,
                    offset: header.map_offset,
                },
            ),
        ];
        for (kind, declared) in header.sections.iter().copied().chain(expected) {
            let listed = self.declared.get(&kind).copied();
            let agrees = match listed {
                Some(listed) => listed == declared,
                None => declared.count == 0,
            };
            if !agrees {
                let listed = listed.unwrap_or_default();
                return Err(consistency_error!(
                    "{kind}: header declares {} items at 0x{:x}, map declares {} items at 0x{:x}",
                    declared.count,
                    declared.offset,
                    listed.count,
                    listed.offset
                ));
            }
        }

        Ok(())
    }

    /// Resolves an index reference into an already parsed indexed section.
    ///
    /// # Errors
    /// Returns [`crate::Error::Resolution`] if `index` is out of range.
    pub fn index<T: Item>(&self, index: u32) -> Result<Id<T>> {
        T::section(&self.dex).id_at(index)
    }

    /// Like [`ReadContext::index`], with [`NO_INDEX`] meaning "absent".
    ///
    /// # Errors
    /// Returns [`crate::Error::Resolution`] if `index` is out of range.
    pub fn optional_index<T: Item>(&self, index: u32) -> Result<Option<Id<T>>> {
        if index == NO_INDEX {
            Ok(None)
        } else {
            self.index(index).map(Some)
        }
    }

    /// Like [`ReadContext::offset`], with 0 meaning "absent".
    ///
    /// # Errors
    /// See [`ReadContext::offset`].
    pub fn optional_offset<T: Item>(&mut self, offset: u32) -> Result<Option<Id<T>>> {
        if offset == 0 {
            Ok(None)
        } else {
            self.offset(offset).map(Some)
        }
    }

    /// Resolves an offset reference, decoding the target on demand if its section has not
    /// been traversed yet.
    ///
    /// # Errors
    /// Returns [`crate::Error::Resolution`] if no item of kind `T` starts at `offset`, or
    /// any error raised while decoding the target.
    pub fn offset<T: Item>(&mut self, offset: u32) -> Result<Id<T>> {
        let key = (T::KIND, offset);
        if let Some(cached) = self.cached.get(&key) {
            return Ok(Id::new(cached.raw));
        }

        if self.traversed.contains(&T::KIND) {
            return Err(resolution_error!(
                "could not find the {} item at offset 0x{:x}",
                T::KIND,
                offset
            ));
        }

        let Some(section) = self.declared.get(&T::KIND).copied() else {
            return Err(resolution_error!(
                "reference to {} at 0x{:x}, but the map declares no such section",
                T::KIND,
                offset
            ));
        };
        if offset < section.offset || offset % T::KIND.alignment() != 0 {
            return Err(resolution_error!(
                "reference to {} at 0x{:x} does not land inside its section at 0x{:x}",
                T::KIND,
                offset,
                section.offset
            ));
        }

        if !self.decoding.insert(key) {
            return Err(resolution_error!(
                "{} at 0x{:x} references itself",
                T::KIND,
                offset
            ));
        }

        let data = self.data;
        let mut parser = Parser::at(data, offset as usize)?;
        let decoded = T::read(&mut parser, self);
        self.decoding.remove(&key);
        let item = decoded.map_err(|e| e.within(format!("{} @0x{:x}", T::KIND, offset)))?;

        let id = T::section_mut(&mut self.dex).push(item)?;
        self.cached.insert(
            key,
            Cached {
                raw: id.raw(),
                end: parser.pos(),
            },
        );
        Ok(id)
    }

    /// Reads every item of section `T` in file order.
    ///
    /// Items that were decoded on demand are reused rather than decoded again. Afterwards the
    /// section's order is file order and every item carries its parsed offset and index.
    ///
    /// # Errors
    /// Any decoding error wrapped with the failing item's identity, or
    /// [`crate::Error::Resolution`] if an item referenced by offset turned out not to be part
    /// of the section.
    pub(crate) fn read_section<T: Item>(&mut self) -> Result<()> {
        let Some(section) = self.declared.get(&T::KIND).copied() else {
            self.traversed.insert(T::KIND);
            return Ok(());
        };
        if section.offset == 0 {
            self.traversed.insert(T::KIND);
            return Ok(());
        }

        let data = self.data;
        let mut parser = Parser::at(data, section.offset as usize)?;
        let alignment = T::KIND.alignment() as usize;
        let mut order = Vec::with_capacity(section.count.min(0x1_0000) as usize);
        let mut visited = HashSet::new();

        for index in 0..section.count {
            parser.align(alignment)?;
            let offset = to_u32(parser.pos())?;

            let id = match self.cached.get(&(T::KIND, offset)).copied() {
                Some(cached) => {
                    parser.seek(cached.end)?;
                    Id::new(cached.raw)
                }
                None => {
                    let item = T::read(&mut parser, self).map_err(|e| {
                        e.within(if T::KIND.is_indexed() {
                            format!("{} #{}", T::KIND, index)
                        } else {
                            format!("{} @0x{:x}", T::KIND, offset)
                        })
                    })?;
                    let id = T::section_mut(&mut self.dex).push(item)?;
                    if !T::KIND.is_indexed() {
                        self.cached.insert(
                            (T::KIND, offset),
                            Cached {
                                raw: id.raw(),
                                end: parser.pos(),
                            },
                        );
                    }
                    id
                }
            };

            T::section_mut(&mut self.dex).set_placement(id, Placement::Placed { offset, index });
            visited.insert(offset);
            order.push(id);
        }

        if let Some(((kind, offset), _)) = self
            .cached
            .iter()
            .find(|((kind, offset), _)| *kind == T::KIND && !visited.contains(offset))
        {
            return Err(resolution_error!(
                "{} at 0x{:x} is referenced but is not part of its section",
                kind,
                offset
            ));
        }

        let target = T::section_mut(&mut self.dex);
        target.set_order(order);
        target.set_offset(Some(section.offset));
        self.traversed.insert(T::KIND);

        debug!(
            kind = %T::KIND,
            count = section.count,
            offset = section.offset,
            "parsed section"
        );
        Ok(())
    }

    /// Notes a debug info register operand encoded in the legacy signed form.
    pub(crate) fn note_signed_register(&mut self) {
        self.signed_registers += 1;
    }

    /// Hands back the parsed container.
    pub(crate) fn finish(self) -> DexFile {
        if self.signed_registers > 0 && !self.dex.options().preserve_signed_registers {
            warn!(
                count = self.signed_registers,
                "debug info uses signed register operands; they will be re-encoded unsigned"
            );
        }
        self.dex
    }
}
