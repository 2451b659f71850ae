//! The map list, the container's table of contents, and the layout it describes.
//!
//! The map is derived from placement and never authored independently: [`Layout`] is built
//! by [`crate::DexFile::place`] and both the header and the map are encoded from it.

use std::collections::HashSet;

use crate::{
    dex::{header::SectionRef, kind::ItemKind},
    file::{parser::Parser, writer::Writer},
    utils::math::to_u32,
    Result,
};

/// Size of one map entry in bytes.
pub const MAP_ENTRY_SIZE: u32 = 12;

/// One directory entry of the map list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapEntry {
    /// Kind of the section
    pub kind: ItemKind,
    /// Number of items in the section
    pub count: u32,
    /// Offset of the section's first item
    pub offset: u32,
}

/// Reads a map list at the parser's position.
///
/// # Errors
/// Returns [`crate::Error::Format`] for an unsupported kind code and
/// [`crate::Error::Consistency`] if a kind is listed twice.
pub fn read_map(parser: &mut Parser<'_>) -> Result<Vec<MapEntry>> {
    let count = parser.read_le::<u32>()?;
    let mut entries = Vec::new();
    let mut seen = HashSet::new();

    for _ in 0..count {
        let code = parser.read_le::<u16>()?;
        let _unused = parser.read_le::<u16>()?;
        let item_count = parser.read_le::<u32>()?;
        let offset = parser.read_le::<u32>()?;

        let kind = ItemKind::from_code(code)
            .ok_or_else(|| format_error!("unsupported map item kind 0x{code:04x}"))?;
        if !seen.insert(kind) {
            return Err(consistency_error!("map lists {kind} more than once"));
        }

        entries.push(MapEntry {
            kind,
            count: item_count,
            offset,
        });
    }

    Ok(entries)
}

/// Final placement of every section, as recorded in the header and the map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Layout {
    /// Total size of the container
    pub file_size: u32,
    /// Start of the data region, right after the indexed sections
    pub data_offset: u32,
    /// Size of the data region, which runs to the end of the file
    pub data_size: u32,
    /// Offset of the map list
    pub map_offset: u32,
    /// Map entries in placement order, header first and map last
    pub entries: Vec<MapEntry>,
}

impl Layout {
    /// Placed count and offset of a section, `None` if it is empty.
    #[must_use]
    pub fn section(&self, kind: ItemKind) -> Option<SectionRef> {
        self.entries
            .iter()
            .find(|entry| entry.kind == kind)
            .map(|entry| SectionRef {
                count: entry.count,
                offset: entry.offset,
            })
    }

    /// Encoded size of a map listing `sections` non-empty sections besides header and map.
    #[must_use]
    pub fn map_size(sections: usize) -> u32 {
        let entries = u32::try_from(sections + 2).unwrap_or(u32::MAX);
        4_u32.saturating_add(entries.saturating_mul(MAP_ENTRY_SIZE))
    }

    /// Encodes the map list.
    pub(crate) fn write_map(&self, out: &mut Writer) -> Result<()> {
        let start = out.pos()?;
        out.write_le(to_u32(self.entries.len())?);
        out.annotate_from(start, || format!("map_size: {}", self.entries.len()));

        for (index, entry) in self.entries.iter().enumerate() {
            let start = out.pos()?;
            out.write_le(entry.kind.code());
            out.write_le(0_u16);
            out.write_le(entry.count);
            out.write_le(entry.offset);
            out.annotate_from(start, || {
                format!(
                    "map[{index}] {}: {} items at 0x{:x}",
                    entry.kind, entry.count, entry.offset
                )
            });
        }

        Ok(())
    }
}
