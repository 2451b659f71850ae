//! `string_id_item` and `string_data_item`.

use std::{cmp::Ordering, fmt};

use crate::{
    dex::{
        context::ReadContext,
        item::{Item, SortContext},
        kind::ItemKind,
        section::{Id, Section},
        DexFile,
    },
    file::{parser::Parser, writer::Writer},
    utils::{
        math::{to_u32, uleb128_size},
        mutf8,
    },
    Result,
};

/// A string as stored in a container: UTF-16 code units.
///
/// Kept as code units rather than `String` so that unpaired surrogates survive a round trip.
/// Ordering is by code unit, which is the order the format requires for the string table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DexString(Vec<u16>);

impl DexString {
    /// Wraps raw UTF-16 code units.
    #[must_use]
    pub fn from_units(units: Vec<u16>) -> Self {
        DexString(units)
    }

    /// The UTF-16 code units.
    #[must_use]
    pub fn units(&self) -> &[u16] {
        &self.0
    }

    /// Length in UTF-16 code units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for DexString {
    fn from(value: &str) -> Self {
        DexString(value.encode_utf16().collect())
    }
}

impl From<String> for DexString {
    fn from(value: String) -> Self {
        DexString::from(value.as_str())
    }
}

impl fmt::Display for DexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in char::decode_utf16(self.0.iter().copied()) {
            match c {
                Ok(c) => write!(f, "{c}")?,
                Err(e) => write!(f, "\\u{:04x}", e.unpaired_surrogate())?,
            }
        }
        Ok(())
    }
}

/// `string_data_item`: the character data of one string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StringDataItem {
    /// The string's contents
    pub value: DexString,
}

impl Item for StringDataItem {
    const KIND: ItemKind = ItemKind::StringData;
    type Key = DexString;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.string_data
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.string_data
    }

    fn intern_key(&self) -> Option<DexString> {
        Some(self.value.clone())
    }

    fn read(parser: &mut Parser<'_>, _ctx: &mut ReadContext<'_>) -> Result<Self> {
        let declared = parser.read_uleb128()?;
        let units = parser.read_mutf8()?;
        if units.len() != declared as usize {
            return Err(malformed_error!(
                "string declares {} UTF-16 units but decodes to {}",
                declared,
                units.len()
            ));
        }
        Ok(StringDataItem {
            value: DexString(units),
        })
    }

    fn size(&self, _dex: &DexFile) -> Result<u32> {
        let units = to_u32(self.value.len())?;
        let bytes = to_u32(mutf8::encoded_len(self.value.units()))?;
        Ok(uleb128_size(units) + bytes + 1)
    }

    fn write(&self, _dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_uleb128(to_u32(self.value.len())?);
        out.write_mutf8(self.value.units());
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.string_data;
        section[a].value.cmp(&section[b].value)
    }

    fn summary(&self, _dex: &DexFile) -> String {
        format!("\"{}\"", self.value)
    }
}

/// `string_id_item`: an index entry pointing at a string's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringIdItem {
    /// The character data
    pub data: Id<StringDataItem>,
}

impl Item for StringIdItem {
    const KIND: ItemKind = ItemKind::StringId;
    type Key = Id<StringDataItem>;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.string_ids
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.string_ids
    }

    fn intern_key(&self) -> Option<Id<StringDataItem>> {
        Some(self.data)
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let offset = parser.read_le::<u32>()?;
        Ok(StringIdItem {
            data: ctx.offset(offset)?,
        })
    }

    fn size(&self, _dex: &DexFile) -> Result<u32> {
        Ok(4)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_le(dex.string_data.offset_of(self.data)?);
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.string_ids;
        cx.cmp(section[a].data, section[b].data)
    }

    fn summary(&self, dex: &DexFile) -> String {
        dex.string_data[self.data].summary(dex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_escapes_unpaired_surrogates() {
        let value = DexString::from_units(vec![0x61, 0xD800, 0x62]);
        assert_eq!(value.to_string(), "a\\ud800b");
        assert_eq!(DexString::from("Lfoo;").to_string(), "Lfoo;");
    }

    #[test]
    fn ordering_is_by_code_unit() {
        // U+FF21 sorts before a surrogate pair by code unit, after it by code point
        let wide = DexString::from("\u{FF21}");
        let supplementary = DexString::from("\u{10400}");
        assert!(supplementary < wide);
        assert!(DexString::from("A") < DexString::from("a"));
        assert!(DexString::from("") < DexString::from("a"));
    }

    #[test]
    fn string_data_size_and_encoding() -> Result<()> {
        let dex = DexFile::new();
        let item = StringDataItem {
            value: DexString::from_units(vec![0x61, 0x0000, 0x20AC]),
        };
        let mut out = Writer::new(false);
        item.write(&dex, &mut out)?;
        // length 3, 'a', 0xC0 0x80, 0xE2 0x82 0xAC, terminator
        assert_eq!(
            out.data(),
            &[0x03, 0x61, 0xC0, 0x80, 0xE2, 0x82, 0xAC, 0x00]
        );
        assert_eq!(item.size(&dex)?, 8);
        Ok(())
    }
}
