//! The fixed 0x70-byte header.
//!
//! # Layout
//!
//! | Offset | Field | Notes |
//! |--------|-------|-------|
//! | 0x00 | magic | `dex\n035\0` or `dex\n036\0` |
//! | 0x08 | checksum | Adler-32 of bytes `[12..]` |
//! | 0x0C | signature | SHA-1 of bytes `[32..]` |
//! | 0x20 | file_size | |
//! | 0x24 | header_size | always 0x70 |
//! | 0x28 | endian_tag | always 0x12345678 |
//! | 0x2C | link_size, link_off | must be zero |
//! | 0x34 | map_off | |
//! | 0x38 | six (size, off) pairs | strings, types, protos, fields, methods, class defs |
//! | 0x68 | data_size, data_off | |

use std::fmt;

use crate::{
    dex::{kind::ItemKind, map::Layout},
    file::{parser::Parser, writer::Writer},
    utils::checksum::{hex, SIGNATURE_LEN},
    Result,
};

/// Size of the header in bytes.
pub const HEADER_SIZE: u32 = 0x70;
/// Little-endian byte order marker.
pub const ENDIAN_CONSTANT: u32 = 0x1234_5678;
/// The byte order marker as it reads from a big-endian container.
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x7856_3412;

/// Indexed sections in the order the header lists them.
const HEADER_SECTIONS: [ItemKind; 6] = [
    ItemKind::StringId,
    ItemKind::TypeId,
    ItemKind::ProtoId,
    ItemKind::FieldId,
    ItemKind::MethodId,
    ItemKind::ClassDef,
];

/// Container format version, as carried in the magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DexVersion {
    /// `dex\n035\0`
    #[default]
    V035,
    /// `dex\n036\0`
    V036,
}

impl DexVersion {
    /// The 8-byte magic for this version.
    #[must_use]
    pub fn magic(self) -> &'static [u8; 8] {
        match self {
            DexVersion::V035 => b"dex\n035\0",
            DexVersion::V036 => b"dex\n036\0",
        }
    }

    /// Recognizes a magic value.
    #[must_use]
    pub fn from_magic(magic: &[u8]) -> Option<DexVersion> {
        [DexVersion::V035, DexVersion::V036]
            .into_iter()
            .find(|version| version.magic().as_slice() == magic)
    }
}

impl fmt::Display for DexVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DexVersion::V035 => f.write_str("035"),
            DexVersion::V036 => f.write_str("036"),
        }
    }
}

/// Count and offset of one section as declared by the header or the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionRef {
    /// Number of items
    pub count: u32,
    /// Offset of the first item
    pub offset: u32,
}

/// The decoded header of a parsed container.
///
/// Checksum and signature are the values found in the input; encoding recomputes both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderItem {
    /// Format version from the magic
    pub version: DexVersion,
    /// Adler-32 checksum as stored
    pub checksum: u32,
    /// SHA-1 signature as stored
    pub signature: [u8; SIGNATURE_LEN],
    /// Declared file size
    pub file_size: u32,
    /// Offset of the map
    pub map_offset: u32,
    /// Declared indexed sections, in header order
    pub sections: [(ItemKind, SectionRef); 6],
    /// Size of the data region
    pub data_size: u32,
    /// Offset of the data region
    pub data_offset: u32,
}

impl HeaderItem {
    /// Decodes the header at the start of `parser`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Format`] for an unknown magic, a big-endian container, a
    /// non-standard header size, a link section or a file size larger than the input.
    pub fn read(parser: &mut Parser<'_>) -> Result<HeaderItem> {
        let magic = parser.read_bytes(8)?;
        let version = DexVersion::from_magic(magic).ok_or_else(|| {
            format_error!("unrecognized magic {}", hex(magic))
        })?;

        let checksum = parser.read_le::<u32>()?;
        let mut signature = [0_u8; SIGNATURE_LEN];
        signature.copy_from_slice(parser.read_bytes(SIGNATURE_LEN)?);

        let file_size = parser.read_le::<u32>()?;
        if file_size as usize > parser.len() {
            return Err(format_error!(
                "declared file size 0x{:x} exceeds the 0x{:x} bytes available",
                file_size,
                parser.len()
            ));
        }

        let header_size = parser.read_le::<u32>()?;
        if header_size != HEADER_SIZE {
            return Err(format_error!(
                "header size 0x{header_size:x}, expected 0x{HEADER_SIZE:x}"
            ));
        }

        match parser.read_le::<u32>()? {
            ENDIAN_CONSTANT => {}
            REVERSE_ENDIAN_CONSTANT => {
                return Err(format_error!("big-endian containers are not supported"))
            }
            other => return Err(format_error!("invalid endian tag 0x{other:08x}")),
        }

        let link_size = parser.read_le::<u32>()?;
        let link_offset = parser.read_le::<u32>()?;
        if link_size != 0 || link_offset != 0 {
            return Err(format_error!(
                "link section (size {link_size}, offset 0x{link_offset:x}) is not supported"
            ));
        }

        let map_offset = parser.read_le::<u32>()?;

        let mut sections = HEADER_SECTIONS.map(|kind| (kind, SectionRef::default()));
        for (_, section) in &mut sections {
            section.count = parser.read_le::<u32>()?;
            section.offset = parser.read_le::<u32>()?;
        }

        let data_size = parser.read_le::<u32>()?;
        let data_offset = parser.read_le::<u32>()?;

        Ok(HeaderItem {
            version,
            checksum,
            signature,
            file_size,
            map_offset,
            sections,
            data_size,
            data_offset,
        })
    }

    /// Encodes a header describing `layout`, with zeroed checksum and signature.
    pub(crate) fn write(version: DexVersion, layout: &Layout, out: &mut Writer) -> Result<()> {
        field(out, "magic", |out| out.write_bytes(version.magic()))?;
        field(out, "checksum", |out| out.write_le(0_u32))?;
        field(out, "signature", |out| out.write_bytes(&[0; SIGNATURE_LEN]))?;
        field(out, "file_size", |out| out.write_le(layout.file_size))?;
        field(out, "header_size", |out| out.write_le(HEADER_SIZE))?;
        field(out, "endian_tag", |out| out.write_le(ENDIAN_CONSTANT))?;
        field(out, "link_size", |out| out.write_le(0_u32))?;
        field(out, "link_off", |out| out.write_le(0_u32))?;
        field(out, "map_off", |out| out.write_le(layout.map_offset))?;

        for kind in HEADER_SECTIONS {
            let section = layout.section(kind).unwrap_or_default();
            let name = kind.name();
            field(out, &format!("{name} size"), |out| out.write_le(section.count))?;
            field(out, &format!("{name} off"), |out| out.write_le(section.offset))?;
        }

        field(out, "data_size", |out| out.write_le(layout.data_size))?;
        field(out, "data_off", |out| out.write_le(layout.data_offset))?;
        Ok(())
    }

    /// Declared count and offset of an indexed section.
    #[must_use]
    pub fn section(&self, kind: ItemKind) -> Option<SectionRef> {
        self.sections
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, section)| *section)
    }
}

fn field(out: &mut Writer, name: &str, write: impl FnOnce(&mut Writer)) -> Result<()> {
    let start = out.pos()?;
    write(out);
    out.annotate_from(start, || name.to_string());
    Ok(())
}

impl Default for HeaderItem {
    fn default() -> Self {
        HeaderItem {
            version: DexVersion::V035,
            checksum: 0,
            signature: [0; SIGNATURE_LEN],
            file_size: 0,
            map_offset: 0,
            sections: HEADER_SECTIONS.map(|kind| (kind, SectionRef::default())),
            data_size: 0,
            data_offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(magic: &[u8; 8], endian: u32, link: u32) -> Vec<u8> {
        let mut data = magic.to_vec();
        data.extend_from_slice(&0_u32.to_le_bytes()); // checksum
        data.extend_from_slice(&[0; 20]); // signature
        data.extend_from_slice(&0x70_u32.to_le_bytes()); // file_size
        data.extend_from_slice(&HEADER_SIZE.to_le_bytes());
        data.extend_from_slice(&endian.to_le_bytes());
        data.extend_from_slice(&link.to_le_bytes()); // link_size
        data.extend_from_slice(&0_u32.to_le_bytes()); // link_off
        data.extend_from_slice(&0x60_u32.to_le_bytes()); // map_off
        data.extend_from_slice(&1_u32.to_le_bytes()); // string_ids_size
        data.extend_from_slice(&0x70_u32.to_le_bytes()); // string_ids_off
        data.extend_from_slice(&[0; 40]); // remaining sections
        data.extend_from_slice(&0_u32.to_le_bytes()); // data_size
        data.extend_from_slice(&0_u32.to_le_bytes()); // data_off
        data
    }

    #[test]
    fn reads_fields() {
        let data = header(b"dex\n036\0", ENDIAN_CONSTANT, 0);
        let header = HeaderItem::read(&mut Parser::new(&data)).unwrap();
        assert_eq!(header.version, DexVersion::V036);
        assert_eq!(header.file_size, 0x70);
        assert_eq!(header.map_offset, 0x60);
        assert_eq!(
            header.section(ItemKind::StringId),
            Some(SectionRef {
                count: 1,
                offset: 0x70
            })
        );
        assert_eq!(header.section(ItemKind::ClassDef), Some(SectionRef::default()));
        assert_eq!(header.section(ItemKind::Code), None);
    }

    #[test]
    fn rejects_bad_headers() {
        let data = header(b"dex\n037\0", ENDIAN_CONSTANT, 0);
        assert!(matches!(
            HeaderItem::read(&mut Parser::new(&data)),
            Err(crate::Error::Format(_))
        ));

        let data = header(b"dex\n035\0", REVERSE_ENDIAN_CONSTANT, 0);
        let error = HeaderItem::read(&mut Parser::new(&data)).unwrap_err();
        assert!(error.to_string().contains("big-endian"));

        let data = header(b"dex\n035\0", ENDIAN_CONSTANT, 4);
        let error = HeaderItem::read(&mut Parser::new(&data)).unwrap_err();
        assert!(error.to_string().contains("link section"));

        let data = header(b"dex\n035\0", ENDIAN_CONSTANT, 0);
        assert!(HeaderItem::read(&mut Parser::new(&data[..0x40])).is_err());
    }

    #[test]
    fn version_magic() {
        assert_eq!(DexVersion::from_magic(b"dex\n035\0"), Some(DexVersion::V035));
        assert_eq!(DexVersion::from_magic(b"dey\n035\0"), None);
        assert_eq!(DexVersion::V036.to_string(), "036");
    }
}
