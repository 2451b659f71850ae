//! Optimized-container wrapper header.
//!
//! An optimized container starts with a 40-byte header that locates the embedded plain
//! container and the dependency and auxiliary blobs that follow it. Only the header is
//! interpreted; the blobs are kept opaque.

use crate::{file::parser::Parser, Result};

/// Magic of an optimized container wrapping a 035 container.
pub const ODEX_MAGIC_035: &[u8; 8] = b"dey\n035\0";
/// Magic of an optimized container wrapping a 036 container.
pub const ODEX_MAGIC_036: &[u8; 8] = b"dey\n036\0";
/// Size of the optimized-container header.
pub const ODEX_HEADER_SIZE: usize = 40;

/// The optimized-container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OdexHeader {
    /// The 8-byte magic
    pub magic: [u8; 8],
    /// Offset of the embedded plain container
    pub dex_offset: u32,
    /// Length of the embedded plain container
    pub dex_length: u32,
    /// Offset of the dependency table
    pub deps_offset: u32,
    /// Length of the dependency table
    pub deps_length: u32,
    /// Offset of the auxiliary data
    pub aux_offset: u32,
    /// Length of the auxiliary data
    pub aux_length: u32,
    /// Optimization flags
    pub flags: u32,
}

impl OdexHeader {
    /// Parses the optimized-container header if `data` starts with one.
    ///
    /// Returns `Ok(None)` for any other input.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the header is truncated, or
    /// [`crate::Error::Format`] if the embedded container overlaps the header or the blobs
    /// that follow it.
    pub fn detect(data: &[u8]) -> Result<Option<OdexHeader>> {
        let Some(magic) = data.get(..8) else {
            return Ok(None);
        };
        if magic != ODEX_MAGIC_035 && magic != ODEX_MAGIC_036 {
            return Ok(None);
        }

        let mut parser = Parser::new(data);
        let mut header = OdexHeader {
            magic: [0; 8],
            dex_offset: 0,
            dex_length: 0,
            deps_offset: 0,
            deps_length: 0,
            aux_offset: 0,
            aux_length: 0,
            flags: 0,
        };
        header.magic.copy_from_slice(parser.read_bytes(8)?);
        header.dex_offset = parser.read_le::<u32>()?;
        header.dex_length = parser.read_le::<u32>()?;
        header.deps_offset = parser.read_le::<u32>()?;
        header.deps_length = parser.read_le::<u32>()?;
        header.aux_offset = parser.read_le::<u32>()?;
        header.aux_length = parser.read_le::<u32>()?;
        header.flags = parser.read_le::<u32>()?;
        let _padding = parser.read_le::<u32>()?;

        if (header.dex_offset as usize) < ODEX_HEADER_SIZE {
            return Err(format_error!(
                "optimized container places its dex at 0x{:x}, inside its own header",
                header.dex_offset
            ));
        }

        let dex_end = u64::from(header.dex_offset) + u64::from(header.dex_length);
        if header.deps_length != 0 && u64::from(header.deps_offset) < dex_end {
            return Err(format_error!(
                "optimized container dependencies at 0x{:x} overlap the dex ending at 0x{:x}",
                header.deps_offset,
                dex_end
            ));
        }

        Ok(Some(header))
    }

    /// The wrapped container's format version, from the second half of the magic.
    #[must_use]
    pub fn version_tag(&self) -> &[u8] {
        &self.magic[4..7]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(magic: &[u8; 8], dex_offset: u32, dex_length: u32, deps_offset: u32) -> Vec<u8> {
        let mut data = magic.to_vec();
        data.extend_from_slice(&dex_offset.to_le_bytes());
        data.extend_from_slice(&dex_length.to_le_bytes());
        data.extend_from_slice(&deps_offset.to_le_bytes());
        data.extend_from_slice(&4_u32.to_le_bytes()); // deps_length
        data.extend_from_slice(&0_u32.to_le_bytes()); // aux_offset
        data.extend_from_slice(&0_u32.to_le_bytes()); // aux_length
        data.extend_from_slice(&1_u32.to_le_bytes()); // flags
        data.extend_from_slice(&0_u32.to_le_bytes()); // padding
        data
    }

    #[test]
    fn plain_input_is_not_odex() {
        assert_eq!(OdexHeader::detect(b"dex\n035\0").unwrap(), None);
        assert_eq!(OdexHeader::detect(b"dey").unwrap(), None);
    }

    #[test]
    fn parses_fields() {
        let data = header_bytes(ODEX_MAGIC_036, 40, 0x70, 0xB0);
        let header = OdexHeader::detect(&data).unwrap().unwrap();
        assert_eq!(header.dex_offset, 40);
        assert_eq!(header.dex_length, 0x70);
        assert_eq!(header.deps_offset, 0xB0);
        assert_eq!(header.deps_length, 4);
        assert_eq!(header.flags, 1);
        assert_eq!(header.version_tag(), b"036");
    }

    #[test]
    fn rejects_overlap() {
        let data = header_bytes(ODEX_MAGIC_035, 40, 0x70, 0x50);
        assert!(matches!(
            OdexHeader::detect(&data),
            Err(crate::Error::Format(_))
        ));

        let data = header_bytes(ODEX_MAGIC_035, 8, 0x70, 0x100);
        assert!(OdexHeader::detect(&data).is_err());

        let truncated = &header_bytes(ODEX_MAGIC_035, 40, 0x70, 0xB0)[..20];
        assert!(matches!(
            OdexHeader::detect(truncated),
            Err(crate::Error::OutOfBounds)
        ));
    }
}
