//! Input and output plumbing for DEX containers.
//!
//! This module abstracts over where container bytes come from and where they go, and provides
//! the primitive readers and writers every record codec is built on.
//!
//! # Key Components
//!
//! ## Core Types
//! - [`crate::file::Input`] - A loaded input, with an optimized-container wrapper recognized and skipped
//! - [`crate::file::Backend`] - Trait for different data sources (disk files, memory buffers)
//!
//! ## Codec Infrastructure
//! - [`crate::file::parser::Parser`] - Cursor-based, bounds-checked reader
//! - [`crate::file::writer::Writer`] - Growable encoder with optional annotations
//! - [`crate::file::io`] - Little-endian primitive helpers
//! - [`crate::file::output::Output`] - Memory-mapped target file
//!
//! # Examples
//!
//! ```rust,no_run
//! use dexscope::file::Input;
//!
//! let input = Input::from_file("classes.odex")?;
//! if let Some(odex) = input.odex_header() {
//!     println!("embedded dex at 0x{:x}", odex.dex_offset);
//! }
//! println!("{} dex bytes", input.dex_data().len());
//! # Ok::<(), dexscope::Error>(())
//! ```

pub mod io;
pub mod memory;
pub mod output;
pub mod parser;
pub mod physical;
pub mod writer;

use std::path::Path;

use crate::{dex::OdexHeader, Result};
use memory::Memory;
use physical::Physical;

/// Backend trait for container data sources.
///
/// Abstracts over whether the bytes live in a memory-mapped file or an owned buffer. Parsing
/// needs random access for forward references, so every backend exposes the whole input.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Arguments
    ///
    /// * `offset` - The starting offset within the data.
    /// * `len` - The length of the slice in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// A loaded input container.
///
/// Plain containers are used as they are. Optimized containers start with their own 40-byte
/// header that locates an embedded plain container; that wrapper is parsed, kept for
/// inspection, and otherwise skipped.
pub struct Input {
    backend: Box<dyn Backend>,
    odex: Option<OdexHeader>,
}

impl Input {
    /// Memory-maps the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, or any error from
    /// [`Input::from_backend`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Input> {
        Self::from_backend(Box::new(Physical::new(path)?))
    }

    /// Wraps an owned buffer.
    ///
    /// # Errors
    /// See [`Input::from_backend`].
    pub fn from_mem(data: Vec<u8>) -> Result<Input> {
        Self::from_backend(Box::new(Memory::new(data)))
    }

    /// Wraps an arbitrary backend, recognizing an optimized-container wrapper.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input, or a format error if an optimized
    /// wrapper points outside the input.
    pub fn from_backend(backend: Box<dyn Backend>) -> Result<Input> {
        if backend.len() == 0 {
            return Err(crate::Error::Empty);
        }

        let odex = OdexHeader::detect(backend.data())?;
        if let Some(header) = &odex {
            backend.data_slice(header.dex_offset as usize, header.dex_length as usize)?;
        }

        Ok(Input { backend, odex })
    }

    /// The optimized-container header, if the input had one.
    #[must_use]
    pub fn odex_header(&self) -> Option<&OdexHeader> {
        self.odex.as_ref()
    }

    /// The plain container bytes.
    #[must_use]
    pub fn dex_data(&self) -> &[u8] {
        match &self.odex {
            Some(header) => {
                let start = header.dex_offset as usize;
                let end = start + header.dex_length as usize;
                &self.backend.data()[start..end]
            }
            None => self.backend.data(),
        }
    }

    /// The complete input, wrapper included.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.backend.data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_input() {
        let input = Input::from_mem(b"dex\n035\0rest".to_vec()).unwrap();
        assert!(input.odex_header().is_none());
        assert_eq!(input.dex_data(), b"dex\n035\0rest");
    }

    #[test]
    fn empty_input() {
        assert!(matches!(Input::from_mem(Vec::new()), Err(crate::Error::Empty)));
    }

    #[test]
    fn odex_wrapper_skipped() {
        let mut data = Vec::new();
        data.extend_from_slice(b"dey\n036\0");
        data.extend_from_slice(&40_u32.to_le_bytes()); // dex_offset
        data.extend_from_slice(&8_u32.to_le_bytes()); // dex_length
        data.extend_from_slice(&48_u32.to_le_bytes()); // deps_offset
        data.extend_from_slice(&2_u32.to_le_bytes()); // deps_length
        data.extend_from_slice(&50_u32.to_le_bytes()); // aux_offset
        data.extend_from_slice(&0_u32.to_le_bytes()); // aux_length
        data.extend_from_slice(&0_u32.to_le_bytes()); // flags
        data.extend_from_slice(&0_u32.to_le_bytes()); // padding
        data.extend_from_slice(b"dex\n035\0");
        data.extend_from_slice(&[0xAA, 0xBB]);

        let input = Input::from_mem(data).unwrap();
        let header = input.odex_header().unwrap();
        assert_eq!(header.dex_offset, 40);
        assert_eq!(header.deps_length, 2);
        assert_eq!(input.dex_data(), b"dex\n035\0");
        assert_eq!(input.data().len(), 50);
    }

    #[test]
    fn odex_wrapper_out_of_range() {
        let mut data = Vec::new();
        data.extend_from_slice(b"dey\n035\0");
        data.extend_from_slice(&40_u32.to_le_bytes());
        data.extend_from_slice(&0x1000_u32.to_le_bytes());
        data.extend_from_slice(&[0u8; 24]);

        assert!(Input::from_mem(data).is_err());
    }
}
