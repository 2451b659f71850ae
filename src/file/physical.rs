//! Memory-mapped backend for containers on disk.
//!
//! This module provides the [`crate::file::physical::Physical`] backend, which implements
//! [`crate::file::Backend`] over a read-only memory map of a file. Containers are read with
//! random access (the map list sits at the end, items are reached by offset), so mapping the
//! file avoids copying it while keeping every lookup a plain slice access.
//!
//! # Architecture
//!
//! The file is opened, mapped once and closed; the map keeps the pages alive for as long as
//! the backend exists. Nothing is written through the map. Pages are faulted in by the
//! operating system as the parser touches them, so a parse that skips instruction streams
//! never pulls those pages into memory.
//!
//! # Key Components
//!
//! - [`crate::file::physical::Physical::new`] - Opens and maps a file
//! - [`crate::file::Backend::data_slice`] - Bounds-checked sub-slice
//! - [`crate::file::Backend::data`] - The whole mapped file
//! - [`crate::file::Backend::len`] - File size in bytes
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use dexscope::file::{physical::Physical, Backend};
//!
//! let physical = Physical::new("classes.dex")?;
//! assert_eq!(physical.data_slice(0, 4)?, b"dex\n");
//! println!("{} bytes", physical.len());
//! # Ok::<(), dexscope::Error>(())
//! ```
//!
//! Most callers go through [`crate::file::Input::from_file`] instead, which also recognizes an
//! optimized-container wrapper.
//!
//! # Error Handling
//!
//! - [`crate::Error::FileError`] when the file cannot be opened or mapped
//! - [`crate::Error::OutOfBounds`] when a requested range does not lie inside the file
//!
//! # Thread Safety
//!
//! [`crate::file::physical::Physical`] is [`Send`] and [`Sync`]. The map is immutable, so
//! any number of threads may read from one backend concurrently.

use super::Backend;
use crate::{Error::FileError, Result};

use memmap2::Mmap;
use std::{fs, path::Path};

/// Backend over a read-only memory map of a file.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Maps the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = fs::File::open(path).map_err(FileError)?;

        // The map is read-only and lives no longer than this backend
        let mmap = unsafe { Mmap::map(&file) }.map_err(FileError)?;

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };

        if offset_end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn physical() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"dex\n035\0\x01\x02\x03").unwrap();
        file.flush().unwrap();

        let physical = Physical::new(file.path()).unwrap();

        assert_eq!(physical.len(), 11);
        assert_eq!(&physical.data()[..4], b"dex\n");
        assert_eq!(physical.data_slice(8, 3).unwrap(), &[1, 2, 3]);
        assert!(physical.data_slice(9, 3).is_err());
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Physical::new("/nonexistent/classes.dex"),
            Err(crate::Error::FileError(_))
        ));
    }
}
