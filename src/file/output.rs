//! Memory-mapped output file for finished containers.
//!
//! The file is created at its final size up front and filled through a writable map. If the
//! [`Output`] is dropped without [`Output::finalize`] having succeeded, the partially written
//! file is removed again, so a failed write never leaves a truncated container behind.

use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::{Error, Result};

/// A writable, memory-mapped target file of fixed size.
pub struct Output {
    mmap: MmapMut,

    target_path: PathBuf,

    finalized: bool,
}

impl Output {
    /// Creates (or truncates) `target_path` with a length of `size` bytes and maps it.
    ///
    /// # Errors
    /// Returns [`Error::WriteMmapFailed`] if the file cannot be created, sized or mapped.
    pub fn create<P: AsRef<Path>>(target_path: P, size: u64) -> Result<Self> {
        let target_path = target_path.as_ref().to_path_buf();

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target_path)
            .map_err(|e| Error::WriteMmapFailed {
                message: format!("Failed to create target file: {e}"),
            })?;

        file.set_len(size).map_err(|e| Error::WriteMmapFailed {
            message: format!("Failed to set file size: {e}"),
        })?;

        // The mapping is exclusively owned by this Output
        let mmap = unsafe {
            MmapOptions::new()
                .map_mut(&file)
                .map_err(|e| Error::WriteMmapFailed {
                    message: format!("Failed to create memory mapping: {e}"),
                })?
        };

        Ok(Self {
            mmap,
            target_path,
            finalized: false,
        })
    }

    /// Copies `data` into the file at `offset`.
    ///
    /// # Errors
    /// Returns [`Error::WriteMmapFailed`] if the write would exceed the file size.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let start = usize::try_from(offset).map_err(|_| Error::WriteMmapFailed {
            message: format!("Offset {offset} does not fit the address space"),
        })?;
        let end = start + data.len();

        if end > self.mmap.len() {
            return Err(Error::WriteMmapFailed {
                message: format!(
                    "Write would exceed file size: offset={}, len={}, file_size={}",
                    offset,
                    data.len(),
                    self.mmap.len()
                ),
            });
        }

        self.mmap[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Size of the mapped file in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Flushes the map and keeps the file.
    ///
    /// # Errors
    /// Returns [`Error::WriteMmapFailed`] if flushing fails; the file is removed in that case.
    pub fn finalize(mut self) -> Result<()> {
        self.mmap.flush().map_err(|e| Error::WriteMmapFailed {
            message: format!("Failed to flush memory mapping: {e}"),
        })?;

        self.finalized = true;
        Ok(())
    }

    /// Path of the file being written.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = self.mmap.flush();
            let _ = std::fs::remove_file(&self.target_path);
        }
    }
}
