//! In-memory backend for containers that are already held in a buffer.
//!
//! [`crate::file::memory::Memory`] implements [`crate::file::Backend`] over an owned
//! `Vec<u8>`. It is what [`crate::file::Input::from_mem`] and [`crate::DexFile::from_bytes`]
//! use, and it is the natural choice for containers pulled out of an archive, received over
//! the network or produced by [`crate::DexFile::encode`] in the same process.
//!
//! # Usage Examples
//!
//! ```rust
//! use dexscope::file::{memory::Memory, Backend};
//!
//! let memory = Memory::new(b"dex\n035\0".to_vec());
//! assert_eq!(memory.data_slice(4, 3)?, b"035");
//! assert!(memory.data_slice(6, 4).is_err());
//! # Ok::<(), dexscope::Error>(())
//! ```
//!
//! # Error Handling
//!
//! Slicing past the end of the buffer, including ranges whose end overflows `usize`, yields
//! [`crate::Error::OutOfBounds`].

use super::Backend;
use crate::Result;

/// Backend over an owned byte buffer.
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Takes ownership of `data`.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
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
        self.data.as_slice()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_are_bounds_checked() {
        let mut data = b"dex\n035\0".to_vec();
        data.resize(0x70, 0);

        let memory = Memory::new(data);

        assert_eq!(memory.len(), 0x70);
        assert_eq!(memory.data_slice(4, 3).unwrap(), b"035");
        assert!(memory.data_slice(0x6C, 8).is_err());
        assert!(memory.data_slice(usize::MAX, 2).is_err());
    }
}
