//! Little-endian primitive I/O over byte slices.
//!
//! Every fixed-width field in a DEX container is little-endian: the header is checked for the
//! little-endian tag before anything else is read, and big-endian containers are rejected. The
//! helpers here are therefore little-endian only. They are bounds checked and advance a caller
//! owned offset, which lets record decoders thread one position through a sequence of reads.
//!
//! # Examples
//!
//! ```rust,ignore
//! use dexscope::file::io::{read_le_at, write_le_at};
//!
//! let mut buffer = [0u8; 6];
//! let mut offset = 0;
//! write_le_at(&mut buffer, &mut offset, 0x1234_u16)?;
//! write_le_at(&mut buffer, &mut offset, 0x1234_5678_u32)?;
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u16>(&buffer, &mut offset)?, 0x1234);
//! assert_eq!(read_le_at::<u32>(&buffer, &mut offset)?, 0x1234_5678);
//! ```

use crate::{Error::OutOfBounds, Result};

/// Primitive values that can be read from and written to little-endian byte sequences.
pub trait DexIO: Sized + Copy {
    /// The fixed-size byte array backing this primitive.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decodes the value from its little-endian representation.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encodes the value into its little-endian representation.
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_dex_io {
    ($($ty:ty),*) => {
        $(
            impl DexIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_dex_io!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Reads a little-endian value from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than the value.
pub fn read_le<T: DexIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a little-endian value at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value would extend past the end of `data`.
pub fn read_le_at<T: DexIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Writes a little-endian value at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value would extend past the end of `data`.
pub fn write_le_at<T: DexIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_u16() {
        let result = read_le::<u16>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0201);
    }

    #[test]
    fn read_le_u32_at() {
        let mut offset = 2;
        let result = read_le_at::<u32>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0605_0403);
        assert_eq!(offset, 6);
    }

    #[test]
    fn read_le_i8_negative() {
        let data = [0xFE];
        assert_eq!(read_le::<i8>(&data).unwrap(), -2);
    }

    #[test]
    fn read_past_end() {
        let mut offset = 6;
        assert!(matches!(
            read_le_at::<u32>(&TEST_BUFFER, &mut offset),
            Err(OutOfBounds)
        ));
        assert_eq!(offset, 6);
    }

    #[test]
    fn write_then_read() {
        let mut buffer = [0u8; 6];
        let mut offset = 0;
        write_le_at(&mut buffer, &mut offset, 0xABCD_u16).unwrap();
        write_le_at(&mut buffer, &mut offset, 0x1234_5678_u32).unwrap();
        assert_eq!(buffer, [0xCD, 0xAB, 0x78, 0x56, 0x34, 0x12]);

        let mut offset = 5;
        assert!(write_le_at(&mut buffer, &mut offset, 1_u16).is_err());
    }
}
