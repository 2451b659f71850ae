//! Low-level byte stream parser for DEX records.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor over a byte slice
//! with bounds-checked reads for the primitive encodings used throughout a DEX container:
//! little-endian fixed-width integers, the LEB128 family, and modified UTF-8 strings.
//!
//! # Key Components
//!
//! ## Navigation Methods
//! - [`crate::file::parser::Parser::seek`] - Move to specific position
//! - [`crate::file::parser::Parser::advance_by`] - Move forward by specified bytes
//! - [`crate::file::parser::Parser::pos`] - Get current position
//! - [`crate::file::parser::Parser::align`] - Align to byte boundaries
//!
//! ## Data Access Methods
//! - [`crate::file::parser::Parser::read_le`] - Read primitive types (little-endian)
//! - [`crate::file::parser::Parser::read_bytes`] - Borrow a run of raw bytes
//! - [`crate::file::parser::Parser::peek_byte`] - Peek at current byte without advancing
//!
//! ## Variable-length Reading Methods
//! - [`crate::file::parser::Parser::read_uleb128`] - Unsigned LEB128
//! - [`crate::file::parser::Parser::read_sleb128`] - Signed LEB128
//! - [`crate::file::parser::Parser::read_uleb128p1`] - Unsigned LEB128 biased by one
//! - [`crate::file::parser::Parser::read_register`] - Register operand that may use the legacy signed form
//! - [`crate::file::parser::Parser::read_mutf8`] - Zero-terminated modified UTF-8
//!
//! # Usage Examples
//!
//! ```rust
//! use dexscope::Parser;
//!
//! // uleb128 300, sleb128 -1, u16 0x0201
//! let data = [0xAC, 0x02, 0x7F, 0x01, 0x02];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_uleb128()?, 300);
//! assert_eq!(parser.read_sleb128()?, -1);
//! assert_eq!(parser.read_le::<u16>()?, 0x0201);
//! # Ok::<(), dexscope::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, DexIO},
    utils::mutf8,
    Result,
};

/// A register operand decoded from debug info.
///
/// Some historical encoders wrote register numbers as signed LEB128. Such values are still
/// non-negative, but their encoding ends in a zero byte; `signed` records that form so the
/// operand can be re-emitted identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    /// The register number
    pub number: u32,
    /// The operand was encoded in the legacy signed form
    pub signed: bool,
}

/// A cursor-based binary data parser for DEX records.
///
/// All reads are bounds checked against the underlying slice; a failing read leaves the
/// position untouched unless documented otherwise.
///
/// # Examples
///
/// ```rust
/// use dexscope::Parser;
///
/// let data = [0x78, 0x56, 0x34, 0x12, 0x00, 0x00, 0x00, 0x00];
/// let mut parser = Parser::new(&data);
///
/// assert_eq!(parser.read_le::<u32>()?, 0x1234_5678);
/// parser.align(8)?;
/// assert_eq!(parser.pos(), 8);
/// # Ok::<(), dexscope::Error>(())
/// ```
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new Parser from a byte slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Create a new Parser positioned at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `offset` lies beyond the end of `data`.
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self> {
        let mut parser = Parser::new(data);
        parser.seek(offset)?;
        Ok(parser)
    }

    /// Returns the length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if there is more data to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the position to a specific offset.
    ///
    /// Seeking to exactly the end of the data is allowed; the next read fails.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Advance the position by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the new position would be past the end.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(end) if end <= self.data.len() => {
                self.position = end;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Get the current position of the parser.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Get access to the underlying data slice.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Peek at the next byte without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are no more bytes.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or_else(|| out_of_bounds_error!())
    }

    /// Align the position to a power-of-two boundary.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the aligned position would be past the end.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read a little-endian value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_le<T: DexIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `len` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(len)?;
        Ok(&self.data[start..self.position])
    }

    /// Read an unsigned LEB128 value of at most five bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the encoding is longer than five bytes or its
    /// fifth byte carries more than the four remaining bits, [`crate::Error::OutOfBounds`] if
    /// it is truncated.
    pub fn read_uleb128(&mut self) -> Result<u32> {
        let (value, _) = self.read_leb128_raw(false)?;
        Ok(value)
    }

    /// Read a signed LEB128 value of at most five bytes.
    ///
    /// # Errors
    /// Same conditions as [`Parser::read_uleb128`].
    pub fn read_sleb128(&mut self) -> Result<i32> {
        let start = self.position;
        let (value, len) = self.read_leb128_raw(true)?;
        let shift = 7 * len;
        if shift >= 32 {
            return Ok(value as i32);
        }
        // Sign extend from the last byte's bit 6
        if self.data[start + len - 1] & 0x40 != 0 {
            Ok((value | (!0_u32 << shift)) as i32)
        } else {
            Ok(value as i32)
        }
    }

    /// Read an unsigned LEB128 value biased by one; an encoded 0 yields `None`.
    ///
    /// # Errors
    /// Same conditions as [`Parser::read_uleb128`].
    pub fn read_uleb128p1(&mut self) -> Result<Option<u32>> {
        let value = self.read_uleb128()?;
        Ok(value.checked_sub(1))
    }

    /// Read a register operand that may have been encoded in the legacy signed form.
    ///
    /// A multi-byte encoding whose final byte is zero is only produced by a signed LEB128
    /// writer; the value itself is still read as unsigned.
    ///
    /// # Errors
    /// Same conditions as [`Parser::read_uleb128`].
    pub fn read_register(&mut self) -> Result<Register> {
        let start = self.position;
        let (number, len) = self.read_leb128_raw(false)?;
        let signed = len > 1 && self.data[start + len - 1] == 0;
        Ok(Register { number, signed })
    }

    fn read_leb128_raw(&mut self, signed: bool) -> Result<(u32, usize)> {
        let start = self.position;
        let mut result: u32 = 0;

        for index in 0..5 {
            let Some(&byte) = self.data.get(start + index) else {
                return Err(out_of_bounds_error!());
            };

            if index == 4 && (byte & 0x80 != 0 || (!signed && byte > 0x0F)) {
                return Err(malformed_error!(
                    "Invalid LEB128 encoding at offset 0x{:x}",
                    start
                ));
            }

            result |= u32::from(byte & 0x7F) << (7 * index);
            if byte & 0x80 == 0 {
                self.position = start + index + 1;
                return Ok((result, index + 1));
            }
        }

        Err(malformed_error!(
            "Invalid LEB128 encoding at offset 0x{:x}",
            start
        ))
    }

    /// Read a zero-terminated modified UTF-8 string as UTF-16 code units.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the bytes are not valid modified UTF-8 and
    /// [`crate::Error::OutOfBounds`] if no terminator is found.
    pub fn read_mutf8(&mut self) -> Result<Vec<u16>> {
        let remaining = &self.data[self.position..];
        let Some(end) = remaining.iter().position(|&byte| byte == 0) else {
            return Err(out_of_bounds_error!());
        };

        let units = mutf8::decode(&remaining[..end])?;
        self.position += end + 1;
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_uleb128() {
        let test_cases = vec![
            (vec![0x00], 0),
            (vec![0x01], 1),
            (vec![0x7F], 127),
            (vec![0x80, 0x7F], 16256),
            (vec![0xE5, 0x8E, 0x26], 624_485),
            (vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F], 0xFFFF_FFFF),
        ];

        for (input, expected) in test_cases {
            let mut parser = Parser::new(&input);
            assert_eq!(parser.read_uleb128().unwrap(), expected);
            assert_eq!(parser.pos(), input.len());
        }
    }

    #[test]
    fn test_read_uleb128_invalid() {
        let mut parser = Parser::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        assert!(parser.read_uleb128().is_err());
        assert_eq!(parser.pos(), 0);

        let mut parser = Parser::new(&[0x80, 0x80]);
        assert!(matches!(
            parser.read_uleb128(),
            Err(crate::Error::OutOfBounds)
        ));
    }

    #[test]
    fn test_read_sleb128() {
        let test_cases = vec![
            (vec![0x00], 0),
            (vec![0x01], 1),
            (vec![0x7F], -1),
            (vec![0x80, 0x7F], -128),
            (vec![0x3F], 63),
            (vec![0xC0, 0x00], 64),
            (vec![0x80, 0x80, 0x80, 0x80, 0x78], i32::MIN),
        ];

        for (input, expected) in test_cases {
            let mut parser = Parser::new(&input);
            assert_eq!(parser.read_sleb128().unwrap(), expected);
        }
    }

    #[test]
    fn test_read_uleb128p1() {
        let mut parser = Parser::new(&[0x00, 0x01, 0x80, 0x01]);
        assert_eq!(parser.read_uleb128p1().unwrap(), None);
        assert_eq!(parser.read_uleb128p1().unwrap(), Some(0));
        assert_eq!(parser.read_uleb128p1().unwrap(), Some(127));
    }

    #[test]
    fn test_read_register() {
        let mut parser = Parser::new(&[0x05, 0xC5, 0x00, 0x85, 0x01]);
        assert_eq!(
            parser.read_register().unwrap(),
            Register {
                number: 5,
                signed: false
            }
        );
        assert_eq!(
            parser.read_register().unwrap(),
            Register {
                number: 0x45,
                signed: true
            }
        );
        assert_eq!(
            parser.read_register().unwrap(),
            Register {
                number: 0x85,
                signed: false
            }
        );
    }

    #[test]
    fn test_read_mutf8() {
        let data = [0x61, 0x62, 0xC0, 0x80, 0x00, 0x7A];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_mutf8().unwrap(), vec![0x61, 0x62, 0x00]);
        assert_eq!(parser.pos(), 5);
        assert!(parser.read_mutf8().is_err());
    }

    #[test]
    fn test_align_and_seek() {
        let data = [0u8; 10];
        let mut parser = Parser::new(&data);
        parser.advance_by(1).unwrap();
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
        parser.seek(9).unwrap();
        assert!(parser.align(4).is_err());
        parser.seek(10).unwrap();
        assert!(parser.seek(11).is_err());
        assert!(parser.peek_byte().is_err());
    }

    #[test]
    fn test_read_bytes() {
        let data = [1, 2, 3, 4];
        let mut parser = Parser::at(&data, 1).unwrap();
        assert_eq!(parser.read_bytes(2).unwrap(), &[2, 3]);
        assert!(parser.read_bytes(2).is_err());
        assert_eq!(parser.pos(), 3);
    }
}
