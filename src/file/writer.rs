//! Growable in-memory encoder, the write-side counterpart of [`crate::file::parser::Parser`].
//!
//! Besides the primitive encodings the writer can optionally record annotations: labelled byte
//! ranges describing what was written where. Annotations never influence the bytes produced.

use std::fmt;

use crate::{
    file::io::DexIO,
    utils::{math::to_u32, mutf8},
    Result,
};

/// A labelled byte range produced while encoding with annotations enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// First byte of the range
    pub start: u32,
    /// One past the last byte of the range
    pub end: u32,
    /// Human readable description
    pub text: String,
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06x}-{:06x}: {}", self.start, self.end, self.text)
    }
}

/// In-memory little-endian encoder.
#[derive(Debug, Default)]
pub struct Writer {
    data: Vec<u8>,
    annotations: Option<Vec<Annotation>>,
}

impl Writer {
    /// Creates an empty writer; `annotate` enables range recording.
    #[must_use]
    pub fn new(annotate: bool) -> Self {
        Writer {
            data: Vec::new(),
            annotations: annotate.then(Vec::new),
        }
    }

    /// Creates an empty writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize, annotate: bool) -> Self {
        Writer {
            data: Vec::with_capacity(capacity),
            annotations: annotate.then(Vec::new),
        }
    }

    /// Current write position.
    ///
    /// # Errors
    /// Returns [`crate::Error::Overflow`] once the output outgrows 32-bit offsets.
    pub fn pos(&self) -> Result<u32> {
        to_u32(self.data.len())
    }

    /// Whether annotations are being recorded.
    #[must_use]
    pub fn annotates(&self) -> bool {
        self.annotations.is_some()
    }

    /// Records an annotation for the bytes written since `start`.
    pub fn annotate_from(&mut self, start: u32, text: impl FnOnce() -> String) {
        let end = u32::try_from(self.data.len()).unwrap_or(u32::MAX);
        if let Some(annotations) = self.annotations.as_mut() {
            annotations.push(Annotation {
                start,
                end,
                text: text(),
            });
        }
    }

    /// Writes a little-endian primitive.
    pub fn write_le<T: DexIO>(&mut self, value: T) {
        self.data.extend_from_slice(value.to_le_bytes().as_ref());
    }

    /// Writes raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Writes an unsigned LEB128 value.
    pub fn write_uleb128(&mut self, value: u32) {
        let mut value = value;
        let mut remaining = value >> 7;
        while remaining != 0 {
            self.data.push(((value & 0x7F) | 0x80) as u8);
            value = remaining;
            remaining >>= 7;
        }
        self.data.push((value & 0x7F) as u8);
    }

    /// Writes an optional value as unsigned LEB128 biased by one, `None` as 0.
    pub fn write_uleb128p1(&mut self, value: Option<u32>) {
        self.write_uleb128(value.map_or(0, |value| value.wrapping_add(1)));
    }

    /// Writes a signed LEB128 value in its minimal form.
    pub fn write_sleb128(&mut self, value: i32) {
        let mut value = value;
        let mut remaining = value >> 7;
        let end = if value < 0 { -1 } else { 0 };
        let mut has_more = true;

        while has_more {
            has_more = remaining != end || (remaining & 1) != ((value >> 6) & 1);
            self.data
                .push(((value & 0x7F) as u8) | if has_more { 0x80 } else { 0 });
            value = remaining;
            remaining >>= 7;
        }
    }

    /// Writes UTF-16 code units as modified UTF-8 followed by a zero terminator.
    pub fn write_mutf8(&mut self, units: &[u16]) {
        self.data.extend_from_slice(&mutf8::encode(units));
        self.data.push(0);
    }

    /// Pads with zero bytes up to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) {
        let padding = (alignment - (self.data.len() % alignment)) % alignment;
        self.data.resize(self.data.len() + padding, 0);
    }

    /// Pads with zero bytes up to `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::State`] if more than `offset` bytes were already written.
    pub fn pad_to(&mut self, offset: u32) -> Result<()> {
        let offset = offset as usize;
        if offset < self.data.len() {
            return Err(state_error!(
                "writer already at 0x{:x}, cannot pad back to 0x{:x}",
                self.data.len(),
                offset
            ));
        }
        self.data.resize(offset, 0);
        Ok(())
    }

    /// Returns the encoded bytes and the recorded annotations.
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, Vec<Annotation>) {
        (self.data, self.annotations.unwrap_or_default())
    }

    /// Borrow the bytes written so far.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::parser::Parser;

    #[test]
    fn leb128_encodings() {
        let mut writer = Writer::new(false);
        writer.write_uleb128(0);
        writer.write_uleb128(300);
        writer.write_sleb128(-1);
        writer.write_sleb128(64);
        writer.write_sleb128(-128);
        writer.write_uleb128p1(None);
        writer.write_uleb128p1(Some(0x7F));

        assert_eq!(
            writer.data(),
            &[0x00, 0xAC, 0x02, 0x7F, 0xC0, 0x00, 0x80, 0x7F, 0x00, 0x80, 0x01]
        );

        let mut parser = Parser::new(writer.data());
        assert_eq!(parser.read_uleb128().unwrap(), 0);
        assert_eq!(parser.read_uleb128().unwrap(), 300);
        assert_eq!(parser.read_sleb128().unwrap(), -1);
        assert_eq!(parser.read_sleb128().unwrap(), 64);
        assert_eq!(parser.read_sleb128().unwrap(), -128);
        assert_eq!(parser.read_uleb128p1().unwrap(), None);
        assert_eq!(parser.read_uleb128p1().unwrap(), Some(0x7F));
    }

    #[test]
    fn alignment_and_padding() {
        let mut writer = Writer::new(false);
        writer.write_le(0xAB_u8);
        writer.align(4);
        assert_eq!(writer.data(), &[0xAB, 0, 0, 0]);
        writer.align(4);
        assert_eq!(writer.pos().unwrap(), 4);
        writer.pad_to(6).unwrap();
        assert_eq!(writer.pos().unwrap(), 6);
        assert!(writer.pad_to(5).is_err());
    }

    #[test]
    fn annotations_recorded_only_when_enabled() {
        let mut writer = Writer::new(true);
        writer.write_le(0x1234_5678_u32);
        writer.annotate_from(0, || "endian_tag".to_string());
        let (data, annotations) = writer.into_parts();
        assert_eq!(data, vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].to_string(), "000000-000004: endian_tag");

        let mut writer = Writer::new(false);
        writer.write_le(1_u16);
        writer.annotate_from(0, || unreachable!());
        assert!(writer.into_parts().1.is_empty());
    }
}
