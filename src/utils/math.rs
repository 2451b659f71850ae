//! Checked narrowing, alignment and LEB128 size arithmetic used by placement.

use crate::Result;

/// Converts a `usize` into a `u32`, failing instead of truncating.
///
/// # Errors
/// Returns [`crate::Error::Overflow`] if `value` exceeds `u32::MAX`.
pub fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| overflow_error!("value {value} exceeds u32::MAX"))
}

/// Converts an index into a 16-bit field value, failing instead of truncating.
///
/// # Errors
/// Returns [`crate::Error::Overflow`] naming `what` if `value` exceeds 65535.
pub fn to_u16(value: u32, what: &str) -> Result<u16> {
    u16::try_from(value)
        .map_err(|_| overflow_error!("{what} index {value} does not fit in 16 bits (max 65535)"))
}

/// Rounds `offset` up to the next multiple of `alignment`, which must be a power of two.
///
/// # Errors
/// Returns [`crate::Error::Overflow`] if the aligned offset exceeds `u32::MAX`.
pub fn align(offset: u32, alignment: u32) -> Result<u32> {
    let mask = alignment - 1;
    offset
        .checked_add(mask)
        .map(|value| value & !mask)
        .ok_or_else(|| overflow_error!("offset 0x{offset:x} cannot be aligned to {alignment}"))
}

/// Adds a size to an offset, failing once the container would outgrow 32-bit offsets.
///
/// # Errors
/// Returns [`crate::Error::Overflow`] on wrap-around.
pub fn advance(offset: u32, size: u32) -> Result<u32> {
    offset
        .checked_add(size)
        .ok_or_else(|| overflow_error!("offset 0x{offset:x} + {size} exceeds 32-bit offsets"))
}

/// Number of bytes an unsigned LEB128 encoding of `value` occupies.
#[must_use]
pub fn uleb128_size(value: u32) -> u32 {
    let mut remaining = value >> 7;
    let mut count = 1;
    while remaining != 0 {
        remaining >>= 7;
        count += 1;
    }
    count
}

/// Number of bytes a signed LEB128 encoding of `value` occupies.
#[must_use]
pub fn sleb128_size(value: i32) -> u32 {
    let mut value = value;
    let mut remaining = value >> 7;
    let mut count = 0;
    let end = if value < 0 { -1 } else { 0 };
    let mut has_more = true;

    while has_more {
        has_more = remaining != end || (remaining & 1) != ((value >> 6) & 1);
        value = remaining;
        remaining >>= 7;
        count += 1;
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_u32_valid() {
        assert_eq!(to_u32(0).unwrap(), 0);
        assert_eq!(to_u32(u32::MAX as usize).unwrap(), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_to_u32_overflow() {
        assert!(to_u32(u32::MAX as usize + 1).is_err());
    }

    #[test]
    fn test_to_u16() {
        assert_eq!(to_u16(0xFFFF, "type").unwrap(), 0xFFFF);
        let error = to_u16(0x1_0000, "type").unwrap_err();
        assert!(error.to_string().contains("type index 65536"));
    }

    #[test]
    fn test_align() {
        assert_eq!(align(0, 4).unwrap(), 0);
        assert_eq!(align(1, 4).unwrap(), 4);
        assert_eq!(align(4, 4).unwrap(), 4);
        assert_eq!(align(0x71, 4).unwrap(), 0x74);
        assert_eq!(align(7, 1).unwrap(), 7);
        assert!(align(u32::MAX, 4).is_err());
    }

    #[test]
    fn test_uleb128_size() {
        assert_eq!(uleb128_size(0), 1);
        assert_eq!(uleb128_size(0x7F), 1);
        assert_eq!(uleb128_size(0x80), 2);
        assert_eq!(uleb128_size(0x3FFF), 2);
        assert_eq!(uleb128_size(0x4000), 3);
        assert_eq!(uleb128_size(u32::MAX), 5);
    }

    #[test]
    fn test_sleb128_size() {
        assert_eq!(sleb128_size(0), 1);
        assert_eq!(sleb128_size(-1), 1);
        assert_eq!(sleb128_size(63), 1);
        assert_eq!(sleb128_size(64), 2);
        assert_eq!(sleb128_size(-64), 1);
        assert_eq!(sleb128_size(-65), 2);
        assert_eq!(sleb128_size(i32::MIN), 5);
        assert_eq!(sleb128_size(i32::MAX), 5);
    }
}
