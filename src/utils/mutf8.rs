//! Modified UTF-8 as used by string data records.
//!
//! DEX strings are sequences of UTF-16 code units. Each unit is encoded on its own: U+0000 as the
//! two-byte form `C0 80`, units below 0x80 as one byte, units below 0x800 as two bytes, and every
//! other unit (surrogates included) as three bytes. Supplementary characters therefore appear as
//! two three-byte surrogate encodings rather than one four-byte sequence.

use crate::Result;

/// Decodes modified UTF-8 bytes into UTF-16 code units.
///
/// The input must not contain the terminating zero byte.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for a truncated sequence or an invalid lead byte.
pub fn decode(bytes: &[u8]) -> Result<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut position = 0;

    while position < bytes.len() {
        let lead = bytes[position];
        match lead >> 4 {
            0x0..=0x7 => {
                if lead == 0 {
                    return Err(malformed_error!(
                        "Embedded zero byte in modified UTF-8 at {}",
                        position
                    ));
                }
                units.push(u16::from(lead));
                position += 1;
            }
            0xC | 0xD => {
                let second = continuation(bytes, position + 1)?;
                units.push((u16::from(lead & 0x1F) << 6) | second);
                position += 2;
            }
            0xE => {
                let second = continuation(bytes, position + 1)?;
                let third = continuation(bytes, position + 2)?;
                units.push((u16::from(lead & 0x0F) << 12) | (second << 6) | third);
                position += 3;
            }
            _ => {
                return Err(malformed_error!(
                    "Invalid modified UTF-8 lead byte 0x{:02x} at {}",
                    lead,
                    position
                ))
            }
        }
    }

    Ok(units)
}

fn continuation(bytes: &[u8], position: usize) -> Result<u16> {
    match bytes.get(position) {
        Some(byte) if byte & 0xC0 == 0x80 => Ok(u16::from(byte & 0x3F)),
        Some(byte) => Err(malformed_error!(
            "Invalid modified UTF-8 continuation byte 0x{:02x} at {}",
            byte,
            position
        )),
        None => Err(malformed_error!("Truncated modified UTF-8 sequence")),
    }
}

/// Encodes UTF-16 code units as modified UTF-8, without a terminator.
#[must_use]
pub fn encode(units: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(encoded_len(units));
    for &unit in units {
        match unit {
            0x0001..=0x007F => bytes.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                bytes.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                bytes.push(0xE0 | (unit >> 12) as u8);
                bytes.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    bytes
}

/// Number of bytes [`encode`] produces for `units`.
#[must_use]
pub fn encoded_len(units: &[u16]) -> usize {
    units
        .iter()
        .map(|&unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}
