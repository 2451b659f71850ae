//! Container checksum and signature.
//!
//! The header carries two integrity fields that can only be computed once the whole file has
//! been materialized: an Adler-32 checksum over `bytes[12..]` stored at `bytes[8..12]`, and a
//! SHA-1 signature over `bytes[32..]` stored at `bytes[12..32]`. The checksum range covers the
//! signature, so the signature has to be patched first.

use sha1::{Digest, Sha1};

use crate::{file::io::read_le, Result};

/// Offset of the Adler-32 checksum field.
pub const CHECKSUM_OFFSET: usize = 8;
/// Offset of the SHA-1 signature field; also the first byte covered by the checksum.
pub const SIGNATURE_OFFSET: usize = 12;
/// Length of the SHA-1 signature field.
pub const SIGNATURE_LEN: usize = 20;
/// First byte covered by the signature.
pub const SIGNED_OFFSET: usize = SIGNATURE_OFFSET + SIGNATURE_LEN;

const ADLER_MOD: u32 = 65521;
// Largest n such that 255n(n+1)/2 + (n+1)(ADLER_MOD-1) fits in a u32
const ADLER_NMAX: usize = 5552;

/// Computes the Adler-32 checksum of `data`.
#[must_use]
pub fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;

    for chunk in data.chunks(ADLER_NMAX) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= ADLER_MOD;
        b %= ADLER_MOD;
    }

    (b << 16) | a
}

/// Computes the SHA-1 digest of `data`.
#[must_use]
pub fn sha1(data: &[u8]) -> [u8; SIGNATURE_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Patches the signature and then the checksum into a fully encoded container.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than the signed prefix.
pub fn finalize(data: &mut [u8]) -> Result<()> {
    if data.len() < SIGNED_OFFSET {
        return Err(out_of_bounds_error!());
    }

    let signature = sha1(&data[SIGNED_OFFSET..]);
    data[SIGNATURE_OFFSET..SIGNED_OFFSET].copy_from_slice(&signature);

    let checksum = adler32(&data[SIGNATURE_OFFSET..]);
    data[CHECKSUM_OFFSET..SIGNATURE_OFFSET].copy_from_slice(&checksum.to_le_bytes());

    Ok(())
}

/// Verifies the checksum and signature stored in an encoded container.
///
/// # Errors
/// Returns [`crate::Error::Consistency`] naming the field that does not match, or
/// [`crate::Error::OutOfBounds`] for inputs shorter than the signed prefix.
pub fn verify(data: &[u8]) -> Result<()> {
    if data.len() < SIGNED_OFFSET {
        return Err(out_of_bounds_error!());
    }

    let signature = sha1(&data[SIGNED_OFFSET..]);
    if data[SIGNATURE_OFFSET..SIGNED_OFFSET] != signature {
        return Err(consistency_error!(
            "signature mismatch: stored {}, computed {}",
            hex(&data[SIGNATURE_OFFSET..SIGNED_OFFSET]),
            hex(&signature)
        ));
    }

    let stored = read_le::<u32>(&data[CHECKSUM_OFFSET..])?;
    let computed = adler32(&data[SIGNATURE_OFFSET..]);
    if stored != computed {
        return Err(consistency_error!(
            "checksum mismatch: stored 0x{stored:08x}, computed 0x{computed:08x}"
        ));
    }

    Ok(())
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adler32_known_values() {
        assert_eq!(adler32(b""), 1);
        assert_eq!(adler32(b"a"), 0x0062_0062);
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn adler32_long_input_reduces() {
        let data = vec![0xFF; 100_000];
        let mut a: u64 = 1;
        let mut b: u64 = 0;
        for &byte in &data {
            a = (a + u64::from(byte)) % 65521;
            b = (b + a) % 65521;
        }
        assert_eq!(adler32(&data), ((b << 16) | a) as u32);
    }

    #[test]
    fn sha1_known_value() {
        assert_eq!(hex(&sha1(b"abc")), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn finalize_then_verify() {
        let mut data = vec![0u8; 0x70];
        data[..8].copy_from_slice(b"dex\n035\0");
        data[0x40] = 0x42;

        finalize(&mut data).unwrap();
        verify(&data).unwrap();

        assert_eq!(&data[12..32], &sha1(&data[32..]));
        assert_eq!(
            u32::from_le_bytes(data[8..12].try_into().unwrap()),
            adler32(&data[12..])
        );

        data[0x41] ^= 1;
        assert!(matches!(verify(&data), Err(crate::Error::Consistency(_))));
    }

    #[test]
    fn short_input() {
        let mut data = vec![0u8; 16];
        assert!(finalize(&mut data).is_err());
        assert!(verify(&data).is_err());
    }
}
