//! Data segment digests.
//!
//! The digest is a 32-bit ones-complement sum over the padded data segment,
//! rendered as eight lowercase hex digits and stored in the DATASUM card.
//! Saving an entity refreshes the card so a stale digest never describes
//! fresh data.

use std::path::Path;

use crate::codec;
use crate::error::Result;
use crate::header::Value;

/// The header keyword carrying the data segment digest.
pub const DATASUM_KEYWORD: &str = "DATASUM";

/// Add with end-around carry.
fn ones_complement_add(a: u32, b: u32) -> u32 {
    let (sum, carry) = a.overflowing_add(b);
    sum.wrapping_add(carry as u32)
}

/// Ones-complement sum of `bytes` taken as big-endian 32-bit words.
///
/// A trailing partial word is zero-padded, matching the zero fill of the
/// data segment's final block.
pub(crate) fn checksum_bytes(bytes: &[u8]) -> u32 {
    let mut sum = 0u32;
    let mut chunks = bytes.chunks_exact(4);
    for chunk in &mut chunks {
        let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        sum = ones_complement_add(sum, word);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut tail = [0u8; 4];
        tail[..rest.len()].copy_from_slice(rest);
        sum = ones_complement_add(sum, u32::from_be_bytes(tail));
    }
    sum
}

/// Digest of the data segment of the given extension.
///
/// An empty data segment digests to `"00000000"`.
pub fn data_digest(path: &Path, extension: usize) -> Result<String> {
    let (bytes, hdus) = codec::scan_file(path)?;
    let hdu = codec::select(path, &hdus, extension)?;

    let end = (hdu.data_start + codec::padded(hdu.data_len)).min(bytes.len());
    let sum = checksum_bytes(&bytes[hdu.data_start..end]);
    Ok(format!("{sum:08x}"))
}

/// Recompute the digest of one extension and rewrite its DATASUM card,
/// returning the digest.
pub fn update_datasum(path: &Path, extension: usize) -> Result<String> {
    let digest = data_digest(path, extension)?;
    let mut header = codec::open_header(path, extension)?;
    header.set(
        DATASUM_KEYWORD,
        Value::Str(digest.clone()),
        Some("data segment checksum"),
    );
    codec::rewrite_header(path, extension, &header)?;
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use ndarray::Array;
    use tempfile::tempdir;

    // ---- word sums ----

    #[test]
    fn empty_input_sums_to_zero() {
        assert_eq!(checksum_bytes(&[]), 0);
    }

    #[test]
    fn single_word() {
        assert_eq!(checksum_bytes(&[0, 0, 0, 5]), 5);
        assert_eq!(checksum_bytes(&[1, 0, 0, 0]), 0x0100_0000);
    }

    #[test]
    fn carry_wraps_around() {
        // 0xFFFFFFFF + 2 overflows; the carry folds back in.
        let sum = ones_complement_add(u32::MAX, 2);
        assert_eq!(sum, 2);
    }

    #[test]
    fn partial_word_is_zero_padded() {
        assert_eq!(checksum_bytes(&[0xAB]), 0xAB00_0000);
        assert_eq!(checksum_bytes(&[0xAB, 0, 0, 0]), 0xAB00_0000);
    }

    #[test]
    fn sum_is_order_independent_for_word_swaps() {
        let a = checksum_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let b = checksum_bytes(&[5, 6, 7, 8, 1, 2, 3, 4]);
        assert_eq!(a, b);
    }

    // ---- file digests ----

    fn write_grid(path: &Path, seed: f64) {
        let data = Array::from_shape_fn((4, 4), |(r, c)| seed + (r * 4 + c) as f64).into_dyn();
        codec::write(path, &data, DataType::Float32, None, true).unwrap();
    }

    #[test]
    fn digest_is_stable_across_reads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.fits");
        write_grid(&path, 0.0);

        let d1 = data_digest(&path, 0).unwrap();
        let d2 = data_digest(&path, 0).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 8);
    }

    #[test]
    fn digest_tracks_data_changes() {
        let dir = tempdir().unwrap();
        let p1 = dir.path().join("a.fits");
        let p2 = dir.path().join("b.fits");
        write_grid(&p1, 0.0);
        write_grid(&p2, 100.0);

        assert_ne!(data_digest(&p1, 0).unwrap(), data_digest(&p2, 0).unwrap());
    }

    #[test]
    fn update_datasum_writes_the_card_and_keeps_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sum.fits");
        write_grid(&path, 0.0);
        let before = data_digest(&path, 0).unwrap();

        let written = update_datasum(&path, 0).unwrap();
        assert_eq!(written, before);

        let header = codec::open_header(&path, 0).unwrap();
        assert_eq!(header.str_value(DATASUM_KEYWORD), Some(before.as_str()));
        // The data segment itself is untouched.
        assert_eq!(data_digest(&path, 0).unwrap(), before);
    }
}
