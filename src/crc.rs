//! Frame checksum.
//!
//! The mower firmware signs every frame with a CRC-8/MAXIM (Dallas 1-Wire)
//! checksum: reflected polynomial `0x31` (`0x8C` in reflected form), initial
//! value `0x00`, no final xor. Parameters were recovered from captured frames,
//! see the fixtures in the tests below.

/// Signature of a checksum over `buffer[start..=end]`.
///
/// The frame codec is parameterised over this so captured traffic can be
/// checked against alternative algorithms.
pub type ChecksumFn = fn(buffer: &[u8], start: usize, end: usize) -> u8;

const POLY_REFLECTED: u8 = 0x8C;

const TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x01 != 0 {
                (crc >> 1) ^ POLY_REFLECTED
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Checksum over the inclusive range `buffer[start..=end]`.
///
/// Out-of-range indices are clamped to the buffer, an empty range yields `0`.
#[must_use]
pub fn crc(buffer: &[u8], start: usize, end: usize) -> u8 {
    if buffer.is_empty() || start > end || start >= buffer.len() {
        return 0;
    }
    let end = end.min(buffer.len() - 1);

    buffer[start..=end]
        .iter()
        .fold(0u8, |acc, &byte| TABLE[usize::from(acc ^ byte)])
}
