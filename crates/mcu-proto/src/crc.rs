//! CRC-32 (IEEE 802.3 / zlib) for the config-command checksum.
//!
//! The host and firmware must agree on a checksum of the ordered config
//! command list before the session is allowed to run. This is the same
//! polynomial `zlib.crc32` uses, not the CRC-16 used for wire framing.

/// Calculates the CRC-32 (IEEE 802.3) checksum of `data`.
///
/// A `const fn` table-free implementation so it can run without pulling in
/// a dependency just for one checksum.
pub const fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    let mut i = 0;
    while i < data.len() {
        crc ^= data[i] as u32;
        let mut j = 0;
        while j < 8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
            j += 1;
        }
        i += 1;
    }
    !crc
}
