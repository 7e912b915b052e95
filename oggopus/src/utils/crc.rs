//! CRC validation utilities for Ogg pages.
//!
//! Provides the 32-bit page checksum used by the Ogg framing layer.
//!
//! Note: the page checksum is not the reflected IEEE-802.3 CRC-32 found in
//! zip/PNG/Ethernet. It shifts MSB-first, starts from zero and applies no
//! final inversion.

/// CRC algorithm parameters: polynomial and initial value.
pub struct Algorithm<T> {
    poly: T,
    init: T,
}

/// CRC-32 algorithm for Ogg page validation.
pub const CRC_OGG_PAGE_ALG: Algorithm<u32> = Algorithm {
    poly: 0x04C1_1DB7,
    init: 0x0000_0000,
};

/// Computes CRC-32 checksum using specified polynomial.
#[inline(always)]
pub const fn crc32(poly: u32, mut value: u32, len: usize) -> u32 {
    value <<= 24;

    let mut i = 0;
    while i < len {
        value = (value << 1) ^ (((value >> 31) & 1) * poly);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc32_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc32(poly, i as u32, 8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc32 {
    pub poly: u32,
    pub init: u32,
    table: [u32; 256],
}

impl Crc32 {
    pub const fn new(algorithm: &Algorithm<u32>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            table: crc32_table(algorithm.poly),
        }
    }

    const fn table_entry(&self, index: u32) -> u32 {
        self.table[(index & 0xFF) as usize]
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u32, bytes: &[u8]) -> u32 {
        let mut i = 0;

        while i < bytes.len() {
            crc = self.table_entry((crc >> 24) ^ bytes[i] as u32) ^ (crc << 8);
            i += 1;
        }

        crc
    }

    /// Checksum of a complete buffer starting from the algorithm's initial value.
    #[inline(always)]
    pub const fn checksum(&self, bytes: &[u8]) -> u32 {
        self.update(self.init, bytes)
    }
}

/// Shared table for page checksums, built at compile time.
pub static OGG_PAGE_CRC: Crc32 = Crc32::new(&CRC_OGG_PAGE_ALG);

/// Checksum of a page buffer whose checksum field (bytes 22..26) is treated as zero.
///
/// The buffer must hold at least a full fixed header.
pub fn page_checksum(page: &[u8]) -> u32 {
    let crc = OGG_PAGE_CRC.update(OGG_PAGE_CRC.init, &page[..22]);
    let crc = OGG_PAGE_CRC.update(crc, &[0u8; 4]);
    OGG_PAGE_CRC.update(crc, &page[26..])
}
