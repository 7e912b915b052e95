//! Ogg page structures.
//!
//! Wire layout (all integers little-endian):
//!
//! | offset | size | field                      |
//! |--------|------|----------------------------|
//! | 0      | 4    | capture pattern `OggS`     |
//! | 4      | 1    | stream structure version   |
//! | 5      | 1    | header type flags          |
//! | 6      | 8    | granule position (signed)  |
//! | 14     | 4    | stream serial number       |
//! | 18     | 4    | page sequence number       |
//! | 22     | 4    | CRC checksum               |
//! | 26     | 1    | number of segments         |
//! | 27     | n    | segment table              |
//! | 27 + n | sum  | page body                  |

use std::fmt::{Display, Formatter};

use crate::byteorder::WriteBytesLe;
use crate::utils::crc::page_checksum;
use crate::utils::errors::SyncError;

pub const CAPTURE_PATTERN: [u8; 4] = *b"OggS";
pub const STREAM_STRUCTURE_VERSION: u8 = 0;
/// Fixed part of the header, up to and including the segment count.
pub const HEADER_LEN: usize = 27;
pub const MAX_SEGMENTS: usize = 255;
pub const MAX_SEGMENT_LEN: usize = 255;
pub const MAX_BODY_LEN: usize = MAX_SEGMENTS * MAX_SEGMENT_LEN;
pub const MAX_PAGE_LEN: usize = HEADER_LEN + MAX_SEGMENTS + MAX_BODY_LEN;

const CHECKSUM_RANGE: std::ops::Range<usize> = 22..26;

/// Header type flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageFlags(u8);

impl PageFlags {
    /// First packet on the page continues one from the previous page.
    pub const CONTINUED: u8 = 0x01;
    /// First page of a logical stream.
    pub const BOS: u8 = 0x02;
    /// Last page of a logical stream.
    pub const EOS: u8 = 0x04;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub const fn with(self, flag: u8, enabled: bool) -> Self {
        if enabled {
            Self(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }
}

impl Display for PageFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names = [
            (Self::CONTINUED, "continued"),
            (Self::BOS, "bos"),
            (Self::EOS, "eos"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect::<Vec<_>>();

        if names.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub version: u8,
    pub flags: PageFlags,
    pub granule_position: i64,
    pub serial: u32,
    pub sequence: u32,
    pub checksum: u32,
    pub segment_table: Vec<u8>,
}

impl PageHeader {
    /// Parses a header from the start of `buf`.
    ///
    /// Returns `Ok(None)` while `buf` is too short to hold the fixed header
    /// and the segment table. The capture pattern must already be at offset 0.
    pub fn read(buf: &[u8]) -> Result<Option<Self>, SyncError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        debug_assert_eq!(buf[..4], CAPTURE_PATTERN);

        let version = buf[4];
        if version != STREAM_STRUCTURE_VERSION {
            return Err(SyncError::UnsupportedVersion(version));
        }

        let segments = buf[26] as usize;
        if buf.len() < HEADER_LEN + segments {
            return Ok(None);
        }

        let le_u32 = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let mut granule = [0u8; 8];
        granule.copy_from_slice(&buf[6..14]);

        Ok(Some(Self {
            version,
            flags: PageFlags::from_bits(buf[5]),
            granule_position: i64::from_le_bytes(granule),
            serial: le_u32(14),
            sequence: le_u32(18),
            checksum: le_u32(22),
            segment_table: buf[HEADER_LEN..HEADER_LEN + segments].to_vec(),
        }))
    }

    pub fn header_len(&self) -> usize {
        HEADER_LEN + self.segment_table.len()
    }

    pub fn body_len(&self) -> usize {
        self.segment_table.iter().map(|&v| v as usize).sum()
    }

    pub fn page_len(&self) -> usize {
        self.header_len() + self.body_len()
    }
}

impl WriteBytesLe for PageHeader {
    fn write_le(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(&CAPTURE_PATTERN);
        self.version.write_le(dst);
        self.flags.bits().write_le(dst);
        self.granule_position.write_le(dst);
        self.serial.write_le(dst);
        self.sequence.write_le(dst);
        self.checksum.write_le(dst);
        (self.segment_table.len() as u8).write_le(dst);
        self.segment_table.write_le(dst);
    }
}

/// A complete, self-contained page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub header: PageHeader,
    pub body: Vec<u8>,
}

impl Page {
    /// Serialises the page exactly as stored, checksum included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len());
        self.header.write_le(&mut bytes);
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Parses and validates one page at the start of `buf`.
    ///
    /// Returns `Ok(None)` if `buf` does not yet hold the whole page.
    pub fn from_bytes(buf: &[u8]) -> Result<Option<Self>, SyncError> {
        let Some(header) = PageHeader::read(buf)? else {
            return Ok(None);
        };

        let page_len = header.page_len();
        if buf.len() < page_len {
            return Ok(None);
        }

        let calculated = page_checksum(&buf[..page_len]);
        if calculated != header.checksum {
            return Err(SyncError::CorruptPage {
                serial: header.serial,
                sequence: header.sequence,
                calculated,
                read: header.checksum,
            });
        }

        let body = buf[header.header_len()..page_len].to_vec();
        Ok(Some(Self { header, body }))
    }

    pub fn len(&self) -> usize {
        self.header.header_len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.segment_table.is_empty()
    }

    pub fn serial(&self) -> u32 {
        self.header.serial
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    pub fn granule_position(&self) -> i64 {
        self.header.granule_position
    }

    pub fn is_continued(&self) -> bool {
        self.header.flags.contains(PageFlags::CONTINUED)
    }

    pub fn is_bos(&self) -> bool {
        self.header.flags.contains(PageFlags::BOS)
    }

    pub fn is_eos(&self) -> bool {
        self.header.flags.contains(PageFlags::EOS)
    }

    /// Number of packets that end on this page.
    pub fn packets_completed(&self) -> usize {
        self.header
            .segment_table
            .iter()
            .filter(|&&v| (v as usize) < MAX_SEGMENT_LEN)
            .count()
    }

    /// The last packet on this page continues onto the next one.
    pub fn ends_mid_packet(&self) -> bool {
        self.header.segment_table.last() == Some(&(MAX_SEGMENT_LEN as u8))
    }
}

/// Assembles pages and stamps their checksum.
///
/// Sequence numbering is left to the caller.
#[derive(Debug, Clone, Copy)]
pub struct PageBuilder {
    serial: u32,
    sequence: u32,
    granule_position: i64,
    flags: PageFlags,
}

impl PageBuilder {
    pub fn new(serial: u32, sequence: u32) -> Self {
        Self {
            serial,
            sequence,
            granule_position: 0,
            flags: PageFlags::default(),
        }
    }

    pub fn granule_position(mut self, granule_position: i64) -> Self {
        self.granule_position = granule_position;
        self
    }

    pub fn continued(mut self, continued: bool) -> Self {
        self.flags = self.flags.with(PageFlags::CONTINUED, continued);
        self
    }

    pub fn bos(mut self, bos: bool) -> Self {
        self.flags = self.flags.with(PageFlags::BOS, bos);
        self
    }

    pub fn eos(mut self, eos: bool) -> Self {
        self.flags = self.flags.with(PageFlags::EOS, eos);
        self
    }

    /// Builds the page from a segment table and the body it describes.
    pub fn build(self, segment_table: Vec<u8>, body: Vec<u8>) -> Page {
        debug_assert!(segment_table.len() <= MAX_SEGMENTS);
        debug_assert_eq!(
            segment_table.iter().map(|&v| v as usize).sum::<usize>(),
            body.len()
        );

        let mut page = Page {
            header: PageHeader {
                version: STREAM_STRUCTURE_VERSION,
                flags: self.flags,
                granule_position: self.granule_position,
                serial: self.serial,
                sequence: self.sequence,
                checksum: 0,
                segment_table,
            },
            body,
        };

        let bytes = page.to_bytes();
        page.header.checksum = page_checksum(&bytes);
        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> Page {
        PageBuilder::new(0x1234_5678, 7)
            .granule_position(48_000)
            .continued(true)
            .eos(true)
            .build(vec![255, 45, 3], vec![0xA5; 303])
    }

    #[test]
    fn header_layout() {
        let bytes = sample_page().to_bytes();

        assert_eq!(&bytes[..4], b"OggS");
        assert_eq!(bytes[4], 0);
        assert_eq!(bytes[5], PageFlags::CONTINUED | PageFlags::EOS);
        assert_eq!(&bytes[6..14], &48_000i64.to_le_bytes());
        assert_eq!(&bytes[14..18], &0x1234_5678u32.to_le_bytes());
        assert_eq!(&bytes[18..22], &7u32.to_le_bytes());
        assert_eq!(bytes[26], 3);
        assert_eq!(&bytes[27..30], &[255, 45, 3]);
        assert_eq!(bytes.len(), 30 + 303);
    }

    #[test]
    fn built_page_parses_back() -> Result<(), SyncError> {
        let page = sample_page();
        let parsed = Page::from_bytes(&page.to_bytes())?.expect("complete page");

        assert_eq!(parsed, page);
        assert!(parsed.is_continued());
        assert!(parsed.is_eos());
        assert!(!parsed.is_bos());
        assert_eq!(parsed.packets_completed(), 2);
        assert!(!parsed.ends_mid_packet());
        Ok(())
    }

    #[test]
    fn incomplete_buffer_is_not_an_error() -> Result<(), SyncError> {
        let bytes = sample_page().to_bytes();
        assert!(Page::from_bytes(&bytes[..20])?.is_none());
        assert!(Page::from_bytes(&bytes[..29])?.is_none());
        assert!(Page::from_bytes(&bytes[..bytes.len() - 1])?.is_none());
        Ok(())
    }

    #[test]
    fn flipped_body_bit_fails_checksum() {
        let mut bytes = sample_page().to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x10;

        assert!(matches!(
            Page::from_bytes(&bytes),
            Err(SyncError::CorruptPage { sequence: 7, .. })
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = sample_page().to_bytes();
        bytes[4] = 1;
        assert_eq!(
            Page::from_bytes(&bytes),
            Err(SyncError::UnsupportedVersion(1))
        );
    }

    #[test]
    fn empty_page_round_trips() -> Result<(), SyncError> {
        let page = PageBuilder::new(1, 0).bos(true).build(Vec::new(), Vec::new());
        let bytes = page.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(Page::from_bytes(&bytes)?, Some(page));
        Ok(())
    }

    #[test]
    fn flags_display() {
        assert_eq!(PageFlags::default().to_string(), "-");
        assert_eq!(
            PageFlags::from_bits(PageFlags::BOS | PageFlags::EOS).to_string(),
            "bos|eos"
        );
    }

    #[test]
    fn maximum_page_size() {
        assert_eq!(MAX_PAGE_LEN, 65_307);
    }
}
