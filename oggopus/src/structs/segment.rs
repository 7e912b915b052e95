//! Packet segmentation (lacing).
//!
//! A packet of `n` bytes is laced as `n / 255` segments of 255 followed by a
//! single terminal segment of `n % 255`. The terminal segment is always
//! present, so a zero-length packet is a single 0 and a packet of exactly
//! `255 * k` bytes ends with an explicit 0.

use super::page::{MAX_SEGMENT_LEN, MAX_SEGMENTS};

/// Where a packet ends, recorded on its terminal segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketBoundary {
    pub granule_position: i64,
    pub packet_no: u64,
    pub eos: bool,
}

/// One entry of a segment table waiting to be placed on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub len: u8,
    /// `Some` on the terminal segment of a packet.
    pub end: Option<PacketBoundary>,
}

impl Segment {
    /// A segment of 255 bytes that does not end its packet.
    pub fn is_continuation(&self) -> bool {
        self.end.is_none()
    }
}

/// Lacing values for a packet of `len` bytes.
pub fn lacing_values(len: usize) -> impl Iterator<Item = u8> {
    let full = len / MAX_SEGMENT_LEN;
    let rest = (len % MAX_SEGMENT_LEN) as u8;
    std::iter::repeat_n(MAX_SEGMENT_LEN as u8, full).chain(std::iter::once(rest))
}

/// Splits one packet into segments, tagging the terminal one with `boundary`.
pub fn segment_packet(len: usize, boundary: PacketBoundary) -> Vec<Segment> {
    let mut segments: Vec<Segment> = lacing_values(len)
        .map(|len| Segment { len, end: None })
        .collect();

    if let Some(last) = segments.last_mut() {
        last.end = Some(boundary);
    }

    segments
}

/// Number of leading segments of `pending` that form the next page.
///
/// Segments are taken until the table holds [`MAX_SEGMENTS`] entries or the
/// accumulated body has reached `target` bytes. The target is checked before
/// each segment is added, so the first segment is always taken.
pub fn page_span<'a>(pending: impl IntoIterator<Item = &'a Segment>, target: usize) -> usize {
    let target = target.max(1);
    let mut body = 0usize;
    let mut count = 0usize;

    for segment in pending.into_iter().take(MAX_SEGMENTS) {
        if body >= target {
            break;
        }
        body += segment.len as usize;
        count += 1;
    }

    count
}
