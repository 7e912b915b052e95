use std::collections::VecDeque;

use log::{debug, trace};

use crate::structs::packet::Packet;
use crate::structs::page::{MAX_BODY_LEN, MAX_SEGMENTS, Page, PageBuilder};
use crate::structs::segment::{PacketBoundary, Segment, page_span, segment_packet};
use crate::utils::errors::SequenceError;

/// Body size at which a page is emitted without an explicit flush.
pub const DEFAULT_PAGE_TARGET: usize = 4096;

#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Body bytes that make a page ready. Clamped to `1..=MAX_BODY_LEN`.
    pub page_target: usize,
    /// Leading packets that must each be flushed onto pages of their own.
    pub header_packets: u64,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            page_target: DEFAULT_PAGE_TARGET,
            header_packets: 0,
        }
    }
}

/// Page emission state of a [`Muxer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxState {
    /// Nothing pending.
    Idle,
    /// Pending data below the page target.
    Accumulating,
    /// At least one full page can be emitted.
    PageReady,
    /// Everything pending is emitted regardless of the target.
    Flushing,
    /// End of stream was emitted; no further packets are accepted.
    Closed,
}

/// Packs packets of one logical stream into pages.
///
/// # Example
///
/// ```rust
/// use oggopus::process::mux::{MuxConfig, Muxer};
/// use oggopus::structs::packet::Packet;
///
/// let mut muxer = Muxer::new(0x5EED, MuxConfig::default());
/// muxer.submit(Packet::new(vec![1, 2, 3], 480, 0))?;
/// muxer.submit(Packet::new(vec![4, 5], 960, 1).with_eos(true))?;
///
/// let pages = muxer.drain_pages();
/// assert_eq!(pages.len(), 1);
/// assert!(pages[0].is_bos() && pages[0].is_eos());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Muxer {
    serial: u32,
    config: MuxConfig,
    state: MuxState,
    segments: VecDeque<Segment>,
    body: VecDeque<u8>,
    sequence: u32,
    next_packet_no: u64,
    last_granule: Option<i64>,
    page_granule: i64,
    mid_packet: bool,
    eos_submitted: bool,
}

impl Muxer {
    pub fn new(serial: u32, mut config: MuxConfig) -> Self {
        config.page_target = config.page_target.clamp(1, MAX_BODY_LEN);

        Self {
            serial,
            config,
            state: MuxState::Idle,
            segments: VecDeque::new(),
            body: VecDeque::new(),
            sequence: 0,
            next_packet_no: 0,
            last_granule: None,
            page_granule: 0,
            mid_packet: false,
            eos_submitted: false,
        }
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn state(&self) -> MuxState {
        self.state
    }

    /// Sequence number the next page will carry.
    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }

    pub fn next_packet_no(&self) -> u64 {
        self.next_packet_no
    }

    pub fn pending_bytes(&self) -> usize {
        self.body.len()
    }

    /// Queues a packet.
    ///
    /// Packets must arrive in packet-number order with non-decreasing
    /// granule positions, and header packets must be flushed before the
    /// next packet is submitted.
    pub fn submit(&mut self, packet: Packet) -> Result<(), SequenceError> {
        if self.eos_submitted {
            return Err(SequenceError::SubmitAfterEndOfStream);
        }

        if packet.packet_no != self.next_packet_no {
            return Err(SequenceError::PacketNumber {
                expected: self.next_packet_no,
                got: packet.packet_no,
            });
        }

        if packet.bos && packet.packet_no != 0 {
            return Err(SequenceError::MisplacedBeginOfStream(packet.packet_no));
        }

        if let Some(previous) = self.last_granule {
            if packet.granule_position < previous {
                return Err(SequenceError::GranuleRegression {
                    previous,
                    submitted: packet.granule_position,
                });
            }
        }

        if let Some(header) = self.pending_header() {
            return Err(SequenceError::HeaderNotFlushed(header));
        }

        let boundary = PacketBoundary {
            granule_position: packet.granule_position,
            packet_no: packet.packet_no,
            eos: packet.eos,
        };

        trace!(
            "Packet {} in: {} bytes, granule {}{}",
            packet.packet_no,
            packet.data.len(),
            packet.granule_position,
            if packet.eos { ", eos" } else { "" }
        );

        self.segments
            .extend(segment_packet(packet.data.len(), boundary));
        self.body.extend(packet.data);
        self.last_granule = Some(packet.granule_position);
        self.next_packet_no += 1;
        self.eos_submitted = packet.eos;

        self.state = self.next_state();
        Ok(())
    }

    /// Forces everything pending onto pages, even below the page target.
    pub fn flush(&mut self) {
        if !self.segments.is_empty() {
            self.state = MuxState::Flushing;
        }
    }

    /// Emits the next page if one is ready.
    pub fn page_out(&mut self) -> Option<Page> {
        match self.state {
            MuxState::PageReady | MuxState::Flushing => {
                let page = self.build_page();
                self.state = self.next_state();
                Some(page)
            }
            MuxState::Idle | MuxState::Accumulating | MuxState::Closed => None,
        }
    }

    /// Emits every page that is ready, in order.
    pub fn drain_pages(&mut self) -> Vec<Page> {
        std::iter::from_fn(|| self.page_out()).collect()
    }

    fn pending_header(&self) -> Option<u64> {
        self.segments
            .iter()
            .filter_map(|segment| segment.end)
            .map(|end| end.packet_no)
            .find(|&packet_no| packet_no < self.config.header_packets)
    }

    fn page_ready(&self) -> bool {
        self.body.len() >= self.config.page_target
            || self.segments.len() >= MAX_SEGMENTS
            || self.pending_header().is_some()
    }

    fn next_state(&self) -> MuxState {
        if self.segments.is_empty() {
            return if self.eos_submitted {
                MuxState::Closed
            } else {
                MuxState::Idle
            };
        }

        if self.state == MuxState::Flushing || self.eos_submitted {
            MuxState::Flushing
        } else if self.page_ready() {
            MuxState::PageReady
        } else {
            MuxState::Accumulating
        }
    }

    fn build_page(&mut self) -> Page {
        // Header packets get pages of their own, so only the lacing limits apply.
        let target = match self.pending_header() {
            Some(_) => MAX_BODY_LEN,
            None => self.config.page_target,
        };
        let span = page_span(&self.segments, target);
        let taken = self.segments.drain(..span).collect::<Vec<_>>();

        let segment_table = taken.iter().map(|segment| segment.len).collect::<Vec<_>>();
        let body_len = segment_table.iter().map(|&v| v as usize).sum::<usize>();
        let body = self.body.drain(..body_len).collect::<Vec<_>>();

        let last_end = taken.iter().rev().find_map(|segment| segment.end);
        let granule_position = last_end.map_or(self.page_granule, |end| end.granule_position);
        let eos = last_end.is_some_and(|end| end.eos);

        let page = PageBuilder::new(self.serial, self.sequence)
            .granule_position(granule_position)
            .continued(self.mid_packet)
            .bos(self.sequence == 0)
            .eos(eos)
            .build(segment_table, body);

        debug!(
            "Page {} out: {} segments, {} bytes, granule {}, flags {}",
            page.sequence(),
            page.header.segment_table.len(),
            page.body.len(),
            page.granule_position(),
            page.header.flags
        );

        self.mid_packet = taken.last().is_some_and(Segment::is_continuation);
        self.page_granule = granule_position;
        self.sequence = self.sequence.wrapping_add(1);

        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn muxer(page_target: usize) -> Muxer {
        Muxer::new(
            0xC0FFEE,
            MuxConfig {
                page_target,
                header_packets: 0,
            },
        )
    }

    fn submit_lengths(muxer: &mut Muxer, lengths: &[usize]) {
        for (i, &len) in lengths.iter().enumerate() {
            let packet = Packet::new(vec![i as u8; len], (i as i64 + 1) * 480, i as u64);
            muxer.submit(packet).unwrap();
        }
    }

    fn table(page: &Page) -> &[u8] {
        &page.header.segment_table
    }

    #[test]
    fn below_target_waits_for_flush() {
        let mut muxer = muxer(512);
        submit_lengths(&mut muxer, &[100, 300, 10]);

        assert_eq!(muxer.state(), MuxState::Accumulating);
        assert!(muxer.drain_pages().is_empty());

        muxer.flush();
        let pages = muxer.drain_pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(table(&pages[0]), [100, 255, 45, 10]);
        assert_eq!(pages[0].granule_position(), 3 * 480);
        assert_eq!(muxer.state(), MuxState::Idle);
    }

    #[test]
    fn target_splits_after_packet_boundary() {
        let mut muxer = muxer(400);
        submit_lengths(&mut muxer, &[100, 300, 10]);

        let pages = muxer.drain_pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(table(&pages[0]), [100, 255, 45]);
        assert_eq!(pages[0].granule_position(), 2 * 480);

        muxer.flush();
        let rest = muxer.drain_pages();
        assert_eq!(rest.len(), 1);
        assert_eq!(table(&rest[0]), [10]);
        assert!(!rest[0].is_continued());
        assert_eq!(rest[0].sequence(), 1);
    }

    #[test]
    fn target_splits_mid_packet_with_continuation() {
        let mut muxer = muxer(256);
        submit_lengths(&mut muxer, &[100, 300, 10]);
        muxer.flush();

        let pages = muxer.drain_pages();
        assert_eq!(pages.len(), 2);
        assert_eq!(table(&pages[0]), [100, 255]);
        assert!(pages[0].ends_mid_packet());
        assert_eq!(table(&pages[1]), [45, 10]);
        assert!(pages[1].is_continued());
        assert_eq!(pages[1].granule_position(), 3 * 480);
    }

    #[test]
    fn continuation_only_page_carries_granule_forward() {
        let mut muxer = muxer(600);
        submit_lengths(&mut muxer, &[10]);
        muxer.flush();
        let first = muxer.drain_pages();
        assert_eq!(first[0].granule_position(), 480);

        muxer
            .submit(Packet::new(vec![7; 2000], 960, 1))
            .unwrap();
        muxer.flush();
        let pages = muxer.drain_pages();

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].packets_completed(), 0);
        assert_eq!(pages[0].granule_position(), 480);
        assert_eq!(pages[1].packets_completed(), 0);
        assert_eq!(pages[1].granule_position(), 480);
        assert!(pages[1].is_continued());
        assert_eq!(pages[2].packets_completed(), 1);
        assert_eq!(pages[2].granule_position(), 960);
    }

    #[test]
    fn exact_multiple_of_255_gets_terminal_zero() {
        let mut muxer = muxer(DEFAULT_PAGE_TARGET);
        submit_lengths(&mut muxer, &[255 * 3]);
        muxer.flush();

        let pages = muxer.drain_pages();
        assert_eq!(table(&pages[0]), [255, 255, 255, 0]);
        assert_eq!(pages[0].packets_completed(), 1);
    }

    #[test]
    fn segment_table_limit_forces_page() {
        let mut muxer = muxer(MAX_BODY_LEN);
        let lengths = vec![0usize; 300];
        submit_lengths(&mut muxer, &lengths);

        assert_eq!(muxer.state(), MuxState::PageReady);
        let pages = muxer.drain_pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(table(&pages[0]).len(), MAX_SEGMENTS);
        assert_eq!(muxer.state(), MuxState::Accumulating);
    }

    #[test]
    fn sequence_numbers_have_no_gaps() {
        let mut muxer = muxer(300);
        let lengths = (0..40).map(|i| 50 + i * 7).collect::<Vec<_>>();
        submit_lengths(&mut muxer, &lengths);
        muxer.flush();

        let pages = muxer.drain_pages();
        assert!(pages.len() > 5);
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.sequence(), i as u32);
            assert_eq!(page.is_bos(), i == 0);
        }
    }

    #[test]
    fn header_packets_get_their_own_pages() {
        let mut muxer = Muxer::new(
            1,
            MuxConfig {
                page_target: DEFAULT_PAGE_TARGET,
                header_packets: 2,
            },
        );

        muxer.submit(Packet::new(vec![0; 19], 0, 0)).unwrap();
        assert_eq!(
            muxer.submit(Packet::new(vec![1; 30], 0, 1)),
            Err(SequenceError::HeaderNotFlushed(0))
        );
        muxer.flush();
        let id = muxer.drain_pages();

        muxer.submit(Packet::new(vec![1; 30], 0, 1)).unwrap();
        muxer.flush();
        let tags = muxer.drain_pages();

        for n in 2..6u64 {
            muxer
                .submit(Packet::new(vec![2; 3000], n as i64 * 480, n))
                .unwrap();
        }
        muxer.flush();
        let audio = muxer.drain_pages();

        assert_eq!(id.len(), 1);
        assert_eq!(table(&id[0]), [19]);
        assert!(id[0].is_bos());
        assert_eq!(tags.len(), 1);
        assert_eq!(table(&tags[0]), [30]);
        assert_eq!(tags[0].sequence(), 1);
        assert_eq!(audio[0].sequence(), 2);
        assert!(!audio[0].is_continued());
    }

    #[test]
    fn header_above_page_target_stays_on_one_page() {
        let mut muxer = Muxer::new(
            1,
            MuxConfig {
                page_target: 1000,
                header_packets: 2,
            },
        );

        muxer.submit(Packet::new(vec![0; 19], 0, 0)).unwrap();
        muxer.flush();
        muxer.drain_pages();
        muxer.submit(Packet::new(vec![1; 6020], 0, 1)).unwrap();
        muxer.flush();
        let tags = muxer.drain_pages();

        muxer.submit(Packet::new(vec![2; 100], 480, 2)).unwrap();
        muxer.flush();
        let audio = muxer.drain_pages();

        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].body.len(), 6020);
        assert_eq!(tags[0].packets_completed(), 1);
        assert!(!tags[0].ends_mid_packet());
        assert_eq!(audio[0].sequence(), 2);
        assert!(!audio[0].is_continued());
    }

    #[test]
    fn end_of_stream_only_on_final_page() {
        let mut muxer = muxer(256);
        for n in 0..5u64 {
            let packet = Packet::new(vec![n as u8; 200], (n as i64 + 1) * 480, n).with_eos(n == 4);
            muxer.submit(packet).unwrap();
        }

        assert_eq!(muxer.state(), MuxState::Flushing);
        let pages = muxer.drain_pages();
        let (last, rest) = pages.split_last().unwrap();

        assert!(last.is_eos());
        assert_eq!(last.granule_position(), 5 * 480);
        assert!(rest.iter().all(|page| !page.is_eos()));
        assert_eq!(muxer.state(), MuxState::Closed);

        // Flushing with nothing pending must not produce a second eos page.
        muxer.flush();
        assert!(muxer.drain_pages().is_empty());
        assert_eq!(
            muxer.submit(Packet::new(vec![], 5 * 480, 5)),
            Err(SequenceError::SubmitAfterEndOfStream)
        );
    }

    #[test]
    fn eos_packet_spanning_pages_flags_only_its_last_page() {
        let mut muxer = muxer(500);
        muxer
            .submit(Packet::new(vec![9; 1500], 480, 0).with_eos(true))
            .unwrap();

        let pages = muxer.drain_pages();
        assert_eq!(pages.len(), 3);
        assert_eq!(
            pages.iter().map(Page::is_eos).collect::<Vec<_>>(),
            [false, false, true]
        );
    }

    #[test]
    fn rejects_out_of_order_submissions() {
        let mut muxer = muxer(DEFAULT_PAGE_TARGET);
        muxer.submit(Packet::new(vec![1], 960, 0)).unwrap();

        assert_eq!(
            muxer.submit(Packet::new(vec![2], 480, 1)),
            Err(SequenceError::GranuleRegression {
                previous: 960,
                submitted: 480
            })
        );
        assert_eq!(
            muxer.submit(Packet::new(vec![2], 960, 3)),
            Err(SequenceError::PacketNumber {
                expected: 1,
                got: 3
            })
        );

        let mut bos = Packet::new(vec![2], 960, 1);
        bos.bos = true;
        assert_eq!(
            muxer.submit(bos),
            Err(SequenceError::MisplacedBeginOfStream(1))
        );

        // Equal granule positions are allowed.
        muxer.submit(Packet::new(vec![2], 960, 1)).unwrap();
    }

    #[test]
    fn zero_length_packets_are_framed() {
        let mut muxer = muxer(DEFAULT_PAGE_TARGET);
        submit_lengths(&mut muxer, &[0, 5, 0]);
        muxer.flush();

        let pages = muxer.drain_pages();
        assert_eq!(table(&pages[0]), [0, 5, 0]);
        assert_eq!(pages[0].packets_completed(), 3);
    }
}
