use std::collections::VecDeque;

use log::{Level, debug, trace, warn};

use crate::log_or_err;
use crate::process::sync::{SyncConfig, Syncer};
use crate::structs::packet::Packet;
use crate::structs::page::{MAX_SEGMENT_LEN, Page};
use crate::utils::errors::DemuxError;

/// What to do when a page of another serial arrives before end of stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamChangePolicy {
    /// End the open stream and continue with the new serial.
    #[default]
    ImplicitEnd,
    /// Return [`DemuxError::UnexpectedStreamChange`] and hold the page until
    /// [`Demuxer::adopt_stream`] is called.
    Reject,
}

#[derive(Debug, Clone, Default)]
pub struct DemuxConfig {
    pub sync: SyncConfig,
    pub stream_change: StreamChangePolicy,
}

/// Running totals across every stream seen by a [`Demuxer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DemuxStats {
    pub streams: usize,
    pub pages: usize,
    pub packets: u64,
    pub corrupt_pages: usize,
    pub lost_pages: u64,
    pub dropped_bytes: u64,
}

/// Reassembly state of the logical stream being read.
#[derive(Debug)]
struct LogicalStream {
    serial: u32,
    next_sequence: Option<u32>,
    partial: Vec<u8>,
    /// Granule of the page the held bytes were last extended on.
    partial_granule: i64,
    packet_no: u64,
    fail_level: Level,
}

impl LogicalStream {
    fn new(serial: u32, fail_level: Level) -> Self {
        Self {
            serial,
            next_sequence: None,
            partial: Vec::new(),
            partial_granule: -1,
            packet_no: 0,
            fail_level,
        }
    }

    fn accept(
        &mut self,
        page: &Page,
        packets: &mut VecDeque<Packet>,
        stats: &mut DemuxStats,
    ) -> Result<(), DemuxError> {
        let sequence = page.sequence();

        if let Some(expected) = self.next_sequence {
            if sequence != expected {
                let missing = sequence.wrapping_sub(expected);
                stats.lost_pages += missing as u64;
                // Bytes held from before the gap belong to a packet whose
                // middle was lost.
                stats.dropped_bytes += self.drop_partial() as u64;
                log_or_err!(
                    self,
                    Level::Warn,
                    DemuxError::PagesLost {
                        serial: self.serial,
                        sequence,
                        missing,
                    }
                );
            }
        }
        self.next_sequence = Some(sequence.wrapping_add(1));

        let mut skipping = false;
        if page.is_continued() {
            skipping = self.partial.is_empty();
        } else if !self.partial.is_empty() {
            // A run of 255s closing the previous page ended its packet.
            packets.push_back(self.complete_partial(false, stats));
        }

        let table = &page.header.segment_table;
        // On the end-of-stream page the final segment closes the packet even at 255.
        let is_terminal =
            |i: usize| (table[i] as usize) < MAX_SEGMENT_LEN || (page.is_eos() && i + 1 == table.len());
        let last_terminal = (0..table.len()).rev().find(|&i| is_terminal(i));
        let mut orphaned = 0;
        let mut offset = 0;

        for (i, &lace) in table.iter().enumerate() {
            let len = lace as usize;
            let bytes = &page.body[offset..offset + len];
            offset += len;
            let terminal = is_terminal(i);

            if skipping {
                orphaned += len;
                skipping = !terminal;
                continue;
            }

            self.partial.extend_from_slice(bytes);
            if !terminal {
                continue;
            }

            let last_on_page = Some(i) == last_terminal;
            self.partial_granule = page.granule_position();
            let packet = self.complete_partial(page.is_eos() && last_on_page, stats);
            packets.push_back(Packet {
                last_on_page,
                ..packet
            });
        }

        if orphaned > 0 {
            stats.dropped_bytes += orphaned as u64;
            log_or_err!(
                self,
                Level::Warn,
                DemuxError::OrphanContinuation {
                    sequence,
                    dropped: orphaned,
                }
            );
        }

        if !self.partial.is_empty() {
            self.partial_granule = page.granule_position();
            if page.is_eos() {
                // End-of-stream page without segments of its own.
                packets.push_back(self.complete_partial(true, stats));
            }
        }

        Ok(())
    }

    /// Turns the held bytes into the next packet, stamped with the granule of
    /// the page they ended on.
    fn complete_partial(&mut self, eos: bool, stats: &mut DemuxStats) -> Packet {
        let packet = Packet {
            data: std::mem::take(&mut self.partial),
            granule_position: self.partial_granule,
            packet_no: self.packet_no,
            bos: self.packet_no == 0,
            eos,
            serial: self.serial,
            last_on_page: true,
        };
        trace!(
            "Packet {} out: {} bytes, granule {}",
            packet.packet_no,
            packet.data.len(),
            packet.granule_position
        );

        self.packet_no += 1;
        stats.packets += 1;
        packet
    }

    fn drop_partial(&mut self) -> usize {
        let dropped = self.partial.len();
        self.partial.clear();
        dropped
    }
}

/// Recovers the packets of one logical stream from chunked bytes.
///
/// Pages go through a [`Syncer`], then their segments are reassembled into
/// packets. Each packet carries the granule position of the page on which it
/// completed.
///
/// # Example
///
/// ```rust
/// use oggopus::process::demux::Demuxer;
/// use oggopus::process::mux::{MuxConfig, Muxer};
/// use oggopus::structs::packet::Packet;
///
/// let mut muxer = Muxer::new(42, MuxConfig::default());
/// muxer.submit(Packet::new(vec![0xAA; 700], 960, 0).with_eos(true))?;
/// let bytes: Vec<u8> = muxer.drain_pages().iter().flat_map(|p| p.to_bytes()).collect();
///
/// let mut demuxer = Demuxer::default();
/// for chunk in bytes.chunks(100) {
///     demuxer.feed(chunk)?;
/// }
///
/// let packet = demuxer.packet_out()?.unwrap();
/// assert_eq!(packet.data, vec![0xAA; 700]);
/// assert!(packet.bos && packet.eos);
/// assert_eq!(demuxer.current_serial(), Some(42));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Demuxer {
    syncer: Syncer,
    policy: StreamChangePolicy,
    pub(crate) fail_level: Level,
    stream: Option<LogicalStream>,
    packets: VecDeque<Packet>,
    rejected: Option<Page>,
    ended: bool,
    eof: bool,
    drained: bool,
    stats: DemuxStats,
}

impl Default for Demuxer {
    fn default() -> Self {
        Self::new(DemuxConfig::default())
    }
}

impl Demuxer {
    pub fn new(config: DemuxConfig) -> Self {
        Self {
            fail_level: config.sync.fail_level,
            syncer: Syncer::new(config.sync),
            policy: config.stream_change,
            stream: None,
            packets: VecDeque::new(),
            rejected: None,
            ended: false,
            eof: false,
            drained: false,
            stats: DemuxStats::default(),
        }
    }

    /// Appends raw bytes. Bytes after the end-of-stream page are discarded.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), DemuxError> {
        if self.ended {
            trace!("Ignoring {} bytes after end of stream", data.len());
            return Ok(());
        }
        self.syncer.feed(data)?;
        Ok(())
    }

    /// Sets the level at which conditions become errors.
    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
        self.syncer.fail_level = level;
        if let Some(stream) = self.stream.as_mut() {
            stream.fail_level = level;
        }
    }

    /// Marks the end of input.
    pub fn finish(&mut self) {
        self.eof = true;
        self.syncer.finish();
    }

    pub fn current_serial(&self) -> Option<u32> {
        self.stream.as_ref().map(|stream| stream.serial)
    }

    /// The end-of-stream page has been read.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Input is finished and the last packet has been handed out.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    pub fn stats(&self) -> DemuxStats {
        DemuxStats {
            corrupt_pages: self.syncer.corrupt_pages(),
            ..self.stats
        }
    }

    /// Page held back by [`StreamChangePolicy::Reject`].
    pub fn rejected_page(&self) -> Option<&Page> {
        self.rejected.as_ref()
    }

    /// Ends the open stream and continues with the held page's stream.
    ///
    /// Returns `false` if no page was held.
    pub fn adopt_stream(&mut self) -> Result<bool, DemuxError> {
        let Some(page) = self.rejected.take() else {
            return Ok(false);
        };

        self.end_stream();
        self.open_stream(page.serial());
        self.accept(&page)?;
        Ok(true)
    }

    /// Returns the next valid page after folding its segments into the
    /// packet queue.
    pub fn page_out(&mut self) -> Result<Option<Page>, DemuxError> {
        if self.ended {
            return Ok(None);
        }

        let Some(page) = self.syncer.page_out()? else {
            return Ok(None);
        };

        match self.current_serial() {
            None => self.open_stream(page.serial()),
            Some(serial) if serial != page.serial() => {
                let err = DemuxError::UnexpectedStreamChange {
                    expected: serial,
                    found: page.serial(),
                };

                match self.policy {
                    StreamChangePolicy::ImplicitEnd => {
                        warn!("{err}, ending it");
                        self.end_stream();
                        self.open_stream(page.serial());
                    }
                    StreamChangePolicy::Reject => {
                        self.rejected = Some(page);
                        return Err(err);
                    }
                }
            }
            Some(_) => {}
        }

        self.accept(&page)?;
        Ok(Some(page))
    }

    /// Returns the next complete packet, or `None` until more bytes are fed.
    pub fn packet_out(&mut self) -> Result<Option<Packet>, DemuxError> {
        loop {
            if let Some(packet) = self.packets.pop_front() {
                return Ok(Some(packet));
            }

            if self.page_out()?.is_none() {
                if self.eof {
                    self.end_stream();
                    let packet = self.packets.pop_front();
                    self.drained = self.packets.is_empty();
                    return Ok(packet);
                }
                return Ok(None);
            }
        }
    }

    fn accept(&mut self, page: &Page) -> Result<(), DemuxError> {
        self.stats.pages += 1;

        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let result = stream.accept(page, &mut self.packets, &mut self.stats);

        if page.is_eos() {
            debug!(
                "End of stream {:#010X} at page {}",
                page.serial(),
                page.sequence()
            );
            self.ended = true;
        }

        result
    }

    fn open_stream(&mut self, serial: u32) {
        debug!("Opening stream {serial:#010X}");
        self.stream = Some(LogicalStream::new(serial, self.fail_level));
        self.stats.streams += 1;
        self.ended = false;
    }

    /// Closes the open stream. Bytes still held after a page that ended on
    /// a 255 segment form its last packet.
    fn end_stream(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        if !stream.partial.is_empty() {
            let packet = stream.complete_partial(false, &mut self.stats);
            debug!(
                "Stream {:#010X} ended after a 255 segment, packet {} of {} bytes completed",
                stream.serial,
                packet.packet_no,
                packet.data.len()
            );
            self.packets.push_back(packet);
        }
    }
}

impl Iterator for Demuxer {
    type Item = Result<Packet, DemuxError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.packet_out().transpose()
    }
}
