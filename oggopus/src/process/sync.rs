use std::collections::VecDeque;

use log::{Level, debug, trace};

use crate::log_or_err;
use crate::structs::page::{CAPTURE_PATTERN, MAX_PAGE_LEN, Page, PageHeader};
use crate::utils::errors::SyncError;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Most bytes not yet framed into pages that the sync buffer may hold.
    /// A feed that would exceed it fails.
    pub buffer_ceiling: usize,
    /// Conditions logged at this level or more severe are returned as errors.
    pub fail_level: Level,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            buffer_ceiling: 4 * MAX_PAGE_LEN,
            fail_level: Level::Error,
        }
    }
}

/// Where the syncer is in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Scanning for a capture pattern.
    Seeking,
    /// A header was parsed at the front of the buffer; waiting for `page_len` bytes.
    InPage { page_len: usize },
}

/// Recovers pages from arbitrarily chunked bytes.
///
/// Bytes that do not form a valid page are skipped one at a time until the
/// next capture pattern yields a page with a matching checksum. Complete
/// pages are framed as soon as they are fed, so only the bytes of an
/// unfinished page count against the buffer ceiling.
///
/// # Example
///
/// ```rust
/// use oggopus::process::sync::Syncer;
/// use oggopus::structs::page::PageBuilder;
///
/// let page = PageBuilder::new(7, 0).bos(true).build(vec![3], vec![1, 2, 3]);
/// let bytes = page.to_bytes();
///
/// let mut syncer = Syncer::default();
/// syncer.feed(b"junk")?;
/// syncer.feed(&bytes[..10])?;
/// assert_eq!(syncer.page_out()?, None);
///
/// syncer.feed(&bytes[10..])?;
/// assert_eq!(syncer.page_out()?, Some(page));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Syncer {
    buffer: VecDeque<u8>,
    ready: VecDeque<Result<Page, SyncError>>,
    state: SyncState,
    ceiling: usize,
    pub(crate) fail_level: Level,
    eof: bool,
    corrupt_pages: usize,
    skipped_bytes: u64,
    pages_out: usize,
}

impl Default for Syncer {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

impl Syncer {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            buffer: VecDeque::with_capacity(MAX_PAGE_LEN),
            ready: VecDeque::new(),
            state: SyncState::Seeking,
            ceiling: config.buffer_ceiling,
            fail_level: config.fail_level,
            eof: false,
            corrupt_pages: 0,
            skipped_bytes: 0,
            pages_out: 0,
        }
    }

    /// Appends bytes to the sync buffer and frames every page they complete.
    ///
    /// Input is taken in slices that fit the room left under the ceiling,
    /// framing pages after each slice. Fails without keeping any of `data`
    /// if unframed bytes would still grow past the ceiling, which happens
    /// when a single page is larger than the ceiling allows.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), SyncError> {
        if self.buffer.len() + data.len() <= self.ceiling {
            self.buffer.extend(data);
            self.frame_pages();
            return Ok(());
        }

        let checkpoint = self.checkpoint();
        let mut rest = data;
        while !rest.is_empty() {
            let room = self.ceiling.saturating_sub(self.buffer.len());
            if room == 0 {
                let buffered = checkpoint.buffer.len();
                self.restore(checkpoint);
                return Err(SyncError::SyncBufferOverflow {
                    buffered,
                    incoming: data.len(),
                    ceiling: self.ceiling,
                });
            }

            let (slice, tail) = rest.split_at(room.min(rest.len()));
            self.buffer.extend(slice);
            self.frame_pages();
            rest = tail;
        }

        Ok(())
    }

    /// Marks the end of input. An incomplete page at the front of the buffer
    /// is then skipped instead of waited for.
    pub fn finish(&mut self) {
        self.eof = true;
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Bytes held that are not yet framed into pages.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Framed pages waiting for [`Syncer::page_out`].
    pub fn pages_ready(&self) -> usize {
        self.ready.iter().filter(|page| page.is_ok()).count()
    }

    /// Candidate pages rejected for a checksum mismatch.
    pub fn corrupt_pages(&self) -> usize {
        self.corrupt_pages
    }

    /// Bytes discarded while scanning for pages.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    pub fn pages_out(&self) -> usize {
        self.pages_out
    }

    /// Returns the next valid page, or `None` until more bytes are fed.
    ///
    /// Corrupt candidates are skipped. They are only returned as errors when
    /// the fail level is raised to include warnings.
    pub fn page_out(&mut self) -> Result<Option<Page>, SyncError> {
        let next = match self.ready.pop_front() {
            Some(framed) => framed.map(Some),
            None => self.next_page(),
        };
        if let Ok(Some(_)) = next {
            self.pages_out += 1;
        }
        next
    }

    fn frame_pages(&mut self) {
        loop {
            match self.next_page() {
                Ok(Some(page)) => self.ready.push_back(Ok(page)),
                Ok(None) => break,
                Err(err) => self.ready.push_back(Err(err)),
            }
        }
    }

    fn next_page(&mut self) -> Result<Option<Page>, SyncError> {
        loop {
            let Some(offset) = self.find_capture() else {
                // A capture pattern may straddle the end of the buffer.
                let keep = if self.eof {
                    0
                } else {
                    self.buffer.len().min(CAPTURE_PATTERN.len() - 1)
                };
                self.skip(self.buffer.len() - keep);
                self.state = SyncState::Seeking;
                return Ok(None);
            };
            self.skip(offset);

            match Page::from_bytes(self.buffer.make_contiguous()) {
                Ok(Some(page)) => {
                    self.buffer.drain(..page.len());
                    self.state = SyncState::Seeking;
                    trace!(
                        "Synced page {} of stream {:#010X}, {} bytes",
                        page.sequence(),
                        page.serial(),
                        page.len()
                    );
                    return Ok(Some(page));
                }
                Ok(None) if self.eof => {
                    debug!(
                        "Skipping incomplete page at end of input ({} bytes left)",
                        self.buffer.len()
                    );
                    self.skip(1);
                    self.state = SyncState::Seeking;
                }
                Ok(None) => {
                    if let Some(page_len) = self.pending_page_len() {
                        self.state = SyncState::InPage { page_len };
                    }
                    return Ok(None);
                }
                Err(err) => {
                    self.skip(1);
                    self.state = SyncState::Seeking;
                    match err {
                        SyncError::CorruptPage { .. } => {
                            self.corrupt_pages += 1;
                            log_or_err!(self, Level::Warn, err);
                        }
                        _ => log_or_err!(self, Level::Debug, err),
                    }
                }
            }
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            buffer: self.buffer.clone(),
            state: self.state,
            ready: self.ready.len(),
            corrupt_pages: self.corrupt_pages,
            skipped_bytes: self.skipped_bytes,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.buffer = checkpoint.buffer;
        self.state = checkpoint.state;
        self.ready.truncate(checkpoint.ready);
        self.corrupt_pages = checkpoint.corrupt_pages;
        self.skipped_bytes = checkpoint.skipped_bytes;
    }

    fn find_capture(&mut self) -> Option<usize> {
        self.buffer
            .make_contiguous()
            .windows(CAPTURE_PATTERN.len())
            .position(|window| window == CAPTURE_PATTERN)
    }

    fn pending_page_len(&mut self) -> Option<usize> {
        PageHeader::read(self.buffer.make_contiguous())
            .ok()
            .flatten()
            .map(|header| header.page_len())
    }

    fn skip(&mut self, count: usize) {
        if count > 0 {
            self.buffer.drain(..count);
            self.skipped_bytes += count as u64;
        }
    }
}

/// Syncer state saved before a feed that may overflow.
#[derive(Debug)]
struct Checkpoint {
    buffer: VecDeque<u8>,
    state: SyncState,
    ready: usize,
    corrupt_pages: usize,
    skipped_bytes: u64,
}

impl Iterator for Syncer {
    type Item = Result<Page, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.page_out().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::page::PageBuilder;

    fn page(sequence: u32, body_len: usize) -> Page {
        let body = (0..body_len).map(|i| (i * 7 + sequence as usize) as u8).collect::<Vec<_>>();
        let table = crate::structs::segment::lacing_values(body_len).collect();
        PageBuilder::new(0xABCD, sequence)
            .granule_position(sequence as i64 * 960)
            .bos(sequence == 0)
            .build(table, body)
    }

    fn stream(pages: &[Page]) -> Vec<u8> {
        pages.iter().flat_map(Page::to_bytes).collect()
    }

    #[test]
    fn pages_survive_byte_by_byte_feeding() -> anyhow::Result<()> {
        let pages = [page(0, 19), page(1, 600), page(2, 0)];
        let mut syncer = Syncer::default();
        let mut out = Vec::new();

        for byte in stream(&pages) {
            syncer.feed(&[byte])?;
            while let Some(page) = syncer.page_out()? {
                out.push(page);
            }
        }

        assert_eq!(out, pages);
        assert_eq!(syncer.skipped_bytes(), 0);
        Ok(())
    }

    #[test]
    fn leading_garbage_is_skipped() -> anyhow::Result<()> {
        let mut syncer = Syncer::default();
        syncer.feed(b"OggOggSnot a page at all")?;
        syncer.feed(&page(0, 40).to_bytes())?;

        assert_eq!(syncer.page_out()?, Some(page(0, 40)));
        assert_eq!(syncer.page_out()?, None);
        assert!(syncer.skipped_bytes() >= 24);
        Ok(())
    }

    #[test]
    fn waits_for_whole_page() -> anyhow::Result<()> {
        let bytes = page(3, 1000).to_bytes();
        let mut syncer = Syncer::default();
        syncer.feed(&bytes[..500])?;

        assert_eq!(syncer.page_out()?, None);
        assert_eq!(
            syncer.state(),
            SyncState::InPage {
                page_len: bytes.len()
            }
        );

        syncer.feed(&bytes[500..])?;
        assert!(syncer.page_out()?.is_some());
        assert_eq!(syncer.state(), SyncState::Seeking);
        Ok(())
    }

    #[test]
    fn corrupt_page_is_skipped() -> anyhow::Result<()> {
        let pages = [page(0, 100), page(1, 100), page(2, 100)];
        let mut bytes = stream(&pages);
        let second = pages[0].len();
        bytes[second + 50] ^= 0x10;

        let mut syncer = Syncer::default();
        syncer.feed(&bytes)?;
        let out = syncer.by_ref().collect::<Result<Vec<_>, _>>()?;

        assert_eq!(out, [pages[0].clone(), pages[2].clone()]);
        assert_eq!(syncer.corrupt_pages(), 1);
        Ok(())
    }

    #[test]
    fn strict_mode_reports_corrupt_page() -> anyhow::Result<()> {
        let pages = [page(0, 100), page(1, 100)];
        let mut bytes = stream(&pages);
        bytes[40] ^= 0x01;

        let mut syncer = Syncer::new(SyncConfig {
            fail_level: Level::Warn,
            ..Default::default()
        });
        syncer.feed(&bytes)?;

        let err = syncer.page_out().unwrap_err();
        assert!(matches!(err, SyncError::CorruptPage { sequence: 0, .. }));
        // Scanning resumes after the reported page.
        assert_eq!(syncer.page_out()?, Some(pages[1].clone()));
        Ok(())
    }

    #[test]
    fn overflow_leaves_buffer_unchanged() -> anyhow::Result<()> {
        let bytes = page(0, 2000).to_bytes();
        let mut syncer = Syncer::new(SyncConfig {
            buffer_ceiling: 1000,
            ..Default::default()
        });
        syncer.feed(&bytes[..990])?;

        let err = syncer.feed(&bytes[990..1001]).unwrap_err();
        assert_eq!(
            err,
            SyncError::SyncBufferOverflow {
                buffered: 990,
                incoming: 11,
                ceiling: 1000,
            }
        );
        assert_eq!(syncer.buffered(), 990);
        syncer.feed(&bytes[990..1000])?;
        Ok(())
    }

    #[test]
    fn framed_pages_do_not_count_against_ceiling() -> anyhow::Result<()> {
        let pages = (0..12).map(|n| page(n, 20_000)).collect::<Vec<_>>();
        let bytes = stream(&pages);
        assert!(bytes.len() > 3 * MAX_PAGE_LEN);

        let mut syncer = Syncer::new(SyncConfig {
            buffer_ceiling: MAX_PAGE_LEN,
            ..Default::default()
        });
        syncer.feed(&bytes)?;

        assert_eq!(syncer.buffered(), 0);
        assert_eq!(syncer.pages_ready(), 12);
        let out = syncer.by_ref().collect::<Result<Vec<_>, _>>()?;
        assert_eq!(out, pages);
        assert_eq!(syncer.pages_out(), 12);
        Ok(())
    }

    #[test]
    fn garbage_is_scanned_away_while_feeding() -> anyhow::Result<()> {
        let mut syncer = Syncer::new(SyncConfig {
            buffer_ceiling: 100,
            ..Default::default()
        });
        syncer.feed(&[0u8; 10_000])?;
        syncer.feed(&page(0, 50).to_bytes())?;

        assert!(syncer.buffered() < CAPTURE_PATTERN.len());
        assert_eq!(syncer.page_out()?, Some(page(0, 50)));
        assert_eq!(syncer.skipped_bytes(), 10_000);
        Ok(())
    }

    #[test]
    fn finish_skips_truncated_page() -> anyhow::Result<()> {
        let truncated = page(0, 1000).to_bytes();
        let intact = page(1, 50);

        let mut syncer = Syncer::default();
        syncer.feed(&truncated[..100])?;
        syncer.feed(&intact.to_bytes())?;

        assert_eq!(syncer.page_out()?, None);
        syncer.finish();
        assert_eq!(syncer.page_out()?, Some(intact));
        assert_eq!(syncer.page_out()?, None);
        assert_eq!(syncer.buffered(), 0);
        Ok(())
    }

    #[test]
    fn unsupported_version_is_resynced() -> anyhow::Result<()> {
        let mut bytes = page(0, 10).to_bytes();
        bytes[4] = 1;
        bytes.extend(page(1, 10).to_bytes());

        let mut syncer = Syncer::default();
        syncer.feed(&bytes)?;
        assert_eq!(syncer.page_out()?, Some(page(1, 10)));
        assert_eq!(syncer.corrupt_pages(), 0);
        Ok(())
    }
}
