use std::io::Write;

use anyhow::{Result, ensure};
use log::{debug, info};

use crate::process::codec::{AudioEncoder, MAX_PACKET_LEN, code, frame_samples};
use crate::process::mux::{DEFAULT_PAGE_TARGET, MuxConfig, Muxer};
use crate::process::random_serial;
use crate::structs::header::{CommentHeader, HeaderPacket, IdHeader};
use crate::structs::packet::Packet;
use crate::utils::errors::CodecError;

/// Number of header packets at the start of every stream.
pub const HEADER_PACKETS: u64 = 2;

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub sample_rate: u32,
    pub channels: u8,
    /// Decoder delay in samples, written to the identification header.
    pub pre_skip: u16,
    /// Q7.8 dB.
    pub output_gain: i16,
    /// Stream serial. A random one is picked when `None`.
    pub serial: Option<u32>,
    pub page_target: usize,
    pub vendor: String,
    /// `(tag, value)` pairs for the comment header.
    pub comments: Vec<(String, String)>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            pre_skip: 0,
            output_gain: 0,
            serial: None,
            page_target: DEFAULT_PAGE_TARGET,
            vendor: concat!("oggopus ", env!("CARGO_PKG_VERSION")).to_string(),
            comments: Vec::new(),
        }
    }
}

impl EncoderConfig {
    pub fn id_header(&self) -> IdHeader {
        IdHeader {
            output_gain: self.output_gain,
            ..IdHeader::new(self.channels, self.sample_rate, self.pre_skip)
        }
    }

    pub fn comment_header(&self) -> CommentHeader {
        self.comments
            .iter()
            .fold(CommentHeader::new(self.vendor.as_str()), |header, (tag, value)| {
                header.with_comment(tag, value)
            })
    }
}

/// Totals reported once a stream is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeStats {
    pub serial: u32,
    pub packets: u64,
    pub pages: u64,
    pub bytes: u64,
    /// Real input samples per channel, padding excluded.
    pub samples: u64,
    pub final_granule: i64,
}

/// Encodes interleaved PCM into a complete Ogg stream.
///
/// Samples are cut into 10 ms frames. The final frame is zero padded, and
/// only its real samples count toward the granule position, so a decoder can
/// trim the padding again. If the codec's own lookahead is shorter than the
/// configured pre-skip, the stream starts with enough silence to make up the
/// difference.
///
/// # Example
///
/// ```rust
/// use oggopus::process::codec::PassthroughCodec;
/// use oggopus::process::encode::{EncoderConfig, StreamEncoder};
///
/// let config = EncoderConfig { serial: Some(1), ..Default::default() };
/// let mut encoder = StreamEncoder::new(PassthroughCodec::new(1), Vec::new(), &config)?;
/// encoder.write_samples(&[0i16; 1000])?;
/// let (bytes, stats) = encoder.finish()?;
///
/// assert_eq!(stats.packets, 2 + 3);
/// assert_eq!(stats.final_granule, 1000);
/// assert_eq!(&bytes[..4], b"OggS");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct StreamEncoder<E: AudioEncoder, W: Write> {
    codec: E,
    writer: W,
    muxer: Muxer,
    channels: usize,
    frame_size: usize,
    pre_skip: u64,
    pending: Vec<i16>,
    primer_left: usize,
    stats: EncodeStats,
}

impl<E: AudioEncoder, W: Write> StreamEncoder<E, W> {
    /// Writes both header pages and prepares for audio.
    pub fn new(codec: E, writer: W, config: &EncoderConfig) -> Result<Self> {
        ensure!(
            config.sample_rate > 0 && frame_samples(config.sample_rate) * 100 == config.sample_rate as usize,
            "Sample rate {} does not divide into 10 ms frames",
            config.sample_rate
        );

        let id_header = config.id_header();
        id_header.validate()?;

        let serial = config.serial.unwrap_or_else(random_serial);
        let muxer = Muxer::new(
            serial,
            MuxConfig {
                page_target: config.page_target,
                header_packets: HEADER_PACKETS,
            },
        );

        // Silence covering whatever part of the pre-skip the codec does not
        // produce itself.
        let primer = (config.pre_skip as usize).saturating_sub(codec.lookahead());
        let channels = config.channels as usize;

        let mut encoder = Self {
            codec,
            writer,
            muxer,
            channels,
            frame_size: frame_samples(config.sample_rate),
            pre_skip: config.pre_skip as u64,
            pending: vec![0; primer * channels],
            primer_left: primer,
            stats: EncodeStats {
                serial,
                ..Default::default()
            },
        };

        info!("Encoding stream {serial:#010X}: {id_header}");
        encoder.write_header(id_header.to_packet_bytes())?;
        encoder.write_header(config.comment_header().to_packet_bytes())?;

        Ok(encoder)
    }

    pub fn stats(&self) -> EncodeStats {
        self.stats
    }

    /// Queues interleaved samples; complete frames are encoded right away.
    ///
    /// One full frame is always held back so that the last frame can be
    /// marked as end of stream by [`StreamEncoder::finish`].
    pub fn write_samples(&mut self, pcm: &[i16]) -> Result<()> {
        ensure!(
            pcm.len() % self.channels == 0,
            "{} samples do not interleave into {} channels",
            pcm.len(),
            self.channels
        );

        self.pending.extend_from_slice(pcm);

        let frame_len = self.frame_size * self.channels;
        let mut offset = 0;
        while self.pending.len() - offset > frame_len {
            let frame = self.pending[offset..offset + frame_len].to_vec();
            let real = self.take_real(self.frame_size);
            self.encode_frame(&frame, real, false)?;
            offset += frame_len;
        }
        self.pending.drain(..offset);

        Ok(())
    }

    /// Encodes what is left as the end-of-stream packet and flushes all pages.
    pub fn finish(mut self) -> Result<(W, EncodeStats)> {
        let frame_len = self.frame_size * self.channels;
        let real = self.take_real(self.pending.len() / self.channels);

        let mut frame = std::mem::take(&mut self.pending);
        frame.resize(frame_len, 0);
        self.encode_frame(&frame, real, true)?;

        self.write_pages()?;
        self.writer.flush()?;

        debug!(
            "Stream {:#010X} finished: {} packets on {} pages, {} bytes",
            self.stats.serial, self.stats.packets, self.stats.pages, self.stats.bytes
        );
        Ok((self.writer, self.stats))
    }

    /// Real input samples among the next `samples`, primer excluded.
    fn take_real(&mut self, samples: usize) -> usize {
        let primer = self.primer_left.min(samples);
        self.primer_left -= primer;
        samples - primer
    }

    fn write_header(&mut self, data: Vec<u8>) -> Result<()> {
        let packet = Packet::new(data, 0, self.muxer.next_packet_no());
        self.muxer.submit(packet)?;
        self.muxer.flush();
        self.stats.packets += 1;
        self.write_pages()
    }

    fn encode_frame(&mut self, frame: &[i16], real_samples: usize, eos: bool) -> Result<()> {
        let data = self.codec.encode(frame, self.frame_size)?;
        ensure!(
            data.len() <= MAX_PACKET_LEN,
            CodecError::new(
                code::BUFFER_TOO_SMALL,
                format!("packet of {} bytes exceeds {MAX_PACKET_LEN}", data.len())
            )
        );

        self.stats.samples += real_samples as u64;
        let granule_position = (self.pre_skip + self.stats.samples) as i64;
        self.stats.final_granule = granule_position;

        let packet = Packet::new(data, granule_position, self.muxer.next_packet_no()).with_eos(eos);
        self.muxer.submit(packet)?;
        self.stats.packets += 1;

        self.write_pages()
    }

    fn write_pages(&mut self) -> Result<()> {
        for page in self.muxer.drain_pages() {
            let bytes = page.to_bytes();
            self.writer.write_all(&bytes)?;
            self.stats.pages += 1;
            self.stats.bytes += bytes.len() as u64;
        }
        Ok(())
    }
}

/// Encodes a whole buffer of interleaved samples into `writer`.
pub fn encode_stream<E: AudioEncoder, W: Write>(
    codec: E,
    pcm: &[i16],
    config: &EncoderConfig,
    writer: W,
) -> Result<(W, EncodeStats)> {
    let mut encoder = StreamEncoder::new(codec, writer, config)?;
    encoder.write_samples(pcm)?;
    encoder.finish()
}
