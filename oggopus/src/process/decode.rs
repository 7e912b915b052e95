use anyhow::{Result, bail};
use log::{debug, info, warn};

use crate::process::codec::AudioDecoder;
use crate::process::demux::{DemuxConfig, DemuxStats, Demuxer};
use crate::structs::header::{CommentHeader, IdHeader};
use crate::structs::packet::Packet;

/// Decoded samples of one audio packet after pre-skip and end trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Interleaved samples; may be empty when the whole packet was trimmed.
    pub samples: Vec<i16>,
    pub granule_position: i64,
    pub packet_no: u64,
    pub eos: bool,
}

/// Decodes an Ogg stream fed in arbitrary chunks.
///
/// The first two packets are parsed as identification and comment headers.
/// Every following packet goes through the codec. The first `pre_skip`
/// samples are dropped, and the end-of-stream packet is trimmed so the total
/// output matches its page's granule position.
///
/// # Example
///
/// ```rust
/// use oggopus::process::codec::PassthroughCodec;
/// use oggopus::process::decode::StreamDecoder;
/// use oggopus::process::encode::{EncoderConfig, encode_stream};
///
/// let pcm: Vec<i16> = (0..1234).map(|i| i as i16).collect();
/// let config = EncoderConfig { pre_skip: 100, ..Default::default() };
/// let (bytes, _) = encode_stream(PassthroughCodec::new(1), &pcm, &config, Vec::new())?;
///
/// let mut decoder = StreamDecoder::new(PassthroughCodec::default(), Default::default());
/// decoder.feed(&bytes)?;
/// decoder.finish();
///
/// let mut out = Vec::new();
/// while let Some(frame) = decoder.next_frame()? {
///     out.extend(frame.samples);
/// }
/// assert_eq!(out, pcm);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct StreamDecoder<D: AudioDecoder> {
    codec: D,
    demuxer: Demuxer,
    id_header: Option<IdHeader>,
    comment_header: Option<CommentHeader>,
    skip_remaining: u64,
    samples_out: u64,
    ended: bool,
}

impl<D: AudioDecoder> StreamDecoder<D> {
    pub fn new(codec: D, config: DemuxConfig) -> Self {
        Self {
            codec,
            demuxer: Demuxer::new(config),
            id_header: None,
            comment_header: None,
            skip_remaining: 0,
            samples_out: 0,
            ended: false,
        }
    }

    /// Sets the level at which demux conditions become errors.
    ///
    /// - `log::Level::Error`: only fatal conditions fail (default)
    /// - `log::Level::Warn`: corrupt or lost pages fail too (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.demuxer.set_fail_level(level);
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        self.demuxer.feed(data)?;
        Ok(())
    }

    /// Marks the end of input.
    pub fn finish(&mut self) {
        self.demuxer.finish();
    }

    pub fn id_header(&self) -> Option<&IdHeader> {
        self.id_header.as_ref()
    }

    pub fn comment_header(&self) -> Option<&CommentHeader> {
        self.comment_header.as_ref()
    }

    /// Samples per channel produced so far.
    pub fn samples_out(&self) -> u64 {
        self.samples_out
    }

    pub fn demux_stats(&self) -> DemuxStats {
        self.demuxer.stats()
    }

    /// Decodes the next audio packet, or returns `None` until more bytes are
    /// fed. Header packets are consumed on the way.
    pub fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        loop {
            if self.ended {
                return Ok(None);
            }

            let Some(packet) = self.demuxer.packet_out()? else {
                return Ok(None);
            };

            match packet.packet_no {
                0 => self.read_id_header(&packet)?,
                1 => self.read_comment_header(&packet)?,
                _ => {
                    let packet_no = packet.packet_no;
                    match self.decode_packet(packet) {
                        Ok(frame) => return Ok(Some(frame)),
                        // Input stopped without an end-of-stream page, so the
                        // last packet may have been cut short.
                        Err(e) if self.demuxer.is_drained() && !self.demuxer.is_ended() => {
                            warn!("Discarding final packet {packet_no} of unterminated stream: {e}");
                            self.ended = true;
                            return Ok(None);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    fn read_id_header(&mut self, packet: &Packet) -> Result<()> {
        let header = IdHeader::parse(&packet.data)?;
        self.codec.configure(&header)?;

        info!("Decoding stream {:#010X}: {header}", packet.serial);
        self.skip_remaining = header.pre_skip as u64;
        self.samples_out = 0;
        self.ended = false;
        self.id_header = Some(header);
        Ok(())
    }

    fn read_comment_header(&mut self, packet: &Packet) -> Result<()> {
        let header = CommentHeader::parse(&packet.data)?;
        debug!(
            "Vendor \"{}\", {} comment(s)",
            header.vendor,
            header.comments().len()
        );
        self.comment_header = Some(header);
        Ok(())
    }

    fn decode_packet(&mut self, packet: Packet) -> Result<DecodedFrame> {
        let Some(header) = &self.id_header else {
            bail!("Audio packet {} before the identification header", packet.packet_no);
        };
        let channels = header.channels as usize;
        let pre_skip = header.pre_skip as u64;

        let mut samples = self.codec.decode(&packet.data)?;
        if samples.len() % channels != 0 {
            bail!(
                "Codec returned {} samples for {channels} channels",
                samples.len()
            );
        }

        let decoded = (samples.len() / channels) as u64;
        let skip = self.skip_remaining.min(decoded);
        self.skip_remaining -= skip;
        let mut keep = decoded - skip;

        if packet.eos {
            let total = (packet.granule_position.max(0) as u64).saturating_sub(pre_skip);
            let allowed = total.saturating_sub(self.samples_out);
            if allowed > keep {
                warn!(
                    "Final granule {} asks for {} more samples than decoded",
                    packet.granule_position,
                    allowed - keep
                );
            }
            keep = keep.min(allowed);
            self.ended = true;
        }

        let start = skip as usize * channels;
        let end = start + keep as usize * channels;
        samples.truncate(end);
        samples.drain(..start);
        self.samples_out += keep;

        Ok(DecodedFrame {
            samples,
            granule_position: packet.granule_position,
            packet_no: packet.packet_no,
            eos: packet.eos,
        })
    }
}

/// A fully decoded stream.
#[derive(Debug, Clone)]
pub struct DecodedStream {
    pub id_header: IdHeader,
    pub comment_header: Option<CommentHeader>,
    /// Interleaved samples.
    pub samples: Vec<i16>,
    pub stats: DemuxStats,
}

/// Decodes a complete in-memory stream.
pub fn decode_stream<D: AudioDecoder>(codec: D, data: &[u8], config: DemuxConfig) -> Result<DecodedStream> {
    let mut decoder = StreamDecoder::new(codec, config);
    let mut samples = Vec::new();

    for chunk in data.chunks(64 * 1024) {
        decoder.feed(chunk)?;
        while let Some(frame) = decoder.next_frame()? {
            samples.extend(frame.samples);
        }
    }
    decoder.finish();
    while let Some(frame) = decoder.next_frame()? {
        samples.extend(frame.samples);
    }

    let Some(id_header) = decoder.id_header else {
        bail!("No identification header found");
    };

    Ok(DecodedStream {
        id_header,
        comment_header: decoder.comment_header,
        samples,
        stats: decoder.demuxer.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::codec::PassthroughCodec;
    use crate::process::encode::{EncoderConfig, encode_stream};
    use crate::utils::errors::{CodecError, HeaderError};

    fn encode(pcm: &[i16], config: &EncoderConfig) -> Vec<u8> {
        let codec = PassthroughCodec::new(config.channels);
        encode_stream(codec, pcm, config, Vec::new()).unwrap().0
    }

    fn tone(len: usize) -> Vec<i16> {
        (0..len).map(|i| ((i * 131) % 2000) as i16 - 1000).collect()
    }

    #[test]
    fn round_trip_without_pre_skip() -> Result<()> {
        let pcm = tone(4321);
        let bytes = encode(&pcm, &EncoderConfig::default());

        let decoded = decode_stream(PassthroughCodec::default(), &bytes, DemuxConfig::default())?;
        assert_eq!(decoded.samples, pcm);
        assert_eq!(decoded.id_header.channels, 1);
        assert_eq!(decoded.stats.corrupt_pages, 0);
        Ok(())
    }

    #[test]
    fn stereo_round_trip_with_comments() -> Result<()> {
        let pcm = tone(2 * 3000);
        let config = EncoderConfig {
            channels: 2,
            comments: vec![("ARTIST".into(), "Nobody".into())],
            ..Default::default()
        };
        let bytes = encode(&pcm, &config);

        let decoded = decode_stream(PassthroughCodec::default(), &bytes, DemuxConfig::default())?;
        assert_eq!(decoded.samples, pcm);
        let comments = decoded.comment_header.unwrap();
        assert_eq!(comments.get("artist").collect::<Vec<_>>(), ["Nobody"]);
        Ok(())
    }

    #[test]
    fn pre_skip_is_dropped_and_end_trimmed() -> Result<()> {
        let pcm = tone(2000);
        let config = EncoderConfig {
            pre_skip: 700,
            ..Default::default()
        };
        let bytes = encode(&pcm, &config);

        let decoded = decode_stream(PassthroughCodec::default(), &bytes, DemuxConfig::default())?;
        // Final granule 2700 minus 700 pre-skip leaves exactly the input.
        assert_eq!(decoded.samples.len(), 2000);
        assert_eq!(decoded.samples, pcm);
        Ok(())
    }

    #[test]
    fn truncated_stream_keeps_decoded_audio() -> Result<()> {
        let pcm = tone(4800);
        let mut bytes = encode(&pcm, &EncoderConfig::default());
        bytes.truncate(bytes.len() - 100);

        let decoded = decode_stream(PassthroughCodec::default(), &bytes, DemuxConfig::default())?;
        assert!(!decoded.samples.is_empty());
        assert!(decoded.samples.len() < pcm.len());
        assert_eq!(decoded.samples, pcm[..decoded.samples.len()]);
        Ok(())
    }

    #[test]
    fn cut_final_packet_of_unterminated_stream_is_discarded() -> Result<()> {
        let pcm = tone(4800);
        let config = EncoderConfig {
            page_target: 1000,
            ..Default::default()
        };
        let bytes = encode(&pcm, &config);

        let mut syncer = crate::process::sync::Syncer::default();
        syncer.feed(&bytes)?;
        let pages = syncer.collect::<Result<Vec<_>, _>>()?;
        // Page 2 holds one 960-byte packet plus the first 255 bytes of the next.
        assert!(pages[2].ends_mid_packet());

        let cut: Vec<u8> = pages[..3].iter().flat_map(|p| p.to_bytes()).collect();
        let decoded = decode_stream(PassthroughCodec::default(), &cut, DemuxConfig::default())?;
        assert_eq!(decoded.samples, pcm[..480]);
        assert_eq!(decoded.stats.packets, 4);
        Ok(())
    }

    #[test]
    fn frames_report_packet_positions() -> Result<()> {
        let bytes = encode(&tone(1000), &EncoderConfig::default());
        let mut decoder = StreamDecoder::new(PassthroughCodec::default(), DemuxConfig::default());
        decoder.feed(&bytes)?;

        let mut frames = Vec::new();
        while let Some(frame) = decoder.next_frame()? {
            frames.push(frame);
        }

        assert_eq!(
            frames.iter().map(|f| (f.packet_no, f.samples.len())).collect::<Vec<_>>(),
            [(2, 480), (3, 480), (4, 40)]
        );
        assert!(frames[2].eos);
        assert_eq!(decoder.samples_out(), 1000);
        assert_eq!(decoder.id_header().map(|h| h.pre_skip), Some(0));
        Ok(())
    }

    #[test]
    fn garbage_is_not_a_stream() {
        let err = decode_stream(PassthroughCodec::default(), &[0u8; 1000], DemuxConfig::default()).unwrap_err();
        assert!(err.to_string().contains("identification header"));
    }

    #[test]
    fn wrong_first_packet_is_rejected() {
        let mut muxer = crate::process::mux::Muxer::new(1, Default::default());
        muxer
            .submit(Packet::new(b"NotOpus!xxxxxxxxxxx".to_vec(), 0, 0).with_eos(true))
            .unwrap();
        let bytes: Vec<u8> = muxer.drain_pages().iter().flat_map(|p| p.to_bytes()).collect();

        let err = decode_stream(PassthroughCodec::default(), &bytes, DemuxConfig::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HeaderError>(),
            Some(HeaderError::InvalidMagic(_))
        ));
    }

    #[test]
    fn codec_failure_is_surfaced() {
        struct Broken;
        impl AudioDecoder for Broken {
            fn decode(&mut self, _: &[u8]) -> Result<Vec<i16>, CodecError> {
                Err(CodecError::new(-4, "corrupted stream"))
            }
        }

        let bytes = encode(&tone(100), &EncoderConfig::default());
        let err = decode_stream(Broken, &bytes, DemuxConfig::default()).unwrap_err();
        assert_eq!(err.downcast_ref::<CodecError>().map(|e| e.code), Some(-4));
    }
}
