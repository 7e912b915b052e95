//! Boundary to the perceptual codec.
//!
//! The container never looks inside audio packets. Anything that turns a
//! 10 ms frame of interleaved `i16` samples into a packet and back can be
//! plugged in through [`AudioEncoder`] and [`AudioDecoder`].

use crate::structs::header::IdHeader;
use crate::utils::errors::CodecError;

/// Frame duration used for every audio packet.
pub const FRAME_DURATION_MS: u32 = 10;

/// Largest packet a codec may produce for one frame.
pub const MAX_PACKET_LEN: usize = 3 * 1276;

/// Codec failure codes.
pub mod code {
    pub const BAD_ARG: i32 = -1;
    pub const BUFFER_TOO_SMALL: i32 = -2;
    pub const INVALID_PACKET: i32 = -4;
}

/// Samples per channel in one frame at `sample_rate`.
pub const fn frame_samples(sample_rate: u32) -> usize {
    (sample_rate / (1000 / FRAME_DURATION_MS)) as usize
}

pub trait AudioEncoder {
    /// Encodes one frame of `frame_size` samples per channel, interleaved.
    fn encode(&mut self, pcm: &[i16], frame_size: usize) -> Result<Vec<u8>, CodecError>;

    /// Delay in samples per channel the codec adds on its own.
    fn lookahead(&self) -> usize {
        0
    }
}

pub trait AudioDecoder {
    /// Called once with the stream's identification header before any packet.
    fn configure(&mut self, _header: &IdHeader) -> Result<(), CodecError> {
        Ok(())
    }

    /// Decodes one packet into interleaved samples.
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>, CodecError>;
}

/// Lossless stand-in codec that stores samples as little-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassthroughCodec {
    channels: u8,
}

impl PassthroughCodec {
    pub fn new(channels: u8) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }
}

impl Default for PassthroughCodec {
    fn default() -> Self {
        Self::new(1)
    }
}

impl AudioEncoder for PassthroughCodec {
    fn encode(&mut self, pcm: &[i16], frame_size: usize) -> Result<Vec<u8>, CodecError> {
        let expected = frame_size * self.channels as usize;
        if pcm.len() != expected {
            return Err(CodecError::new(
                code::BAD_ARG,
                format!("frame holds {} samples, expected {expected}", pcm.len()),
            ));
        }

        if expected * 2 > MAX_PACKET_LEN {
            return Err(CodecError::new(
                code::BUFFER_TOO_SMALL,
                format!("{} bytes exceed the {MAX_PACKET_LEN}-byte packet limit", expected * 2),
            ));
        }

        Ok(pcm.iter().flat_map(|sample| sample.to_le_bytes()).collect())
    }
}

impl AudioDecoder for PassthroughCodec {
    fn configure(&mut self, header: &IdHeader) -> Result<(), CodecError> {
        if header.channels == 0 {
            return Err(CodecError::new(code::BAD_ARG, "zero channels"));
        }
        self.channels = header.channels;
        Ok(())
    }

    fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>, CodecError> {
        let block_align = 2 * self.channels as usize;
        if packet.len() % block_align != 0 {
            return Err(CodecError::new(
                code::INVALID_PACKET,
                format!(
                    "{} bytes is not a whole number of {block_align}-byte sample frames",
                    packet.len()
                ),
            ));
        }

        Ok(packet
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }
}
