#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Multiplexer and demultiplexer for Opus audio in the Ogg container.
//!
//! ### Page Organization
//!
//! **External Structure**: Pages starting with the `OggS` capture pattern, each
//! carrying a checksum, a granule position and a segment table.
//! **Internal Structure**: Packets laced into segments of up to 255 bytes that
//! may continue from one page into the next.
//!
//! ### Stream Layout
//!
//! - Page 0: identification header (`OpusHead`), beginning of stream
//! - Page 1: comment header (`OpusTags`)
//! - Following pages: audio packets of 10 ms each, the last page marked end of stream
//!
//! ## Quick Start
//!
//! Steps for a round trip:
//!
//! 1. Encode PCM into pages using [`process::encode::StreamEncoder`]
//! 2. Recover pages and packets from bytes using [`process::demux::Demuxer`]
//! 3. Decode packets back to PCM using [`process::decode::StreamDecoder`]
//!
//! ```rust
//! use oggopus::process::codec::PassthroughCodec;
//! use oggopus::process::decode::StreamDecoder;
//! use oggopus::process::encode::{EncoderConfig, StreamEncoder};
//!
//! let pcm: Vec<i16> = (0..4800).map(|i| (i % 100) as i16).collect();
//!
//! // Encode into an in-memory stream
//! let config = EncoderConfig::default();
//! let mut encoder = StreamEncoder::new(PassthroughCodec::new(1), Vec::new(), &config)?;
//! encoder.write_samples(&pcm)?;
//! let (bytes, stats) = encoder.finish()?;
//! assert_eq!(stats.final_granule, 4800);
//!
//! // Feed it back in small chunks
//! let mut decoder = StreamDecoder::new(PassthroughCodec::default(), Default::default());
//! let mut decoded = Vec::new();
//! for chunk in bytes.chunks(512) {
//!     decoder.feed(chunk)?;
//!     while let Some(frame) = decoder.next_frame()? {
//!         decoded.extend(frame.samples);
//!     }
//! }
//!
//! assert_eq!(decoded, pcm);
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Processing pipeline for Ogg streams.
///
/// 1. **Multiplexing** ([`process::mux`]): Packets to pages.
///
/// 2. **Synchronisation** ([`process::sync`]): Bytes to validated pages.
///
/// 3. **Demultiplexing** ([`process::demux`]): Pages to packets.
///
/// 4. **Codec loop** ([`process::encode`], [`process::decode`]): PCM to
///    packets and back through a [`process::codec`] implementation.
pub mod process;

/// Data structures of the container and the Opus headers.
///
/// - **Pages** ([`structs::page`]): Header, flags and builder
/// - **Segments** ([`structs::segment`]): Lacing and page planning
/// - **Packets** ([`structs::packet`]): Codec payloads with positions
/// - **Headers** ([`structs::header`]): `OpusHead` and `OpusTags`
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **CRC Validation** ([`utils::crc`]): Page checksums
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;

/// Little-endian serialisation used by headers and pages.
pub mod byteorder;
