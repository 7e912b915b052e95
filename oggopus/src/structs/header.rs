//! Opus header packets.
//!
//! Every stream starts with an identification header (`OpusHead`) followed
//! by a comment header (`OpusTags`). Each sits alone on its own page.

use std::fmt::{Display, Formatter};

use anyhow::{Result, bail, ensure};
use bitstream_io::{ByteRead, ByteReader, LittleEndian};
use log::trace;
use oggopusd_macros::{ToBytes, header_magic};

use crate::byteorder::WriteBytesLe;
use crate::utils::errors::HeaderError;

/// A header packet introduced by an 8-byte magic signature.
pub trait HeaderPacket {
    const MAGIC: [u8; 8];

    /// Packet body following the magic.
    fn payload(&self) -> Vec<u8>;

    fn to_packet_bytes(&self) -> Vec<u8> {
        let mut bytes = Self::MAGIC.to_vec();
        bytes.extend(self.payload());
        bytes
    }

    fn matches(data: &[u8]) -> bool {
        data.starts_with(&Self::MAGIC)
    }
}

/// Minimum size of an identification header.
pub const ID_HEADER_LEN: usize = 19;

/// Channel mapping table, present for mapping families other than 0.
#[derive(Debug, Clone, PartialEq, Eq, ToBytes)]
pub struct ChannelMapping {
    pub stream_count: u8,
    pub coupled_count: u8,
    pub mapping: Vec<u8>,
}

/// Identification header.
#[derive(Debug, Clone, PartialEq, Eq, ToBytes)]
#[header_magic(b"OpusHead")]
pub struct IdHeader {
    pub version: u8,
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    /// Q7.8 fixed-point gain in dB.
    pub output_gain: i16,
    pub mapping_family: u8,
    pub mapping: Option<ChannelMapping>,
}

impl IdHeader {
    /// Header for mono or stereo audio using mapping family 0.
    pub fn new(channels: u8, input_sample_rate: u32, pre_skip: u16) -> Self {
        Self {
            version: 1,
            channels,
            pre_skip,
            input_sample_rate,
            output_gain: 0,
            mapping_family: 0,
            mapping: None,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        ensure_magic::<Self>(data)?;
        if data.len() < ID_HEADER_LEN {
            bail!(HeaderError::TooShort {
                actual: data.len(),
                required: ID_HEADER_LEN,
            });
        }

        let mut reader = ByteReader::endian(&data[8..], LittleEndian);
        let version = reader.read::<u8>()?;
        // Only the major version nibble breaks compatibility.
        if version >> 4 != 0 {
            bail!(HeaderError::UnsupportedVersion(version));
        }

        let channels = reader.read::<u8>()?;
        let pre_skip = reader.read::<u16>()?;
        let input_sample_rate = reader.read::<u32>()?;
        let output_gain = reader.read::<i16>()?;
        let mapping_family = reader.read::<u8>()?;

        let mapping = if mapping_family != 0 {
            let required = ID_HEADER_LEN + 2 + channels as usize;
            if data.len() < required {
                bail!(HeaderError::TooShort {
                    actual: data.len(),
                    required,
                });
            }
            let stream_count = reader.read::<u8>()?;
            let coupled_count = reader.read::<u8>()?;
            let mut mapping = vec![0u8; channels as usize];
            reader.read_bytes(&mut mapping)?;
            Some(ChannelMapping {
                stream_count,
                coupled_count,
                mapping,
            })
        } else {
            None
        };

        let header = Self {
            version,
            channels,
            pre_skip,
            input_sample_rate,
            output_gain,
            mapping_family,
            mapping,
        };
        header.validate()?;

        trace!("Parsed identification header: {header}");
        Ok(header)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.channels != 0, HeaderError::NoChannels);

        match (&self.mapping, self.mapping_family) {
            (None, 0) => {
                ensure!(
                    self.channels <= 2,
                    HeaderError::InvalidFamilyZeroChannels(self.channels)
                );
            }
            (Some(table), family) if family != 0 => {
                let streams = table.stream_count;
                let coupled = table.coupled_count;
                let decoded = streams as usize + coupled as usize;
                let valid = streams != 0
                    && coupled <= streams
                    && decoded <= 255
                    && table.mapping.len() == self.channels as usize
                    && table
                        .mapping
                        .iter()
                        .all(|&index| index == 255 || (index as usize) < decoded);
                ensure!(
                    valid,
                    HeaderError::InvalidMappingTable { streams, coupled }
                );
            }
            _ => bail!(HeaderError::InvalidMappingTable {
                streams: 0,
                coupled: 0,
            }),
        }

        Ok(())
    }

    pub fn output_gain_db(&self) -> f64 {
        self.output_gain as f64 / 256.0
    }

    /// Linear factor to apply to decoded samples.
    pub fn output_gain_linear(&self) -> f64 {
        10f64.powf(self.output_gain_db() / 20.0)
    }
}

impl Display for IdHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "version {}, {} ch @ {} Hz, pre-skip {}, gain {:.2} dB, mapping family {}",
            self.version,
            self.channels,
            self.input_sample_rate,
            self.pre_skip,
            self.output_gain_db(),
            self.mapping_family
        )
    }
}

/// User comments, written as a count followed by length-prefixed strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserComments(pub Vec<String>);

impl WriteBytesLe for UserComments {
    fn write_le(&self, dst: &mut Vec<u8>) {
        (self.0.len() as u32).write_le(dst);
        self.0.write_le(dst);
    }
}

/// Comment header: vendor string plus `TAG=value` comments.
#[derive(Debug, Clone, PartialEq, Eq, ToBytes)]
#[header_magic(b"OpusTags")]
pub struct CommentHeader {
    pub vendor: String,
    pub comments: UserComments,
}

impl CommentHeader {
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            comments: UserComments::default(),
        }
    }

    pub fn with_comment(mut self, tag: &str, value: &str) -> Self {
        self.push(tag, value);
        self
    }

    pub fn push(&mut self, tag: &str, value: &str) {
        self.comments.0.push(format!("{tag}={value}"));
    }

    /// Values of all comments whose tag matches `tag`, ignoring ASCII case.
    pub fn get<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.comments.0.iter().filter_map(move |comment| {
            let (key, value) = comment.split_once('=')?;
            key.eq_ignore_ascii_case(tag).then_some(value)
        })
    }

    pub fn comments(&self) -> &[String] {
        &self.comments.0
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        ensure_magic::<Self>(data)?;

        let mut reader = ByteReader::endian(&data[8..], LittleEndian);
        let vendor = read_string(&mut reader, data.len())?;

        let count = reader.read::<u32>()? as usize;
        // Each comment needs at least its 4-byte length.
        ensure!(
            count <= data.len() / 4,
            HeaderError::TooShort {
                actual: data.len(),
                required: count * 4,
            }
        );

        let mut comments = Vec::with_capacity(count);
        for _ in 0..count {
            comments.push(read_string(&mut reader, data.len())?);
        }

        Ok(Self {
            vendor,
            comments: UserComments(comments),
        })
    }
}

fn ensure_magic<H: HeaderPacket>(data: &[u8]) -> Result<()> {
    if data.len() < 8 {
        bail!(HeaderError::TooShort {
            actual: data.len(),
            required: 8,
        });
    }
    if !H::matches(data) {
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&data[..8]);
        bail!(HeaderError::InvalidMagic(magic));
    }
    Ok(())
}

fn read_string<R: std::io::Read>(
    reader: &mut ByteReader<R, LittleEndian>,
    packet_len: usize,
) -> Result<String> {
    let len = reader.read::<u32>()? as usize;
    ensure!(
        len <= packet_len,
        HeaderError::TooShort {
            actual: packet_len,
            required: len,
        }
    );

    let mut bytes = vec![0u8; len];
    reader.read_bytes(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| HeaderError::InvalidUtf8.into())
}
