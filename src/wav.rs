use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};

/// Size of the canonical RIFF/WAVE header written by [`WavWriter`].
pub const WAV_HEADER_LEN: u64 = 44;

const PCM_FORMAT: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Data size some tools write when streaming a file of unknown length.
const UNKNOWN_DATA_SIZE: u32 = u32::MAX;

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// RIFF/WAVE writer for 16-bit PCM audio
pub struct WavWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    data_written: u64,
    sample_rate: u32,
    channels: u16,
    header_written: bool,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(writer: W, sample_rate: u32, channels: u16) -> Self {
        Self {
            writer: BufWriter::new(writer),
            data_written: 0,
            sample_rate,
            channels,
            header_written: false,
        }
    }

    /// Write the 44-byte header with placeholder sizes
    pub fn write_header(&mut self) -> io::Result<()> {
        if self.header_written {
            return Ok(());
        }

        let block_align = self.channels * (BITS_PER_SAMPLE / 8);
        let byte_rate = self.sample_rate * block_align as u32;

        self.writer.write_all(b"RIFF")?;
        self.writer.write_all(&0u32.to_le_bytes())?; // RIFF size, patched in finish()
        self.writer.write_all(b"WAVE")?;

        self.writer.write_all(b"fmt ")?;
        self.writer.write_all(&16u32.to_le_bytes())?;
        self.writer.write_all(&PCM_FORMAT.to_le_bytes())?;
        self.writer.write_all(&self.channels.to_le_bytes())?;
        self.writer.write_all(&self.sample_rate.to_le_bytes())?;
        self.writer.write_all(&byte_rate.to_le_bytes())?;
        self.writer.write_all(&block_align.to_le_bytes())?;
        self.writer.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;

        self.writer.write_all(b"data")?;
        self.writer.write_all(&0u32.to_le_bytes())?; // data size, patched in finish()

        self.header_written = true;
        Ok(())
    }

    /// Write interleaved samples
    pub fn write_samples(&mut self, samples: &[i16]) -> io::Result<()> {
        self.write_header()?;

        for &sample in samples {
            self.writer.write_all(&sample.to_le_bytes())?;
        }
        self.data_written += samples.len() as u64 * 2;
        Ok(())
    }

    /// Patch the RIFF and data sizes, then return the underlying writer
    pub fn finish(mut self) -> io::Result<W> {
        self.write_header()?;

        let data_size = u32::try_from(self.data_written)
            .map_err(|_| invalid_data("PCM data exceeds the 4 GiB RIFF limit"))?;
        let end = WAV_HEADER_LEN + self.data_written;

        self.writer.seek(SeekFrom::Start(4))?;
        self.writer.write_all(&data_size.saturating_add(36).to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(40))?;
        self.writer.write_all(&data_size.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;

        self.writer.into_inner().map_err(|e| e.into_error())
    }

    pub fn stats(&self) -> WavStats {
        WavStats {
            data_written: self.data_written,
            channels: self.channels,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WavStats {
    pub data_written: u64,
    pub channels: u16,
}

impl WavStats {
    /// Samples per channel written so far.
    pub fn frames(&self) -> u64 {
        self.data_written / (2 * self.channels.max(1) as u64)
    }
}

/// Reader for 16-bit PCM RIFF/WAVE input
///
/// Chunks other than `fmt ` and `data` are skipped. A data size of zero or
/// `0xFFFFFFFF` is treated as "until end of input".
pub struct WavReader<R: Read> {
    reader: BufReader<R>,
    sample_rate: u32,
    channels: u16,
    remaining: Option<u64>,
}

impl<R: Read> WavReader<R> {
    pub fn new(reader: R) -> io::Result<Self> {
        let mut reader = BufReader::new(reader);

        let mut riff = [0u8; 12];
        reader.read_exact(&mut riff)?;
        if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
            return Err(invalid_data("not a RIFF/WAVE file"));
        }

        let mut format = None;
        loop {
            let mut chunk = [0u8; 8];
            reader.read_exact(&mut chunk)?;
            let id = [chunk[0], chunk[1], chunk[2], chunk[3]];
            let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);

            match &id {
                b"fmt " => {
                    if size < 16 {
                        return Err(invalid_data(format!("fmt chunk of {size} bytes")));
                    }
                    let mut fmt = vec![0u8; size as usize + (size as usize & 1)];
                    reader.read_exact(&mut fmt)?;

                    let tag = u16::from_le_bytes([fmt[0], fmt[1]]);
                    let channels = u16::from_le_bytes([fmt[2], fmt[3]]);
                    let sample_rate = u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]);
                    let bits = u16::from_le_bytes([fmt[14], fmt[15]]);

                    if tag != PCM_FORMAT || bits != BITS_PER_SAMPLE {
                        return Err(invalid_data(format!(
                            "unsupported WAV format {tag} with {bits} bits, expected 16-bit PCM"
                        )));
                    }
                    if channels == 0 {
                        return Err(invalid_data("WAV file declares zero channels"));
                    }
                    format = Some((sample_rate, channels));
                }
                b"data" => {
                    let Some((sample_rate, channels)) = format else {
                        return Err(invalid_data("data chunk before fmt chunk"));
                    };
                    let remaining = match size {
                        0 | UNKNOWN_DATA_SIZE => None,
                        n => Some(n as u64),
                    };
                    return Ok(Self {
                        reader,
                        sample_rate,
                        channels,
                        remaining,
                    });
                }
                _ => {
                    let skip = size as u64 + (size as u64 & 1);
                    io::copy(&mut (&mut reader).take(skip), &mut io::sink())?;
                }
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Declared data length in bytes, if known.
    pub fn data_len(&self) -> Option<u64> {
        self.remaining
    }

    /// Read up to `frames` interleaved frames into `buf`, replacing its
    /// contents. Returns the number of frames read, 0 at end of data.
    pub fn read_frames(&mut self, buf: &mut Vec<i16>, frames: usize) -> io::Result<usize> {
        let block_align = self.channels as usize * 2;
        let mut want = frames * block_align;
        if let Some(remaining) = self.remaining {
            want = want.min(remaining as usize);
        }

        let mut bytes = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            let n = self.reader.read(&mut bytes[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= filled as u64;
        }

        let whole = filled - filled % block_align;
        buf.clear();
        buf.extend(
            bytes[..whole]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );
        Ok(whole / block_align)
    }
}
