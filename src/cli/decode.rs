use std::fs::File;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use indicatif::{MultiProgress, ProgressBar};
use log::Level;
use oggopus::process::codec::PassthroughCodec;
use oggopus::process::decode::StreamDecoder;
use oggopus::process::demux::DemuxConfig;
use oggopus::structs::header::IdHeader;

use crate::cli::command::{Cli, DecodeArgs};
use crate::cli::progress::{create_progress_bar, finish_progress_bar};
use crate::input::InputReader;
use crate::wav::WavWriter;

const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks the reader thread may queue ahead of the decoder.
const CHANNEL_DEPTH: usize = 16;

/// Opus always decodes at this rate; used when the header leaves the input rate unset.
const FALLBACK_SAMPLE_RATE: u32 = 48_000;

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Decoding Ogg stream: {} (strict mode: {})",
        args.input.display(),
        cli.strict
    );

    let input = InputReader::new(&args.input)?;
    if input.is_pipe() {
        log::debug!("Reading from stdin");
    }

    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, input.len(), "decoding")?),
        None => None,
    };

    let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
    let reader_thread = spawn_reader_thread(input, tx);

    let mut decoder = StreamDecoder::new(PassthroughCodec::default(), DemuxConfig::default());
    let fail_level = if cli.strict { Level::Warn } else { Level::Error };
    decoder.set_fail_level(fail_level);

    let mut sink = WavSink::new(args);
    let start = Instant::now();

    if let Err(e) = pump(&rx, &mut decoder, &mut sink, pb.as_ref()) {
        if let Some(pb) = &pb {
            pb.finish_with_message("decode failed");
        }
        return Err(e);
    }

    match reader_thread.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            if let Some(pb) = &pb {
                pb.finish_with_message("decode failed");
            }
            return Err(e);
        }
        Err(_) => {
            if let Some(pb) = &pb {
                pb.finish_with_message("reader thread panicked");
            }
            return Err(anyhow!("Reader thread panicked"));
        }
    }

    let Some(header) = decoder.id_header() else {
        bail!("No identification header found in {}", args.input.display());
    };
    let sample_rate = output_sample_rate(header);
    let channels = header.channels as u16;
    let samples = sink.finish(sample_rate, channels)?;

    finish_progress_bar(pb.as_ref(), samples, sample_rate, start);

    let stats = decoder.demux_stats();
    if stats.corrupt_pages > 0 || stats.lost_pages > 0 {
        log::warn!(
            "Stream damaged: {} corrupt page(s), {} lost page(s), {} bytes dropped",
            stats.corrupt_pages,
            stats.lost_pages,
            stats.dropped_bytes
        );
    }
    log::info!(
        "Wrote {} samples per channel to {}",
        samples,
        args.output.display()
    );

    Ok(())
}

/// Feeds received chunks to the decoder until the reader thread hangs up.
fn pump(
    rx: &mpsc::Receiver<Vec<u8>>,
    decoder: &mut StreamDecoder<PassthroughCodec>,
    sink: &mut WavSink<'_>,
    pb: Option<&ProgressBar>,
) -> Result<()> {
    while let Ok(chunk) = rx.recv() {
        decoder.feed(&chunk)?;
        sink.drain(decoder)?;

        if let Some(pb) = pb {
            pb.inc(chunk.len() as u64);
        }
    }

    decoder.finish();
    sink.drain(decoder)
}

fn spawn_reader_thread(
    mut input: InputReader,
    tx: mpsc::SyncSender<Vec<u8>>,
) -> JoinHandle<Result<()>> {
    thread::spawn(move || {
        input.process_chunks(CHUNK_SIZE, |chunk| {
            // The decoder hung up, nothing left to do.
            Ok(tx.send(chunk.to_vec()).is_ok())
        })
    })
}

fn output_sample_rate(header: &IdHeader) -> u32 {
    match header.input_sample_rate {
        0 => FALLBACK_SAMPLE_RATE,
        rate => rate,
    }
}

/// WAV output opened once the identification header is known.
struct WavSink<'a> {
    args: &'a DecodeArgs,
    writer: Option<WavWriter<File>>,
}

impl<'a> WavSink<'a> {
    fn new(args: &'a DecodeArgs) -> Self {
        Self { args, writer: None }
    }

    fn open(&mut self, sample_rate: u32, channels: u16) -> Result<&mut WavWriter<File>> {
        if self.writer.is_none() {
            let file = File::create(&self.args.output)
                .with_context(|| format!("Cannot create {}", self.args.output.display()))?;
            log::info!(
                "Writing {} ({sample_rate} Hz, {channels} channel(s))",
                self.args.output.display()
            );
            let mut writer = WavWriter::new(file, sample_rate, channels);
            writer.write_header()?;
            self.writer = Some(writer);
        }

        self.writer
            .as_mut()
            .ok_or_else(|| anyhow!("WAV output is not open"))
    }

    fn drain(&mut self, decoder: &mut StreamDecoder<PassthroughCodec>) -> Result<()> {
        while let Some(frame) = decoder.next_frame()? {
            let Some(header) = decoder.id_header() else {
                continue;
            };
            let (sample_rate, channels) = (output_sample_rate(header), header.channels as u16);
            self.open(sample_rate, channels)?.write_samples(&frame.samples)?;
        }
        Ok(())
    }

    /// Closes the output and returns the samples per channel written.
    fn finish(mut self, sample_rate: u32, channels: u16) -> Result<u64> {
        let writer = self.open(sample_rate, channels)?;
        let frames = writer.stats().frames();

        if let Some(writer) = self.writer.take() {
            writer.finish()?.sync_all()?;
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn temp_input(name: &str, len: usize) -> Result<std::path::PathBuf> {
        let path = std::env::temp_dir().join(format!("oggopusd-{name}-{}", std::process::id()));
        std::fs::write(&path, vec![0x4Fu8; len])?;
        Ok(path)
    }

    #[test]
    fn reader_waits_for_slow_decoder() -> Result<()> {
        let path = temp_input("bounded", 10 * CHUNK_SIZE)?;
        let (tx, rx) = mpsc::sync_channel(1);
        let reader = spawn_reader_thread(InputReader::new(&path)?, tx);

        // Ten chunks cannot all fit in a channel of depth one.
        thread::sleep(Duration::from_millis(100));
        assert!(!reader.is_finished());

        let received = rx.iter().map(|chunk| chunk.len()).sum::<usize>();
        let joined = reader.join().map_err(|_| anyhow!("Reader thread panicked"))?;
        std::fs::remove_file(&path)?;

        joined?;
        assert_eq!(received, 10 * CHUNK_SIZE);
        Ok(())
    }

    #[test]
    fn reader_stops_when_decoder_hangs_up() -> Result<()> {
        let path = temp_input("hangup", 4 * CHUNK_SIZE)?;
        let (tx, rx) = mpsc::sync_channel(1);
        let reader = spawn_reader_thread(InputReader::new(&path)?, tx);
        drop(rx);

        let joined = reader.join().map_err(|_| anyhow!("Reader thread panicked"))?;
        std::fs::remove_file(&path)?;
        joined
    }
}
