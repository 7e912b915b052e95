use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use indicatif::MultiProgress;
use oggopus::process::codec::PassthroughCodec;
use oggopus::process::encode::{EncoderConfig, StreamEncoder};

use crate::cli::command::{Cli, EncodeArgs};
use crate::cli::progress::{create_progress_bar, finish_progress_bar};
use crate::input::InputReader;
use crate::wav::WavReader;

/// Frames read from the WAV file per iteration.
const READ_FRAMES: usize = 4800;

pub fn cmd_encode(args: &EncodeArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Encoding WAV file: {}", args.input.display());

    let input = InputReader::new(&args.input)?;
    let total_bytes = input.len();
    let mut wav = WavReader::new(input).context("Invalid WAV input")?;

    let channels = wav.channels();
    if !(1..=2).contains(&channels) {
        bail!("Only mono and stereo input is supported, got {channels} channels");
    }
    log::info!("Input: {} Hz, {channels} channel(s)", wav.sample_rate());
    match wav.data_len() {
        Some(len) => log::debug!("WAV data chunk: {len} bytes"),
        None => log::debug!("WAV data chunk of unknown length, reading to end of input"),
    }

    let config = EncoderConfig {
        sample_rate: wav.sample_rate(),
        channels: channels as u8,
        pre_skip: args.pre_skip,
        serial: args.serial,
        page_target: args.page_target,
        comments: args.comments.clone(),
        ..Default::default()
    };

    let output = File::create(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;
    let mut encoder = StreamEncoder::new(
        PassthroughCodec::new(config.channels),
        BufWriter::new(output),
        &config,
    )?;

    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, total_bytes, "encoding")?),
        None => None,
    };

    let start = Instant::now();
    let block_align = channels as u64 * 2;
    let mut buf = Vec::with_capacity(READ_FRAMES * channels as usize);

    loop {
        let frames = wav.read_frames(&mut buf, READ_FRAMES)?;
        if frames == 0 {
            break;
        }
        encoder.write_samples(&buf)?;

        if let Some(pb) = &pb {
            pb.inc(frames as u64 * block_align);
        }
    }

    let (mut writer, stats) = encoder.finish()?;
    writer.flush()?;

    finish_progress_bar(pb.as_ref(), stats.samples, config.sample_rate, start);
    log::info!(
        "Wrote {} ({} pages, {} packets, {} bytes, serial {:#010X}, final granule {})",
        args.output.display(),
        stats.pages,
        stats.packets,
        stats.bytes,
        stats.serial,
        stats.final_granule
    );

    Ok(())
}
