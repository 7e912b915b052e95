use std::fs::File;

use anyhow::{Context, Result, ensure};

use crate::cli::command::GenerateArgs;
use crate::signal::SineGenerator;
use crate::timestamp::{samples_to_duration, time_str};
use crate::wav::WavWriter;

const BLOCK_FRAMES: usize = 4800;

pub fn cmd_generate(args: &GenerateArgs) -> Result<()> {
    ensure!(args.sample_rate > 0, "Sample rate must be positive");
    ensure!(
        args.duration.is_finite() && args.duration >= 0.0,
        "Invalid duration {}",
        args.duration
    );
    ensure!(
        args.frequency > 0.0 && args.frequency < args.sample_rate as f64 / 2.0,
        "Frequency {} Hz is outside (0, {}) Hz",
        args.frequency,
        args.sample_rate / 2
    );

    let total = (args.duration * args.sample_rate as f64).round() as u64;
    log::info!(
        "Generating {} Hz tone: {} at {} Hz, {} channel(s)",
        args.frequency,
        time_str(samples_to_duration(total, args.sample_rate)),
        args.sample_rate,
        args.channels
    );

    let file = File::create(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;
    let mut writer = WavWriter::new(file, args.sample_rate, args.channels);
    let mut tone = SineGenerator::new(args.frequency, args.sample_rate, args.channels);

    let mut remaining = total;
    let mut block = Vec::new();
    while remaining > 0 {
        let frames = remaining.min(BLOCK_FRAMES as u64) as usize;
        block.clear();
        tone.fill(&mut block, frames);
        writer.write_samples(&block)?;
        remaining -= frames as u64;
    }

    let frames = writer.stats().frames();
    writer.finish()?.sync_all()?;
    log::info!("Wrote {frames} samples per channel to {}", args.output.display());

    Ok(())
}
