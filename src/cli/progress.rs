use std::time::Instant;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::timestamp::{samples_to_duration, time_str};

const BAR_TEMPLATE: &str =
    "{bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {bytes}\n{msg} | elapsed: {elapsed_precise}";

/// Byte-based progress bar, or a spinner when the input size is unknown.
pub fn create_progress_bar(
    multi: &MultiProgress,
    total_bytes: Option<u64>,
    message: &'static str,
) -> Result<ProgressBar> {
    let pb = match total_bytes {
        Some(total) => {
            let pb = multi.add(ProgressBar::new(total));
            pb.set_style(ProgressStyle::with_template(BAR_TEMPLATE)?);
            pb
        }
        None => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template(SPINNER_TEMPLATE)?);
            pb
        }
    };

    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(message);
    Ok(pb)
}

/// Replaces the bar's message with the processing speed relative to real time.
pub fn finish_progress_bar(pb: Option<&ProgressBar>, samples: u64, sample_rate: u32, start: Instant) {
    let Some(pb) = pb else {
        return;
    };

    let audio = samples_to_duration(samples, sample_rate);
    let elapsed = start.elapsed().as_secs_f64();
    let speed = if elapsed > 0.0 {
        audio.as_secs_f64() / elapsed
    } else {
        0.0
    };

    pb.finish_with_message(format!(
        "speed: {speed:.1}x | timestamp: {}",
        time_str(audio)
    ));
}
