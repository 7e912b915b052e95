use std::time::Duration;

/// Formats a duration as `HH:MM:SS.mmm`. Hours widen past 99.
pub fn time_str(duration: Duration) -> String {
    let ms = duration.as_millis();
    let hours = ms / 3_600_000;
    let minutes = ms / 60_000 % 60;
    let seconds = ms / 1000 % 60;
    let milliseconds = ms % 1000;

    format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}")
}

/// Duration of `samples` per-channel samples at `sample_rate`.
pub fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let rate = sample_rate as u64;
    Duration::from_secs(samples / rate)
        + Duration::from_nanos((samples % rate) * 1_000_000_000 / rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(time_str(Duration::ZERO), "00:00:00.000");
        assert_eq!(time_str(Duration::from_millis(3_723_456)), "01:02:03.456");
        assert_eq!(time_str(Duration::from_secs(360_000)), "100:00:00.000");
    }

    #[test]
    fn sample_counts_convert_exactly() {
        assert_eq!(samples_to_duration(48_000, 48_000), Duration::from_secs(1));
        assert_eq!(samples_to_duration(480, 48_000), Duration::from_millis(10));
        assert_eq!(samples_to_duration(5, 0), Duration::ZERO);
    }
}
