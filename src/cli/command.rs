use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Tools for muxing, demuxing and inspecting Ogg Opus streams",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat corrupt or lost pages as fatal errors.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Encode a 16-bit PCM WAV file into an Ogg Opus stream.
    Encode(EncodeArgs),

    /// Decode an Ogg Opus stream into a 16-bit PCM WAV file.
    Decode(DecodeArgs),

    /// Print stream information
    Info(InfoArgs),

    /// Write a sine test signal as a WAV file.
    Generate(GenerateArgs),
}

#[derive(Debug, Args)]
pub struct EncodeArgs {
    /// Input WAV file (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output Ogg file.
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    /// Page body size at which a page is emitted.
    #[arg(long, value_name = "BYTES", default_value_t = oggopus::process::mux::DEFAULT_PAGE_TARGET)]
    pub page_target: usize,

    /// Stream serial number (random if omitted).
    #[arg(long, value_name = "SERIAL")]
    pub serial: Option<u32>,

    /// Samples the decoder should discard at the start.
    #[arg(long, value_name = "SAMPLES", default_value_t = 0)]
    pub pre_skip: u16,

    /// Comment to store in the stream, may be repeated.
    #[arg(long = "comment", value_name = "TAG=VALUE", value_parser = parse_comment)]
    pub comments: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Input Ogg stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output WAV file.
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input Ogg stream.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Print the report as YAML.
    #[arg(long)]
    pub yaml: bool,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Output WAV file.
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    /// Tone frequency in Hz.
    #[arg(long, value_name = "HZ", default_value_t = 1000.0)]
    pub frequency: f64,

    /// Signal length in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 10.0)]
    pub duration: f64,

    /// Sample rate in Hz.
    #[arg(long, value_name = "HZ", default_value_t = 48_000)]
    pub sample_rate: u32,

    /// Number of identical channels.
    #[arg(long, value_name = "COUNT", default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=2))]
    pub channels: u16,
}

fn parse_comment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((tag, value)) if !tag.is_empty() => Ok((tag.to_string(), value.to_string())),
        _ => Err(format!("expected TAG=VALUE, got \"{s}\"")),
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}
