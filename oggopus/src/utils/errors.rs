#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error(
        "Corrupt page (serial {serial:#010X}, sequence {sequence}): CRC calculated {calculated:#010X}, read {read:#010X}"
    )]
    CorruptPage {
        serial: u32,
        sequence: u32,
        calculated: u32,
        read: u32,
    },

    #[error("Unsupported stream structure version {0} at a capture pattern")]
    UnsupportedVersion(u8),

    #[error("Sync buffer overflow: {buffered} bytes buffered + {incoming} incoming > ceiling {ceiling}")]
    SyncBufferOverflow {
        buffered: usize,
        incoming: usize,
        ceiling: usize,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("Granule position regressed: previous {previous}, submitted {submitted}")]
    GranuleRegression { previous: i64, submitted: i64 },

    #[error("Packet submitted after end of stream")]
    SubmitAfterEndOfStream,

    #[error("Packet number out of order: expected {expected}, got {got}")]
    PacketNumber { expected: u64, got: u64 },

    #[error("Header packet {0} must be flushed onto its own page before the next packet")]
    HeaderNotFlushed(u64),

    #[error("Only the first packet of a stream may carry the beginning-of-stream flag (packet {0})")]
    MisplacedBeginOfStream(u64),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DemuxError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Unexpected stream change: serial {found:#010X} while {expected:#010X} is still open")]
    UnexpectedStreamChange { expected: u32, found: u32 },

    #[error("Lost {missing} page(s) of stream {serial:#010X} before sequence {sequence}")]
    PagesLost {
        serial: u32,
        sequence: u32,
        missing: u32,
    },

    #[error("Continued page {sequence} without a packet in progress; dropped {dropped} leading bytes")]
    OrphanContinuation { sequence: u32, dropped: usize },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Invalid header magic, read {0:?}")]
    InvalidMagic([u8; 8]),

    #[error("Header packet too short: {actual} bytes, need {required}")]
    TooShort { actual: usize, required: usize },

    #[error("Unsupported identification header version {0}")]
    UnsupportedVersion(u8),

    #[error("Channel count must be non-zero")]
    NoChannels,

    #[error("Mapping family 0 allows 1 or 2 channels, got {0}")]
    InvalidFamilyZeroChannels(u8),

    #[error("Channel mapping table invalid: {streams} streams, {coupled} coupled")]
    InvalidMappingTable { streams: u8, coupled: u8 },

    #[error("Comment string is not valid UTF-8")]
    InvalidUtf8,
}

/// Failure reported by a codec implementation, surfaced without reinterpretation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Codec failure ({code}): {message}")]
pub struct CodecError {
    pub code: i32,
    pub message: String,
}

impl CodecError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
