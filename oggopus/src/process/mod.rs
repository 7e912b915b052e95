/// Packet to page multiplexing.
///
/// Provides the [`Muxer`](mux::Muxer) state machine that laces packets into
/// pages under a size target and stamps sequence numbers, flags and granule
/// positions.
pub mod mux;

/// Page recovery from a byte stream.
///
/// Provides the [`Syncer`](sync::Syncer) for finding capture patterns,
/// validating checksums and resynchronising after corrupt data.
pub mod sync;

/// Page to packet demultiplexing.
///
/// Provides the [`Demuxer`](demux::Demuxer) for reassembling packets across
/// pages and handling lost pages and stream changes.
pub mod demux;

/// Codec boundary and the built-in pass-through codec.
pub mod codec;

/// PCM to Ogg encoding loop.
///
/// Provides the [`StreamEncoder`](encode::StreamEncoder) that frames samples,
/// writes header pages and keeps granule positions.
pub mod encode;

/// Ogg to PCM decoding loop.
///
/// Provides the [`StreamDecoder`](decode::StreamDecoder) that parses header
/// packets, drops pre-skip samples and trims the end of stream.
pub mod decode;

/// Picks a random stream serial number.
pub fn random_serial() -> u32 {
    uuid::Uuid::new_v4().as_u128() as u32
}

#[test]
fn random_serials_differ() {
    let serials = (0..8).map(|_| random_serial()).collect::<std::collections::HashSet<_>>();
    assert!(serials.len() > 1);
}
