use anyhow::Result;
use oggopus::process::codec::PassthroughCodec;
use oggopus::process::decode::{StreamDecoder, decode_stream};
use oggopus::process::demux::{DemuxConfig, Demuxer};
use oggopus::process::encode::{EncoderConfig, encode_stream};
use oggopus::process::mux::{MuxConfig, Muxer};
use oggopus::process::sync::{SyncConfig, Syncer};
use oggopus::structs::packet::Packet;
use oggopus::structs::page::{MAX_PAGE_LEN, Page};
use oggopus::utils::errors::{DemuxError, SyncError};

/// Deterministic packet sizes covering short, exact-multiple and multi-page packets.
fn packet_sizes() -> Vec<usize> {
    let mut sizes = vec![0, 1, 254, 255, 256, 510, 765, 3000, 12_000];
    let mut x = 17u32;
    for _ in 0..120 {
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        sizes.push((x >> 16) as usize % 1800);
    }
    sizes
}

fn packets(sizes: &[usize]) -> Vec<Packet> {
    let last = sizes.len() - 1;
    let mut granule = 0;
    sizes
        .iter()
        .enumerate()
        .map(|(i, &len)| {
            granule += 480;
            let data = (0..len).map(|b| (b * 31 + i * 7) as u8).collect();
            Packet::new(data, granule, i as u64).with_eos(i == last)
        })
        .collect()
}

fn mux(packets: &[Packet], page_target: usize) -> Result<Vec<Page>> {
    let mut muxer = Muxer::new(
        0x0DD_BA11,
        MuxConfig {
            page_target,
            header_packets: 0,
        },
    );
    let mut pages = Vec::new();
    for packet in packets {
        muxer.submit(packet.clone())?;
        pages.extend(muxer.drain_pages());
    }
    muxer.flush();
    pages.extend(muxer.drain_pages());
    Ok(pages)
}

fn to_bytes(pages: &[Page]) -> Vec<u8> {
    pages.iter().flat_map(Page::to_bytes).collect()
}

fn demux_chunked(bytes: &[u8], chunk: usize) -> Result<Vec<Packet>> {
    let mut demuxer = Demuxer::default();
    let mut out = Vec::new();
    for piece in bytes.chunks(chunk) {
        demuxer.feed(piece)?;
        while let Some(packet) = demuxer.packet_out()? {
            out.push(packet);
        }
    }
    demuxer.finish();
    while let Some(packet) = demuxer.packet_out()? {
        out.push(packet);
    }
    Ok(out)
}

#[test]
fn round_trip_preserves_payloads_and_granules() -> Result<()> {
    let sent = packets(&packet_sizes());
    let pages = mux(&sent, 1000)?;
    let received = demux_chunked(&to_bytes(&pages), 4096)?;

    assert_eq!(received.len(), sent.len());
    for (a, b) in sent.iter().zip(&received) {
        assert_eq!(a.data, b.data);
        assert_eq!(a.packet_no, b.packet_no);
        assert_eq!(a.eos, b.eos);
        if b.last_on_page {
            assert_eq!(a.granule_position, b.granule_position);
        }
    }
    assert!(received[0].bos);

    // Each page is stamped with the granule of the last packet it completes.
    let mut completed = 0;
    for page in &pages {
        completed += page.packets_completed();
        if page.packets_completed() > 0 {
            assert_eq!(page.granule_position(), sent[completed - 1].granule_position);
        }
    }
    Ok(())
}

#[test]
fn page_sequence_has_no_gaps_and_single_eos() -> Result<()> {
    let pages = mux(&packets(&packet_sizes()), 700)?;

    for (i, page) in pages.iter().enumerate() {
        assert_eq!(page.sequence(), i as u32);
        assert!(page.len() <= MAX_PAGE_LEN);
    }
    assert_eq!(pages.iter().filter(|page| page.is_eos()).count(), 1);
    assert!(pages.last().is_some_and(Page::is_eos));
    Ok(())
}

#[test]
fn ten_byte_chunks_match_single_feed() -> Result<()> {
    let bytes = to_bytes(&mux(&packets(&packet_sizes()[..60]), 2048)?);

    let whole = {
        let mut demuxer = Demuxer::default();
        demuxer.feed(&bytes)?;
        demuxer.by_ref().collect::<Result<Vec<_>, _>>()?
    };
    let chunked = demux_chunked(&bytes, 10)?;

    assert_eq!(whole, chunked);
    assert_eq!(whole.len(), 60);
    Ok(())
}

#[test]
fn flipped_bit_fails_exactly_one_page() -> Result<()> {
    // One packet per page, so every page maps to one packet.
    let sent = packets(&[300, 400, 500, 600, 700]);
    let mut muxer = Muxer::new(5, MuxConfig::default());
    let mut pages = Vec::new();
    for packet in &sent {
        muxer.submit(packet.clone())?;
        muxer.flush();
        pages.extend(muxer.drain_pages());
    }
    assert_eq!(pages.len(), sent.len());

    let mut bytes = to_bytes(&pages);
    let offset = pages[..2].iter().map(Page::len).sum::<usize>() + 100;
    bytes[offset] ^= 0x04;

    let mut syncer = Syncer::default();
    syncer.feed(&bytes)?;
    let recovered = syncer.by_ref().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(
        recovered.iter().map(Page::sequence).collect::<Vec<_>>(),
        [0, 1, 3, 4]
    );
    assert_eq!(syncer.corrupt_pages(), 1);

    let received = demux_chunked(&bytes, 333)?;
    assert_eq!(
        received.iter().map(|p| p.data.len()).collect::<Vec<_>>(),
        [300, 400, 600, 700]
    );
    Ok(())
}

#[test]
fn trailing_bytes_after_eos_are_ignored() -> Result<()> {
    let mut bytes = to_bytes(&mux(&packets(&[10, 20, 30]), 4096)?);
    bytes.extend_from_slice(&[0x4F, 0x67, 0x67, 0x53, 0xFF, 0xFF]);
    bytes.extend(std::iter::repeat_n(0xA5, 5000));

    let mut demuxer = Demuxer::default();
    let mut received = Vec::new();
    for chunk in bytes.chunks(700) {
        demuxer.feed(chunk)?;
        while let Some(packet) = demuxer.packet_out()? {
            received.push(packet);
        }
    }

    assert_eq!(received.len(), 3);
    assert!(demuxer.is_ended());
    assert_eq!(demuxer.stats().corrupt_pages, 0);
    Ok(())
}

#[test]
fn three_packets_against_page_targets() -> Result<()> {
    let sent = packets(&[100, 300, 10]);
    let sent = sent
        .into_iter()
        .map(|packet| packet.with_eos(false))
        .collect::<Vec<_>>();
    let tables = |pages: &[Page]| {
        pages
            .iter()
            .map(|page| page.header.segment_table.clone())
            .collect::<Vec<_>>()
    };

    let at_512 = mux(&sent, 512)?;
    assert_eq!(tables(&at_512), [vec![100, 255, 45, 10]]);

    let at_400 = mux(&sent, 400)?;
    assert_eq!(tables(&at_400), [vec![100, 255, 45], vec![10]]);
    assert!(!at_400[1].is_continued());
    Ok(())
}

#[test]
fn overflow_is_fatal_for_the_feed() -> Result<()> {
    // A single 3000-byte packet page cannot fit under a 2000-byte ceiling.
    let bytes = to_bytes(&mux(&packets(&[3000]), 4096)?);
    let mut demuxer = Demuxer::new(DemuxConfig {
        sync: SyncConfig {
            buffer_ceiling: 2000,
            ..Default::default()
        },
        ..Default::default()
    });

    let err = demuxer.feed(&bytes).unwrap_err();
    assert!(matches!(
        err,
        DemuxError::Sync(SyncError::SyncBufferOverflow { buffered: 0, ceiling: 2000, .. })
    ));
    assert_eq!(demuxer.packet_out()?, None);
    Ok(())
}

#[test]
fn long_stereo_stream_fed_at_once_does_not_overflow() -> Result<()> {
    let pcm = (0..3 * 48_000 * 2)
        .map(|i| ((i as f64 * 0.01).sin() * 8_000.0) as i16)
        .collect::<Vec<_>>();
    let config = EncoderConfig {
        channels: 2,
        serial: Some(3),
        ..Default::default()
    };
    let (bytes, _) = encode_stream(PassthroughCodec::new(2), &pcm, &config, Vec::new())?;
    assert!(bytes.len() > 4 * MAX_PAGE_LEN);

    let mut decoder = StreamDecoder::new(PassthroughCodec::default(), DemuxConfig::default());
    decoder.feed(&bytes)?;
    decoder.finish();
    let mut decoded = Vec::new();
    while let Some(frame) = decoder.next_frame()? {
        decoded.extend(frame.samples);
    }

    assert_eq!(decoded, pcm);
    Ok(())
}

#[test]
fn encoded_stream_decodes_through_small_chunks() -> Result<()> {
    let pcm = (0..2 * 48_000)
        .map(|i| ((i as f64 * 0.05).sin() * 12_000.0) as i16)
        .collect::<Vec<_>>();
    let config = EncoderConfig {
        channels: 2,
        pre_skip: 312,
        page_target: 1500,
        serial: Some(99),
        ..Default::default()
    };
    let (bytes, stats) = encode_stream(PassthroughCodec::new(2), &pcm, &config, Vec::new())?;
    assert_eq!(stats.final_granule, 312 + 48_000);

    let mut decoder = StreamDecoder::new(PassthroughCodec::default(), DemuxConfig::default());
    let mut decoded = Vec::new();
    for chunk in bytes.chunks(10) {
        decoder.feed(chunk)?;
        while let Some(frame) = decoder.next_frame()? {
            decoded.extend(frame.samples);
        }
    }

    assert_eq!(decoded, pcm);
    assert_eq!(decoder.samples_out(), 48_000);

    let whole = decode_stream(PassthroughCodec::default(), &bytes, DemuxConfig::default())?;
    assert_eq!(whole.samples, pcm);
    assert_eq!(whole.id_header.pre_skip, 312);
    Ok(())
}
