use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;
use oggopus::process::demux::{DemuxStats, Demuxer};
use oggopus::structs::header::{CommentHeader, IdHeader};
use oggopus::structs::packet::Packet;
use serde::Serialize;

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use crate::timestamp::{samples_to_duration, time_str};

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing Ogg stream: {}", args.input.display());

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Analyzing pages...");
            Some(pb)
        }
        None => None,
    };

    let context = analyze_stream(&args.input, cli, pb.as_ref())?;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let Some(report) = context.into_report() else {
        println!("No Ogg Opus identification header found in the file.");
        println!("This doesn't appear to be a valid Ogg Opus stream.");
        return Ok(());
    };

    if args.yaml {
        print!("{}", serde_yaml_ng::to_string(&report)?);
    } else {
        display_report(&report);
    }

    Ok(())
}

fn analyze_stream(input_path: &Path, cli: &Cli, pb: Option<&ProgressBar>) -> Result<AnalysisContext> {
    let mut input_reader = InputReader::new(input_path)?;
    let mut demuxer = Demuxer::default();

    let fail_level = if cli.strict { Level::Warn } else { Level::Error };
    demuxer.set_fail_level(fail_level);

    let mut context = AnalysisContext::default();

    input_reader.process_chunks(64 * 1024, |chunk| {
        context.total_bytes += chunk.len() as u64;
        demuxer.feed(chunk)?;

        while let Some(packet) = demuxer.packet_out()? {
            context.process_packet(&packet)?;
        }

        if let Some(pb) = pb {
            pb.set_message(format!("Analyzing pages...       {}", demuxer.stats().pages));
        }

        // Nothing after the end-of-stream page is read.
        Ok(!demuxer.is_ended())
    })?;

    demuxer.finish();
    while let Some(packet) = demuxer.packet_out()? {
        context.process_packet(&packet)?;
    }

    context.serial = demuxer.current_serial();
    context.ended = demuxer.is_ended();
    context.demux = demuxer.stats();
    Ok(context)
}

#[derive(Default)]
struct AnalysisContext {
    id_header: Option<IdHeader>,
    comment_header: Option<CommentHeader>,
    serial: Option<u32>,
    ended: bool,
    audio_packets: u64,
    audio_bytes: u64,
    min_packet: Option<usize>,
    max_packet: usize,
    final_granule: i64,
    total_bytes: u64,
    demux: DemuxStats,
}

impl AnalysisContext {
    fn process_packet(&mut self, packet: &Packet) -> Result<()> {
        match packet.packet_no {
            0 => {
                let header = IdHeader::parse(&packet.data).context("Invalid identification header")?;
                log::debug!("Identification header: {header}");
                self.id_header = Some(header);
            }
            1 => {
                let header = CommentHeader::parse(&packet.data).context("Invalid comment header")?;
                self.comment_header = Some(header);
            }
            _ => {
                self.audio_packets += 1;
                self.audio_bytes += packet.data.len() as u64;
                self.min_packet = Some(self.min_packet.map_or(packet.data.len(), |m| m.min(packet.data.len())));
                self.max_packet = self.max_packet.max(packet.data.len());
            }
        }

        if packet.last_on_page && packet.granule_position >= 0 {
            self.final_granule = self.final_granule.max(packet.granule_position);
        }
        Ok(())
    }

    fn into_report(self) -> Option<StreamReport> {
        let id = self.id_header?;
        let sample_rate = match id.input_sample_rate {
            0 => 48_000,
            rate => rate,
        };

        let samples = (self.final_granule.max(0) as u64).saturating_sub(id.pre_skip as u64);
        let duration = samples_to_duration(samples, sample_rate);
        let seconds = duration.as_secs_f64();
        let bitrate_kbps = if seconds > 0.0 {
            self.audio_bytes as f64 * 8.0 / (seconds * 1000.0)
        } else {
            0.0
        };

        let (vendor, comments) = match self.comment_header {
            Some(header) => (Some(header.vendor.clone()), header.comments().to_vec()),
            None => (None, Vec::new()),
        };

        Some(StreamReport {
            serial: self.serial.map(|s| format!("{s:#010X}")),
            complete: self.ended,
            header: HeaderReport {
                version: id.version,
                channels: id.channels,
                pre_skip: id.pre_skip,
                input_sample_rate: id.input_sample_rate,
                output_gain_db: id.output_gain_db(),
                output_gain_linear: id.output_gain_linear(),
                mapping_family: id.mapping_family,
                stream_count: id.mapping.as_ref().map(|m| m.stream_count),
                coupled_count: id.mapping.as_ref().map(|m| m.coupled_count),
            },
            vendor,
            comments,
            pages: self.demux.pages,
            audio_packets: self.audio_packets,
            min_packet_bytes: self.min_packet.unwrap_or(0),
            max_packet_bytes: self.max_packet,
            final_granule: self.final_granule,
            samples,
            duration: time_str(duration),
            duration_seconds: seconds,
            average_bitrate_kbps: bitrate_kbps,
            file_bytes: self.total_bytes,
            corrupt_pages: self.demux.corrupt_pages,
            lost_pages: self.demux.lost_pages,
            dropped_bytes: self.demux.dropped_bytes,
        })
    }
}

#[derive(Debug, Serialize)]
struct StreamReport {
    serial: Option<String>,
    complete: bool,
    header: HeaderReport,
    vendor: Option<String>,
    comments: Vec<String>,
    pages: usize,
    audio_packets: u64,
    min_packet_bytes: usize,
    max_packet_bytes: usize,
    final_granule: i64,
    samples: u64,
    duration: String,
    duration_seconds: f64,
    average_bitrate_kbps: f64,
    file_bytes: u64,
    corrupt_pages: usize,
    lost_pages: u64,
    dropped_bytes: u64,
}

#[derive(Debug, Serialize)]
struct HeaderReport {
    version: u8,
    channels: u8,
    pre_skip: u16,
    input_sample_rate: u32,
    output_gain_db: f64,
    output_gain_linear: f64,
    mapping_family: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_count: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    coupled_count: Option<u8>,
}

fn display_report(report: &StreamReport) {
    println!();
    println!("Ogg Opus Stream Information");
    println!("===========================");
    println!();

    let header = &report.header;
    println!("Identification Header");
    if let Some(serial) = &report.serial {
        println!("  Serial number             {serial}");
    }
    println!("  Version                   {}", header.version);
    println!("  Channels                  {}", header.channels);
    println!("  Input sample rate         {} Hz", header.input_sample_rate);
    println!("  Pre-skip                  {} samples", header.pre_skip);
    println!(
        "  Output gain               {:.2} dB (x{:.3})",
        header.output_gain_db, header.output_gain_linear
    );
    println!("  Channel mapping family    {}", header.mapping_family);
    if let (Some(streams), Some(coupled)) = (header.stream_count, header.coupled_count) {
        println!("  Streams                   {streams} ({coupled} coupled)");
    }
    println!();

    if let Some(vendor) = &report.vendor {
        println!("Comment Header");
        println!("  Vendor                    {vendor}");
        for comment in &report.comments {
            println!("  Comment                   {comment}");
        }
        println!();
    }

    println!("Analysis Summary");
    println!("  Pages                     {}", report.pages);
    println!("  Audio packets             {}", report.audio_packets);
    println!(
        "  Packet size               {} - {} bytes",
        report.min_packet_bytes, report.max_packet_bytes
    );

    let size_mb = report.file_bytes as f64 / 1_000_000.0;
    println!("  Size                      {size_mb:.2} MB ({} bytes)", report.file_bytes);
    println!("  Final granule position    {}", report.final_granule);
    println!("  Duration                  {}", report.duration);
    if report.duration_seconds > 0.0 {
        println!("  Average data rate         {:.1} kbps", report.average_bitrate_kbps);
    }
    println!("  End of stream             {}", report.complete);

    if report.corrupt_pages > 0 || report.lost_pages > 0 || report.dropped_bytes > 0 {
        println!("  Corrupt pages             {}", report.corrupt_pages);
        println!("  Lost pages                {}", report.lost_pages);
        println!("  Dropped bytes             {}", report.dropped_bytes);
    }
    println!();
}
