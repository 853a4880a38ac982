//! PCO binary timestamp CLI application.
//!
//! Decodes the frame id and recording time from a stamp row given as pixel
//! values, or prints the stamp row for a frame id and time.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use ndarray::Array1;
use pcostamp_core::{
    stamp_width, write_stamp, DecoderOptions, FrameStamp, SampleBuffer, StampDecoder,
    Validation, DEFAULT_ID_OFFSET, DEFAULT_TIME_OFFSET,
};
use tracing::debug;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Frame stamp decoder for PCO 2000/4000 cameras.
///
/// Works on the BCD stamp written when the camera timestamp mode is BINARY or
/// BINARY+ASCII.
#[derive(Parser, Debug)]
#[command(name = "pcostamp")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode frame id and time from the pixel values of a stamp row
    Decode {
        /// Pixel values (decimal or 0x-prefixed hex), first pixel first
        #[arg(value_name = "SAMPLES", required = true, value_parser = parse_sample)]
        samples: Vec<u32>,

        /// Pixel offset of the frame id
        #[arg(long, default_value_t = DEFAULT_ID_OFFSET)]
        id_offset: usize,

        /// Pixel offset of the timestamp
        #[arg(long, default_value_t = DEFAULT_TIME_OFFSET)]
        time_offset: usize,

        /// Fail on nibbles that are not decimal digits
        #[arg(short, long)]
        strict: bool,
    },

    /// Print the stamp row for a frame id and recording time
    Encode {
        /// Frame id (up to 8 digits)
        #[arg(long)]
        id: u32,

        /// Recording time, e.g. 2010-03-15T12:30:45.678900
        #[arg(long, value_parser = parse_time)]
        time: NaiveDateTime,

        /// Pixel offset of the frame id
        #[arg(long, default_value_t = DEFAULT_ID_OFFSET)]
        id_offset: usize,

        /// Pixel offset of the timestamp
        #[arg(long, default_value_t = DEFAULT_TIME_OFFSET)]
        time_offset: usize,
    },
}

fn parse_sample(value: &str) -> Result<u32, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid sample {:?}: {}", value, e))
}

fn parse_time(value: &str) -> Result<NaiveDateTime, String> {
    value
        .parse()
        .map_err(|e| format!("invalid time {:?}: {}", value, e))
}

fn main() -> Result<()> {
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .context("Invalid RUST_LOG filter")?;
    let format_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(format_layer)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Decode {
            samples,
            id_offset,
            time_offset,
            strict,
        } => {
            let validation = if strict {
                Validation::Strict
            } else {
                Validation::Lenient
            };
            let options = DecoderOptions::default()
                .with_id_offset(id_offset)
                .with_time_offset(time_offset)
                .with_validation(validation);
            debug!(?options, pixels = samples.len(), "decoding stamp row");

            let row = Array1::from(samples);
            let stamp = StampDecoder::with_options(options)
                .frame_stamp(&SampleBuffer::from(row.view()))
                .context("Failed to decode frame stamp")?
                .single()
                .context("Expected a single frame stamp")?;

            println!("frame id:   {}", stamp.id);
            println!("frame time: {}", stamp.time.format("%Y-%m-%d %H:%M:%S%.6f"));
        }
        Command::Encode {
            id,
            time,
            id_offset,
            time_offset,
        } => {
            let width = stamp_width(id_offset, time_offset).context("Invalid stamp layout")?;
            let mut row = Array1::<u32>::zeros(width);
            write_stamp(
                row.view_mut(),
                &FrameStamp::new(id, time),
                id_offset,
                time_offset,
            )
            .context("Failed to encode frame stamp")?;

            let hex: Vec<String> = row.iter().map(|v| format!("0x{:02X}", v)).collect();
            println!("{}", hex.join(" "));
        }
    }

    Ok(())
}
