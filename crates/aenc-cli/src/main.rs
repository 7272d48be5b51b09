//! aenc CLI - replay scene-stats traces through the decision engine.
//!
//! A trace is a JSON array of per-frame analyzer records (see `template`).
//! The `decide` command replays it through the engine with the given GOP
//! parameters and prints one decision per frame.

use aenc_core::{
    Aenc, AencConfig, Codec, ColorFormat, FrameAnalysis, OutputFrame, ScriptedAnalyzer,
    ScriptedFrame,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::debug;

/// aenc - adaptive encoding decision engine
#[derive(Parser, Debug)]
#[command(name = "aenc")]
#[command(about = "Replay scene-stats traces through the adaptive encoding engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a stats trace and print the decision stream
    Decide {
        /// Trace file (JSON array of per-frame records)
        #[arg(short, long)]
        trace: PathBuf,

        /// Target codec
        #[arg(long, value_enum, default_value = "avc")]
        codec: CodecArg,

        /// Maximum mini-GOP size (1, 2, 4 or 8)
        #[arg(long, default_value = "8")]
        max_mini_gop: u32,

        /// Minimum GOP size
        #[arg(long, default_value = "8")]
        min_gop: u32,

        /// Maximum GOP size
        #[arg(long, default_value = "32")]
        max_gop: u32,

        /// Maximum IDR distance
        #[arg(long, default_value = "128")]
        idr_dist: u32,

        /// Nominal GOP size for strict-I placement
        #[arg(long, default_value = "32")]
        gop_pic_size: u32,

        /// Place I/IDR strictly on the gop-pic-size grid
        #[arg(long)]
        strict_i: bool,

        /// Enable adaptive long-term reference
        #[arg(long)]
        altr: bool,

        /// Enable adaptive key-P reference
        #[arg(long)]
        aref: bool,

        /// Enable adaptive perceptual QP
        #[arg(long)]
        apq: bool,

        /// Enable adaptive mini-GOP sizing
        #[arg(long)]
        agop: bool,

        /// Output format (text, json)
        #[arg(short = 'F', long, default_value = "text")]
        format: String,
    },

    /// Print an example trace to adapt by hand
    Template {
        /// Number of frames in the example
        #[arg(short = 'n', long, default_value = "8")]
        frames: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CodecArg {
    Avc,
    Hevc,
}

impl From<CodecArg> for Codec {
    fn from(arg: CodecArg) -> Self {
        match arg {
            CodecArg::Avc => Codec::Avc,
            CodecArg::Hevc => Codec::Hevc,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Decide {
            trace,
            codec,
            max_mini_gop,
            min_gop,
            max_gop,
            idr_dist,
            gop_pic_size,
            strict_i,
            altr,
            aref,
            apq,
            agop,
            format,
        } => {
            let config = AencConfig {
                codec: codec.into(),
                color_format: ColorFormat::Nv12,
                max_mini_gop_size: max_mini_gop,
                min_gop_size: min_gop,
                max_gop_size: max_gop,
                max_idr_dist: idr_dist,
                gop_pic_size,
                strict_i_frame: strict_i,
                altr,
                aref,
                apq,
                agop,
                ..AencConfig::default()
            };
            decide(&trace, config, &format)
        }
        Commands::Template { frames } => template(frames),
    }
}

fn decide(trace: &Path, config: AencConfig, format: &str) -> Result<()> {
    let data = std::fs::read_to_string(trace)
        .with_context(|| format!("reading trace {}", trace.display()))?;
    let script: Vec<ScriptedFrame> =
        serde_json::from_str(&data).context("parsing trace JSON")?;
    let frames = script.len() as u32;
    debug!(frames, "trace loaded");

    let mut engine = Aenc::new(config, ScriptedAnalyzer::new(script))
        .context("engine construction failed")?;

    let mut decisions = Vec::new();
    for poc in 0..frames {
        if let Some(d) = engine.process_frame(poc, Some(&[]), 0)? {
            print_or_hold(d, format, &mut decisions);
        }
    }
    while let Some(d) = engine.process_frame(frames, None, 0)? {
        print_or_hold(d, format, &mut decisions);
    }
    engine.close();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&decisions)?);
    }
    Ok(())
}

fn print_or_hold(decision: OutputFrame, format: &str, held: &mut Vec<OutputFrame>) {
    if format == "json" {
        held.push(decision);
    } else {
        println!("{decision}");
    }
}

fn template(frames: usize) -> Result<()> {
    let script: Vec<ScriptedFrame> = (0..frames)
        .map(|i| ScriptedFrame {
            analysis: FrameAnalysis {
                scene_changed: i == frames / 2,
                suggested_mini_gop: 8,
                spatial_complexity: 3,
                temporal_complexity: 2,
                mv: 400,
                mv_size: 500,
                contrast: 60,
                ..Default::default()
            },
            ltr_transition: false,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&script)?);
    Ok(())
}
