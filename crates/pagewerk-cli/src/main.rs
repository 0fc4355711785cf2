// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pagewerk — merge, split, rotate, watermark, and recover PDF page bundles.
//
// Entry point. Initialises logging, loads the configuration, and dispatches
// one subcommand on a current-thread runtime.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use pagewerk_core::human_errors::humanize_error;
use pagewerk_core::types::{
    CompressionLevel, ImageLayoutMode, PageRange, RotationDirection, WatermarkPosition,
};
use pagewerk_core::{AppConfig, PagewerkError};

use commands::{PageTurn, WatermarkArgs, Workspace};

#[derive(Parser)]
#[command(name = "pagewerk")]
#[command(version)]
#[command(about = "Merge, split, rotate, watermark, and repair PDF documents", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/pagewerk/config.json)
    #[arg(long, global = true, value_name = "FILE", env = "PAGEWERK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Combine documents, in the order given, into one
    Merge {
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,

        /// Output file [default: merged.pdf]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Cut a document into one file per page range
    Split {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Page range as START-END[:NAME], repeatable (default: whole document)
        #[arg(short, long = "range", value_name = "RANGE", value_parser = commands::parse_range)]
        ranges: Vec<PageRange>,

        /// Output directory [default: alongside the input]
        #[arg(short = 'd', long = "dir", value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Rotate individual pages or the whole document by quarter turns
    Rotate {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Page turn as PAGE:cw or PAGE:ccw, repeatable
        #[arg(short, long = "page", value_name = "PAGE:DIR", value_parser = commands::parse_turn)]
        pages: Vec<PageTurn>,

        /// Turn every page
        #[arg(long, value_enum, value_name = "DIR")]
        all: Option<Turn>,

        /// Output file [default: rotated_<input>]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Stamp a text or image watermark on every page
    Watermark {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Watermark text
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        text: Option<String>,

        /// Watermark image (PNG or JPEG)
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,

        /// Text colour as #RRGGBB
        #[arg(long)]
        color: Option<String>,

        /// Opacity from 0.0 to 1.0
        #[arg(long)]
        opacity: Option<f32>,

        /// Rotation in degrees, counter-clockwise
        #[arg(long)]
        rotation: Option<f32>,

        /// Size as a percentage of the page's shorter side
        #[arg(long)]
        size: Option<f32>,

        #[arg(long, value_enum)]
        position: Option<Position>,

        /// Output file [default: watermarked_<input>]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Lay images out onto new pages
    Images {
        #[arg(value_name = "IMAGE", required = true)]
        images: Vec<PathBuf>,

        #[arg(long, value_enum, default_value = "grid")]
        layout: Layout,

        /// Output file [default: high-quality-images.pdf]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Re-save a document with stream compression
    Compress {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Compression level [default: from config]
        #[arg(long, value_enum)]
        level: Option<Level>,

        /// Output file [default: compressed_<input>]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Recover a damaged document
    Repair {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Maximum repair runs, 1 to 3 [default: from config]
        #[arg(long)]
        runs: Option<u32>,

        /// Output file [default: repaired_<input>]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Turn {
    /// Clockwise
    Cw,
    /// Counter-clockwise
    Ccw,
}

impl From<Turn> for RotationDirection {
    fn from(turn: Turn) -> Self {
        match turn {
            Turn::Cw => RotationDirection::Clockwise,
            Turn::Ccw => RotationDirection::CounterClockwise,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Position {
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl From<Position> for WatermarkPosition {
    fn from(position: Position) -> Self {
        match position {
            Position::Center => WatermarkPosition::Center,
            Position::TopLeft => WatermarkPosition::TopLeft,
            Position::TopRight => WatermarkPosition::TopRight,
            Position::BottomLeft => WatermarkPosition::BottomLeft,
            Position::BottomRight => WatermarkPosition::BottomRight,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Layout {
    /// Several images per page
    Grid,
    /// One image per page
    Single,
}

impl From<Layout> for ImageLayoutMode {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Grid => ImageLayoutMode::Grid,
            Layout::Single => ImageLayoutMode::SinglePage,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Level {
    Low,
    Medium,
    High,
}

impl From<Level> for CompressionLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => CompressionLevel::Low,
            Level::Medium => CompressionLevel::Medium,
            Level::High => CompressionLevel::High,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(outputs) => {
            for path in outputs {
                println!("{}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            let human = humanize_error(&err);
            tracing::debug!(error = %err, "command failed");
            eprintln!("error: {}", human.message);
            eprintln!("  {}", human.suggestion);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Vec<PathBuf>, PagewerkError> {
    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path)?;
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    if let Commands::Repair {
        runs: Some(runs), ..
    } = &cli.command
    {
        config.max_repair_runs = *runs;
    }

    let mut workspace = Workspace::new(config);
    tracing::info!(session = %workspace.session_id(), "Pagewerk starting");

    match cli.command {
        Commands::Merge { inputs, output } => workspace.merge(&inputs, output).await,
        Commands::Split { input, ranges, dir } => workspace.split(&input, ranges, dir).await,
        Commands::Rotate {
            input,
            pages,
            all,
            output,
        } => {
            workspace
                .rotate(&input, &pages, all.map(Into::into), output)
                .await
        }
        Commands::Watermark {
            input,
            text,
            image,
            color,
            opacity,
            rotation,
            size,
            position,
            output,
        } => {
            let args = WatermarkArgs {
                text,
                image,
                color,
                opacity,
                rotation,
                size_percent: size,
                position: position.map(Into::into),
            };
            workspace.watermark(&input, args, output).await
        }
        Commands::Images {
            images,
            layout,
            output,
        } => workspace.images(&images, layout.into(), output).await,
        Commands::Compress {
            input,
            level,
            output,
        } => workspace.compress(&input, level.map(Into::into), output).await,
        Commands::Repair { input, output, .. } => workspace.repair(&input, output).await,
    }
}
