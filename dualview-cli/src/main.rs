//! Replays dual-viewport comparison scenarios from the command line.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

mod scenario;

use clap::{Parser, Subcommand, ValueEnum};
use dualview_core::{RegionScope, Side};
use dualview_sync::ChannelStats;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

use crate::scenario::{replay, Report, Scenario, SideReport};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] dualview_core::Error),

    #[error("Scenario error: {0}")]
    Scenario(String),
}

/// Statistics region selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Region {
    /// Every ROI sharing the last edited ROI's correlation
    LastRoi,
    /// ROIs on the slices currently shown
    Slice,
    /// Every ROI on every slice
    Volume,
}

impl From<Region> for RegionScope {
    fn from(region: Region) -> Self {
        match region {
            Region::LastRoi => RegionScope::LastRoi,
            Region::Slice => RegionScope::Slice,
            Region::Volume => RegionScope::Volume,
        }
    }
}

/// Side-by-side image comparison driver.
#[derive(Parser)]
#[command(name = "dualview")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose logging (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario and report difference statistics
    Compare {
        /// Scenario JSON file
        scenario: PathBuf,

        /// Statistics region, overriding the scenario's
        #[arg(short, long, value_enum)]
        region: Option<Region>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the volumes and configuration of a scenario
    Info {
        /// Scenario JSON file
        scenario: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn print_channel(name: &str, c: &ChannelStats) {
    println!(
        "  {:<6} min {:>10.3}  max {:>10.3}  mean {:>10.3}  std {:>10.3}",
        name, c.min, c.max, c.mean, c.std
    );
}

fn print_side(s: &SideReport) {
    let position = match (s.slice, s.depth) {
        (Some(slice), Some(depth)) => format!("slice {}/{}", slice + 1, depth),
        _ => "not loaded".to_string(),
    };
    println!(
        "{:<5}: {}, {} ROI record(s), {} annotation(s) on slice, offset ({:.2}, {:.2}), angle {:.1}",
        s.side.to_string(),
        position,
        s.records,
        s.annotations,
        s.dx,
        s.dy,
        s.angle
    );
}

fn print_report(report: &Report, region: RegionScope) {
    println!("Steps: {}", report.steps);
    println!("Stack offset: {}", report.delta_stack_index);
    print_side(&report.left);
    print_side(&report.right);

    let Some(stats) = &report.stats else {
        println!("Stats ({:?}): no data", region);
        return;
    };
    println!("Stats ({:?}): {} point(s)", stats.scope, stats.count);
    print_channel("diff", &stats.diff);
    print_channel("left", &stats.left);
    print_channel("right", &stats.right);
    println!(
        "  area   left {:.2}  right {:.2}",
        stats.area_left, stats.area_right
    );
    for (side, own) in [(Side::Left, &stats.left_own), (Side::Right, &stats.right_own)] {
        match (own.mean, own.std) {
            (Some(mean), Some(std)) => println!(
                "  {} ROIs: {} pixel(s), mean {:.3}, std {:.3}",
                side, own.count, mean, std
            ),
            _ => println!("  {} ROIs: no measurements", side),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Compare {
            scenario,
            region,
            json,
        } => {
            let loaded = Scenario::load(&scenario)?;
            let region = region.map_or(loaded.region, RegionScope::from);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;

            let start = Instant::now();
            let report = runtime.block_on(replay(&loaded, region))?;
            let elapsed = start.elapsed();

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Scenario: {}", scenario.display());
                print_report(&report, region);
                println!("Replayed in {:.2}s", elapsed.as_secs_f64());
            }
        }

        Commands::Info { scenario } => {
            let loaded = Scenario::load(&scenario)?;
            let renderer = loaded.renderer();

            println!("Scenario: {}", scenario.display());
            for side in Side::BOTH {
                let (depth, geometry) = renderer.describe(side);
                println!(
                    "{:<5}: {} x {} x {}, spacing {} x {}",
                    side.to_string(),
                    geometry.columns,
                    geometry.rows,
                    depth,
                    geometry.column_pixel_spacing,
                    geometry.row_pixel_spacing
                );
            }
            println!("Steps: {}", loaded.steps.len());
            println!("Region: {:?}", loaded.region);
            println!(
                "Sync: roi={}, stack={}, stack offset {}",
                loaded.config.sync.synchronize_roi,
                loaded.config.sync.synchronize_stack,
                loaded.config.sync.delta_stack_index
            );
            println!(
                "Stack poll: {} read(s) every {} ms",
                loaded.config.stack_poll.attempts, loaded.config.stack_poll.interval_ms
            );
            println!("Registration method: {}", loaded.config.registration_method);
        }
    }

    Ok(())
}
