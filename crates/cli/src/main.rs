//! gapsnap CLI - quality checks for vector line and polygon networks

mod io;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use gapsnap_algorithms::engine::{run_gaps, run_midpoints, run_network, run_short_features, run_snap};
use gapsnap_algorithms::gaps::GapParams;
use gapsnap_algorithms::network::NetworkParams;
use gapsnap_algorithms::proximity::{LengthFilterParams, MidpointParams};
use gapsnap_algorithms::report::{RunLimits, RunReport};
use gapsnap_algorithms::snap::{SnapOutputMode, SnapParams, SnapPolicy};
use gapsnap_core::store::{CategoryFilter, FeatureSink, MemoryStore, SubtypeFilter};
use gapsnap_core::AttributeValue;

use crate::io::{read_dataset, JsonFileSink};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "gapsnap")]
#[command(author, version, about = "Gap, containment and dangle checks for vector networks", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Arguments shared by every check
#[derive(Args)]
struct RunArgs {
    /// Input dataset (JSON)
    input: PathBuf,
    /// Output file (JSON)
    output: PathBuf,
    /// Layer to read; repeat for several
    #[arg(short, long = "layer")]
    layers: Vec<String>,
    /// Subtype attribute to filter on
    #[arg(long, requires = "subtype_value")]
    subtype_field: Option<String>,
    /// Accepted subtype value; repeat for several
    #[arg(long)]
    subtype_value: Vec<String>,
    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Abort the run after this many seconds
    #[arg(long)]
    timeout: Option<f64>,
    /// Abort the run after this many candidate evaluations
    #[arg(long)]
    max_evaluations: Option<usize>,
    /// Write the run report to this file instead of stdout
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract regions of polygons narrower than a threshold
    Gaps {
        #[command(flatten)]
        run: RunArgs,
        /// Gap threshold in metres
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Minimum gap area in square metres
        #[arg(short, long)]
        min_area: Option<f64>,
    },
    /// Keep linear features lying inside another feature's buffer
    Network {
        #[command(flatten)]
        run: RunArgs,
        /// Buffer threshold in metres
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Tolerance added to the buffer radius
        #[arg(short, long)]
        epsilon: Option<f64>,
    },
    /// Flag line endpoints near another feature without being snapped
    Snap {
        #[command(flatten)]
        run: RunArgs,
        /// Search radius in metres
        #[arg(short, long)]
        near: Option<f64>,
        /// Snap tolerance to an existing vertex
        #[arg(long)]
        vertex_tolerance: Option<f64>,
        /// Tolerance for lying on a segment
        #[arg(long)]
        segment_tolerance: Option<f64>,
        /// Parallel excuse angle in degrees
        #[arg(short = 'a', long, conflicts_with = "no_parallel")]
        parallel_angle: Option<f64>,
        /// Never excuse parallel offsets
        #[arg(long)]
        no_parallel: bool,
        /// Evaluate every neighbour instead of stopping at the first verdict
        #[arg(long)]
        exhaustive: bool,
        /// Write flagged lines instead of flagged endpoints
        #[arg(long)]
        lines: bool,
    },
    /// Keep linear features whose midpoint lies near another feature
    Midpoints {
        #[command(flatten)]
        run: RunArgs,
        /// Search radius in metres
        #[arg(short, long)]
        radius: Option<f64>,
        /// Tolerance added to the radius
        #[arg(short, long)]
        epsilon: Option<f64>,
        /// Also write every computed midpoint to this file
        #[arg(long)]
        midpoints: Option<PathBuf>,
    },
    /// Select linear features shorter than a length
    Short {
        #[command(flatten)]
        run: RunArgs,
        /// Maximum length in metres
        #[arg(short, long)]
        max_length: Option<f64>,
    },
}

// ─── Configuration file ─────────────────────────────────────────────────

/// Contents of a `--config` file; every section is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    layers: Vec<String>,
    subtype: Option<SubtypeFilter>,
    limits: RunLimits,
    gaps: GapParams,
    network: NetworkParams,
    snap: SnapParams,
    midpoints: MidpointParams,
    short: LengthFilterParams,
}

fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

/// Subtype values typed on the command line: integers stay integers
fn parse_value(raw: &str) -> AttributeValue {
    match raw.parse::<i64>() {
        Ok(v) => AttributeValue::Int(v),
        Err(_) => AttributeValue::String(raw.to_string()),
    }
}

/// Inputs of one run after merging the config file and the flags
struct Prepared {
    store: MemoryStore,
    filter: CategoryFilter,
    limits: RunLimits,
    config: FileConfig,
}

impl RunArgs {
    fn prepare(&self) -> Result<Prepared> {
        let mut config = load_config(self.config.as_deref())?;

        let layers = if self.layers.is_empty() {
            std::mem::take(&mut config.layers)
        } else {
            self.layers.clone()
        };
        let mut filter = CategoryFilter::layers(layers);
        filter.subtype = match &self.subtype_field {
            Some(field) => Some(SubtypeFilter {
                field: field.clone(),
                values: self.subtype_value.iter().map(|v| parse_value(v)).collect(),
            }),
            None => config.subtype.take(),
        };

        let mut limits = config.limits.clone();
        if let Some(secs) = self.timeout {
            limits.timeout_secs = Some(secs);
        }
        if let Some(max) = self.max_evaluations {
            limits = limits.with_max_evaluations(max);
        }

        let pb = spinner("Reading dataset...");
        let store = read_dataset(&self.input)?;
        pb.finish_and_clear();
        info!(
            "Input: {} layers in {}",
            store.layers.len(),
            store.crs
        );

        Ok(Prepared {
            store,
            filter,
            limits,
            config,
        })
    }

    fn sink(&self, store: &MemoryStore) -> JsonFileSink {
        JsonFileSink::new(&self.output, store.crs.clone())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn write_output(sink: JsonFileSink) -> Result<()> {
    let pb = spinner("Writing output...");
    let count = sink.len();
    let path = sink.finish()?;
    pb.finish_and_clear();
    println!("{} records saved to: {}", count, path.display());
    Ok(())
}

fn emit_report(report: &RunReport, path: Option<&Path>) -> Result<()> {
    if !report.skipped.is_empty() {
        warn!("{} features skipped", report.skipped.len());
    }
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    match path {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Report saved to: {}", path.display());
        }
        None => println!("{json}"),
    }
    println!("  Processing time: {:.2?}", Duration::from_millis(report.elapsed_ms as u64));
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Gaps {
            run,
            threshold,
            min_area,
        } => {
            let Prepared {
                store,
                filter,
                limits,
                config,
            } = run.prepare()?;
            let mut params = config.gaps;
            if let Some(t) = threshold {
                params.threshold = t;
            }
            if let Some(a) = min_area {
                params.min_area = a;
            }
            let mut sink = run.sink(&store);
            let pb = spinner("Extracting gaps...");
            let report = run_gaps(&store, &mut sink, &filter, &params, &limits);
            pb.finish_and_clear();
            let report = report.context("Failed to extract gaps")?;
            write_output(sink)?;
            emit_report(&report, run.report.as_deref())?;
        }

        Commands::Network {
            run,
            threshold,
            epsilon,
        } => {
            let Prepared {
                store,
                filter,
                limits,
                config,
            } = run.prepare()?;
            let mut params = config.network;
            if let Some(t) = threshold {
                params.threshold = t;
            }
            if let Some(e) = epsilon {
                params.epsilon = e;
            }
            let mut sink = run.sink(&store);
            let pb = spinner("Building containment network...");
            let report = run_network(&store, &mut sink, &filter, &params, &limits);
            pb.finish_and_clear();
            let report = report.context("Failed to build containment network")?;
            write_output(sink)?;
            emit_report(&report, run.report.as_deref())?;
        }

        Commands::Snap {
            run,
            near,
            vertex_tolerance,
            segment_tolerance,
            parallel_angle,
            no_parallel,
            exhaustive,
            lines,
        } => {
            let Prepared {
                store,
                filter,
                limits,
                config,
            } = run.prepare()?;
            let mut params = config.snap;
            if let Some(t) = near {
                params.near_tolerance = t;
            }
            if let Some(t) = vertex_tolerance {
                params.vertex_tolerance = t;
            }
            if let Some(t) = segment_tolerance {
                params.segment_tolerance = t;
            }
            if parallel_angle.is_some() {
                params.parallel_angle = parallel_angle;
            }
            if no_parallel {
                params.parallel_angle = None;
            }
            if exhaustive {
                params.policy = SnapPolicy::Exhaustive;
            }
            if lines {
                params.output = SnapOutputMode::Lines;
            }
            let mut sink = run.sink(&store);
            let pb = spinner("Classifying endpoints...");
            let report = run_snap(&store, &mut sink, &filter, &params, &limits);
            pb.finish_and_clear();
            let report = report.context("Failed to classify endpoints")?;
            write_output(sink)?;
            emit_report(&report, run.report.as_deref())?;
        }

        Commands::Midpoints {
            run,
            radius,
            epsilon,
            midpoints,
        } => {
            let Prepared {
                store,
                filter,
                limits,
                config,
            } = run.prepare()?;
            let mut params = config.midpoints;
            if let Some(r) = radius {
                params.radius = r;
            }
            if let Some(e) = epsilon {
                params.epsilon = e;
            }
            let mut sink = run.sink(&store);
            let mut point_sink = midpoints.map(|path| JsonFileSink::new(path, store.crs.clone()));
            let pb = spinner("Measuring midpoint proximity...");
            let report = run_midpoints(
                &store,
                &mut sink,
                point_sink.as_mut().map(|s| s as &mut dyn FeatureSink),
                &filter,
                &params,
                &limits,
            );
            pb.finish_and_clear();
            let report = report.context("Failed to measure midpoint proximity")?;
            write_output(sink)?;
            if let Some(points) = point_sink {
                write_output(points)?;
            }
            emit_report(&report, run.report.as_deref())?;
        }

        Commands::Short { run, max_length } => {
            let Prepared {
                store,
                filter,
                limits,
                config,
            } = run.prepare()?;
            let mut params = config.short;
            if let Some(l) = max_length {
                params.max_length = l;
            }
            let mut sink = run.sink(&store);
            let pb = spinner("Selecting short features...");
            let report = run_short_features(&store, &mut sink, &filter, &params, &limits);
            pb.finish_and_clear();
            let report = report.context("Failed to select short features")?;
            write_output(sink)?;
            emit_report(&report, run.report.as_deref())?;
        }
    }

    Ok(())
}
