//! mosaic-join CLI - Enrich demographic postcode extracts with grid references.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use mosaic_join::{
    distance, find_processed, summarize, JoinConfig, JoinEngine, JoinStats, LocalStorage,
    PrimaryReader,
};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// JSON output for join results.
#[derive(Serialize)]
struct JsonOutput<'a> {
    input: String,
    output_dir: String,
    #[serde(flatten)]
    stats: &'a JoinStats,
    eligible: usize,
    written: usize,
    throughput_rows_s: f64,
}

/// JSON output for a postcode lookup.
#[derive(Serialize)]
struct LookupOutput {
    postcode: String,
    subgroup: String,
    northing: String,
    easting: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    near: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance_m: Option<f64>,
}

/// Enrich demographic postcode extracts with grid references.
///
/// Joins each eligible record's postcode against per-region reference files
/// (<REFERENCE_DIR>/<region>.csv) and writes one processed file per region
/// (<OUTPUT_DIR>/<region>.csv). Regions without a reference file are omitted
/// and reported at the end of the run.
#[derive(Parser, Debug)]
#[command(name = "mosaic-join")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Primary extract (CSV: postcode, _, _, group, subgroup).
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Directory of per-region reference files [env: MOSAIC_REFERENCE_DIR].
    #[arg(short, long, value_name = "DIR")]
    reference_dir: Option<PathBuf>,

    /// Directory for processed per-region files [env: MOSAIC_OUTPUT_DIR].
    #[arg(short, long, value_name = "DIR", global = true)]
    output_dir: Option<PathBuf>,

    /// Eligibility marker a record must carry [env: MOSAIC_ELIGIBLE_GROUP].
    #[arg(short, long)]
    group: Option<String>,

    /// Output results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Show progress spinner.
    #[arg(long)]
    progress: bool,

    /// Verbose output (info-level logs).
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Look up a postcode in the processed output
    Lookup {
        /// Postcode to find
        postcode: String,

        /// Also report the distance in metres to this postcode
        #[arg(long, value_name = "POSTCODE")]
        near: Option<String>,
    },
    /// Summarize processed output by subgroup
    Summary,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Create a spinner for indeterminate progress.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn build_config(args: &Cli) -> JoinConfig {
    let mut config = JoinConfig::from_env();
    if let Some(dir) = &args.reference_dir {
        config.reference_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(group) = &args.group {
        config.eligible_group = group.clone();
    }
    config
}

/// Run the join over the primary extract.
fn run_join(
    args: &Cli,
    input: &Path,
    config: &JoinConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    if args.verbose && !args.json {
        eprintln!("Configuration:");
        eprintln!("  Input: {}", input.display());
        eprintln!("  Reference dir: {}", config.reference_dir.display());
        eprintln!("  Output dir: {}", config.output_dir.display());
        eprintln!("  Eligible group: {}", config.eligible_group);
        eprintln!();
    }

    let pb = if args.progress && !args.json {
        Some(create_spinner("Joining postcodes..."))
    } else {
        None
    };

    let store = LocalStorage::new(&config.reference_dir, &config.output_dir)?;
    let mut engine = JoinEngine::new(store, config.eligible_group.clone())
        .with_report_interval(config.report_interval);

    for row in PrimaryReader::from_path(input)? {
        engine.process_row(&row?)?;
        if let Some(pb) = &pb {
            let rows = engine.stats().rows;
            if rows % 100_000 == 0 {
                pb.set_message(format!(
                    "Joined {rows} rows ({} regions omitted)...",
                    engine.omitted_shards().len()
                ));
            }
        }
    }

    let stats = engine.finish()?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if args.json {
        let output = JsonOutput {
            input: input.display().to_string(),
            output_dir: config.output_dir.display().to_string(),
            stats: &stats,
            eligible: stats.eligible(),
            written: stats.written(),
            throughput_rows_s: stats.throughput(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!();
    eprintln!("Join Results:");
    eprintln!("  Rows read:         {}", stats.rows);
    eprintln!("  Eligible:          {}", stats.eligible());
    eprintln!("  Rows written:      {}", stats.written());
    eprintln!("    Matched:         {}", stats.matched);
    eprintln!("    Defaulted (0,0): {}", stats.defaulted);
    eprintln!("  Duplicates:        {}", stats.duplicates);
    eprintln!("  Omitted rows:      {}", stats.omitted_rows);
    eprintln!("  Ineligible:        {}", stats.ineligible);
    eprintln!("  Malformed:         {}", stats.malformed);
    eprintln!("  Unroutable:        {}", stats.unroutable);
    eprintln!(
        "  Shards opened:     {} ({} reopened)",
        stats.shards_opened, stats.shards_reopened
    );
    eprintln!();
    eprintln!("Performance:");
    eprintln!("  Processing time:   {:.3}s", stats.elapsed_secs);
    eprintln!("  Throughput:        {:.0} rows/sec", stats.throughput());
    eprintln!("  Peak index size:   {} postcodes", stats.peak_index_entries);
    eprintln!();

    let omitted: Vec<&str> = stats.omitted_shards.iter().map(|k| k.as_str()).collect();
    eprintln!(
        "Processed data written to '{}' with the following omitted regions: [{}]",
        config.output_dir.display(),
        omitted.join(", ")
    );
    eprintln!("Total time: {:.3}s", start.elapsed().as_secs_f64());

    Ok(())
}

/// Look a postcode up in the processed output.
fn run_lookup(
    args: &Cli,
    config: &JoinConfig,
    postcode: &str,
    near: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = LocalStorage::for_output(&config.output_dir);

    let Some(record) = find_processed(&store, postcode)? else {
        eprintln!("Error: no processed record for postcode '{postcode}'");
        std::process::exit(1);
    };

    let distance_m = match near {
        Some(other) => {
            let Some(other_record) = find_processed(&store, other)? else {
                eprintln!("Error: no processed record for postcode '{other}'");
                std::process::exit(1);
            };
            distance(&record.coordinates(), &other_record.coordinates())
        }
        None => None,
    };

    if args.json {
        let output = LookupOutput {
            postcode: record.postcode.clone(),
            subgroup: record.subgroup.clone(),
            northing: record.northing.clone(),
            easting: record.easting.clone(),
            near: near.map(str::to_string),
            distance_m,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Postcode:  {}", record.postcode);
    println!("Subgroup:  {}", record.subgroup);
    if record.is_located() {
        println!("Northing:  {}", record.northing);
        println!("Easting:   {}", record.easting);
    } else {
        println!("Location:  unknown");
    }
    if let Some(other) = near {
        match distance_m {
            Some(d) => println!("Distance to {other}: {d:.0} m"),
            None => println!("Distance to {other}: unknown (missing location data)"),
        }
    }

    Ok(())
}

/// Summarize processed output by subgroup.
fn run_summary(args: &Cli, config: &JoinConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = LocalStorage::for_output(&config.output_dir);
    let summary = summarize(&store)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.shards == 0 {
        eprintln!(
            "Warning: no processed files found in {}",
            config.output_dir.display()
        );
        return Ok(());
    }

    println!("Processed Output Summary:");
    println!("  Shards:     {}", summary.shards);
    println!("  Rows:       {}", summary.rows);
    println!("  Located:    {}", summary.located());
    println!("  Unlocated:  {}", summary.unlocated());
    println!("  Malformed:  {}", summary.malformed);
    println!();
    println!("By subgroup:");
    for (subgroup, tally) in &summary.subgroups {
        println!(
            "  {:<8} located: {:>10}  unlocated: {:>10}",
            subgroup, tally.located, tally.unlocated
        );
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let config = build_config(&args);
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    match &args.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "mosaic-join", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::Lookup { postcode, near }) => {
            return run_lookup(&args, &config, postcode, near.as_deref());
        }
        Some(Commands::Summary) => return run_summary(&args, &config),
        None => {}
    }

    // Require input file for the join
    let input = args.input.clone().ok_or("Input file is required")?;

    if !input.exists() {
        eprintln!("Error: input file not found: {}", input.display());
        std::process::exit(1);
    }

    run_join(&args, &input, &config)
}
