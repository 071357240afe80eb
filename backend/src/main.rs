//! MaStR battery CLI - fetch, inspect and serve battery storage snapshots
//!
//! # Main Commands
//!
//! ```bash
//! mastr-battery fetch                      # Download a new snapshot (needs MASTR_API_KEY)
//! mastr-battery serve                      # Start HTTP server (port 3000)
//! mastr-battery stats --bundesland Bayern  # Summary of the newest snapshot
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! mastr-battery latest                     # Print the newest snapshot path
//! mastr-battery normalize                  # Normalized records as JSON
//! mastr-battery export -o table.csv        # Detail table as CSV
//! mastr-battery technologies               # Which technology codes the registry knows
//! ```

use clap::{Parser, Subcommand};
use mastr_battery::{
    build_view, export_csv, fetch_snapshot, find_latest_snapshot, load_dataset, load_latest,
    table_rows, AppConfig, FetchOptions, FetchProfile, FilterQuery, MastrClient,
};
use mastr_battery::config::{DEFAULT_MIN_CAPACITY_KWH, DEFAULT_MIN_POWER_KW, DEFAULT_PAGE_SIZE};
use mastr_battery::fetch::TECHNOLOGY_CHECK_CODES;
use mastr_battery::models::fields;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "mastr-battery")]
#[command(about = "German battery storage registry (MaStR) snapshots and dashboard API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all matching units from the registry into a new snapshot
    Fetch {
        /// Minimum gross power in kW
        #[arg(long, default_value_t = DEFAULT_MIN_POWER_KW)]
        min_power: u64,

        /// Minimum usable capacity in kWh
        #[arg(long, default_value_t = DEFAULT_MIN_CAPACITY_KWH)]
        min_capacity: u64,

        /// Units per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,

        /// Registry query to run
        #[arg(long, value_enum, default_value = "all-technologies")]
        profile: FetchProfile,

        /// Snapshot directory (default: MASTR_DATA_DIR or .)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Ask the registry which battery technology codes have units
    Technologies {
        /// First code to check
        #[arg(long, default_value_t = *TECHNOLOGY_CHECK_CODES.start())]
        from: i64,

        /// Last code to check (inclusive)
        #[arg(long, default_value_t = *TECHNOLOGY_CHECK_CODES.end())]
        to: i64,
    },

    /// Print the newest snapshot file
    Latest {
        /// Snapshot directory (default: MASTR_DATA_DIR or .)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Normalize a snapshot and output JSON
    Normalize {
        /// Snapshot file or directory (default: newest in MASTR_DATA_DIR)
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summary of the newest snapshot, optionally filtered
    Stats {
        /// Snapshot directory (default: MASTR_DATA_DIR or .)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        filter: FilterQuery,
    },

    /// Export the detail table of the newest snapshot as CSV
    Export {
        /// Snapshot directory (default: MASTR_DATA_DIR or .)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        filter: FilterQuery,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: MASTR_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Snapshot directory (default: MASTR_DATA_DIR or .)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match AppConfig::from_env() {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = |dir: Option<PathBuf>| dir.unwrap_or_else(|| config.data_dir.clone());

    match command {
        Commands::Fetch {
            min_power,
            min_capacity,
            page_size,
            profile,
            dir,
        } => {
            let options = FetchOptions {
                min_power_kw: min_power,
                min_capacity_kwh: min_capacity,
                page_size,
                profile,
            };
            cmd_fetch(&config, &options, &data_dir(dir)).await
        }

        Commands::Technologies { from, to } => cmd_technologies(&config, from, to).await,

        Commands::Latest { dir } => cmd_latest(&data_dir(dir)),

        Commands::Normalize { input, output } => {
            cmd_normalize(&input.unwrap_or_else(|| config.data_dir.clone()), output.as_deref())
        }

        Commands::Stats { dir, json, filter } => cmd_stats(&data_dir(dir), &filter, json),

        Commands::Export { dir, output, filter } => cmd_export(&data_dir(dir), &filter, output.as_deref()),

        Commands::Serve { port, dir } => cmd_serve(data_dir(dir), port.unwrap_or(config.port)).await,
    }
}

async fn cmd_fetch(
    config: &AppConfig,
    options: &FetchOptions,
    dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🔋 Fetching battery storage units from MaStR");
    let client = MastrClient::from_config(config)?;
    let path = fetch_snapshot(&client, options, dir).await?;
    eprintln!("💾 Snapshot written to: {}", path.display());
    Ok(())
}

async fn cmd_technologies(config: &AppConfig, from: i64, to: i64) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🔍 Checking battery technology codes {}..={}", from, to);
    let client = MastrClient::from_config(config)?;

    for (code, result) in client.check_technologies(from..=to).await {
        let Ok(check) = result else {
            // already logged, keep going with the next code
            continue;
        };
        let Some(sample) = &check.sample else {
            continue;
        };
        println!("{}: {} units (first page)", code, check.units);
        for field in [fields::UNIT_NAME, fields::BATTERY_TECHNOLOGY, fields::GROSS_POWER, fields::USABLE_CAPACITY] {
            println!("   {:<28} {}", field, sample.get(field).unwrap_or(&serde_json::Value::Null));
        }
    }
    Ok(())
}

fn cmd_latest(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let path = find_latest_snapshot(dir)?;
    println!("{}", path.display());
    Ok(())
}

fn cmd_normalize(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = if input.is_dir() {
        load_latest(input)?
    } else {
        load_dataset(input)?
    };

    let json = serde_json::to_string_pretty(&dataset.records)?;
    write_output(&json, output)
}

fn cmd_stats(dir: &Path, filter: &FilterQuery, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    filter.validate()?;
    let dataset = load_latest(dir)?;
    let view = build_view(&dataset.records, filter);

    if json {
        println!("{}", serde_json::to_string_pretty(&view.summary)?);
        return Ok(());
    }

    let summary = &view.summary;
    eprintln!("\n📊 {} ({} of {} units match)", dataset.file_name(), summary.total_units, dataset.records.len());
    println!("   Total power:       {:.2} MW", summary.total_power_mw);
    println!("   Total capacity:    {:.2} MWh", summary.total_capacity_mwh);
    println!("   Average power:     {:.2} MW", summary.average_power_mw);
    println!("   Average capacity:  {:.2} MWh", summary.average_capacity_mwh);
    println!("   Average duration:  {:.2} h", summary.average_duration_hours);

    print_breakdown("Status", &summary.status_breakdown);
    print_breakdown("Technology", &summary.technology_name_breakdown);
    print_breakdown("Bundesland", &summary.bundesland_breakdown);
    Ok(())
}

fn print_breakdown(title: &str, table: &mastr_battery::transform::Frequencies) {
    if table.is_empty() {
        return;
    }
    println!("\n   {}:", title);
    for entry in mastr_battery::dashboard::ranked(table) {
        println!("     {:<40} {}", entry.label, entry.count);
    }
}

fn cmd_export(dir: &Path, filter: &FilterQuery, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    filter.validate()?;
    let dataset = load_latest(dir)?;
    let view = build_view(&dataset.records, filter);
    let rows = table_rows(view.records.iter().copied());

    match output {
        Some(p) => {
            export_csv(&rows, File::create(p)?)?;
            eprintln!("💾 {} rows written to: {}", rows.len(), p.display());
        }
        None => export_csv(&rows, io::stdout().lock())?,
    }
    Ok(())
}

async fn cmd_serve(dir: PathBuf, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    mastr_battery::server::start_server(dir, port).await
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
