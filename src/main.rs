use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use climate_anomalies::aggregate::aggregate;
use climate_anomalies::config::EngineConfig;
use climate_anomalies::models::{Month, Region, Selection, Variable, Year};
use climate_anomalies::{analyze_variable, loader, report, Snapshot, VariableAnalysis};

#[derive(Parser)]
#[command(name = "climate-anomalies")]
#[command(about = "Regional climate baselines, atypical years, trends and extremes", long_about = None)]
struct Cli {
    /// Observation table (CSV) with Region, Year/Month or Date, and variable columns
    #[arg(long)]
    csv: PathBuf,
    /// Optional TOML configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log normalization and pipeline details to stderr
    #[arg(long, short)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print regional-monthly means
    Summary {
        #[arg(long)]
        variable: Variable,
        #[arg(long)]
        region: Option<Region>,
        #[arg(long)]
        year: Option<Year>,
    },
    /// Print the historical baseline per region and month
    Baseline {
        #[arg(long)]
        variable: Variable,
        #[arg(long)]
        region: Option<Region>,
    },
    /// Rank years by deviation from the baseline
    Atypical {
        #[arg(long)]
        variable: Variable,
        #[arg(long)]
        region: Option<Region>,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Fit and classify the annual trend per region
    Trend {
        #[arg(long)]
        variable: Variable,
        #[arg(long)]
        region: Option<Region>,
    },
    /// Locate global extremes and the most seasonal regions
    Extremes {
        #[arg(long)]
        variable: Variable,
        #[arg(long)]
        year: Option<Year>,
        #[arg(long)]
        month: Option<Month>,
    },
    /// Generate a markdown (or JSON) report
    Report {
        #[arg(long)]
        variable: Variable,
        #[arg(long)]
        region: Option<Region>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn variable(&self) -> Variable {
        match self {
            Commands::Summary { variable, .. }
            | Commands::Baseline { variable, .. }
            | Commands::Atypical { variable, .. }
            | Commands::Trend { variable, .. }
            | Commands::Extremes { variable, .. }
            | Commands::Report { variable, .. } => *variable,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let variable = cli.command.variable();
    let table = loader::load_table(&cli.csv, &config.loader)?;
    let snapshot = Snapshot::from_table(&table, &[variable], &config.normalize_options())
        .with_context(|| format!("cannot analyze {} from {}", variable, cli.csv.display()))?;
    let unit = variable.unit();

    match cli.command {
        Commands::Summary {
            variable,
            region,
            year,
        } => {
            let selection = Selection {
                region,
                year,
                month: None,
            };
            let table = aggregate(snapshot.records(), variable).filter(&selection);
            println!("Monthly {} means for {}:", variable, selection);
            print!("{}", report::format_monthly_means(table.iter(), unit));
        }
        Commands::Baseline { variable, region } => {
            let selection = Selection {
                region,
                ..Selection::default()
            };
            let Some(analysis) = run_analysis(&snapshot, variable, &selection, &config)? else {
                return Ok(());
            };
            println!("Historical {} baseline:", variable);
            print!("{}", report::format_baselines(analysis.baselines.iter(), unit));
        }
        Commands::Atypical {
            variable,
            region,
            limit,
        } => {
            let selection = Selection {
                region,
                ..Selection::default()
            };
            let Some(analysis) = run_analysis(&snapshot, variable, &selection, &config)? else {
                return Ok(());
            };
            for region in &analysis.regions {
                print!("{}", report::format_ranking(region, limit, unit));
            }
        }
        Commands::Trend { variable, region } => {
            let selection = Selection {
                region,
                ..Selection::default()
            };
            let Some(analysis) = run_analysis(&snapshot, variable, &selection, &config)? else {
                return Ok(());
            };
            println!("Annual {} trends:", variable);
            for region in &analysis.regions {
                println!(
                    "- {}",
                    report::format_trend_line(&region.region, &region.trend, unit)
                );
            }
        }
        Commands::Extremes {
            variable,
            year,
            month,
        } => {
            let selection = Selection {
                region: None,
                year,
                month,
            };
            let Some(analysis) = run_analysis(&snapshot, variable, &selection, &config)? else {
                return Ok(());
            };
            match &analysis.extremes {
                Ok(summary) => {
                    println!("{} extremes for {}:", variable, selection);
                    print!("{}", report::format_extremes(summary, unit));
                }
                Err(err) if err.is_data_sparsity() => println!("{}", err),
                Err(err) => return Err(err.clone().into()),
            }
        }
        Commands::Report {
            variable,
            region,
            out,
            json,
        } => {
            let selection = Selection {
                region,
                ..Selection::default()
            };
            let Some(analysis) = run_analysis(&snapshot, variable, &selection, &config)? else {
                return Ok(());
            };
            let contents = if json {
                report::build_json(&analysis, snapshot.stats())?
            } else {
                report::build_report(&analysis, snapshot.stats())
            };
            std::fs::write(&out, contents)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

/// Runs the analysis, printing a notice instead of failing when the selection
/// has no data.
fn run_analysis(
    snapshot: &Snapshot,
    variable: Variable,
    selection: &Selection,
    config: &EngineConfig,
) -> anyhow::Result<Option<VariableAnalysis>> {
    match analyze_variable(snapshot, variable, selection, config) {
        Ok(analysis) => Ok(Some(analysis)),
        Err(err) if err.is_data_sparsity() => {
            println!("{}", err);
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
