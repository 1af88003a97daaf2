use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};

mod cache;
mod dashboard;
mod db;
mod error;
mod export;
mod filter;
mod kpi;
mod models;
mod normalize;
mod ranking;
mod report;

use crate::cache::SnapshotCache;
use crate::dashboard::DashboardView;
use crate::db::{Snapshot, SourceConfig};
use crate::filter::{FilterParams, Selection};
use crate::kpi::TieBreak;
use crate::models::{ColumnMap, ServiceRecord};

#[derive(Parser)]
#[command(name = "lead-service-kpis")]
#[command(about = "KPI dashboard for sales-lead service records", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,
    /// Table holding the service records
    #[arg(long, env = "KPI_TABLE", default_value = db::DEFAULT_TABLE, global = true)]
    table: String,
    /// Read a CSV snapshot instead of Postgres
    #[arg(long, global = true)]
    csv: Option<PathBuf>,
    /// Newline-separated list of known agents, offered as filter choices
    #[arg(long, env = "KPI_AGENT_ROSTER", global = true)]
    roster: Option<PathBuf>,
    /// How ties for the top agent are resolved
    #[arg(
        long,
        env = "KPI_TIE_BREAK",
        value_enum,
        default_value_t = TieBreak::Lexicographic,
        global = true
    )]
    tie_break: TieBreak,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct FilterArgs {
    /// First day of the period (YYYY-MM-DD); defaults to the earliest record
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day of the period (YYYY-MM-DD); defaults to the latest record
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long)]
    project: Option<String>,
    #[arg(long)]
    agent: Option<String>,
}

impl FilterArgs {
    fn params(&self, records: &[ServiceRecord]) -> FilterParams {
        let mut params = FilterParams::covering(records)
            .with_project(Selection::from(self.project.as_deref()))
            .with_agent(Selection::from(self.agent.as_deref()));
        if let Some(start) = self.start {
            params.start = start;
        }
        if let Some(end) = self.end {
            params.end = end;
        }
        params
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print KPIs and rankings
    Summary {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Emit the full dashboard view as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export the filtered records as CSV
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = export::DEFAULT_EXPORT_NAME)]
        out: PathBuf,
    },
    /// List filter choices and the default period
    Options,
    /// Re-render the summary on a timer; press Enter to refresh immediately
    Watch {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(long, default_value_t = 15)]
        interval_secs: u64,
        #[arg(long, env = "KPI_CACHE_TTL_SECS", default_value_t = 15)]
        cache_ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_filename(".env.txt");
    }

    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let source = match &cli.csv {
        Some(path) => SourceConfig::CsvFile(path.clone()),
        None => SourceConfig::Postgres {
            database_url: cli.database_url.clone(),
            table: cli.table.clone(),
        },
    };
    let columns = ColumnMap::default();

    match &cli.command {
        Commands::Summary { filters, top, json } => {
            let snapshot = db::load_snapshot(&source, &columns).await;
            let params = filters.params(&snapshot.records);
            let view = DashboardView::build(&snapshot.records, params, cli.tie_break);
            if *json {
                let rendered = serde_json::to_string_pretty(&view)
                    .context("failed to serialize dashboard")?;
                println!("{rendered}");
            } else {
                print!("{}", report::build_report(&view, &snapshot, *top));
            }
        }
        Commands::Report { filters, top, out } => {
            let snapshot = db::load_snapshot(&source, &columns).await;
            let params = filters.params(&snapshot.records);
            let view = DashboardView::build(&snapshot.records, params, cli.tie_break);
            let report = report::build_report(&view, &snapshot, *top);
            std::fs::write(out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { filters, out } => {
            let snapshot = db::load_snapshot(&source, &columns).await;
            if let Some(notice) = &snapshot.notice {
                eprintln!("Warning: {notice}");
            }
            let params = filters.params(&snapshot.records);
            let filtered = filter::apply_filters(&snapshot.records, &params);
            let bytes = export::to_csv_bytes(&filtered, &columns)?;
            std::fs::write(out, bytes)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Exported {} records to {}.", filtered.len(), out.display());
        }
        Commands::Options => {
            let snapshot = db::load_snapshot(&source, &columns).await;
            if let Some(notice) = &snapshot.notice {
                eprintln!("Warning: {notice}");
            }
            let roster = match &cli.roster {
                Some(path) => read_roster(path)?,
                None => Vec::new(),
            };

            match filter::date_bounds(&snapshot.records) {
                Some((start, end)) => println!("Period: {start} to {end}"),
                None => println!("Period: no data yet"),
            }
            println!("Projects:");
            for project in filter::project_options(&snapshot.records) {
                println!("- {project}");
            }
            println!("Agents:");
            for agent in filter::agent_options(&snapshot.records, &roster) {
                println!("- {agent}");
            }
        }
        Commands::Watch {
            filters,
            top,
            interval_secs,
            cache_ttl_secs,
        } => {
            let mut cache = SnapshotCache::new(Duration::from_secs(*cache_ttl_secs));
            watch(
                &mut cache,
                &source,
                &columns,
                filters,
                *top,
                *interval_secs,
                cli.tie_break,
            )
            .await?;
        }
    }

    Ok(())
}

async fn watch(
    cache: &mut SnapshotCache,
    source: &SourceConfig,
    columns: &ColumnMap,
    filters: &FilterArgs,
    top: usize,
    interval_secs: u64,
    tie_break: TieBreak,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    info!(
        "refreshing every {}s (cache ttl {}s); press Enter to refresh now, Ctrl-C to stop",
        interval_secs.max(1),
        cache.ttl().as_secs()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            line = stdin.next_line(), if stdin_open => {
                match line.context("failed to read stdin")? {
                    Some(_) => cache.invalidate(),
                    // closed stdin leaves only the timer
                    None => {
                        stdin_open = false;
                        continue;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("stopping");
                return Ok(());
            }
        }

        let snapshot: Arc<Snapshot> = cache
            .get_or_load(|| db::load_snapshot(source, columns))
            .await;
        let params = filters.params(&snapshot.records);
        let view = DashboardView::build(&snapshot.records, params, tie_break);
        println!("{}", report::build_report(&view, &snapshot, top));
    }
}

fn read_roster(path: &Path) -> anyhow::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read agent roster {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
