use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use catalog_import::database_ops::db::Db;
use catalog_import::database_ops::memory::MemoryCatalog;
use catalog_import::database_ops::stores::CategoryStore;
use catalog_import::import::config::load_badges;
use catalog_import::import::csv_source::read_rows;
use catalog_import::import::{BatchImporter, ImportConfig, ImportReport, ReportStatus};
use catalog_import::util::env;
use catalog_import::util::tracing::init_tracing;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "import_products", version, about = "Bulk product import from a CSV export of the product template")]
struct Cli {
    /// CSV file with the template header row
    file: PathBuf,
    /// Optional override for the database URL
    #[arg(long)]
    db_url: Option<String>,
    /// JSON badge corpus (overrides IMPORT_BADGES_FILE)
    #[arg(long)]
    badges: Option<PathBuf>,
    /// Fuzzy acceptance threshold (overrides IMPORT_FUZZY_THRESHOLD)
    #[arg(long)]
    threshold: Option<f64>,
    /// Resolve and validate against the live category list without writing anything
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // .env first so a RUST_LOG set there reaches the filter
    env::init_env();
    init_tracing("catalog_import=info,import_products=info")?;
    env::bootstrap_cli("import_products");
    let cli = Cli::parse();
    env::preflight_check(
        "import_products",
        &[],
        &["DATABASE_URL", "IMPORT_FUZZY_THRESHOLD", "IMPORT_BADGES_FILE", "AUTO_MIGRATE"],
    )?;

    let mut config = ImportConfig::from_env()?;
    if let Some(path) = &cli.badges {
        config.badges = load_badges(path)?;
    }
    if let Some(t) = cli.threshold {
        config.similarity_threshold = t;
    }
    config.validate()?;

    let file = File::open(&cli.file).with_context(|| format!("opening {}", cli.file.display()))?;
    let rows = read_rows(BufReader::new(file))?;
    info!(rows = rows.len(), file = %cli.file.display(), "loaded import rows");

    let database_url = match cli.db_url {
        Some(url) => url,
        None => env::db_url().context("Database URL not configured; set DATABASE_URL")?,
    };
    let max_connections = env::env_parse("DB_MAX_CONNECTIONS", 4u32);
    let db = if cli.dry_run {
        Db::connect_no_migrate(&database_url, max_connections).await?
    } else {
        Db::connect(&database_url, max_connections).await?
    };

    let report = if cli.dry_run {
        let scratch = MemoryCatalog::new(db.list().await.context("fetching category corpus")?);
        let importer = BatchImporter::prepare(&scratch, &config, &scratch, &scratch).await?;
        importer.run(rows).await
    } else {
        let importer = BatchImporter::prepare(&db, &config, &db, &db).await?;
        importer.run(rows).await
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, cli.dry_run);
    }

    Ok(match report.status() {
        ReportStatus::FullSuccess => ExitCode::SUCCESS,
        ReportStatus::PartialSuccess => ExitCode::from(2),
        ReportStatus::TotalFailure => ExitCode::FAILURE,
    })
}

fn print_summary(report: &ImportReport, dry_run: bool) {
    let label = match report.status() {
        ReportStatus::FullSuccess => "import complete",
        ReportStatus::PartialSuccess => "import finished with errors",
        ReportStatus::TotalFailure => "import failed",
    };
    let suffix = if dry_run { " (dry run, nothing written)" } else { "" };
    println!(
        "{label}{suffix}: {} imported, {} failed ({} partially saved)",
        report.success_count, report.error_count, report.partial_count
    );
    for e in &report.errors {
        println!("  row {:>4} [{:?}] {}", e.row, e.kind, e.message);
    }
    for n in &report.notes {
        println!("  row {:>4} note: {}", n.row, n.message);
    }
    for w in &report.warnings {
        println!("  row {:>4} warning: {}", w.row, w.message);
    }
}
