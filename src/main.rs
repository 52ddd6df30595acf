use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};

use storelens::dashboard;
use storelens::db;
use storelens::extract;
use storelens::fetch::{FetchClient, RetryConfig};
use storelens::table::Table;
use storelens::transform;

#[derive(Parser)]
#[command(name = "storelens", about = "Product catalog ETL + insights dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the product catalog into the raw CSV
    Extract {
        /// API base URL
        #[arg(long, default_value = extract::DEFAULT_BASE_URL)]
        base_url: String,
        /// Products per page request
        #[arg(short = 'n', long, default_value_t = extract::DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
    /// Clean the raw CSV into the fixed product schema
    Transform,
    /// Load the cleaned CSV into the SQLite store
    Load,
    /// Extract + transform + load in one pipeline
    Run {
        /// API base URL
        #[arg(long, default_value = extract::DEFAULT_BASE_URL)]
        base_url: String,
        /// Products per page request
        #[arg(short = 'n', long, default_value_t = extract::DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
    /// Show pipeline statistics
    Stats,
    /// Open the interactive dashboard
    Dashboard,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract {
            base_url,
            page_size,
        } => block_on(cmd_extract(&base_url, page_size)),
        Commands::Transform => cmd_transform(),
        Commands::Load => cmd_load(),
        Commands::Run {
            base_url,
            page_size,
        } => block_on(cmd_run(&base_url, page_size)),
        Commands::Stats => cmd_stats(),
        // eframe wants the main thread to itself; no runtime wraps it.
        Commands::Dashboard => dashboard::app::run(PathBuf::from(db::DB_PATH)),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn block_on<T>(
    future: impl std::future::Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::runtime::Runtime::new()?.block_on(future)
}

async fn cmd_extract(base_url: &str, page_size: usize) -> anyhow::Result<()> {
    let client = FetchClient::new(RetryConfig::default());
    let rows = extract::extract_products(
        &client,
        base_url,
        page_size,
        Path::new(extract::RAW_CSV),
    )
    .await?;
    println!("Extracted {} products -> {}", rows, extract::RAW_CSV);
    Ok(())
}

fn cmd_transform() -> anyhow::Result<()> {
    let (kept, dropped) = transform::transform_file(
        Path::new(extract::RAW_CSV),
        Path::new(transform::CLEAN_CSV),
    )?;
    println!(
        "Transform complete: {} rows kept, {} dropped -> {}",
        kept,
        dropped,
        transform::CLEAN_CSV
    );
    Ok(())
}

fn cmd_load() -> anyhow::Result<()> {
    let conn = db::connect(Path::new(db::DB_PATH))?;
    let rows = db::load_file(&conn, Path::new(transform::CLEAN_CSV))?;
    println!(
        "Loaded {} rows into {} (table: {})",
        rows,
        db::DB_PATH,
        db::PRODUCTS_TABLE
    );
    Ok(())
}

async fn cmd_run(base_url: &str, page_size: usize) -> anyhow::Result<()> {
    let t_extract = Instant::now();
    let client = FetchClient::new(RetryConfig::default());
    let rows = extract::extract_products(
        &client,
        base_url,
        page_size,
        Path::new(extract::RAW_CSV),
    )
    .await?;
    println!(
        "Extracted {} products in {:.1}s",
        rows,
        t_extract.elapsed().as_secs_f64()
    );

    let t_transform = Instant::now();
    let (kept, dropped) = transform::transform_file(
        Path::new(extract::RAW_CSV),
        Path::new(transform::CLEAN_CSV),
    )?;
    println!(
        "Transformed {} rows ({} dropped) in {:.1}s",
        kept,
        dropped,
        t_transform.elapsed().as_secs_f64()
    );

    let t_load = Instant::now();
    let conn = db::connect(Path::new(db::DB_PATH))?;
    let loaded = db::load_file(&conn, Path::new(transform::CLEAN_CSV))?;
    println!(
        "Loaded {} rows into {} in {:.1}s",
        loaded,
        db::DB_PATH,
        t_load.elapsed().as_secs_f64()
    );

    println!("\nOpen the dashboard with: storelens dashboard");
    Ok(())
}

fn cmd_stats() -> anyhow::Result<()> {
    println!("Raw rows:     {}", display_count(csv_row_count(Path::new(extract::RAW_CSV))));
    println!("Clean rows:   {}", display_count(csv_row_count(Path::new(transform::CLEAN_CSV))));

    let db_path = Path::new(db::DB_PATH);
    if db_path.exists() {
        let conn = db::connect(db_path)?;
        if db::table_exists(&conn, db::PRODUCTS_TABLE)? {
            let stats = db::get_stats(&conn)?;
            println!("Loaded rows:  {}", stats.products);
            println!(
                "Categories:   {}",
                stats
                    .categories
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".into())
            );
            match (stats.price_min, stats.price_max) {
                (Some(lo), Some(hi)) => println!("Price range:  {lo:.2} - {hi:.2}"),
                _ => println!("Price range:  -"),
            }
            return Ok(());
        }
    }
    println!("Loaded rows:  -");
    Ok(())
}

fn csv_row_count(path: &Path) -> Option<usize> {
    if !path.exists() {
        return None;
    }
    Table::read_csv(path).ok().map(|t| t.row_count())
}

fn display_count(value: Option<usize>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
