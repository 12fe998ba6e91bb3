mod config;
mod db;
mod fetch;
mod geo;
mod parser;

use std::io::Read;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use config::{ExtractConfig, DEFAULT_URL};

#[derive(Parser)]
#[command(name = "noaa_precip", about = "CNRFC precipitation table scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a page and store its raw HTML
    Fetch {
        #[arg(default_value = DEFAULT_URL)]
        url: String,
        /// Skip the host allow-list check
        #[arg(long)]
        any_host: bool,
    },
    /// Extract records from stored pages not yet processed
    Process {
        /// Max pages to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[command(flatten)]
        config: ExtractConfig,
    },
    /// Fetch + extract one page
    Run {
        #[arg(default_value = DEFAULT_URL)]
        url: String,
        #[arg(long)]
        any_host: bool,
        #[command(flatten)]
        config: ExtractConfig,
    },
    /// Extract from a local HTML file (stdin when omitted) and print JSON
    Extract {
        file: Option<PathBuf>,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
        #[command(flatten)]
        config: ExtractConfig,
    },
    /// Join records to station coordinates and print a GeoJSON FeatureCollection
    Geojson {
        /// CSV with name,lat,long columns
        #[arg(long)]
        stations: PathBuf,
        /// Extract from this HTML file instead of the latest stored extraction
        #[arg(long)]
        html: Option<PathBuf>,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
        #[command(flatten)]
        config: ExtractConfig,
    },
    /// Records from the most recent successful extraction
    Show {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show fetch/extraction statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fetch { url, any_host } => {
            let (url, conn) = open_for_fetch(&url, any_host, &config::db_path())?;
            let client = fetch::build_client()?;
            let row = fetch::fetch_page(&client, &url).await;
            let page_id = db::insert_page(&conn, &row)?;
            match row.error {
                None => println!("Stored page {} from {}", page_id, row.url),
                Some(e) => println!("Fetch of {} failed: {}", row.url, e),
            }
            Ok(())
        }
        Commands::Process { limit, config } => {
            let conn = open_db(&config::db_path())?;
            let pages = db::fetch_unprocessed(&conn, limit)?;
            if pages.is_empty() {
                println!("No unprocessed pages. Run 'fetch' first.");
                return Ok(());
            }
            println!("Processing {} pages...", pages.len());
            let counts = process_pages(&conn, &pages, &config)?;
            counts.print();
            Ok(())
        }
        Commands::Run { url, any_host, config } => {
            let (url, conn) = open_for_fetch(&url, any_host, &config::db_path())?;
            let client = fetch::build_client()?;

            let t_fetch = Instant::now();
            let row = fetch::fetch_page(&client, &url).await;
            let page_id = db::insert_page(&conn, &row)?;
            let page = db::StoredPage::from_fetch(page_id, row)?;
            println!(
                "Fetched {} in {:.1}s",
                page.url,
                t_fetch.elapsed().as_secs_f64()
            );

            let result = parser::process_page(&page, &config);
            db::save_results(&conn, std::slice::from_ref(&result))?;
            match &result.outcome {
                Ok(extraction) => {
                    println!(
                        "Extracted {} records ({} lines skipped).",
                        extraction.records.len(),
                        extraction.skipped.len()
                    );
                    Ok(())
                }
                Err(e) => Err(anyhow::anyhow!("Extraction failed for {}: {}", page.url, e)),
            }
        }
        Commands::Extract { file, pretty, config } => {
            let html = read_input(file.as_ref())?;
            let extraction = parser::process_html(&html, &config)?;
            for skipped in &extraction.skipped {
                warn!("Skipped {}", skipped);
            }
            let json = if pretty {
                serde_json::to_string_pretty(&extraction)?
            } else {
                serde_json::to_string(&extraction)?
            };
            println!("{}", json);
            Ok(())
        }
        Commands::Geojson { stations, html, pretty, config } => {
            let stations = geo::load_station_coords(&stations)?;
            let records = match html {
                Some(path) => parser::process_html(&read_input(Some(&path))?, &config)?.records,
                None => {
                    let conn = open_db(&config::db_path())?;
                    let Some((page_id, _, _)) = db::latest_extracted_page(&conn)? else {
                        println!("No extracted pages. Run 'run' or 'process' first.");
                        return Ok(());
                    };
                    db::fetch_records(&conn, page_id, None)?
                        .into_iter()
                        .map(db::RecordRow::into_record)
                        .collect()
                }
            };

            let export = geo::station_features(&records, &stations);
            for id in &export.unmatched {
                warn!("No coordinates for station {}", id);
            }
            info!(
                "{} station features, {} records without coordinates",
                export.collection.features.len(),
                export.unmatched.len()
            );
            let json = if pretty {
                serde_json::to_string_pretty(&export.collection)?
            } else {
                serde_json::to_string(&export.collection)?
            };
            println!("{}", json);
            Ok(())
        }
        Commands::Show { limit } => {
            let conn = open_db(&config::db_path())?;
            let Some((page_id, url, extracted_at)) = db::latest_extracted_page(&conn)? else {
                println!("No extracted pages. Run 'run' or 'process' first.");
                return Ok(());
            };
            let rows = db::fetch_records(&conn, page_id, Some(limit))?;

            println!("{} (extracted {})\n", url, extracted_at);
            println!("{:>3} | {:<10} | {:<28} | {}", "#", "ID", "Name", "Precip");
            println!("{}", "-".repeat(72));
            for r in &rows {
                println!(
                    "{:>3} | {:<10} | {:<28} | {}",
                    r.position + 1,
                    truncate(&r.station_id, 10),
                    truncate(&r.name, 28),
                    r.precip_buckets.join(" / ")
                );
            }
            println!("\n{} records shown", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&config::db_path())?;
            let s = db::get_stats(&conn)?;
            println!("Pages:          {}", s.pages);
            println!("Fetch errors:   {}", s.fetch_errors);
            println!("Unprocessed:    {}", s.unprocessed);
            println!("Extracted:      {}", s.extracted);
            println!("Extract errors: {}", s.extract_errors);
            println!("Records:        {}", s.records);
            println!("Skipped lines:  {}", s.skipped);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Done in {}", format_duration(elapsed));
    }

    result
}

fn open_db(path: &str) -> anyhow::Result<rusqlite::Connection> {
    let conn = db::connect(path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

/// The URL is checked first: a rejected URL never creates the database.
fn open_for_fetch(
    url: &str,
    any_host: bool,
    db_path: &str,
) -> anyhow::Result<(reqwest::Url, rusqlite::Connection)> {
    let url = fetch::check_url(url, any_host)?;
    let conn = open_db(db_path)?;
    Ok((url, conn))
}

fn read_input(file: Option<&PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut html = String::new();
            std::io::stdin()
                .read_to_string(&mut html)
                .context("Failed to read stdin")?;
            Ok(html)
        }
    }
}

#[derive(Default)]
struct ProcessCounts {
    pages: usize,
    failed: usize,
    records: usize,
    skipped: usize,
}

impl ProcessCounts {
    fn add(&mut self, result: &parser::PageResult) {
        self.pages += 1;
        match &result.outcome {
            Ok(extraction) => {
                self.records += extraction.records.len();
                self.skipped += extraction.skipped.len();
            }
            Err(e) => {
                warn!("Page {} ({}): {}", result.page_id, result.url, e);
                self.failed += 1;
            }
        }
    }

    fn print(&self) {
        println!(
            "Processed {} pages ({} failed): {} records, {} skipped lines.",
            self.pages, self.failed, self.records, self.skipped,
        );
    }
}

fn process_pages(
    conn: &rusqlite::Connection,
    pages: &[db::StoredPage],
    config: &ExtractConfig,
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts::default();

    for chunk in pages.chunks(50) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|page| parser::process_page(page, config))
            .collect();

        for result in &results {
            counts.add(result);
        }
        db::save_results(conn, &results)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    info!(
        "Processed {} pages: {} records, {} failed",
        counts.pages, counts.records, counts.failed
    );
    Ok(counts)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_extract_flags() {
        let cli = Cli::parse_from([
            "noaa_precip",
            "extract",
            "page.html",
            "--pretty",
            "--header-lines",
            "2",
        ]);
        match cli.command {
            Commands::Extract { file, pretty, config } => {
                assert_eq!(file, Some(PathBuf::from("page.html")));
                assert!(pretty);
                assert_eq!(config.header_lines, 2);
            }
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn run_defaults_to_cnrfc() {
        let cli = Cli::parse_from(["noaa_precip", "run"]);
        match cli.command {
            Commands::Run { url, any_host, config } => {
                assert_eq!(url, DEFAULT_URL);
                assert!(!any_host);
                assert_eq!(config, ExtractConfig::default());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn cli_parses_geojson() {
        let cli = Cli::parse_from([
            "noaa_precip",
            "geojson",
            "--stations",
            "coords.csv",
            "--html",
            "page.html",
        ]);
        match cli.command {
            Commands::Geojson { stations, html, pretty, .. } => {
                assert_eq!(stations, PathBuf::from("coords.csv"));
                assert_eq!(html, Some(PathBuf::from("page.html")));
                assert!(!pretty);
            }
            _ => panic!("expected geojson"),
        }
    }

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn rejected_url_leaves_no_database() {
        let dir = std::env::temp_dir().join(format!("noaa_precip_reject_{}", std::process::id()));
        let db_path = dir.join("precip.sqlite");
        let db_path = db_path.to_str().unwrap();

        assert!(open_for_fetch("https://example.com/", false, db_path).is_err());
        assert!(open_for_fetch("ftp://www.cnrfc.noaa.gov/", true, db_path).is_err());
        assert!(!dir.exists());
    }

    #[test]
    fn accepted_url_opens_database() {
        let dir = std::env::temp_dir().join(format!("noaa_precip_accept_{}", std::process::id()));
        let db_path = dir.join("precip.sqlite");

        let (url, conn) =
            open_for_fetch(DEFAULT_URL, false, db_path.to_str().unwrap()).unwrap();
        assert_eq!(url.host_str(), Some("www.cnrfc.noaa.gov"));
        assert!(db_path.exists());
        drop(conn);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn truncate_long_names() {
        assert_eq!(truncate("Station Alpha", 20), "Station Alpha");
        assert_eq!(truncate("Station Alpha", 7), "Station...");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(std::time::Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(std::time::Duration::from_secs(3725)), "1h 2m 5s");
    }
}
