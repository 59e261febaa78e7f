use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use photomap::{logging, BoundingBox, Catalog, Config, PhotoRecord, PhotoStore, ScanSummary};

enum Command {
    Scan,
    Query { bbox: BoundingBox, json: bool },
    Add { file: PathBuf },
    Status,
    Watch { interval_secs: Option<u64> },
}

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    print_help();
    std::process::exit(1);
}

fn parse_degrees(value: &str) -> f64 {
    value
        .parse()
        .unwrap_or_else(|_| fail(&format!("'{}' is not a coordinate in degrees", value)))
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut json = false;
    let mut interval_secs = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("photomap {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    fail("--config requires a path argument");
                }
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    interval_secs = Some(
                        args[i + 1]
                            .parse()
                            .unwrap_or_else(|_| fail("--interval requires a number of seconds")),
                    );
                    i += 1;
                } else {
                    fail("--interval requires a number of seconds");
                }
            }
            "--json" => json = true,
            arg if arg.starts_with('-') && arg.parse::<f64>().is_err() => {
                fail(&format!("Unknown argument: {}", arg));
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(String::as_str) {
        Some("scan") => Command::Scan,
        Some("status") => Command::Status,
        Some("watch") => Command::Watch { interval_secs },
        Some("add") => match positional.get(1) {
            Some(file) => Command::Add {
                file: PathBuf::from(file),
            },
            None => fail("add requires a file"),
        },
        Some("query") => {
            if positional.len() != 5 {
                fail("query requires MIN_LAT MIN_LON MAX_LAT MAX_LON");
            }
            let bbox = BoundingBox::from_degrees(
                parse_degrees(&positional[1]),
                parse_degrees(&positional[2]),
                parse_degrees(&positional[3]),
                parse_degrees(&positional[4]),
            )
            .unwrap_or_else(|e| fail(&e.to_string()));
            Command::Query { bbox, json }
        }
        Some(other) => fail(&format!("Unknown command: {}", other)),
        None => fail("missing command"),
    };

    Args {
        config_path,
        command,
    }
}

fn print_help() {
    println!(
        r#"photomap - catalogue of geo-tagged photos

USAGE:
    photomap [OPTIONS] <COMMAND>

COMMANDS:
    scan                                   Update the catalogue from disk
    query MIN_LAT MIN_LON MAX_LAT MAX_LON  List photos inside a bounding box
    add FILE                               Add a single photo
    status                                 Show scan roots and photo count
    watch                                  Rescan periodically

OPTIONS:
    --config, -c PATH   Path to config file
    --interval, -i N    Seconds between rescans in watch mode
    --json              Print query results as JSON
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    PHOTOMAP_CONFIG     Path to config file (overrides default location)
    PHOTOMAP_LOG        Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/photomap/config.toml"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    let config = match args.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let store = PhotoStore::open(&config.db_path, &config.scanner.roots)
        .context("Failed to open photo database")?;
    let catalog = Arc::new(Catalog::new(store.clone(), &config));

    match args.command {
        Command::Scan => {
            let summary = scan(&catalog).await?;
            print_summary(&summary);
        }
        Command::Query { bbox, json } => {
            fill(&catalog).await?;
            let mut photos = catalog.get_photos(&bbox);
            photos.sort_by(|a, b| a.directory().cmp(b.directory()).then(a.name().cmp(b.name())));
            if json {
                println!("{}", serde_json::to_string_pretty(&photos)?);
            } else {
                for photo in &photos {
                    print_photo(photo);
                }
            }
        }
        Command::Add { file } => match catalog.add_photo(&file) {
            Some(photo) => print_photo(&photo),
            None => bail!("No usable location found in {}", file.display()),
        },
        Command::Status => {
            println!("Database: {}", store.path().display());
            println!("Photos:   {}", store.photo_count()?);
            for root in store.scan_roots()? {
                println!("{:<12} {}", root.name, format_timestamp(root.last_scan));
            }
        }
        Command::Watch { interval_secs } => {
            let secs = interval_secs.unwrap_or(config.watch.interval_secs).max(1);
            watch(&catalog, Duration::from_secs(secs)).await?;
        }
    }

    Ok(())
}

async fn scan(catalog: &Arc<Catalog>) -> Result<ScanSummary> {
    let catalog = Arc::clone(catalog);
    let summary = tokio::task::spawn_blocking(move || catalog.create_or_update_index()).await?;
    Ok(summary)
}

async fn fill(catalog: &Arc<Catalog>) -> Result<()> {
    let catalog = Arc::clone(catalog);
    tokio::task::spawn_blocking(move || catalog.fill(None)).await?;
    Ok(())
}

async fn watch(catalog: &Arc<Catalog>, period: Duration) -> Result<()> {
    info!("Rescanning every {} seconds", period.as_secs());
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let summary = scan(catalog).await?;
                fill(catalog).await?;
                info!(
                    "Rescan done: {} photos added, {} directories removed",
                    summary.photos_added, summary.directories_removed
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                return Ok(());
            }
        }
    }
}

fn print_summary(summary: &ScanSummary) {
    println!("Roots scanned:          {}", summary.roots_completed);
    println!("Roots missing:          {}", summary.roots_missing);
    println!("Directories reindexed:  {}", summary.directories_reindexed);
    println!("Directories removed:    {}", summary.directories_removed);
    println!("Directories opted out:  {}", summary.directories_opted_out);
    if summary.directories_skipped > 0 {
        println!("Directories skipped:    {} (path not UTF-8)", summary.directories_skipped);
    }
    println!("Photos added:           {}", summary.photos_added);
    if summary.failures > 0 {
        println!("Failures:               {} (see log)", summary.failures);
    }
}

fn print_photo(photo: &PhotoRecord) {
    let direction = photo
        .direction()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:.7}\t{:.7}\t{}\t{}",
        photo.lat_degrees(),
        photo.lon_degrees(),
        direction,
        photo.path().display()
    );
}

fn format_timestamp(millis: i64) -> String {
    if millis == 0 {
        return "never".to_string();
    }
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}
