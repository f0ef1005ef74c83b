use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use store::{Event, EventStore};

/// Loads a CSV export of events directly into the store, bypassing the
/// dedup cache and work queue: an operator-run batch load of a
/// known-deduplicated export has no use for the online path's machinery.
#[derive(Parser, Debug)]
#[command(name = "import-cli", about = "Bulk-load a CSV file of events into the event store")]
struct Args {
    /// Path to the CSV file to import.
    csv_path: PathBuf,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, default_value_t = 5)]
    database_max_connections: u32,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    event_id: Uuid,
    user_id: String,
    event_type: String,
    occurred_at: DateTime<Utc>,
    #[serde(default)]
    properties: Option<String>,
}

fn setup_tracing() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_tracing();
    let args = Args::parse();

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
            }
        });
    }

    let row_count = match count_rows(&args.csv_path) {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, path = ?args.csv_path, "failed to read csv file");
            return ExitCode::FAILURE;
        }
    };

    let store = match EventStore::connect(&args.database_url, args.database_max_connections).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to connect to the event store");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = store.migrate().await {
        error!(error = %e, "failed to run store migrations");
        return ExitCode::FAILURE;
    }

    let progress = ProgressBar::new(row_count as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} rows ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut reader = match csv::Reader::from_path(&args.csv_path) {
        Ok(reader) => reader,
        Err(e) => {
            error!(error = %e, path = ?args.csv_path, "failed to open csv file");
            return ExitCode::FAILURE;
        }
    };

    let mut failed = 0u64;
    let mut inserted = 0u64;

    for result in reader.deserialize::<CsvRow>() {
        if interrupted.load(Ordering::SeqCst) {
            warn!("interrupted, stopping import");
            progress.finish_and_clear();
            return ExitCode::from(130);
        }

        let row = match result {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "failed to parse csv row");
                failed += 1;
                progress.inc(1);
                continue;
            }
        };

        let properties = match row.properties {
            Some(raw) if !raw.is_empty() => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, event_id = %row.event_id, "failed to parse properties json");
                    failed += 1;
                    progress.inc(1);
                    continue;
                }
            },
            _ => serde_json::json!({}),
        };

        let event = Event {
            event_id: row.event_id,
            user_id: row.user_id,
            event_type: row.event_type,
            occurred_at: row.occurred_at,
            properties,
        };

        match store.insert_one(&event).await {
            Ok(_) => inserted += 1,
            Err(e) => {
                warn!(error = %e, event_id = %event.event_id, "failed to insert event");
                failed += 1;
            }
        }
        progress.inc(1);
    }

    progress.finish_and_clear();
    info!(inserted, failed, "import complete");

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn count_rows(path: &PathBuf) -> Result<usize, csv::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut count = 0;
    for result in reader.records() {
        result?;
        count += 1;
    }
    Ok(count)
}
