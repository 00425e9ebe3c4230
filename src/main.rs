use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use dupegate::config::Config;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    // Initialize tracing; stdout carries decisions, so logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dupegate=info".into()),
        )
        .init();

    // Load configuration from CLI args, environment variables, and config file
    let config = Config::load().expect("Failed to load configuration");

    tracing::info!("Starting dupegate");
    match &config.database_path {
        Some(path) => tracing::info!("  Database: {}", path.display()),
        None => tracing::info!("  Database: in-memory"),
    }
    tracing::info!("  Volatile fields: {}", config.volatile_fields.join(", "));

    let detector = config.build_detector().expect("Failed to open entry store");

    let reader: Box<dyn BufRead> = match &config.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).expect("Failed to open input file"),
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read input line {}: {}", line_no, e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match detector.submit_json(&line) {
            Ok(decision) => {
                let mut value = json!(decision);
                value["line"] = json!(line_no);
                value
            }
            Err(e) => {
                tracing::warn!("Line {}: {}", line_no, e);
                json!({ "line": line_no, "error": e.to_string() })
            }
        };

        if let Err(e) = writeln!(out, "{}", outcome) {
            tracing::error!("Failed to write output: {}", e);
            break;
        }
    }

    match detector.report() {
        Ok(report) => {
            tracing::info!(
                "Processed {} records: {} added, {} duplicates, {} stored",
                report.stats.total_processed,
                report.stats.unique_added,
                report.stats.duplicates_rejected,
                report.total_stored
            );
            if let Err(e) = writeln!(out, "{}", json!({ "summary": report })) {
                tracing::error!("Failed to write summary: {}", e);
            }
        }
        Err(e) => tracing::error!("Failed to build report: {}", e),
    }
}
