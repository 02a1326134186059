//! Crewboard CLI - crew planning data from the terminal.
//!
//! Reads through the offline cache, so listings keep working without a
//! connection once the data has been fetched.

mod format;

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crewboard_core::models::EventKey;
use crewboard_core::{AppContext, Config};

/// Log file prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "crewboard.log";

const USAGE: &str = "\
Usage: crewboard <command>

Commands:
  events [YEAR]        List events of a year (default: current year)
  roster <EVENT_KEY>   Show the crew roster of an event
  waitlist <EVENT_KEY> Show the waiting list of an event
  positions            List crew positions
  clear-cache          Drop all locally cached data

Environment:
  CREWBOARD_API_URL    Override the API base URL
  CREWBOARD_TOKEN      Bearer token for the API
  RUST_LOG             Log filter (default: warn)";

enum Command {
    Events(Option<i32>),
    Roster(EventKey),
    Waitlist(EventKey),
    Positions,
    ClearCache,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let command = match args.first().map(String::as_str) {
        None | Some("help") | Some("--help") | Some("-h") => Command::Help,
        Some("events") => match args.get(1) {
            Some(year) => Command::Events(Some(
                year.parse().with_context(|| format!("Invalid year: {}", year))?,
            )),
            None => Command::Events(None),
        },
        Some("roster") => Command::Roster(event_key(args)?),
        Some("waitlist") => Command::Waitlist(event_key(args)?),
        Some("positions") => Command::Positions,
        Some("clear-cache") => Command::ClearCache,
        Some(other) => bail!("Unknown command: {}\n\n{}", other, USAGE),
    };
    Ok(command)
}

fn event_key(args: &[String]) -> Result<EventKey> {
    match args.get(1) {
        Some(key) if !key.trim().is_empty() => Ok(EventKey::new(key.trim())),
        _ => bail!("Missing event key\n\n{}", USAGE),
    }
}

/// Initialize the tracing subscriber, logging to a daily file in `log_dir`
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;
    if let Command::Help = command {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    if let Ok(url) = std::env::var("CREWBOARD_API_URL") {
        config.api_base_url = url;
    }
    let token = std::env::var("CREWBOARD_TOKEN").ok();

    let log_dir = config.cache_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create {}", log_dir.display()))?;
    let _guard = init_tracing(&log_dir);
    info!("Crewboard starting");

    let ctx = AppContext::from_config(&config, token).await?;
    run(&ctx, command).await
}

async fn run(ctx: &AppContext, command: Command) -> Result<()> {
    match command {
        Command::Events(year) => {
            let events = ctx.events_for_viewer(year).await?;
            if events.is_empty() {
                println!("No events.");
            }
            for event in &events {
                println!("{}", format::event_line(event));
            }
        }
        Command::Roster(key) => {
            let rows = ctx
                .crew_roster(&key)
                .await?
                .with_context(|| format!("Event not found: {}", key))?;
            for row in &rows {
                println!("{}", format::roster_line(row));
            }
        }
        Command::Waitlist(key) => {
            let rows = ctx
                .waiting_list(&key)
                .await?
                .with_context(|| format!("Event not found: {}", key))?;
            if rows.is_empty() {
                println!("Waiting list is empty.");
            }
            for row in &rows {
                println!("{}", format::roster_line(row));
            }
        }
        Command::Positions => {
            let mut positions: Vec<_> = ctx.positions_by_key().await?.into_values().collect();
            positions.sort_by(|a, b| b.prio.cmp(&a.prio).then_with(|| a.name.cmp(&b.name)));
            for position in positions {
                println!("{:>4}  {:<16} {}", position.prio, position.key, position.name);
            }
        }
        Command::ClearCache => {
            ctx.clear_local_cache().await?;
            println!("Local cache cleared.");
        }
        Command::Help => println!("{}", USAGE),
    }
    Ok(())
}
