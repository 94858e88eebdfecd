use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use ulid::Ulid;

use courtside::api::{Api, AvailabilityQuery, BookingRequest, RescheduleRequest};
use courtside::auth::StaticTokens;
use courtside::compactor::{compact_if_due, run_compactor};
use courtside::config::Config;
use courtside::engine::Engine;
use courtside::store::{LocalStore, Store};

#[derive(Parser, Debug)]
#[command(name = "courtside", about = "Sport facility booking service")]
struct Cli {
    /// Overrides COURTSIDE_DATA_DIR.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the demo facility and court unless facilities already exist.
    Seed,
    /// List facilities with their units.
    Facilities,
    /// Free slots per unit for a facility type and day.
    Availability {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, default_value_t = 60)]
        duration_minutes: i64,
    },
    /// Book a unit as the token's subject.
    Book {
        #[arg(long)]
        token: String,
        #[arg(long)]
        unit: Ulid,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List the token subject's bookings.
    Bookings {
        #[arg(long)]
        token: String,
    },
    Cancel {
        #[arg(long)]
        token: String,
        #[arg(long)]
        id: Ulid,
    },
    Reschedule {
        #[arg(long)]
        token: String,
        #[arg(long)]
        id: Ulid,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
    },
    /// Rewrite the WAL down to the current state.
    Compact,
    /// Keep the store open, compacting in the background, until SIGINT/SIGTERM.
    Run,
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    courtside::observability::init(config.metrics_port);

    std::fs::create_dir_all(&config.data_dir)?;
    let wal_path = config.data_dir.join("courtside.wal");
    let store = Arc::new(LocalStore::open(&wal_path)?);
    let engine = Arc::new(
        Engine::new(store.clone())
            .with_opening_policy(config.opening_hours)
            .with_store_timeout(config.store_timeout),
    );
    let tokens = StaticTokens::new(config.tokens.clone());
    if tokens.is_empty() {
        tracing::warn!("no COURTSIDE_TOKENS configured; authenticated commands will be rejected");
    }
    let api = Api::new(engine.clone(), Arc::new(tokens));

    match cli.command {
        Command::Seed => {
            if !engine.list_facilities().await?.is_empty() {
                println!("Facilities already exist. Skipping seed.");
                return Ok(());
            }
            let facility = engine.create_facility("Badminton Court 1", "badminton").await?;
            let unit = engine.create_unit(facility.id, "Court A").await?;
            println!("Seeded facility {} with unit {}", facility.id, unit.id);
        }
        Command::Facilities => {
            #[derive(Serialize)]
            struct Listing {
                #[serde(flatten)]
                facility: courtside::model::Facility,
                units: Vec<courtside::model::ResourceUnit>,
            }
            let mut listings = Vec::new();
            for facility in api.list_facilities().await? {
                let units = api.list_units(facility.id).await?;
                listings.push(Listing { facility, units });
            }
            print_json(&listings)?;
        }
        Command::Availability {
            kind,
            date,
            duration_minutes,
        } => {
            let query = AvailabilityQuery {
                facility_kind: kind,
                date,
                duration_minutes,
            };
            print_json(&api.availability(&query).await?)?;
        }
        Command::Book {
            token,
            unit,
            start,
            end,
            notes,
        } => {
            let request = BookingRequest {
                unit_id: unit,
                start,
                end,
                notes,
            };
            print_json(&api.create_booking(Some(&bearer(&token)), request).await?)?;
        }
        Command::Bookings { token } => {
            print_json(&api.my_bookings(Some(&bearer(&token))).await?)?;
        }
        Command::Cancel { token, id } => {
            print_json(&api.cancel_booking(Some(&bearer(&token)), id).await?)?;
        }
        Command::Reschedule {
            token,
            id,
            start,
            end,
        } => {
            let request = RescheduleRequest { start, end };
            print_json(&api.reschedule_booking(Some(&bearer(&token)), id, request).await?)?;
        }
        Command::Compact => {
            store.compact().await?;
            println!("Compacted {}", wal_path.display());
        }
        Command::Run => run(store, &config).await?,
    }
    Ok(())
}

async fn run(store: Arc<LocalStore>, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("courtside running");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  facilities: {}", store.list_facilities().await?.len());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let compactor = tokio::spawn(run_compactor(
        store.clone(),
        config.compact_threshold,
        Duration::from_secs(30),
    ));

    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received");
    compactor.abort();
    compact_if_due(&store, config.compact_threshold).await?;
    info!("courtside stopped");
    Ok(())
}
