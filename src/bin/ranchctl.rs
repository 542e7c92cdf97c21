//! ranchctl: operator interface to the ranch engine.
//!
//! Reads JSON snapshots from disk and prints JSON results on stdout.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;

use ranch_engine::config::EngineConfig;
use ranch_engine::engine::{OccurrenceSeries, SchedulingCoordinator};
use ranch_engine::geo::{self, TrackPoint};
use ranch_engine::model::{Coordinate, Geofence, LocatedEntity, ScheduledEvent};
use ranch_engine::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "ranchctl", about = "Geospatial and scheduling queries over ranch snapshots")]
struct Cli {
    /// TOML config file (environment variables are used otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Great-circle distance between two points, in km
    Distance {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lon1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lon2: f64,
    },
    /// Entities within a radius of a point, nearest first
    Radius {
        /// JSON array of located entities
        #[arg(long)]
        entities: PathBuf,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long)]
        radius_km: f64,
    },
    /// Entities inside a geofence, or entry/exit alerts against a previous snapshot
    Geofence {
        /// JSON array of located entities
        #[arg(long)]
        entities: PathBuf,
        /// JSON geofence definition
        #[arg(long)]
        fence: PathBuf,
        /// Earlier snapshot; switches the output to transition alerts
        #[arg(long)]
        previous: Option<PathBuf>,
    },
    /// Expand an event's recurrence rule into its future dates
    Occurrences {
        /// JSON scheduled event carrying a recurrence rule
        #[arg(long)]
        event: PathBuf,
        /// Maximum dates to list (defaults to the configured cap)
        #[arg(long)]
        cap: Option<usize>,
    },
    /// Overdue alerts and urgency labels for a set of events
    Overdue {
        /// JSON array of scheduled events
        #[arg(long)]
        events: PathBuf,
        /// Evaluation time (RFC 3339); defaults to the current time
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
    /// Entity counts per grid cell
    Density {
        /// JSON array of located entities
        #[arg(long)]
        entities: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        cell_km: f64,
        /// Only list the busiest N cells
        #[arg(long)]
        top: Option<usize>,
    },
    /// Per-entity movement statistics from position reports
    Movement {
        /// JSON array of track points
        #[arg(long)]
        points: PathBuf,
    },
}

#[derive(Serialize)]
struct UrgencyReport {
    now: DateTime<Utc>,
    overdue: Vec<ranch_engine::alert::Alert>,
    feed: Vec<ranch_engine::engine::UrgencyLabel>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::from_env()?,
    };
    let guard = init_telemetry(TelemetryConfig::from_engine_config(&config))?;

    let result = run(cli.command, &config).await;
    guard.force_flush();
    result
}

async fn run(command: Command, config: &EngineConfig) -> anyhow::Result<()> {
    let coordinator = SchedulingCoordinator::new(config.coordinator());
    let proximity = config.proximity();

    match command {
        Command::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
        } => {
            let km = geo::distance_km(
                &Coordinate::new(lat1, lon1)?,
                &Coordinate::new(lat2, lon2)?,
            )?;
            print_json(&serde_json::json!({ "distance_km": km }))
        }
        Command::Radius {
            entities,
            lat,
            lon,
            radius_km,
        } => {
            let entities: Vec<LocatedEntity> = read_json(&entities).await?;
            let center = Coordinate::new(lat, lon)?;
            print_json(&proximity.within_radius(&entities, &center, radius_km)?)
        }
        Command::Geofence {
            entities,
            fence,
            previous,
        } => {
            let current: Vec<LocatedEntity> = read_json(&entities).await?;
            let fence: Geofence = read_json(&fence).await?;
            match previous {
                Some(path) => {
                    let previous: Vec<LocatedEntity> = read_json(&path).await?;
                    let alerts = geo::geofence_transitions(
                        std::slice::from_ref(&fence),
                        &previous,
                        &current,
                        Utc::now(),
                    )?;
                    print_json(&alerts)
                }
                None => print_json(&proximity.in_geofence(&current, &fence)?),
            }
        }
        Command::Occurrences { event, cap } => {
            let event: ScheduledEvent = read_json(&event).await?;
            let cap = cap.unwrap_or(config.occurrence_cap);
            print_json(&OccurrenceSeries::compute(&event, cap)?)
        }
        Command::Overdue { events, now } => {
            let events: Vec<ScheduledEvent> = read_json(&events).await?;
            let now = now.unwrap_or_else(Utc::now);
            print_json(&UrgencyReport {
                now,
                overdue: coordinator.overdue_alerts(&events, now),
                feed: coordinator.urgency_feed(&events, now),
            })
        }
        Command::Density {
            entities,
            cell_km,
            top,
        } => {
            let entities: Vec<LocatedEntity> = read_json(&entities).await?;
            let grid = geo::density_grid(&entities, cell_km)?;
            let mut cells = grid.to_cells();
            if let Some(n) = top {
                cells.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
                cells.truncate(n);
            }
            print_json(&cells)
        }
        Command::Movement { points } => {
            let points: Vec<TrackPoint> = read_json(&points).await?;
            print_json(&geo::movement_by_entity(&points)?)
        }
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
