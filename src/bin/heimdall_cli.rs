use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use structopt::StructOpt;

use heimdall::buffer::EventBuffer;
use heimdall::compliance::ComplianceReporter;
use heimdall::config::Config;
use heimdall::models::{ComplianceFlag, EventType, ThreatLevel};
use heimdall::persistence::{EventStore, SqliteEventStore};
use heimdall::query::SecurityQuery;

/// Security event engine command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "heimdall", about = "Security event engine CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Show recent events from the durable log
    Recent {
        /// Path to the event database
        #[structopt(long, default_value = "heimdall.db")]
        db: PathBuf,
        /// Restrict to a single event type
        #[structopt(short = "t", long)]
        event_type: Option<EventType>,
        /// Number of events to show
        #[structopt(short, long, default_value = "20")]
        limit: usize,
    },
    /// List suspicious origin addresses
    Origins {
        #[structopt(long, default_value = "heimdall.db")]
        db: PathBuf,
        /// Risk score threshold
        #[structopt(short, long, default_value = "70")]
        risk_threshold: u8,
        #[structopt(short, long, default_value = "24")]
        lookback_hours: i64,
    },
    /// Show aggregate security metrics
    Metrics {
        #[structopt(long, default_value = "heimdall.db")]
        db: PathBuf,
        /// Trailing window in days
        #[structopt(short, long, default_value = "7")]
        days: i64,
    },
    /// Produce a compliance report
    Report {
        #[structopt(long, default_value = "heimdall.db")]
        db: PathBuf,
        /// Period start (YYYY-MM-DD)
        #[structopt(long)]
        from: String,
        /// Period end (YYYY-MM-DD), inclusive
        #[structopt(long)]
        to: String,
        /// Restrict to one compliance flag
        #[structopt(short, long)]
        flag: Option<ComplianceFlag>,
    },
    /// Show the threat indicator watchlist
    Watchlist {
        #[structopt(long, default_value = "heimdall.db")]
        db: PathBuf,
        /// Minimum threat level to show
        #[structopt(short, long, default_value = "low")]
        min_level: ThreatLevel,
        /// Include deactivated indicators
        #[structopt(long)]
        include_inactive: bool,
    },
    /// Show origins flagged by the rate anomaly procedure
    Anomalies {
        #[structopt(long, default_value = "heimdall.db")]
        db: PathBuf,
        #[structopt(short, long, default_value = "24")]
        lookback_hours: i64,
        /// Multiples of the mean per-origin rate before an origin is flagged
        #[structopt(short, long, default_value = "2.0")]
        sensitivity: f64,
    },
}

fn open_query(db: &PathBuf) -> Result<SecurityQuery, Box<dyn std::error::Error>> {
    let store: Arc<dyn EventStore> = Arc::new(SqliteEventStore::new(db)?);
    Ok(SecurityQuery::new(Arc::new(EventBuffer::new()), store))
}

fn parse_day(s: &str) -> Result<chrono::DateTime<Utc>, Box<dyn std::error::Error>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")?;
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or("invalid time of day")?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Recent {
            db,
            event_type,
            limit,
        } => {
            let query = open_query(&db)?;
            let result = query.recent_events(event_type, limit);
            if result.degraded {
                eprintln!("warning: durable store unreachable, result is partial");
            }
            println!("{} event(s):\n", result.value.len());
            for event in &result.value {
                println!(
                    "  {} [{}] origin: {}, risk: {}, instance: {}",
                    event.created_at.to_rfc3339(),
                    event.event_type,
                    event.origin_address,
                    event.risk_score,
                    event.server_instance,
                );
            }
        }
        Cli::Origins {
            db,
            risk_threshold,
            lookback_hours,
        } => {
            let query = open_query(&db)?;
            let result = query.suspicious_origins(risk_threshold, lookback_hours);
            if result.degraded {
                eprintln!("warning: durable store unreachable, result is partial");
            }
            for origin in &result.value {
                println!("{}", origin);
            }
        }
        Cli::Metrics { db, days } => {
            let query = open_query(&db)?;
            let result = query.metrics(days);
            if result.degraded {
                eprintln!("warning: durable store unreachable, result is partial");
            }
            println!("{}", serde_json::to_string_pretty(&result.value)?);
        }
        Cli::Report { db, from, to, flag } => {
            let store: Arc<dyn EventStore> = Arc::new(SqliteEventStore::new(&db)?);
            let reporter = ComplianceReporter::new(store);
            let period_start = parse_day(&from)?;
            // End of the named day, so the range is inclusive.
            let period_end = parse_day(&to)? + chrono::Duration::days(1)
                - chrono::Duration::milliseconds(1);
            let report = reporter.report(period_start, period_end, flag)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Cli::Watchlist {
            db,
            min_level,
            include_inactive,
        } => {
            let store: Arc<dyn EventStore> = Arc::new(SqliteEventStore::new(&db)?);
            let indicators = store.list_indicators(min_level, !include_inactive)?;
            println!("{} indicator(s):\n", indicators.len());
            for indicator in &indicators {
                println!(
                    "  [{}] {} = {} (confidence {}, source {}{})",
                    indicator.threat_level,
                    indicator.indicator_type,
                    indicator.indicator_value,
                    indicator.confidence_score,
                    indicator.source,
                    if indicator.is_active { "" } else { ", inactive" },
                );
            }
        }
        Cli::Anomalies {
            db,
            lookback_hours,
            sensitivity,
        } => {
            let query = open_query(&db)?;
            let result = query.rate_anomalies(lookback_hours, sensitivity);
            if result.degraded {
                eprintln!("warning: anomaly procedure unavailable");
            }
            println!("{}", serde_json::to_string_pretty(&result.value)?);
        }
    }

    Ok(())
}
