//! sqlstage - database calls composed from connection, retry, transaction and cache stages

use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlstage_db::QueryParam;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod config;

use config::{Config, LoggingConfig};

/// sqlstage - run user queries through a stage pipeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// SQLite database file
    #[arg(long, env = "SQLSTAGE_DATABASE")]
    database: Option<String>,

    /// Log level (overrides the config file; RUST_LOG wins over both)
    #[arg(long, env = "SQLSTAGE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the effective configuration to the config path
    InitConfig,

    /// Upsert users from a CSV file with name, email and age columns
    Seed {
        /// CSV file path
        csv: String,
    },

    /// Print the first user with the given age
    UserByAge { age: f64 },

    /// Change a user's email inside a transaction
    UpdateEmail { user_id: String, email: String },

    /// Print every user, retrying on failure
    FetchUsers {
        /// Maximum number of attempts (overrides the config file)
        #[arg(long)]
        retries: Option<u32>,

        /// Delay between attempts in milliseconds (overrides the config file)
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Run literal query text through the cached pipeline
    Query {
        sql: String,

        /// Value for the next `?` placeholder (repeatable, in order)
        #[arg(long = "param")]
        params: Vec<QueryParam>,

        /// Number of times to run the query
        #[arg(long, default_value_t = 2)]
        repeat: u32,

        /// Pause between runs in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },

    /// Stream users in batches, printing those older than --min-age
    Stream {
        #[arg(long, default_value_t = 10)]
        batch_size: usize,

        #[arg(long, default_value_t = 25.0)]
        min_age: f64,
    },

    /// Print users page by page
    Paginate {
        #[arg(long, default_value_t = 100)]
        page_size: i64,
    },

    /// Print the average user age
    AverageAge,

    /// Fetch all users and older users concurrently
    Concurrent {
        #[arg(long, default_value_t = 40.0)]
        min_age: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let (mut config, found) = Config::load(&args.config)?;
    if let Some(database) = args.database {
        config.database.path = database;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting sqlstage v{}", env!("CARGO_PKG_VERSION"));
    if found {
        info!("Loaded configuration from {}", args.config);
    } else {
        info!("Config file not found at {}, using defaults", args.config);
    }

    match args.command {
        Command::InitConfig => config.save(&args.config),
        Command::Seed { csv } => commands::seed(&config, &csv).await,
        Command::UserByAge { age } => commands::user_by_age(&config, age).await,
        Command::UpdateEmail { user_id, email } => {
            commands::update_email(&config, user_id, email).await
        }
        Command::FetchUsers { retries, delay_ms } => {
            if let Some(retries) = retries {
                config.retry.retries = retries;
            }
            if let Some(delay_ms) = delay_ms {
                config.retry.delay_ms = delay_ms;
            }
            commands::fetch_users(&config).await
        }
        Command::Query {
            sql,
            params,
            repeat,
            interval_ms,
        } => commands::query(&config, &sql, &params, repeat, interval_ms).await,
        Command::Stream {
            batch_size,
            min_age,
        } => commands::stream(&config, batch_size, min_age).await,
        Command::Paginate { page_size } => commands::paginate(&config, page_size).await,
        Command::AverageAge => commands::average_age(&config).await,
        Command::Concurrent { min_age } => commands::concurrent(&config, min_age).await,
    }
}

/// Initialize logging on stderr; stdout carries results
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
