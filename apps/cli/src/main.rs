//! Octopus Energy electricity tracker CLI.

mod commands;
mod config;
mod output;

use clap::{Parser, Subcommand};
use commands::SyncArgs;
use config::Config;
use octowatt_store::Store;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "octowatt")]
#[command(about = "Octopus Energy electricity tracker", version)]
struct Cli {
    /// Suppress non-error output (cron-friendly)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output as JSON
    #[arg(short, long, global = true)]
    json: bool,

    /// Path to SQLite database
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch account details and save the meter identity
    Init,
    /// Fetch consumption, rates and standing charges from the API
    Sync {
        /// Number of days to sync (default: smart resume or 30)
        #[arg(long)]
        days: Option<i64>,
        /// Start date (YYYY-MM-DD or RFC 3339)
        #[arg(long = "from")]
        from_date: Option<String>,
        /// End date (YYYY-MM-DD or RFC 3339)
        #[arg(long = "to")]
        to_date: Option<String>,
    },
    /// Check live demand and send alerts (lightweight, safe for 1-min cron)
    Demand,
    /// Show consumption data
    Usage {
        /// Number of days (default: 7)
        #[arg(long)]
        days: Option<i64>,
        /// Group by period: day, week or month
        #[arg(long)]
        group: Option<String>,
    },
    /// Show unit rates
    Rates {
        /// Number of days (default: 7)
        #[arg(long)]
        days: Option<i64>,
    },
    /// Calculate costs
    Cost {
        /// Number of days (default: 7)
        #[arg(long)]
        days: Option<i64>,
        /// Group by period: day, week or month (default: day)
        #[arg(long)]
        group: Option<String>,
    },
    /// Export all data to JSON
    Export {
        /// Output file path (default: octowatt_export.json)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Run Telegram bot listener (long-running)
    Bot,
}

fn init_logging(quiet: bool) {
    let directive = if quiet {
        "warn".to_string()
    } else {
        std::env::var("OCTOWATT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = Config::from_env(cli.db.as_deref());
    let store = Store::connect(&config.db_path).await?;

    match cli.command {
        Commands::Init => commands::cmd_init(&config, &store).await?,
        Commands::Sync {
            days,
            from_date,
            to_date,
        } => {
            commands::cmd_sync(
                &config,
                &store,
                SyncArgs {
                    days,
                    from_date,
                    to_date,
                },
                cli.quiet,
            )
            .await?
        }
        Commands::Demand => commands::cmd_demand(&config, &store).await?,
        Commands::Usage { days, group } => {
            commands::cmd_usage(&store, days, group, cli.json).await?
        }
        Commands::Rates { days } => commands::cmd_rates(&store, days, cli.json).await?,
        Commands::Cost { days, group } => {
            commands::cmd_cost(&store, days, group, cli.json).await?
        }
        Commands::Export { output } => commands::cmd_export(&store, output).await?,
        Commands::Bot => return commands::cmd_bot(&config, &store).await,
    }
    Ok(0)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    init_logging(cli.quiet);
    let quiet = cli.quiet;

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            if !quiet {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}
