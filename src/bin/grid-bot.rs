// Grid Order Bot - CLI entry point
// Single entry point for running and inspecting grids

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use grid_order_bot::{
    AlpacaClient, Config, GridOrderManager, GridTradingStrategy, JsonFileStore, StateStore,
    TradingError,
};

const STATE_PATH: &str = "data/grid_state.json";

#[derive(Parser)]
#[command(name = "grid-bot")]
#[command(version = "0.3.0")]
#[command(about = "Grid trading order manager for Alpaca", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and workspace
    Init,

    /// Run the grid trading loop
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Show grid status from the persisted state file
    Status {
        /// Limit output to one symbol
        symbol: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging first (before config load so we can see config errors)
    let log_level = if cli.verbose { "debug" } else { "info" };
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", log_level);
    }
    tracing_subscriber::fmt::init();

    info!("🚀 Grid Order Bot v0.3.0");
    info!("📁 Config: {}", cli.config);

    match cli.command {
        // Init doesn't require config (it creates it)
        Commands::Init => {
            init_workspace(&cli.config)?;
        }

        // Status reads only the state file, no broker credentials needed
        Commands::Status { symbol } => {
            show_status(symbol.as_deref())?;
        }

        Commands::Run { once } => {
            let config = load_config_or_exit(&cli.config);
            run_loop(config, once).await?;
        }
    }

    Ok(())
}

/// Load config or exit with helpful error message
fn load_config_or_exit(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            let err: TradingError = e.into();
            error!("❌ Configuration Error");
            error!("{}", err.user_message());
            std::process::exit(1);
        }
    }
}

fn init_workspace(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    use std::fs;

    info!("🔧 Initializing workspace...");

    fs::create_dir_all("data")?;
    fs::create_dir_all("logs")?;

    if !std::path::Path::new(config_path).exists() {
        Config::default().to_file(config_path)?;
        info!("📝 Created {}", config_path);
    } else {
        warn!("⚠️  {} already exists, skipping", config_path);
    }

    info!("✅ Workspace initialized successfully!");
    info!("💡 Next steps:");
    info!("   1. Edit config.toml with your Alpaca API keys");
    info!("   2. Run: grid-bot run --once");
    info!("   3. Run: grid-bot status");

    Ok(())
}

async fn run_loop(config: Config, once: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !config.grid.enabled {
        warn!("grid trading is disabled in config, nothing to do");
        return Ok(());
    }

    let broker = Arc::new(AlpacaClient::new(&config.api));
    let store = JsonFileStore::new(STATE_PATH)?;
    let mut manager = GridOrderManager::new(broker.clone(), Box::new(store));
    let strategy = GridTradingStrategy::new(config.grid.clone(), broker);

    info!(
        symbols = %config.grid.symbols,
        interval_minutes = config.grid.check_interval_minutes,
        "starting grid trading loop"
    );

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(
        config.grid.check_interval_minutes * 60,
    ));

    loop {
        interval.tick().await;

        let report = strategy.run_grid_cycle(&mut manager).await;

        if config.logging.enable_cycle_logging {
            match serde_json::to_string(&report) {
                Ok(json) => info!(cycle = %json, "grid cycle complete"),
                Err(e) => warn!(error = %e, "failed to encode cycle report"),
            }
        }

        if config.logging.enable_order_logging {
            for view in manager.get_grid_summary() {
                info!(
                    symbol = %view.symbol,
                    status = ?view.status,
                    open_buys = view.open_buy_orders,
                    open_sells = view.open_sell_orders,
                    filled = view.filled_positions,
                    invested = view.total_invested,
                    profit = view.realized_profit,
                    "grid status"
                );
            }
        }

        if once {
            info!("single cycle requested, exiting");
            break;
        }
    }

    Ok(())
}

/// Read-only view over the persisted state, safe while the bot is running.
fn show_status(symbol: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonFileStore::new(STATE_PATH)?;
    let grids = store.load()?;

    if grids.is_empty() {
        info!("📊 No grids found. Run: grid-bot run");
        return Ok(());
    }

    info!("📊 Grid Status");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut symbols: Vec<&String> = grids.keys().collect();
    symbols.sort();

    for sym in symbols {
        if let Some(filter) = symbol {
            if sym != filter {
                continue;
            }
        }
        let view = grid_order_bot::GridStatusView::of(&grids[sym]);
        info!(
            "  {} [{:?}] center={:.2} buys={} sells={} filled={} invested={:.2} profit={:.2}",
            view.symbol,
            view.status,
            view.center_price,
            view.open_buy_orders,
            view.open_sell_orders,
            view.filled_positions,
            view.total_invested,
            view.realized_profit,
        );
    }

    Ok(())
}
