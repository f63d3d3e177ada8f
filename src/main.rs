// src/main.rs
use anyhow::{Context, Result};
use quantframe::config::AppConfig;
use quantframe::connectors::create_exchange;
use quantframe::core::engine::TradingEngine;
use quantframe::core::shutdown::ShutdownCoordinator;
use quantframe::logging;
use quantframe::status::server::WebSocketHub;
use quantframe::status::{LogSink, StatusSink};
use quantframe::strategies::create_strategy;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::new().context("loading configuration")?;
    let _log_guard = logging::init(&config.logging).context("initializing logging")?;

    // Logged here so the file writer guard is still alive.
    let result = trade(config).await;
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

async fn trade(config: AppConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        symbol = %config.engine.symbol,
        exchange = ?config.exchange.kind,
        strategy = %config.strategy.kind,
        mode = if config.engine.live_trading { "live" } else { "paper" },
        "Starting quantframe"
    );
    if config.engine.live_trading {
        warn!("Live trading enabled: orders go to the exchange");
    }

    let coordinator = ShutdownCoordinator::new();
    let _signals = coordinator
        .listen_for_signals()
        .context("installing signal handlers")?;

    let exchange = create_exchange(
        &config.exchange,
        config.engine.live_trading,
        config.strategy.initial_balance,
    )?;
    let strategy = create_strategy(&config.strategy.kind)?;
    let sink: Box<dyn StatusSink> = if config.status.enabled {
        Box::new(WebSocketHub::new(config.status.clone()))
    } else {
        Box::new(LogSink)
    };

    let mut engine = TradingEngine::new(
        config.engine.symbol.clone(),
        config.engine.poll_interval(),
        exchange,
        strategy,
        sink,
    );
    engine
        .bootstrap(&config.exchange, &config.strategy)
        .await
        .context("bootstrapping engine")?;

    engine.run(coordinator.signal()).await;
    engine.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}
