//! Consensus monitor daemon: observes a validator network and republishes
//! its consensus progress to WebSocket subscribers.

use anyhow::Context;
use clap::Parser;
use cmon_monitor::{
    init_logging, DriveMode, LogFormat, MonitorConfig, MonitorDriver, MonitorMetrics,
    ShutdownController,
};
use cmon_upstream::{ChainSource, EventStream, HttpChainSource};
use cmon_websocket::{BroadcastHub, HubMetrics, WebSocketServer};
use prometheus::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Buffered upstream events between the subscription and the drive loop.
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

#[derive(Parser)]
#[command(name = "cmon-daemon", about = "Consensus monitor daemon")]
struct Cli {
    /// REST API base URL (staking registry).
    #[arg(short = 'a', long = "api", env = "CMON_API_URL")]
    api_url: Option<String>,

    /// Tendermint RPC base URL.
    #[arg(short = 'r', long = "rpc", env = "CMON_RPC_URL")]
    rpc_url: Option<String>,

    /// Port subscribers connect to (default 9001).
    #[arg(short = 'p', long = "port", env = "CMON_PORT")]
    port: Option<u16>,

    /// Drive strategy: "events" or "polled".
    #[arg(long, env = "CMON_MODE")]
    mode: Option<DriveMode>,

    /// Polled mode: delay between refreshes while the node is online.
    #[arg(long, env = "CMON_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Polled mode: delay between refreshes while the node is offline.
    #[arg(long, env = "CMON_OFFLINE_POLL_INTERVAL_MS")]
    offline_poll_interval_ms: Option<u64>,

    /// Upper bound on subscriber sends in flight per broadcast.
    #[arg(long, env = "CMON_MAX_CONCURRENT_SENDS")]
    max_concurrent_sends: Option<usize>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "CMON_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "CMON_LOG_FORMAT")]
    log_format: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "CMON_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Layer the flags over `base`.
    fn merge_into(self, base: MonitorConfig) -> MonitorConfig {
        MonitorConfig {
            api_url: self.api_url.unwrap_or(base.api_url),
            rpc_url: self.rpc_url.unwrap_or(base.rpc_url),
            listen_port: self.port.unwrap_or(base.listen_port),
            mode: self.mode.unwrap_or(base.mode),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(base.poll_interval_ms),
            offline_poll_interval_ms: self
                .offline_poll_interval_ms
                .unwrap_or(base.offline_poll_interval_ms),
            max_concurrent_sends: self
                .max_concurrent_sends
                .unwrap_or(base.max_concurrent_sends),
            log_level: self.log_level.unwrap_or(base.log_level),
            log_format: self.log_format.unwrap_or(base.log_format),
            ..base
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => MonitorConfig::from_toml_file(&path.to_string_lossy())
            .with_context(|| format!("loading config file {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    let config = cli.merge_into(file_config);
    config.validate()?;

    let log_format: LogFormat = config.log_format.parse()?;
    init_logging(log_format, &config.log_level)?;

    tracing::info!(
        "Starting consensus monitor in {} mode (API:{}, RPC:{}, WS:{})",
        config.mode,
        config.api_url,
        config.rpc_url,
        config.listen_port,
    );

    let registry = Registry::new();
    let monitor_metrics = MonitorMetrics::new(&registry);
    let source: Arc<dyn ChainSource> = Arc::new(HttpChainSource::new(config.http_source()));
    let hub = Arc::new(
        BroadcastHub::new(source.data_sources(), config.max_concurrent_sends)
            .with_metrics(HubMetrics::new(&registry)),
    );

    let driver = MonitorDriver::bootstrap(source, hub.clone(), monitor_metrics, &config)
        .await
        .context("cannot build the validator directory")?;

    let controller = ShutdownController::new();

    let server = WebSocketServer::new(config.listen_port, hub, registry);
    let server_stop = controller.signal();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.start(server_stop.triggered()).await {
            tracing::error!("WebSocket server error: {e}");
        }
    });

    let drive_handle = match config.mode {
        DriveMode::Polled => tokio::spawn(driver.run_polled(controller.signal())),
        DriveMode::Events => {
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let stream = EventStream::new(&config.rpc_url, config.reconnect_delay());
            tracing::info!("subscribing to events at {}", stream.url());
            tokio::spawn(stream.run(tx));
            tokio::spawn(driver.run_events(rx, controller.signal()))
        }
    };

    controller
        .supervise(controller.wait_for_signal(), drive_handle)
        .await;

    let _ = server_handle.await;
    tracing::info!("consensus monitor stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let cli = Cli::parse_from(["cmon-daemon", "-r", "http://cli:26657", "-p", "9100"]);
        let base = MonitorConfig {
            api_url: "http://file:1317".into(),
            rpc_url: "http://file:26657".into(),
            mode: DriveMode::Polled,
            ..Default::default()
        };
        let merged = cli.merge_into(base);
        assert_eq!(merged.api_url, "http://file:1317");
        assert_eq!(merged.rpc_url, "http://cli:26657");
        assert_eq!(merged.listen_port, 9100);
        assert_eq!(merged.mode, DriveMode::Polled);
    }

    #[test]
    fn mode_flag_parses() {
        let cli = Cli::parse_from(["cmon-daemon", "--mode", "polled"]);
        assert_eq!(cli.mode, Some(DriveMode::Polled));
    }
}
