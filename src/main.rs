use std::{
    net::SocketAddr,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Result};

use modsim::{
    config::{MonitorConfig, SimulatorConfig},
    monitor::{source::TcpRegisterSource, PollMonitor},
    server,
    storage::SlaveStorage,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "modsim.toml".to_string());
    let config = if Path::new(&config_path).exists() {
        SimulatorConfig::load(&config_path)?
    } else {
        log::info!("No config file at {config_path}, using defaults");
        SimulatorConfig::default()
    };

    let bind: SocketAddr = config
        .server
        .bind_address
        .parse()
        .map_err(|err| anyhow!("Invalid bind address {}: {err}", config.server.bind_address))?;

    let mut storage = SlaveStorage::new();
    server::apply_seeds(&mut storage, &config.server.seeds);
    let hub = storage.attach_hub();
    let storage = Arc::new(Mutex::new(storage));

    // Republish storage traffic as JSONL on stdout
    tokio::spawn(async move {
        while let Ok(notification) = hub.recv_async().await {
            match serde_json::to_string(&notification) {
                Ok(line) => println!("{line}"),
                Err(err) => log::warn!("Failed to serialize notification: {err}"),
            }
        }
    });

    for monitor_config in config.monitors.clone() {
        tokio::spawn(async move {
            if let Err(err) = run_monitor(monitor_config).await {
                log::error!("Monitor exited: {err}");
            }
        });
    }

    server::serve(bind, storage).await
}

async fn run_monitor(config: MonitorConfig) -> Result<()> {
    // Give a freshly started local slave time to bind before connecting
    tokio::time::sleep(Duration::from_millis(100)).await;

    let addr = config.socket_addr()?;
    let source = TcpRegisterSource::connect(addr, config.unit_id).await?;
    let monitor = PollMonitor::start(config, source)?;

    while let Ok(reading) = monitor.receiver().recv_async().await {
        match serde_json::to_string(&reading) {
            Ok(line) => println!("{line}"),
            Err(err) => log::warn!("Failed to serialize reading: {err}"),
        }
    }

    Ok(())
}
