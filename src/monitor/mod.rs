pub mod source;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::config::{MonitorConfig, RegisterType};
use source::RegisterSource;

const MAX_CONSECUTIVE_ERRORS: u32 = 10;
const ERROR_RECOVERY_DELAY: Duration = Duration::from_secs(5);

/// One polled register block, timestamped and ready to republish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointReading {
    pub unit_id: u8,
    pub register: RegisterType,
    pub register_address: u16,
    pub values: Vec<u16>,
    pub timestamp: String,
}

/// Shared stop flag for a running monitor.
#[derive(Clone)]
pub struct MonitorControl {
    running: Arc<AtomicBool>,
}

impl MonitorControl {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the poll loop to exit; takes effect at the next poll round.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Liveness snapshot of a monitor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthState {
    pub healthy: bool,
    pub last_success: Option<String>,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
}

/// Handle to a running poll monitor that provides an iterator-like interface.
///
/// The monitor reads every configured block from its [`RegisterSource`] at a
/// fixed interval and publishes one [`PointReading`] per block on the
/// channel behind [`PollMonitor::receiver`]. Poll failures are logged and
/// counted, never fatal; after ten consecutive failures the loop backs off
/// for a few seconds before trying again.
pub struct PollMonitor {
    receiver: flume::Receiver<PointReading>,
    control: MonitorControl,
    health: Arc<Mutex<HealthState>>,
    _handle: tokio::task::JoinHandle<Result<()>>,
}

impl PollMonitor {
    /// Spawn the poll loop for `config`, reading from `source`.
    pub fn start<S>(config: MonitorConfig, source: S) -> Result<Self>
    where
        S: RegisterSource + 'static,
    {
        let (sender, receiver) = flume::unbounded();
        let control = MonitorControl::new();
        let health = Arc::new(Mutex::new(HealthState::default()));

        let handle = tokio::spawn(run_poll_loop(
            config,
            source,
            sender,
            control.clone(),
            health.clone(),
        ));

        Ok(Self {
            receiver,
            control,
            health,
            _handle: handle,
        })
    }

    /// Try to receive a reading without blocking.
    pub fn try_recv(&self) -> Option<PointReading> {
        self.receiver.try_recv().ok()
    }

    /// Receive a reading with a timeout (blocking; use [`Self::receiver`]
    /// and `recv_async` from async contexts).
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PointReading> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// The underlying receiver for advanced usage.
    pub fn receiver(&self) -> &flume::Receiver<PointReading> {
        &self.receiver
    }

    pub fn control(&self) -> MonitorControl {
        self.control.clone()
    }

    pub fn health(&self) -> HealthState {
        self.health.lock().unwrap().clone()
    }
}

async fn run_poll_loop<S: RegisterSource>(
    config: MonitorConfig,
    mut source: S,
    sender: flume::Sender<PointReading>,
    control: MonitorControl,
    health: Arc<Mutex<HealthState>>,
) -> Result<()> {
    log::info!(
        "Starting poll loop: unit={}, blocks={}, interval={}ms",
        config.unit_id,
        config.blocks.len(),
        config.poll_interval_ms
    );

    let mut interval = tokio::time::interval(Duration::from_millis(config.poll_interval_ms.max(1)));
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut consecutive_errors = 0u32;
    let mut last_values: HashMap<(RegisterType, u16), Vec<u16>> = HashMap::new();

    loop {
        interval.tick().await;
        if !control.is_running() {
            log::info!("Poll loop received stop, exiting");
            break;
        }

        for block in &config.blocks {
            let result = match tokio::time::timeout(timeout, source.read_block(block)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!("Poll timed out after {}ms", config.timeout_ms)),
            };

            match result {
                Ok(values) => {
                    consecutive_errors = 0;
                    {
                        let mut health = health.lock().unwrap();
                        health.healthy = true;
                        health.consecutive_errors = 0;
                        health.last_success = Some(chrono::Utc::now().to_rfc3339());
                    }

                    if config.publish_on_change_only
                        && last_values.get(&(block.register, block.address)) == Some(&values)
                    {
                        continue;
                    }
                    last_values.insert((block.register, block.address), values.clone());

                    let reading = PointReading {
                        unit_id: config.unit_id,
                        register: block.register,
                        register_address: block.address,
                        values,
                        timestamp: chrono::Utc::now().to_rfc3339(),
                    };
                    if sender.send(reading).is_err() {
                        log::warn!("Receiver dropped, stopping poll loop");
                        return Ok(());
                    }
                }
                Err(err) => {
                    consecutive_errors += 1;
                    log::warn!("Poll error (#{consecutive_errors}/{MAX_CONSECUTIVE_ERRORS}): {err}");
                    {
                        let mut health = health.lock().unwrap();
                        health.healthy = false;
                        health.consecutive_errors = consecutive_errors;
                        health.last_error = Some(err.to_string());
                    }

                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        log::error!(
                            "Too many consecutive poll errors ({consecutive_errors}), entering recovery"
                        );
                        tokio::time::sleep(ERROR_RECOVERY_DELAY).await;
                        consecutive_errors = 0;
                    }
                }
            }
        }
    }

    Ok(())
}
