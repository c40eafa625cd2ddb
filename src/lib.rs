//! Modsim — Modbus TCP slave simulator with sparse point storage
//!
//! This crate provides the core library for the simulator daemon. A
//! [`storage::SlaveStorage`] bundles four sparse point stores, one per
//! Modbus data table, and notifies registered observers about every block
//! read or write. The [`server`] module serves the storage over Modbus TCP,
//! and [`monitor`] polls remote devices at a fixed interval, republishing
//! the values over in-process channels.
//!
//! All wire-level Modbus handling (framing, function codes, exceptions) is
//! delegated to `tokio-modbus`; this crate only maps requests onto storage
//! block operations.

pub mod config;
pub mod monitor;
pub mod server;
pub mod storage;

pub use config::{
    BlockConfig, MonitorConfig, RegisterSeed, RegisterType, ServerConfig, SimulatorConfig,
};
pub use monitor::{
    source::{RegisterSource, TcpRegisterSource},
    HealthState, MonitorControl, PointReading, PollMonitor,
};
pub use server::{apply_seeds, serve, serve_on, StorageService};
pub use storage::{
    ObserverId, OperationKind, PointStore, SlaveStorage, StorageNotification, StorageObserver,
    StorageOperation,
};
