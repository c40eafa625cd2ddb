use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::net::TcpListener;
use tokio_modbus::client::{tcp, Reader, Writer};

use modsim::{
    config::{BlockConfig, MonitorConfig, RegisterType},
    monitor::{source::TcpRegisterSource, PollMonitor},
    server,
    storage::{OperationKind, SlaveStorage, StorageNotification},
};

/// Spawn a slave on an ephemeral port, returning its address and the
/// notification hub.
async fn start_slave(
    mut storage: SlaveStorage,
) -> (std::net::SocketAddr, flume::Receiver<StorageNotification>) {
    let hub = storage.attach_hub();
    let storage = Arc::new(Mutex::new(storage));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server::serve_on(listener, storage).await;
    });

    (addr, hub)
}

async fn next_notification(hub: &flume::Receiver<StorageNotification>) -> StorageNotification {
    tokio::time::timeout(Duration::from_secs(2), hub.recv_async())
        .await
        .expect("timed out waiting for notification")
        .expect("hub channel closed")
}

#[tokio::test]
async fn test_tcp_round_trip_against_seeded_storage() {
    let mut storage = SlaveStorage::new();
    storage.holdings.write_block(16, &[100, 200, 300]);
    let (addr, hub) = start_slave(storage).await;

    let mut ctx = tcp::connect(addr).await.unwrap();

    let values = ctx.read_holding_registers(16, 3).await.unwrap().unwrap();
    assert_eq!(values, vec![100, 200, 300]);

    // Sparse defaults: any address reads as zero instead of an exception
    let empty = ctx
        .read_holding_registers(40_000, 4)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(empty, vec![0, 0, 0, 0]);

    let read_event = next_notification(&hub).await;
    assert_eq!(read_event.table, RegisterType::Holding);
    assert_eq!(read_event.kind, OperationKind::Read);
    assert_eq!(read_event.start_address, 16);
    assert_eq!(read_event.values, vec![100, 200, 300]);
}

#[tokio::test]
async fn test_tcp_writes_land_in_storage_and_notify() {
    let (addr, hub) = start_slave(SlaveStorage::new()).await;

    let mut ctx = tcp::connect(addr).await.unwrap();

    ctx.write_multiple_registers(10, &[7, 8, 9])
        .await
        .unwrap()
        .unwrap();

    let write_event = next_notification(&hub).await;
    assert_eq!(write_event.table, RegisterType::Holding);
    assert_eq!(write_event.kind, OperationKind::Write);
    assert_eq!(write_event.start_address, 10);
    assert_eq!(write_event.values, vec![7, 8, 9]);

    let values = ctx.read_holding_registers(10, 3).await.unwrap().unwrap();
    assert_eq!(values, vec![7, 8, 9]);
    let read_event = next_notification(&hub).await;
    assert_eq!(read_event.kind, OperationKind::Read);

    ctx.write_single_coil(3, true).await.unwrap().unwrap();
    let coil_event = next_notification(&hub).await;
    assert_eq!(coil_event.table, RegisterType::Coils);
    assert_eq!(coil_event.values, vec![1]);

    let coils = ctx.read_coils(0, 5).await.unwrap().unwrap();
    assert_eq!(coils, vec![false, false, false, true, false]);
}

#[tokio::test]
async fn test_monitor_polls_the_simulated_slave() {
    let mut storage = SlaveStorage::new();
    storage.inputs.write_block(0, &[42, 43]);
    let (addr, _hub) = start_slave(storage).await;

    let config = MonitorConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        unit_id: 1,
        poll_interval_ms: 10,
        timeout_ms: 1000,
        publish_on_change_only: false,
        blocks: vec![BlockConfig {
            register: RegisterType::Input,
            address: 0,
            length: 2,
        }],
    };

    let source = TcpRegisterSource::connect(addr, config.unit_id)
        .await
        .unwrap();
    let monitor = PollMonitor::start(config, source).unwrap();

    let reading = tokio::time::timeout(Duration::from_secs(2), monitor.receiver().recv_async())
        .await
        .expect("timed out waiting for reading")
        .expect("monitor channel closed");

    assert_eq!(reading.register, RegisterType::Input);
    assert_eq!(reading.register_address, 0);
    assert_eq!(reading.values, vec![42, 43]);
    assert!(monitor.health().healthy);

    monitor.control().stop();
}
