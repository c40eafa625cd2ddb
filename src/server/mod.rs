mod service;

pub use service::StorageService;

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use tokio::net::TcpListener;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use crate::{
    config::{RegisterSeed, RegisterType},
    storage::SlaveStorage,
};

/// Write configured initial values into the register banks.
///
/// Bit tables treat any non-zero seed value as ON. Seeds go through
/// `write_block`, so observers attached beforehand see one Write event per
/// seeded block.
pub fn apply_seeds(storage: &mut SlaveStorage, seeds: &[RegisterSeed]) {
    for seed in seeds {
        log::debug!(
            "Seeding {} values into {} at 0x{:04X}",
            seed.values.len(),
            seed.register,
            seed.address
        );
        match seed.register {
            RegisterType::Coils => storage.coils.write_block(seed.address, &as_bits(&seed.values)),
            RegisterType::DiscreteInputs => storage
                .discretes
                .write_block(seed.address, &as_bits(&seed.values)),
            RegisterType::Holding => storage.holdings.write_block(seed.address, &seed.values),
            RegisterType::Input => storage.inputs.write_block(seed.address, &seed.values),
        }
    }
}

fn as_bits(values: &[u16]) -> Vec<bool> {
    values.iter().map(|value| *value != 0).collect()
}

/// Bind `addr` and serve Modbus TCP requests from `storage` until the task
/// is cancelled.
pub async fn serve(addr: SocketAddr, storage: Arc<Mutex<SlaveStorage>>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| anyhow!("Failed to bind {addr}: {err}"))?;
    log::info!("Modbus slave listening on {addr}");
    serve_on(listener, storage).await
}

/// Serve Modbus TCP requests on an already-bound listener.
pub async fn serve_on(listener: TcpListener, storage: Arc<Mutex<SlaveStorage>>) -> Result<()> {
    let server = Server::new(listener);
    let on_connected = |stream, socket_addr| {
        let storage = storage.clone();
        async move {
            accept_tcp_connection(stream, socket_addr, move |peer| {
                log::debug!("Accepted Modbus connection from {peer}");
                Ok(Some(StorageService::new(storage.clone())))
            })
        }
    };
    let on_process_error = |err| {
        log::warn!("Modbus connection error: {err}");
    };
    server.serve(&on_connected, on_process_error).await?;
    Ok(())
}
