use std::net::SocketAddr;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio_modbus::{
    client::{tcp, Context, Reader},
    slave::Slave,
};

use crate::config::{BlockConfig, RegisterType};

/// Source of register blocks for a poll monitor.
///
/// The production implementation reads over Modbus TCP; tests substitute an
/// in-memory source.
#[async_trait]
pub trait RegisterSource: Send {
    /// Read one configured block, normalized to one word per point (coils
    /// and discrete inputs map to 0/1).
    async fn read_block(&mut self, block: &BlockConfig) -> Result<Vec<u16>>;
}

/// Modbus TCP implementation of [`RegisterSource`].
pub struct TcpRegisterSource {
    ctx: Context,
}

impl TcpRegisterSource {
    /// Connect to a Modbus TCP device, addressing the given unit id.
    pub async fn connect(addr: SocketAddr, unit_id: u8) -> Result<Self> {
        let ctx = tcp::connect_slave(addr, Slave(unit_id))
            .await
            .map_err(|err| anyhow!("Failed to connect to {addr}: {err}"))?;
        log::info!("Connected to Modbus device at {addr} (unit {unit_id})");
        Ok(Self { ctx })
    }
}

#[async_trait]
impl RegisterSource for TcpRegisterSource {
    async fn read_block(&mut self, block: &BlockConfig) -> Result<Vec<u16>> {
        let values = match block.register {
            RegisterType::Coils => as_words(
                self.ctx
                    .read_coils(block.address, block.length)
                    .await
                    .map_err(|err| anyhow!("Read coils failed: {err}"))?
                    .map_err(|exc| anyhow!("Modbus exception: {exc}"))?,
            ),
            RegisterType::DiscreteInputs => as_words(
                self.ctx
                    .read_discrete_inputs(block.address, block.length)
                    .await
                    .map_err(|err| anyhow!("Read discrete inputs failed: {err}"))?
                    .map_err(|exc| anyhow!("Modbus exception: {exc}"))?,
            ),
            RegisterType::Holding => self
                .ctx
                .read_holding_registers(block.address, block.length)
                .await
                .map_err(|err| anyhow!("Read holding registers failed: {err}"))?
                .map_err(|exc| anyhow!("Modbus exception: {exc}"))?,
            RegisterType::Input => self
                .ctx
                .read_input_registers(block.address, block.length)
                .await
                .map_err(|err| anyhow!("Read input registers failed: {err}"))?
                .map_err(|exc| anyhow!("Modbus exception: {exc}"))?,
        };
        Ok(values)
    }
}

fn as_words(bits: Vec<bool>) -> Vec<u16> {
    bits.into_iter().map(u16::from).collect()
}
