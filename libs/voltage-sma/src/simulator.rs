//! In-memory SMA device simulator
//!
//! [`SimulatedDevice`] is a cloneable handle to one shared register bank keyed
//! by `(unit_id, address)`. It implements [`WordTransport`] directly, so a
//! session can run against it without sockets, and [`SimulatedDevice::serve`]
//! exposes the same bank as a Modbus/TCP server for end-to-end tests and the
//! `smactl --simulate` mode.
//!
//! Reads of unmapped addresses answer with exception 0x02 (illegal data
//! address), like a real device. Writes are accepted at any address.

use crate::error::TransportError;
use crate::transport::constants::*;
use crate::transport::frame::{self, Request};
use crate::transport::WordTransport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// One FC16 request as seen by the simulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub unit_id: u8,
    pub address: u16,
    pub words: Vec<u16>,
}

#[derive(Debug, Default)]
struct RegisterBank {
    registers: HashMap<(u8, u16), u16>,
    /// Any exchange touching one of these addresses fails with the stored error
    failures: HashMap<u16, TransportError>,
    connect_failure: Option<TransportError>,
    write_log: Vec<WriteRecord>,
    connects: usize,
    reads: usize,
}

impl RegisterBank {
    fn injected_failure(&self, address: u16, count: u16) -> Option<TransportError> {
        let end = u32::from(address) + u32::from(count);
        self.failures
            .iter()
            .find(|(addr, _)| (u32::from(address)..end).contains(&u32::from(**addr)))
            .map(|(_, err)| err.clone())
    }

    fn read(&mut self, unit_id: u8, address: u16, count: u16) -> Result<Vec<u16>, TransportError> {
        self.reads += 1;
        if let Some(err) = self.injected_failure(address, count) {
            return Err(err);
        }
        (0..count)
            .map(|offset| {
                address
                    .checked_add(offset)
                    .and_then(|addr| self.registers.get(&(unit_id, addr)).copied())
                    .ok_or(TransportError::Exception {
                        function: FC_READ_HOLDING_REGISTERS | EXCEPTION_FLAG,
                        code: EXCEPTION_ILLEGAL_DATA_ADDRESS,
                    })
            })
            .collect()
    }

    fn write(&mut self, unit_id: u8, address: u16, words: &[u16]) -> Result<(), TransportError> {
        if let Some(err) = self.injected_failure(address, words.len() as u16) {
            return Err(err);
        }
        if usize::from(address) + words.len() > usize::from(u16::MAX) + 1 {
            return Err(TransportError::Exception {
                function: FC_WRITE_MULTIPLE_REGISTERS | EXCEPTION_FLAG,
                code: EXCEPTION_ILLEGAL_DATA_ADDRESS,
            });
        }
        for (offset, word) in words.iter().enumerate() {
            self.registers
                .insert((unit_id, address + offset as u16), *word);
        }
        self.write_log.push(WriteRecord {
            unit_id,
            address,
            words: words.to_vec(),
        });
        Ok(())
    }
}

/// Handle to a simulated device
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    bank: Arc<RwLock<RegisterBank>>,
    /// Per-handle connection state; the bank is shared
    connected: bool,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Preload
    // ========================================================================

    pub async fn set_words(&self, unit_id: u8, address: u16, words: &[u16]) {
        let mut bank = self.bank.write().await;
        for (offset, word) in words.iter().enumerate() {
            bank.registers
                .insert((unit_id, address.wrapping_add(offset as u16)), *word);
        }
    }

    pub async fn set_u32(&self, unit_id: u8, address: u16, value: u32) {
        self.set_words(unit_id, address, &[(value >> 16) as u16, value as u16])
            .await;
    }

    pub async fn set_u64(&self, unit_id: u8, address: u16, value: u64) {
        let words = [
            (value >> 48) as u16,
            (value >> 32) as u16,
            (value >> 16) as u16,
            value as u16,
        ];
        self.set_words(unit_id, address, &words).await;
    }

    /// Store `text` NUL-padded over `word_count` registers, first byte in the high half
    pub async fn set_string(&self, unit_id: u8, address: u16, word_count: u16, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(usize::from(word_count) * 2, 0);
        let words: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        self.set_words(unit_id, address, &words).await;
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub async fn words(&self, unit_id: u8, address: u16, count: u16) -> Option<Vec<u16>> {
        let bank = self.bank.read().await;
        (0..count)
            .map(|offset| {
                bank.registers
                    .get(&(unit_id, address.wrapping_add(offset)))
                    .copied()
            })
            .collect()
    }

    pub async fn u32_at(&self, unit_id: u8, address: u16) -> Option<u32> {
        let words = self.words(unit_id, address, 2).await?;
        Some((u32::from(words[0]) << 16) | u32::from(words[1]))
    }

    pub async fn write_log(&self) -> Vec<WriteRecord> {
        self.bank.read().await.write_log.clone()
    }

    /// Number of `connect` calls seen across all handles
    pub async fn connect_count(&self) -> usize {
        self.bank.read().await.connects
    }

    /// Number of read requests seen across all handles
    pub async fn read_count(&self) -> usize {
        self.bank.read().await.reads
    }

    // ========================================================================
    // Failure injection
    // ========================================================================

    /// Fail every exchange that touches `address`
    pub async fn fail_at(&self, address: u16, err: TransportError) {
        self.bank.write().await.failures.insert(address, err);
    }

    pub async fn clear_failure(&self, address: u16) {
        self.bank.write().await.failures.remove(&address);
    }

    /// Make `connect` fail until cleared with `None`
    pub async fn fail_connect(&self, err: Option<TransportError>) {
        self.bank.write().await.connect_failure = err;
    }

    /// Forget this handle's connection, as if the peer had closed it
    pub fn drop_connection(&mut self) {
        self.connected = false;
    }

    // ========================================================================
    // TCP server
    // ========================================================================

    /// Serve the bank over Modbus/TCP; the server stops when the handle is dropped
    pub async fn serve(&self, addr: impl ToSocketAddrs) -> std::io::Result<SimulatorServer> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("SMA simulator listening on {}", local_addr);

        let bank = Arc::clone(&self.bank);
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("New connection from {}", peer);
                        let bank = Arc::clone(&bank);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(bank, stream).await {
                                error!("Connection error: {}", e);
                            }
                        });
                    },
                    Err(e) => {
                        error!("Accept error: {}", e);
                        break;
                    },
                }
            }
        });

        Ok(SimulatorServer { local_addr, task })
    }
}

/// Running simulator server
#[derive(Debug)]
pub struct SimulatorServer {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl SimulatorServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for SimulatorServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(
    bank: Arc<RwLock<RegisterBank>>,
    mut stream: TcpStream,
) -> Result<(), TransportError> {
    loop {
        let (header, pdu) = match frame::read_frame(&mut stream).await {
            Ok(frame) => frame,
            // peer closed the connection
            Err(TransportError::Io(_)) => break,
            Err(e) => return Err(e),
        };
        debug!(
            "Transaction: {}, Unit: {}, Function: 0x{:02X}",
            header.transaction_id,
            header.unit_id,
            pdu.first().copied().unwrap_or(0)
        );

        let response = match Request::decode_pdu(&pdu) {
            Ok(Request::ReadHoldingRegisters { address, count }) => {
                match bank.write().await.read(header.unit_id, address, count) {
                    Ok(words) => frame::encode_read_response(&words),
                    Err(e) => frame::encode_exception(FC_READ_HOLDING_REGISTERS, exception_code(&e)),
                }
            },
            Ok(Request::WriteMultipleRegisters { address, words }) => {
                match bank.write().await.write(header.unit_id, address, &words) {
                    Ok(()) => frame::encode_write_response(address, words.len() as u16),
                    Err(e) => {
                        frame::encode_exception(FC_WRITE_MULTIPLE_REGISTERS, exception_code(&e))
                    },
                }
            },
            Err(code) => frame::encode_exception(pdu.first().copied().unwrap_or(0), code),
        };

        let reply = frame::encode_frame(header.transaction_id, header.unit_id, &response);
        stream.write_all(&reply).await?;
    }
    Ok(())
}

fn exception_code(err: &TransportError) -> u8 {
    match err {
        TransportError::Exception { code, .. } => *code,
        _ => EXCEPTION_SLAVE_DEVICE_FAILURE,
    }
}

#[async_trait]
impl WordTransport for SimulatedDevice {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut bank = self.bank.write().await;
        bank.connects += 1;
        if let Some(err) = bank.connect_failure.clone() {
            return Err(err);
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn read_words(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        Request::ReadHoldingRegisters { address, count }.validate()?;
        self.bank.write().await.read(unit_id, address, count)
    }

    async fn write_words(
        &mut self,
        unit_id: u8,
        address: u16,
        words: &[u16],
    ) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        Request::WriteMultipleRegisters {
            address,
            words: words.to_vec(),
        }
        .validate()?;
        self.bank.write().await.write(unit_id, address, words)
    }
}
