//! Modbus/TCP client transport
//!
//! One `TcpStream`, one request in flight. The stream is opened lazily by
//! [`WordTransport::connect`] and dropped after an I/O error, a timeout or a
//! framing error, so the next `connect` starts over on a clean socket.

use super::constants::EXCEPTION_FLAG;
use super::frame::{self, Request};
use super::WordTransport;
use crate::config::SmaConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Modbus/TCP client
#[derive(Debug)]
pub struct ModbusTcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    response_timeout: Duration,
    stream: Option<TcpStream>,
    /// Channel-local transaction ID counter
    next_transaction_id: u16,
}

impl ModbusTcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            stream: None,
            next_transaction_id: 1,
        }
    }

    pub fn from_config(config: &SmaConfig) -> Self {
        Self::new(config.host.clone(), config.port)
            .with_timeouts(config.connect_timeout(), config.response_timeout())
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, response_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.response_timeout = response_timeout;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Close the connection; the next exchange reconnects
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("TCP shutdown: {}", e);
            }
            info!("TCP disconnected: {}", self.endpoint());
        }
    }

    fn next_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }

    /// Send a request and return the (non-exception) response PDU
    async fn exchange(&mut self, unit_id: u8, request: &Request) -> Result<Vec<u8>, TransportError> {
        request.validate()?;

        let transaction_id = self.next_transaction_id();
        let mut pdu = BytesMut::new();
        request.encode_pdu(&mut pdu);
        let request_frame = frame::encode_frame(transaction_id, unit_id, &pdu);

        let response_timeout = self.response_timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        let result = async move {
            let (header, pdu) = timeout(response_timeout, send_and_receive(stream, &request_frame))
                .await
                .map_err(|_| {
                    TransportError::timeout(format!(
                        "no response within {}ms",
                        response_timeout.as_millis()
                    ))
                })??;
            debug!("TCP RX: {}B", pdu.len() + 7);

            if header.transaction_id != transaction_id {
                return Err(TransportError::protocol(format!(
                    "Transaction ID mismatch: expected {transaction_id:04X}, got {:04X}",
                    header.transaction_id
                )));
            }
            if header.unit_id != unit_id {
                return Err(TransportError::protocol(format!(
                    "Unit ID mismatch: expected {unit_id}, got {}",
                    header.unit_id
                )));
            }
            let function = pdu.first().map_or(0, |fc| fc & !EXCEPTION_FLAG);
            if function != request.function_code() {
                return Err(TransportError::protocol(format!(
                    "Function code mismatch: expected {:#04x}, got {function:#04x}",
                    request.function_code()
                )));
            }
            Ok::<_, TransportError>(pdu)
        }
        .await;

        match result {
            Ok(pdu) => {
                frame::check_exception(&pdu)?;
                Ok(pdu)
            },
            Err(e) => {
                warn!("TCP exchange failed, dropping connection: {}", e);
                self.stream = None;
                Err(e)
            },
        }
    }
}

/// Write one request frame and read one response frame
async fn send_and_receive(
    stream: &mut TcpStream,
    request_frame: &[u8],
) -> Result<(frame::MbapHeader, Vec<u8>), TransportError> {
    stream.write_all(request_frame).await?;
    debug!("TCP TX: {}B", request_frame.len());
    frame::read_frame(stream).await
}

#[async_trait]
impl WordTransport for ModbusTcpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = self.endpoint();
        debug!("TCP connecting: {}", addr);

        match timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY: {}", e);
                }
                info!("TCP connected: {}", addr);
                self.stream = Some(stream);
                Ok(())
            },
            Ok(Err(e)) => {
                error!("TCP err: {} - {}", addr, e);
                Err(TransportError::connection(format!(
                    "Failed to connect to {addr}: {e}"
                )))
            },
            Err(_) => {
                warn!("TCP timeout: {}", addr);
                Err(TransportError::timeout(format!(
                    "Connection to {addr} timed out"
                )))
            },
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn read_words(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let request = Request::ReadHoldingRegisters { address, count };
        let pdu = self.exchange(unit_id, &request).await?;
        frame::decode_read_response(&pdu, count)
    }

    async fn write_words(
        &mut self,
        unit_id: u8,
        address: u16,
        words: &[u16],
    ) -> Result<(), TransportError> {
        let request = Request::WriteMultipleRegisters {
            address,
            words: words.to_vec(),
        };
        let pdu = self.exchange(unit_id, &request).await?;
        frame::check_write_response(&pdu, address, words.len() as u16)
    }
}
