//! Modbus/TCP framing
//!
//! Frame: `[Transaction ID(2)][Protocol ID(2)][Length(2)][Unit ID(1)][PDU(N)]`,
//! all big-endian. Only FC03 (read holding registers) and FC16 (write
//! multiple registers) are modelled, on both the client and the server side.

use super::constants::*;
use crate::error::TransportError;
use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

type Result<T> = std::result::Result<T, TransportError>;

/// Modbus TCP MBAP header, unit identifier included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    /// Always 0 for Modbus
    pub protocol_id: u16,
    /// Byte count of unit identifier + PDU
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    pub fn parse(bytes: &[u8; MBAP_HEADER_LEN + 1]) -> Self {
        let mut buf = &bytes[..];
        Self {
            transaction_id: buf.get_u16(),
            protocol_id: buf.get_u16(),
            length: buf.get_u16(),
            unit_id: buf.get_u8(),
        }
    }
}

/// Request PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadHoldingRegisters { address: u16, count: u16 },
    WriteMultipleRegisters { address: u16, words: Vec<u16> },
}

impl Request {
    pub fn function_code(&self) -> u8 {
        match self {
            Self::ReadHoldingRegisters { .. } => FC_READ_HOLDING_REGISTERS,
            Self::WriteMultipleRegisters { .. } => FC_WRITE_MULTIPLE_REGISTERS,
        }
    }

    /// Check register count limits before anything is sent
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::ReadHoldingRegisters { count, .. } => {
                if *count == 0 || *count > MAX_READ_REGISTERS {
                    return Err(TransportError::invalid_request(format!(
                        "read count {count} outside 1..={MAX_READ_REGISTERS}"
                    )));
                }
            },
            Self::WriteMultipleRegisters { words, .. } => {
                if words.is_empty() || words.len() > usize::from(MAX_WRITE_REGISTERS) {
                    return Err(TransportError::invalid_request(format!(
                        "write count {} outside 1..={MAX_WRITE_REGISTERS}",
                        words.len()
                    )));
                }
            },
        }
        Ok(())
    }

    pub fn encode_pdu(&self, buf: &mut BytesMut) {
        buf.put_u8(self.function_code());
        match self {
            Self::ReadHoldingRegisters { address, count } => {
                buf.put_u16(*address);
                buf.put_u16(*count);
            },
            Self::WriteMultipleRegisters { address, words } => {
                buf.put_u16(*address);
                buf.put_u16(words.len() as u16);
                buf.put_u8((words.len() * 2) as u8);
                for word in words {
                    buf.put_u16(*word);
                }
            },
        }
    }

    /// Server side parse; the error is the Modbus exception code to answer with
    pub fn decode_pdu(pdu: &[u8]) -> std::result::Result<Self, u8> {
        let mut buf = pdu;
        if !buf.has_remaining() {
            return Err(EXCEPTION_ILLEGAL_FUNCTION);
        }
        match buf.get_u8() {
            FC_READ_HOLDING_REGISTERS => {
                if buf.remaining() != 4 {
                    return Err(EXCEPTION_ILLEGAL_DATA_VALUE);
                }
                let address = buf.get_u16();
                let count = buf.get_u16();
                if count == 0 || count > MAX_READ_REGISTERS {
                    return Err(EXCEPTION_ILLEGAL_DATA_VALUE);
                }
                Ok(Self::ReadHoldingRegisters { address, count })
            },
            FC_WRITE_MULTIPLE_REGISTERS => {
                if buf.remaining() < 5 {
                    return Err(EXCEPTION_ILLEGAL_DATA_VALUE);
                }
                let address = buf.get_u16();
                let count = buf.get_u16();
                let byte_count = usize::from(buf.get_u8());
                if count == 0
                    || count > MAX_WRITE_REGISTERS
                    || byte_count != usize::from(count) * 2
                    || buf.remaining() != byte_count
                {
                    return Err(EXCEPTION_ILLEGAL_DATA_VALUE);
                }
                let words = (0..count).map(|_| buf.get_u16()).collect();
                Ok(Self::WriteMultipleRegisters { address, words })
            },
            _ => Err(EXCEPTION_ILLEGAL_FUNCTION),
        }
    }
}

/// Wrap a PDU into an MBAP frame
pub fn encode_frame(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(MBAP_HEADER_LEN + 1 + pdu.len());
    buf.put_u16(transaction_id);
    buf.put_u16(0);
    buf.put_u16((pdu.len() + 1) as u16);
    buf.put_u8(unit_id);
    buf.put_slice(pdu);
    buf
}

/// Read one complete frame; returns the header and the PDU
pub async fn read_frame<R>(reader: &mut R) -> Result<(MbapHeader, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; MBAP_HEADER_LEN + 1];
    reader.read_exact(&mut raw).await?;
    let header = MbapHeader::parse(&raw);

    if header.protocol_id != 0 {
        return Err(TransportError::protocol(format!(
            "Invalid protocol ID: expected 0, got {}",
            header.protocol_id
        )));
    }
    let length = usize::from(header.length);
    if !(2..=MAX_MBAP_LENGTH).contains(&length) {
        return Err(TransportError::protocol(format!(
            "Invalid TCP frame length: {length}"
        )));
    }

    let mut pdu = vec![0u8; length - 1];
    reader.read_exact(&mut pdu).await?;
    Ok((header, pdu))
}

/// Turn an exception PDU into an error; other PDUs pass through
pub fn check_exception(pdu: &[u8]) -> Result<()> {
    match pdu {
        [function, code, ..] if function & EXCEPTION_FLAG != 0 => Err(TransportError::Exception {
            function: *function,
            code: *code,
        }),
        [function] if function & EXCEPTION_FLAG != 0 => Err(TransportError::protocol(
            "Exception response without exception code",
        )),
        [] => Err(TransportError::protocol("Empty PDU")),
        _ => Ok(()),
    }
}

/// Client side: words from an FC03 response
pub fn decode_read_response(pdu: &[u8], expected_count: u16) -> Result<Vec<u16>> {
    let mut buf = pdu;
    if buf.remaining() < 2 {
        return Err(TransportError::protocol("FC03 response too short"));
    }
    let function = buf.get_u8();
    if function != FC_READ_HOLDING_REGISTERS {
        return Err(TransportError::protocol(format!(
            "Unexpected function code {function:#04x} in FC03 response"
        )));
    }
    let byte_count = usize::from(buf.get_u8());
    if byte_count != usize::from(expected_count) * 2 || buf.remaining() != byte_count {
        return Err(TransportError::protocol(format!(
            "FC03 byte count {byte_count} (payload {}) for {expected_count} registers",
            buf.remaining()
        )));
    }
    Ok((0..expected_count).map(|_| buf.get_u16()).collect())
}

/// Client side: verify the FC16 echo of address and count
pub fn check_write_response(pdu: &[u8], address: u16, count: u16) -> Result<()> {
    let mut buf = pdu;
    if buf.remaining() != 5 {
        return Err(TransportError::protocol(format!(
            "FC16 response length {}",
            buf.remaining()
        )));
    }
    let function = buf.get_u8();
    let echoed_address = buf.get_u16();
    let echoed_count = buf.get_u16();
    if function != FC_WRITE_MULTIPLE_REGISTERS
        || echoed_address != address
        || echoed_count != count
    {
        return Err(TransportError::protocol(format!(
            "FC16 echo mismatch: fc={function:#04x} addr={echoed_address} count={echoed_count}"
        )));
    }
    Ok(())
}

/// Server side: FC03 response PDU
pub fn encode_read_response(words: &[u16]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(2 + words.len() * 2);
    buf.put_u8(FC_READ_HOLDING_REGISTERS);
    buf.put_u8((words.len() * 2) as u8);
    for word in words {
        buf.put_u16(*word);
    }
    buf
}

/// Server side: FC16 response PDU
pub fn encode_write_response(address: u16, count: u16) -> BytesMut {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(FC_WRITE_MULTIPLE_REGISTERS);
    buf.put_u16(address);
    buf.put_u16(count);
    buf
}

/// Server side: exception response PDU
pub fn encode_exception(function: u8, code: u8) -> BytesMut {
    let mut buf = BytesMut::with_capacity(2);
    buf.put_u8(function | EXCEPTION_FLAG);
    buf.put_u8(code);
    buf
}
