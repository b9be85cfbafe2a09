//! Transport adapter
//!
//! Word-level helpers on top of a [`WordTransport`]: reading and writing
//! unsigned integers of up to 8 bytes and fixed-length byte strings, with the
//! SMA word order (most significant word first, high byte first).
//!
//! Every operation takes [`ExchangeOptions`]. With `raise` a failure comes
//! back as `Err`; without it the call returns `Ok(Exchange)` holding a zero or
//! empty value together with the error, so a failure is never silent.
//! `report` logs failed exchanges at warn level.

use crate::error::{Result, SmaError};
use crate::transport::WordTransport;
use tracing::{debug, warn};

/// Largest integer the adapter packs from words
pub const MAX_UINT_BYTES: usize = 8;

/// Failure handling for one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeOptions {
    /// Return failures as `Err` instead of inside [`Exchange`]
    pub raise: bool,
    /// Log failures at warn level
    pub report: bool,
}

impl ExchangeOptions {
    pub const RAISE: Self = Self {
        raise: true,
        report: true,
    };
    pub const QUIET: Self = Self {
        raise: false,
        report: false,
    };
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            raise: false,
            report: true,
        }
    }
}

/// Outcome of a non-raising exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange<T> {
    /// Data read, or the zero/empty value when `error` is set
    pub value: T,
    pub error: Option<SmaError>,
}

impl<T> Exchange<T> {
    fn ok(value: T) -> Self {
        Self { value, error: None }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&SmaError> {
        self.error.as_ref()
    }

    pub fn into_result(self) -> Result<T> {
        match self.error {
            None => Ok(self.value),
            Some(err) => Err(err),
        }
    }
}

/// Word-level adapter owning the transport
#[derive(Debug)]
pub struct TransportAdapter<T> {
    transport: T,
}

impl<T: WordTransport> TransportAdapter<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Connect if not yet connected; later calls reuse the connection
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if !self.transport.is_connected() {
            self.transport.connect().await?;
        }
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read exactly `count` words
    pub async fn read_words(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
        options: ExchangeOptions,
    ) -> Result<Exchange<Vec<u16>>> {
        let outcome = self.fetch_words(unit_id, address, count).await;
        finish("read_words", unit_id, address, outcome, Vec::new(), options)
    }

    /// Read `byte_count` bytes (even, at most 8) as a big-endian unsigned integer
    pub async fn read_uint(
        &mut self,
        unit_id: u8,
        address: u16,
        byte_count: usize,
        options: ExchangeOptions,
    ) -> Result<Exchange<u64>> {
        let outcome = async {
            check_uint_width(byte_count)?;
            let words = self
                .fetch_words(unit_id, address, (byte_count / 2) as u16)
                .await?;
            Ok::<_, SmaError>(
                words
                    .iter()
                    .fold(0u64, |acc, word| (acc << 16) | u64::from(*word)),
            )
        }
        .await;
        finish("read_uint", unit_id, address, outcome, 0, options)
    }

    /// Read `byte_count` bytes as a string, high byte of each word first
    pub async fn read_string(
        &mut self,
        unit_id: u8,
        address: u16,
        byte_count: usize,
        options: ExchangeOptions,
    ) -> Result<Exchange<Vec<u8>>> {
        let outcome = async {
            let count = string_word_count(byte_count)?;
            let words = self.fetch_words(unit_id, address, count).await?;
            let mut bytes: Vec<u8> = words.iter().flat_map(|word| word.to_be_bytes()).collect();
            bytes.truncate(byte_count);
            Ok::<_, SmaError>(bytes)
        }
        .await;
        finish("read_string", unit_id, address, outcome, Vec::new(), options)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn write_words(
        &mut self,
        unit_id: u8,
        address: u16,
        words: &[u16],
        options: ExchangeOptions,
    ) -> Result<Exchange<()>> {
        let outcome = self.store_words(unit_id, address, words).await;
        finish("write_words", unit_id, address, outcome, (), options)
    }

    /// Write the low `byte_count` bytes of `value`, most significant word first
    pub async fn write_uint(
        &mut self,
        unit_id: u8,
        address: u16,
        byte_count: usize,
        value: u64,
        options: ExchangeOptions,
    ) -> Result<Exchange<()>> {
        let outcome = async {
            check_uint_width(byte_count)?;
            let words: Vec<u16> = (0..byte_count / 2)
                .rev()
                .map(|index| (value >> (16 * index)) as u16)
                .collect();
            self.store_words(unit_id, address, &words).await
        }
        .await;
        finish("write_uint", unit_id, address, outcome, (), options)
    }

    /// Write `text` NUL-padded to `byte_count` bytes; longer text is rejected
    pub async fn write_string(
        &mut self,
        unit_id: u8,
        address: u16,
        byte_count: usize,
        text: &[u8],
        options: ExchangeOptions,
    ) -> Result<Exchange<()>> {
        let outcome = async {
            let count = string_word_count(byte_count)?;
            if text.len() > byte_count {
                return Err(SmaError::width("bytes", byte_count, text.len()));
            }
            let mut bytes = text.to_vec();
            bytes.resize(usize::from(count) * 2, 0);
            let words: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            self.store_words(unit_id, address, &words).await
        }
        .await;
        finish("write_string", unit_id, address, outcome, (), options)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn fetch_words(&mut self, unit_id: u8, address: u16, count: u16) -> Result<Vec<u16>> {
        self.ensure_connected().await?;
        let words = self.transport.read_words(unit_id, address, count).await?;
        if words.len() != usize::from(count) {
            return Err(SmaError::width("words", usize::from(count), words.len()));
        }
        debug!("Read unit={} addr={} words={:04X?}", unit_id, address, words);
        Ok(words)
    }

    async fn store_words(&mut self, unit_id: u8, address: u16, words: &[u16]) -> Result<()> {
        self.ensure_connected().await?;
        self.transport.write_words(unit_id, address, words).await?;
        debug!("Wrote unit={} addr={} words={:04X?}", unit_id, address, words);
        Ok(())
    }
}

fn check_uint_width(byte_count: usize) -> Result<()> {
    if byte_count == 0 || byte_count > MAX_UINT_BYTES || byte_count % 2 != 0 {
        return Err(SmaError::width("bytes", MAX_UINT_BYTES, byte_count));
    }
    Ok(())
}

fn string_word_count(byte_count: usize) -> Result<u16> {
    let count = byte_count.div_ceil(2);
    if count == 0 || count > usize::from(u16::MAX) {
        return Err(SmaError::width("bytes", 2, byte_count));
    }
    Ok(count as u16)
}

fn finish<V>(
    operation: &str,
    unit_id: u8,
    address: u16,
    outcome: Result<V>,
    fallback: V,
    options: ExchangeOptions,
) -> Result<Exchange<V>> {
    match outcome {
        Ok(value) => Ok(Exchange::ok(value)),
        Err(err) => {
            if options.report {
                warn!("{}(unit={}, addr={}) failed: {}", operation, unit_id, address, err);
            }
            if options.raise {
                Err(err)
            } else {
                Ok(Exchange {
                    value: fallback,
                    error: Some(err),
                })
            }
        },
    }
}
