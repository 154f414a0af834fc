use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::error::{FrameError, Result};

/// Frame terminator: a single NUL byte.
pub const DELIMITER: u8 = 0x00;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    ///
    /// On decode, a buffer that grows past this without a delimiter is
    /// unrecoverable and fails the stream.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────────────────────────┬──────┐
/// │ Payload (any length)    │ 0x00 │
/// └─────────────────────────┴──────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if let Some(position) = payload.iter().position(|b| *b == DELIMITER) {
        return Err(FrameError::DelimiterInPayload { position });
    }
    dst.reserve(payload.len() + 1);
    dst.put_slice(payload);
    dst.put_u8(DELIMITER);
    Ok(())
}

/// Streaming NUL-delimited frame codec.
///
/// Holds the scan cursor for one inbound stream, so use one codec per
/// connection.
#[derive(Debug, Clone)]
pub struct NulCodec {
    /// Bytes of the current buffer already scanned without finding a delimiter.
    next_index: usize,
    config: FrameConfig,
}

impl NulCodec {
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            next_index: 0,
            config,
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Check that `payload` can be framed: within the maximum size and free
    /// of the delimiter. Nothing is written.
    pub fn check_payload(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }
        if let Some(position) = payload.iter().position(|b| *b == DELIMITER) {
            return Err(FrameError::DelimiterInPayload { position });
        }
        Ok(())
    }

    /// Encode `payload`, enforcing the configured maximum size.
    pub fn encode_payload(&self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        self.check_payload(payload)?;
        dst.reserve(payload.len() + 1);
        dst.put_slice(payload);
        dst.put_u8(DELIMITER);
        Ok(())
    }

    /// Decode the next complete payload from an accumulating buffer.
    ///
    /// Returns `Ok(None)` when no delimiter has arrived yet; the partial bytes
    /// stay in `src` and are not re-scanned on the next call. On success the
    /// payload and its delimiter are consumed from `src`.
    pub fn decode_payload(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let start = self.next_index.min(src.len());

        match src[start..].iter().position(|b| *b == DELIMITER) {
            Some(offset) => {
                let end = start + offset;
                self.next_index = 0;
                if end > self.config.max_payload_size {
                    return Err(FrameError::PayloadTooLarge {
                        size: end,
                        max: self.config.max_payload_size,
                    });
                }
                let payload = src.split_to(end).freeze();
                src.advance(1);
                Ok(Some(payload))
            }
            None => {
                self.next_index = src.len();
                if src.len() > self.config.max_payload_size {
                    return Err(FrameError::PayloadTooLarge {
                        size: src.len(),
                        max: self.config.max_payload_size,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Decode at end of input.
    ///
    /// Drains fully-delimited payloads one per call. Once none remain, any
    /// trailing undelimited bytes are discarded and `Ok(None)` is returned.
    pub fn decode_payload_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(payload) = self.decode_payload(src)? {
            return Ok(Some(payload));
        }
        if !src.is_empty() {
            warn!(bytes = src.len(), "discarding undelimited trailing bytes at end of stream");
            src.clear();
        }
        self.next_index = 0;
        Ok(None)
    }
}

impl Default for NulCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Decoder for NulCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        self.decode_payload(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        self.decode_payload_eof(src)
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Encoder<Bytes> for NulCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        self.encode_payload(&payload, dst)
    }
}
