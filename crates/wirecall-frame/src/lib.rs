//! NUL-delimited message framing for wirecall.
//!
//! Every message on the wire is its payload followed by a single `0x00`
//! byte. There is no length prefix, version byte or compression, so payloads
//! must never contain the delimiter themselves (JSON text never does).
//!
//! Decoding is incremental: [`NulCodec`] remembers how far it has already
//! scanned a partially-received buffer, so each read only pays for the bytes
//! that just arrived.
//!
//! With the `async` feature, [`NulCodec`] also implements
//! `tokio_util::codec::{Decoder, Encoder}` for use with `Framed`.

pub mod codec;
pub mod error;

pub use codec::{encode_frame, FrameConfig, NulCodec, DEFAULT_MAX_PAYLOAD, DELIMITER};
pub use error::{FrameError, Result};
