//! Pluggable encoding of methods and responses.
//!
//! The transport never looks inside a payload; it only needs bytes that do
//! not contain the frame delimiter. [`JsonSerializer`] is the default and
//! satisfies that for every value, since JSON escapes control characters.

use std::any::type_name;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Encoding or decoding failure at the serialization boundary.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    /// The value cannot be represented in the wire encoding.
    #[error("failed to encode {type_name}: {source}")]
    Encode {
        type_name: &'static str,
        source: BoxError,
    },

    /// The bytes are not a valid (or are a truncated) encoding of the type.
    #[error("failed to decode {type_name}: {source}")]
    Decode {
        type_name: &'static str,
        source: BoxError,
    },
}

impl SerializationError {
    pub fn encode<T: ?Sized>(source: impl Into<BoxError>) -> Self {
        Self::Encode {
            type_name: type_name::<T>(),
            source: source.into(),
        }
    }

    pub fn decode<T: ?Sized>(source: impl Into<BoxError>) -> Self {
        Self::Decode {
            type_name: type_name::<T>(),
            source: source.into(),
        }
    }
}

/// Encode/decode typed values to/from frame payloads.
///
/// Implementations must never emit a `0x00` byte.
pub trait Serializer: Clone + Send + Sync + 'static {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, SerializationError>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError>;
}

/// JSON text via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, SerializationError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(SerializationError::encode::<T>)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        serde_json::from_slice(bytes).map_err(SerializationError::decode::<T>)
    }
}
