use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// A remote operation and its parameters.
///
/// Implement this on a closed enum with one variant per operation. The
/// associated `Response` is the matching result type, typically an enum
/// with one variant per operation outcome.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use wirecall_rpc::Method;
///
/// #[derive(Serialize, Deserialize)]
/// enum Calculator {
///     Add(i64, i64),
///     Negate(i64),
/// }
///
/// #[derive(Serialize, Deserialize)]
/// enum CalculatorResult {
///     Value(i64),
/// }
///
/// impl Method for Calculator {
///     type Response = CalculatorResult;
/// }
/// ```
pub trait Method: Serialize + DeserializeOwned + Send + 'static {
    type Response: Serialize + DeserializeOwned + Send + 'static;
}

/// Wire envelope around every response.
///
/// Encoded with the default serializer as `{"success": ...}` or
/// `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response<T> {
    Success(T),
    Error(String),
}

impl<T> Response<T> {
    /// Package a performer outcome. Only the error's message crosses the wire.
    pub fn from_outcome<E: fmt::Display>(outcome: std::result::Result<T, E>) -> Self {
        match outcome {
            Ok(value) => Response::Success(value),
            Err(err) => Response::Error(err.to_string()),
        }
    }

    /// Convert into the caller-facing result.
    pub fn into_result(self) -> crate::Result<T> {
        match self {
            Response::Success(value) => Ok(value),
            Response::Error(message) => Err(RpcError::Application(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_wire_shape() {
        let json = serde_json::to_string(&Response::Success(7u32)).unwrap();
        assert_eq!(json, r#"{"success":7}"#);
    }

    #[test]
    fn error_wire_shape() {
        let json = serde_json::to_string(&Response::<u32>::Error("boom".to_string())).unwrap();
        assert_eq!(json, r#"{"error":"boom"}"#);
    }

    #[test]
    fn outcome_keeps_only_message() {
        let outcome: std::result::Result<u8, std::io::Error> =
            Err(std::io::Error::other("disk on fire"));
        let response = Response::from_outcome(outcome);
        assert_eq!(response, Response::Error("disk on fire".to_string()));
    }

    #[test]
    fn error_becomes_application_error() {
        let err = Response::<()>::Error("X".to_string())
            .into_result()
            .unwrap_err();
        assert!(matches!(&err, RpcError::Application(message) if message == "X"));
        assert!(err.to_string().contains('X'));
    }
}
