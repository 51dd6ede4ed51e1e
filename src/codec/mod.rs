//! Codec module - the payload collaborator seam.
//!
//! The HTTP layer treats content as opaque bytes. A [`PayloadCodec`] turns
//! those bytes into a [`Call`] (method name plus ordered parameters) on the
//! server side and into a [`Response`] on the client side, and back again.
//!
//! - [`JsonCodec`] - `serde_json` encoding of the call/response documents
//!
//! # Example
//!
//! ```
//! use rpcwire::codec::{Call, JsonCodec, PayloadCodec, Value};
//!
//! let codec = JsonCodec;
//! let call = Call::new("math.add", vec![Value::from(1), Value::from(2)]);
//!
//! let bytes = codec.encode_call(&call).unwrap();
//! assert_eq!(codec.decode_call(&bytes).unwrap(), call);
//! ```

mod json;

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Fault};

pub use json::JsonCodec;

/// Parameter and result value.
pub use serde_json::Value;

/// Decoded method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Name the dispatcher looks up.
    #[serde(rename = "methodName")]
    pub method_name: String,
    /// Ordered parameters.
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Call {
    /// Create a call.
    pub fn new(method_name: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method_name: method_name.into(),
            params,
        }
    }
}

/// Decoded method response: a result value or a fault.
pub type Response = std::result::Result<Value, Fault>;

/// Encodes and decodes request/response payloads.
///
/// Shared by every connection of a server, so implementations must be
/// `Send + Sync`.
pub trait PayloadCodec: Send + Sync + 'static {
    /// Parse a request payload.
    fn decode_call(&self, payload: &[u8]) -> Result<Call, CodecError>;

    /// Serialize a request payload.
    fn encode_call(&self, call: &Call) -> Result<Vec<u8>, CodecError>;

    /// Parse a response payload.
    fn decode_response(&self, payload: &[u8]) -> Result<Response, CodecError>;

    /// Serialize a response payload.
    fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError>;
}
