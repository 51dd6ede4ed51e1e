//! JSON codec using `serde_json`.
//!
//! Documents mirror the XML-RPC element names so the two encodings stay
//! easy to map onto each other:
//!
//! ```text
//! {"methodName": "echo", "params": [1, "two"]}
//! {"result": ...}
//! {"fault": {"faultCode": -32601, "faultString": "..."}}
//! ```

use serde::{Deserialize, Serialize};

use super::{Call, PayloadCodec, Response, Value};
use crate::error::{CodecError, Fault};

/// JSON payload codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ResponseDocument {
    Result(Value),
    Fault(FaultDocument),
}

#[derive(Serialize, Deserialize)]
struct FaultDocument {
    #[serde(rename = "faultCode")]
    code: i32,
    #[serde(rename = "faultString")]
    message: String,
}

impl PayloadCodec for JsonCodec {
    fn decode_call(&self, payload: &[u8]) -> Result<Call, CodecError> {
        let call: Call = serde_json::from_slice(payload)?;
        if call.method_name.is_empty() {
            return Err(CodecError::Invalid("empty method name".to_string()));
        }
        Ok(call)
    }

    fn encode_call(&self, call: &Call) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(call)?)
    }

    fn decode_response(&self, payload: &[u8]) -> Result<Response, CodecError> {
        let document: ResponseDocument = serde_json::from_slice(payload)?;
        Ok(match document {
            ResponseDocument::Result(value) => Ok(value),
            ResponseDocument::Fault(fault) => Err(Fault::new(fault.code, fault.message)),
        })
    }

    fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError> {
        let document = match response {
            Ok(value) => ResponseDocument::Result(value.clone()),
            Err(fault) => ResponseDocument::Fault(FaultDocument {
                code: fault.code,
                message: fault.message.clone(),
            }),
        };
        Ok(serde_json::to_vec(&document)?)
    }
}
