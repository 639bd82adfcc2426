//! Shape-aware codec for remote values.
//!
//! Values travel as JSON. On the way back the bytes are first parsed into an
//! untyped [`serde_json::Value`], checked against the declared
//! [`ResultShape`], and only then rebuilt as the declared Rust type. The
//! structural check turns "a map where a list was expected" into a clean
//! serialization error instead of relying on whatever the element decoder
//! happens to accept.

use serde_json::Value;
use std::marker::PhantomData;

use crate::error::RemoteError;
use crate::shape::{CacheValue, ResultShape};

pub struct ShapeCodec<T> {
    shape: ResultShape,
    _marker: PhantomData<fn() -> T>,
}

impl<T: CacheValue> ShapeCodec<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shape: T::shape(),
            _marker: PhantomData,
        }
    }

    /// Serialize a value for the wire. A present Optional is written as its
    /// inner value.
    pub fn encode(&self, value: &T) -> Result<Vec<u8>, RemoteError> {
        serde_json::to_vec(value).map_err(|e| self.error(e.to_string()))
    }

    /// Rebuild the declared type from wire bytes.
    pub fn decode(&self, bytes: &[u8]) -> Result<T, RemoteError> {
        let raw: Value = serde_json::from_slice(bytes).map_err(|e| self.error(e.to_string()))?;
        self.check_structure(&raw)?;
        serde_json::from_value(raw).map_err(|e| self.error(e.to_string()))
    }

    fn check_structure(&self, raw: &Value) -> Result<(), RemoteError> {
        let found = match (&self.shape, raw) {
            (ResultShape::Scalar(_), _) => return Ok(()),
            (ResultShape::Optional(_), Value::Null) => "null",
            (ResultShape::Optional(_), _) => return Ok(()),
            (ResultShape::List(_) | ResultShape::Set(_), Value::Array(_)) => return Ok(()),
            (ResultShape::Map(_, _), Value::Object(_)) => return Ok(()),
            (_, other) => json_kind(other),
        };
        Err(self.error(format!("unexpected {} on the wire", found)))
    }

    fn error(&self, reason: String) -> RemoteError {
        RemoteError::Serialization {
            shape: self.shape.to_string(),
            reason,
        }
    }
}

impl<T: CacheValue> Default for ShapeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
