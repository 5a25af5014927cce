//! Value codecs that dialects can substitute for the engine's defaults

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::core::{Error, Result};
use crate::types::{Value, ValueKind};

/// Codec translating a value between its engine form and its stored form
///
/// Returned by `GridDialect::override_type` when a datastore cannot store a
/// value kind natively.
pub trait GridType: fmt::Debug + Send + Sync {
    /// Name of the codec, used in diagnostics
    fn name(&self) -> &str;

    /// Kind of the values this codec accepts from the engine
    fn kind(&self) -> ValueKind;

    /// Convert an engine value into its stored representation
    fn to_grid(&self, value: Value) -> Result<Value>;

    /// Convert a stored representation back into the engine value
    fn from_grid(&self, value: Value) -> Result<Value>;
}

/// Stores binary values as base64 text, for datastores without a binary type
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64BytesType;

impl GridType for Base64BytesType {
    fn name(&self) -> &str {
        "base64_bytes"
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Bytes
    }

    fn to_grid(&self, value: Value) -> Result<Value> {
        match value {
            Value::Bytes(bytes) => Ok(Value::Text(STANDARD.encode(bytes))),
            other => Err(Error::dialect(format!(
                "{} cannot encode a {:?} value",
                self.name(),
                other.kind()
            ))),
        }
    }

    fn from_grid(&self, value: Value) -> Result<Value> {
        match value {
            Value::Text(text) => STANDARD
                .decode(text.as_bytes())
                .map(Value::Bytes)
                .map_err(|e| {
                    crate::core::GridDialectError::with_cause(
                        format!("{} cannot decode stored value", self.name()),
                        e,
                    )
                    .into()
                }),
            other => Err(Error::dialect(format!(
                "{} cannot decode a {:?} value",
                self.name(),
                other.kind()
            ))),
        }
    }
}
