//! crates/protocol/src/spec.rs
//!
//! Transfer specification document consumed by `StartTransfer`.
//!
//! The document is produced by external REST collaborators and treated as an
//! opaque JSON object. Only `direction` and `paths` are interpreted here; every
//! other key is forwarded untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::wire;

/// Key holding the `[{source, destination?}]` list.
pub const PATHS_KEY: &str = "paths";

/// Key holding the transfer direction.
pub const DIRECTION_KEY: &str = "direction";

/// Errors raised while interpreting a transfer specification.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// The document is valid JSON but not an object.
    #[error("transfer spec must be a JSON object, found {found}")]
    NotAnObject {
        /// JSON type that was found instead.
        found: &'static str,
    },
    /// The document is not valid JSON.
    #[error("transfer spec is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The `paths` entry does not have the `[{source, destination?}]` shape.
    #[error("transfer spec 'paths' is malformed: {0}")]
    InvalidPaths(#[source] serde_json::Error),
}

/// Direction of a transfer relative to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Upload.
    Send,
    /// Download.
    Receive,
}

impl Direction {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "send" => Some(Self::Send),
            "receive" => Some(Self::Receive),
            _ => None,
        }
    }
}

/// One entry of the `paths` list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    /// Source path or URL.
    pub source: String,
    /// Destination path, when it differs from the daemon default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl PathEntry {
    /// Creates an entry with an explicit destination.
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: Some(destination.into()),
        }
    }

    /// Creates an entry that lets the daemon pick the destination.
    pub fn source_only(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: None,
        }
    }
}

impl From<PathEntry> for wire::TransferPath {
    fn from(entry: PathEntry) -> Self {
        Self {
            source: entry.source,
            destination: entry.destination.unwrap_or_default(),
        }
    }
}

/// Transfer specification: a JSON object forwarded to the daemon.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransferSpec {
    document: Map<String, Value>,
}

impl TransferSpec {
    /// Wraps an already parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, SpecError> {
        match value {
            Value::Object(document) => Ok(Self { document }),
            other => Err(SpecError::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }

    /// Parses a JSON document.
    pub fn from_json(text: &str) -> Result<Self, SpecError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Returns the transfer direction, if present and recognised.
    pub fn direction(&self) -> Option<Direction> {
        self.document
            .get(DIRECTION_KEY)
            .and_then(Value::as_str)
            .and_then(Direction::parse)
    }

    /// Returns the decoded `paths` list; a missing key yields an empty list.
    pub fn paths(&self) -> Result<Vec<PathEntry>, SpecError> {
        self.document
            .get(PATHS_KEY)
            .map_or_else(|| Ok(Vec::new()), decode_paths)
    }

    /// Removes the `paths` entry from the document and returns it decoded.
    ///
    /// The document is left unchanged when decoding fails.
    pub fn take_paths(&mut self) -> Result<Vec<PathEntry>, SpecError> {
        let Some(raw) = self.document.get(PATHS_KEY) else {
            return Ok(Vec::new());
        };
        let paths = decode_paths(raw)?;
        self.document.remove(PATHS_KEY);
        Ok(paths)
    }

    /// Replaces the `paths` entry.
    pub fn set_paths(&mut self, paths: &[PathEntry]) {
        let value = serde_json::to_value(paths).unwrap_or_else(|_| Value::Array(Vec::new()));
        self.document.insert(PATHS_KEY.to_owned(), value);
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    /// Reports whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.document.contains_key(key)
    }

    /// Inserts or replaces a top-level entry, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.document.insert(key.into(), value)
    }

    /// Serializes the document to the compact JSON string sent on the wire.
    pub fn to_wire(&self) -> String {
        Value::Object(self.document.clone()).to_string()
    }

    /// Consumes the spec and returns the underlying JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.document)
    }
}

fn decode_paths(raw: &Value) -> Result<Vec<PathEntry>, SpecError> {
    Vec::<PathEntry>::deserialize(raw).map_err(SpecError::InvalidPaths)
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
