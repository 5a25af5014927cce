//! Identifier sources backing table and sequence id generators

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Kind of id generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSourceType {
    /// Table based generator, one row per segment
    Table,
    /// Native or emulated sequence
    Sequence,
}

/// Describes where an id generator keeps its counters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdSourceKeyMetadata {
    source_type: IdSourceType,
    name: String,
    key_column_name: Option<String>,
    value_column_name: Option<String>,
}

impl IdSourceKeyMetadata {
    /// Metadata of a table based generator
    pub fn for_table(
        table: impl Into<String>,
        key_column_name: impl Into<String>,
        value_column_name: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            source_type: IdSourceType::Table,
            name: table.into(),
            key_column_name: Some(key_column_name.into()),
            value_column_name: Some(value_column_name.into()),
        })
    }

    /// Metadata of a sequence
    pub fn for_sequence(sequence: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            source_type: IdSourceType::Sequence,
            name: sequence.into(),
            key_column_name: None,
            value_column_name: None,
        })
    }

    /// Generator kind
    pub fn source_type(&self) -> IdSourceType {
        self.source_type
    }

    /// Table or sequence name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Segment column of a table generator
    pub fn key_column_name(&self) -> Option<&str> {
        self.key_column_name.as_deref()
    }

    /// Counter column of a table generator
    pub fn value_column_name(&self) -> Option<&str> {
        self.value_column_name.as_deref()
    }
}

/// Identity of one counter: its generator plus the segment for table sources
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdSourceKey {
    metadata: Arc<IdSourceKeyMetadata>,
    segment: Option<Value>,
}

impl IdSourceKey {
    /// Key of one segment of a table generator
    pub fn for_table(metadata: Arc<IdSourceKeyMetadata>, segment: impl Into<Value>) -> Self {
        Self {
            metadata,
            segment: Some(segment.into()),
        }
    }

    /// Key of a sequence
    pub fn for_sequence(metadata: Arc<IdSourceKeyMetadata>) -> Self {
        Self {
            metadata,
            segment: None,
        }
    }

    /// Generator metadata
    pub fn metadata(&self) -> &Arc<IdSourceKeyMetadata> {
        &self.metadata
    }

    /// Table or sequence name
    pub fn table(&self) -> &str {
        self.metadata.name()
    }

    /// Segment value, for table generators
    pub fn segment(&self) -> Option<&Value> {
        self.segment.as_ref()
    }
}

impl fmt::Display for IdSourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.segment {
            Some(segment) => write!(f, "IdSourceKey({}, {})", self.metadata.name, segment),
            None => write!(f, "IdSourceKey({})", self.metadata.name),
        }
    }
}

/// Request for the next value of an id source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextValueRequest {
    key: IdSourceKey,
    increment: i64,
    initial_value: i64,
}

impl NextValueRequest {
    /// Create a request
    pub fn new(key: IdSourceKey, increment: i64, initial_value: i64) -> Self {
        Self {
            key,
            increment,
            initial_value,
        }
    }

    /// Counter to advance
    pub fn key(&self) -> &IdSourceKey {
        &self.key
    }

    /// Step between consecutive values
    pub fn increment(&self) -> i64 {
        self.increment
    }

    /// Value returned by the first call on a never-seen source
    pub fn initial_value(&self) -> i64 {
        self.initial_value
    }
}
