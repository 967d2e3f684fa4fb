//! Core data models for generated telemetry
//!
//! Spans and metric points follow the OTLP data model closely enough that a
//! sink can translate them field for field.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute map attached to spans, resources and metric points
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Double(v) => write!(f, "{}", v),
            AttributeValue::String(v) => f.write_str(v),
        }
    }
}

macro_rules! hex_id {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(&text, &mut bytes).map_err(serde::de::Error::custom)?;
                Ok(Self(bytes))
            }
        }
    };
}

hex_id!(TraceId, 16);
hex_id!(SpanId, 8);

/// Span kind; generated spans are always server spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Server,
    Client,
    Internal,
}

/// A finished span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    /// All zero for the root span
    pub parent_span_id: SpanId,
    pub name: String,
    pub kind: SpanKind,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    pub attributes: Attributes,
    pub resource: Attributes,
}

impl Span {
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_zero()
    }

    pub fn duration_nanos(&self) -> u64 {
        self.end_time_unix_nano
            .saturating_sub(self.start_time_unix_nano)
    }

    /// Name of the service that produced this span
    pub fn service_name(&self) -> Option<&str> {
        match self.resource.get(SERVICE_NAME) {
            Some(AttributeValue::String(name)) => Some(name),
            _ => None,
        }
    }
}

/// All spans of one generated trace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceBatch {
    pub spans: Vec<Span>,
}

impl TraceBatch {
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn root(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.is_root())
    }

    pub fn children_of(&self, span_id: SpanId) -> impl Iterator<Item = &Span> {
        self.spans
            .iter()
            .filter(move |s| s.parent_span_id == span_id && !s.is_root())
    }
}

/// Metric point kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    /// Monotonic sum with delta temporality
    Sum,
}

/// A single synthesized metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_unix_nano: Option<u64>,
    pub time_unix_nano: u64,
    pub attributes: Attributes,
}

/// Metric points sharing one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBatch {
    pub resource: Attributes,
    pub points: Vec<MetricPoint>,
}

/// Resource attribute carrying the emitting service
pub const SERVICE_NAME: &str = "service.name";

/// Span attribute carrying the generator sequence number
pub const SEQUENCE_NUMBER: &str = "load_generator.seq_num";

/// Span attribute propagated from failing children to their parent
pub const ERROR: &str = "error";
