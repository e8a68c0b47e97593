//! Operator attributes

use super::fragment::GraphFragment;
use super::tensor::TensorData;
use crate::{GraphError, Result};
use serde::{Deserialize, Serialize};

/// Attribute payload, scalar or array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributePayload {
    Int(i64),
    Float(f32),
    String(String),
    Tensor(TensorData),
    Graph(Box<GraphFragment>),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    Strings(Vec<String>),
    Tensors(Vec<TensorData>),
    Graphs(Vec<GraphFragment>),
}

impl AttributePayload {
    /// Short kind name, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttributePayload::Int(_) => "int",
            AttributePayload::Float(_) => "float",
            AttributePayload::String(_) => "string",
            AttributePayload::Tensor(_) => "tensor",
            AttributePayload::Graph(_) => "graph",
            AttributePayload::Ints(_) => "ints",
            AttributePayload::Floats(_) => "floats",
            AttributePayload::Strings(_) => "strings",
            AttributePayload::Tensors(_) => "tensors",
            AttributePayload::Graphs(_) => "graphs",
        }
    }
}

/// A named attribute attached to an operator invocation
///
/// The payload is copied in at construction and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    name: String,
    payload: AttributePayload,
}

impl AttributeValue {
    /// Create an attribute
    pub fn new(name: impl Into<String>, payload: AttributePayload) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "attribute name cannot be empty".to_string(),
            ));
        }
        Ok(Self { name, payload })
    }

    pub fn int(name: impl Into<String>, value: i64) -> Result<Self> {
        Self::new(name, AttributePayload::Int(value))
    }

    pub fn float(name: impl Into<String>, value: f32) -> Result<Self> {
        Self::new(name, AttributePayload::Float(value))
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::new(name, AttributePayload::String(value.into()))
    }

    pub fn tensor(name: impl Into<String>, value: TensorData) -> Result<Self> {
        Self::new(name, AttributePayload::Tensor(value))
    }

    pub fn ints(name: impl Into<String>, values: &[i64]) -> Result<Self> {
        Self::new(name, AttributePayload::Ints(values.to_vec()))
    }

    pub fn floats(name: impl Into<String>, values: &[f32]) -> Result<Self> {
        Self::new(name, AttributePayload::Floats(values.to_vec()))
    }

    /// Attribute name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute payload
    pub fn payload(&self) -> &AttributePayload {
        &self.payload
    }

    /// Payload as int, if it is one
    pub fn as_int(&self) -> Option<i64> {
        match self.payload {
            AttributePayload::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Payload as float, if it is one
    pub fn as_float(&self) -> Option<f32> {
        match self.payload {
            AttributePayload::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Payload as tensor, if it is one
    pub fn as_tensor(&self) -> Option<&TensorData> {
        match &self.payload {
            AttributePayload::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "attribute name cannot be empty".to_string(),
            ));
        }
        match &self.payload {
            AttributePayload::Tensor(t) => t.validate(),
            AttributePayload::Tensors(ts) => ts.iter().try_for_each(TensorData::validate),
            // Nested fragments are validated when they are built or deserialized
            _ => Ok(()),
        }
    }
}
