//! Dense tensor payloads for initializers, attributes and session I/O

use super::value::ElementType;
use crate::{GraphError, Result};
use serde::{Deserialize, Serialize};

/// Typed element storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorValues {
    Float(Vec<f32>),
    Double(Vec<f64>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Bool(Vec<bool>),
    String(Vec<String>),
}

impl TensorValues {
    /// Number of stored elements
    pub fn len(&self) -> usize {
        match self {
            TensorValues::Float(v) => v.len(),
            TensorValues::Double(v) => v.len(),
            TensorValues::Int32(v) => v.len(),
            TensorValues::Int64(v) => v.len(),
            TensorValues::Bool(v) => v.len(),
            TensorValues::String(v) => v.len(),
        }
    }

    /// Check if no elements are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type of the storage
    pub fn element_type(&self) -> ElementType {
        match self {
            TensorValues::Float(_) => ElementType::Float,
            TensorValues::Double(_) => ElementType::Double,
            TensorValues::Int32(_) => ElementType::Int32,
            TensorValues::Int64(_) => ElementType::Int64,
            TensorValues::Bool(_) => ElementType::Bool,
            TensorValues::String(_) => ElementType::String,
        }
    }
}

/// A dense tensor: dimensions plus row-major values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    dims: Vec<i64>,
    values: TensorValues,
}

impl TensorData {
    /// Create a tensor, checking that `dims` matches the element count
    pub fn new(dims: Vec<i64>, values: TensorValues) -> Result<Self> {
        if let Some(&bad) = dims.iter().find(|&&d| d < 0) {
            return Err(GraphError::InvalidArgument(format!(
                "tensor dimension {} is negative in {:?}",
                bad, dims
            )));
        }

        let total = element_count(&dims)?;
        if total != values.len() {
            return Err(GraphError::InvalidArgument(format!(
                "shape {:?} doesn't match data length {} (expected {} elements)",
                dims,
                values.len(),
                total
            )));
        }

        Ok(Self { dims, values })
    }

    /// Create a float tensor
    pub fn from_f32(dims: Vec<i64>, values: Vec<f32>) -> Result<Self> {
        Self::new(dims, TensorValues::Float(values))
    }

    /// Create an int64 tensor
    pub fn from_i64(dims: Vec<i64>, values: Vec<i64>) -> Result<Self> {
        Self::new(dims, TensorValues::Int64(values))
    }

    /// Create a rank-0 float tensor
    pub fn scalar_f32(value: f32) -> Self {
        Self {
            dims: Vec::new(),
            values: TensorValues::Float(vec![value]),
        }
    }

    /// Tensor dimensions
    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    /// Stored values
    pub fn values(&self) -> &TensorValues {
        &self.values
    }

    /// Element type
    pub fn element_type(&self) -> ElementType {
        self.values.element_type()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if tensor has no elements
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrow float values, if this is a float tensor
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.values {
            TensorValues::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow int64 values, if this is an int64 tensor
    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.values {
            TensorValues::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        Self::new(self.dims.clone(), self.values.clone()).map(|_| ())
    }
}

/// Element count of non-negative `dims`, rejecting overflow
///
/// Any zero dimension makes the count zero whatever the other extents are.
pub(crate) fn element_count(dims: &[i64]) -> Result<usize> {
    if dims.contains(&0) {
        return Ok(0);
    }
    dims.iter()
        .try_fold(1i64, |acc, &d| acc.checked_mul(d))
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| GraphError::InvalidArgument(format!("tensor shape {:?} overflows the element count", dims)))
}
