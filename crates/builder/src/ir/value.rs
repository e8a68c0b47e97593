//! Value descriptors: graph inputs, outputs and intermediate values

use super::shape::ShapeDescriptor;
use crate::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tensor element type
///
/// Discriminants follow the ONNX `TensorProto.DataType` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Undefined = 0,
    Float = 1,
    Uint8 = 2,
    Int8 = 3,
    Uint16 = 4,
    Int16 = 5,
    Int32 = 6,
    Int64 = 7,
    String = 8,
    Bool = 9,
    Float16 = 10,
    Double = 11,
    Uint32 = 12,
    Uint64 = 13,
    Bfloat16 = 16,
}

impl ElementType {
    /// Look up an element type by its ONNX code
    pub fn from_code(code: i64) -> Option<Self> {
        let ty = match code {
            0 => ElementType::Undefined,
            1 => ElementType::Float,
            2 => ElementType::Uint8,
            3 => ElementType::Int8,
            4 => ElementType::Uint16,
            5 => ElementType::Int16,
            6 => ElementType::Int32,
            7 => ElementType::Int64,
            8 => ElementType::String,
            9 => ElementType::Bool,
            10 => ElementType::Float16,
            11 => ElementType::Double,
            12 => ElementType::Uint32,
            13 => ElementType::Uint64,
            16 => ElementType::Bfloat16,
            _ => return None,
        };
        Some(ty)
    }

    /// ONNX code of this element type
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Check whether the type is specified
    pub fn is_defined(self) -> bool {
        self != ElementType::Undefined
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Undefined => "undefined",
            ElementType::Float => "float",
            ElementType::Uint8 => "uint8",
            ElementType::Int8 => "int8",
            ElementType::Uint16 => "uint16",
            ElementType::Int16 => "int16",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::String => "string",
            ElementType::Bool => "bool",
            ElementType::Float16 => "float16",
            ElementType::Double => "double",
            ElementType::Uint32 => "uint32",
            ElementType::Uint64 => "uint64",
            ElementType::Bfloat16 => "bfloat16",
        };
        f.write_str(name)
    }
}

/// Type of a graph value
///
/// Only `Tensor` is accepted by [`ValueDescriptor::new`] today. The other
/// kinds are the extension point for sequence/map/optional/sparse values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Tensor {
        elem: ElementType,
        shape: Option<ShapeDescriptor>,
    },
    Sequence(Box<ValueType>),
    Map {
        key: ElementType,
        value: Box<ValueType>,
    },
    Optional(Box<ValueType>),
    SparseTensor {
        elem: ElementType,
        shape: Option<ShapeDescriptor>,
    },
}

impl ValueType {
    fn kind_name(&self) -> &'static str {
        match self {
            ValueType::Tensor { .. } => "tensor",
            ValueType::Sequence(_) => "sequence",
            ValueType::Map { .. } => "map",
            ValueType::Optional(_) => "optional",
            ValueType::SparseTensor { .. } => "sparse tensor",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Tensor { elem, shape } => match shape {
                Some(shape) => write!(f, "tensor<{}>{}", elem, shape),
                None => write!(f, "tensor<{}>", elem),
            },
            ValueType::Sequence(inner) => write!(f, "seq<{}>", inner),
            ValueType::Map { key, value } => write!(f, "map<{}, {}>", key, value),
            ValueType::Optional(inner) => write!(f, "optional<{}>", inner),
            ValueType::SparseTensor { elem, .. } => write!(f, "sparse<{}>", elem),
        }
    }
}

/// Name and type of a graph value
///
/// Immutable once constructed. A descriptor added to a fragment is owned by
/// that fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueDescriptor {
    name: String,
    value_type: ValueType,
}

impl ValueDescriptor {
    /// Create a tensor descriptor, taking ownership of `shape`
    pub fn tensor(name: impl Into<String>, elem: ElementType, shape: Option<ShapeDescriptor>) -> Result<Self> {
        Self::new(name, ValueType::Tensor { elem, shape })
    }

    /// Create a descriptor from a full value type
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "value name cannot be empty".to_string(),
            ));
        }

        match &value_type {
            ValueType::Tensor { elem, .. } => {
                if !elem.is_defined() {
                    return Err(GraphError::InvalidArgument(format!(
                        "tensor value '{}' needs an element type",
                        name
                    )));
                }
            }
            other => {
                return Err(GraphError::Unsupported(format!(
                    "{} values are not supported yet ('{}')",
                    other.kind_name(),
                    name
                )));
            }
        }

        Ok(Self { name, value_type })
    }

    /// Value name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full value type
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// Element type for tensor values
    pub fn element_type(&self) -> Option<ElementType> {
        match &self.value_type {
            ValueType::Tensor { elem, .. } | ValueType::SparseTensor { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    /// Shape for tensor values, if declared
    pub fn shape(&self) -> Option<&ShapeDescriptor> {
        match &self.value_type {
            ValueType::Tensor { shape, .. } | ValueType::SparseTensor { shape, .. } => shape.as_ref(),
            _ => None,
        }
    }

    /// Re-check invariants after deserialization
    pub(crate) fn validate(&self) -> Result<()> {
        Self::new(self.name.clone(), self.value_type.clone()).map(|_| ())
    }
}

impl fmt::Display for ValueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value_type)
    }
}
