//! # Graph IR building blocks
//!
//! Leaves first:
//!
//! - **Shapes**: [`ShapeDescriptor`] mixing fixed, symbolic and unknown dimensions
//! - **Values**: [`ValueDescriptor`] naming a typed graph input/output
//! - **Attributes**: [`AttributeValue`] attached to operator invocations
//! - **Tensors**: [`TensorData`] for initializers and tensor attributes
//! - **Nodes**: [`OperatorNode`], one operator invocation
//! - **Fragments**: [`GraphFragment`], the owning container for all of the above

pub mod attribute;
pub mod fragment;
pub mod node;
pub mod shape;
pub mod tensor;
pub mod value;

pub use attribute::{AttributePayload, AttributeValue};
pub use fragment::{GraphFragment, Initializer};
pub use node::{normalize_domain, OperatorNode, ONNX_DOMAIN, ONNX_DOMAIN_ALIAS};
pub use shape::{Dimension, ShapeDescriptor};
pub use tensor::{TensorData, TensorValues};
pub use value::{ElementType, ValueDescriptor, ValueType};
