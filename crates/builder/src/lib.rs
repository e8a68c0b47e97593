//! # Hologram Graph Builder
//!
//! Builds tensor-model graphs from small owned pieces, merges patches into
//! existing models, and materializes the result for execution.
//!
//! ## Overview
//!
//! - [`ir`]: shapes, value descriptors, attributes, operator nodes and the
//!   [`GraphFragment`] that owns them
//! - [`model`]: opset registry and [`ModelDocument`]
//! - [`graph`]: resolved, topologically ordered graphs and the
//!   [`GraphMerger`] that applies a [`GraphPatch`]
//! - [`materialize`]: turns a document into an [`ExecutableModel`]
//! - [`runtime`]: edit sessions and the reference execution provider
//! - [`api`]: versioned, handle-based operation table
//!
//! ## Example
//!
//! ```
//! use hologram_graph_builder::{
//!     ElementType, GraphFragment, Materializer, ModelDocument, OperatorNode, ValueDescriptor,
//! };
//!
//! let mut graph = GraphFragment::new();
//! graph.add_input(ValueDescriptor::tensor("x", ElementType::Float, None)?)?;
//! graph.add_output(ValueDescriptor::tensor("y", ElementType::Float, None)?)?;
//! graph.add_node(OperatorNode::new("Relu", "", "relu", ["x"], ["y"], vec![])?)?;
//!
//! let mut doc = ModelDocument::with_opsets([("", 18)])?;
//! doc.add_graph(graph)?;
//!
//! let model = Materializer::new().materialize(doc)?;
//! assert_eq!(model.graph().node_count(), 1);
//! # Ok::<(), hologram_graph_builder::GraphError>(())
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod graph;
pub mod ir;
pub mod materialize;
pub mod model;
pub mod runtime;

pub use config::{BuilderConfig, MergeConfig, SessionConfig};
pub use error::{ErrorKind, GraphError, Result};
pub use graph::{GraphMerger, GraphPatch, GraphStatistics, ResolvedGraph};
pub use ir::{
    AttributePayload, AttributeValue, Dimension, ElementType, GraphFragment, Initializer, OperatorNode,
    ShapeDescriptor, TensorData, TensorValues, ValueDescriptor, ValueType,
};
pub use materialize::{ExecutableModel, Materializer};
pub use model::{LineageEntry, ModelDocument, ModelMetadata, OpsetRegistry};
pub use runtime::{EditSession, ExecutionProvider, ReferenceSession, TensorMap};
