//! Hand-off from the builder to the execution boundary
//!
//! The materializer is a pure translation: it resolves names, orders nodes
//! and checks opsets, but never decides shapes. Values whose type or shape
//! is not fully known pass through as declared.

use crate::graph::{GraphStatistics, ResolvedGraph};
use crate::ir::{GraphFragment, OperatorNode, ValueDescriptor};
use crate::model::{ModelDocument, ModelMetadata, OpsetRegistry};
use crate::{GraphError, Result};
use tracing::{info, warn};

/// A resolved model ready for an execution provider
///
/// Once built it is read-only from the builder's side.
#[derive(Debug, Clone)]
pub struct ExecutableModel {
    graph: ResolvedGraph,
    opsets: OpsetRegistry,
    metadata: ModelMetadata,
}

impl ExecutableModel {
    pub(crate) fn new(graph: ResolvedGraph, opsets: OpsetRegistry, metadata: ModelMetadata) -> Self {
        Self {
            graph,
            opsets,
            metadata,
        }
    }

    /// Resolved graph
    pub fn graph(&self) -> &ResolvedGraph {
        &self.graph
    }

    /// Opset registry
    pub fn opsets(&self) -> &OpsetRegistry {
        &self.opsets
    }

    /// Provenance metadata
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Graph statistics
    pub fn statistics(&self) -> GraphStatistics {
        self.graph.statistics()
    }

    /// Turn back into an editable document
    pub fn into_document(self) -> Result<ModelDocument> {
        let fragment = self.graph.to_fragment()?;
        Ok(ModelDocument::from_parts(self.opsets, fragment, self.metadata))
    }
}

/// Translates documents into executable models
#[derive(Debug, Clone, Default)]
pub struct Materializer {
    _private: (),
}

impl Materializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a document and produce its executable form
    ///
    /// Fails with `InvalidArgument` if the document has no main graph and
    /// with `MissingOpset` if a node names an unregistered domain.
    pub fn materialize(&self, document: ModelDocument) -> Result<ExecutableModel> {
        let (opsets, graph, metadata) = document.into_parts();
        let graph = graph.ok_or_else(|| {
            GraphError::InvalidArgument("document has no main graph to materialize".to_string())
        })?;
        self.materialize_graph(graph, opsets, metadata)
    }

    /// Run every check `materialize` runs without taking the document
    pub fn check(&self, document: &ModelDocument) -> Result<()> {
        let graph = document.graph().ok_or_else(|| {
            GraphError::InvalidArgument("document has no main graph to materialize".to_string())
        })?;
        check_domains(graph.nodes(), document.opsets())?;
        ResolvedGraph::check(graph)
    }

    pub(crate) fn materialize_graph(
        &self,
        graph: GraphFragment,
        opsets: OpsetRegistry,
        metadata: ModelMetadata,
    ) -> Result<ExecutableModel> {
        check_domains(graph.nodes(), &opsets)?;
        let resolved = ResolvedGraph::resolve(graph)?;

        for value in resolved.inputs().iter().chain(resolved.outputs()) {
            report_opaque(value);
        }

        info!(
            nodes = resolved.node_count(),
            initializers = resolved.initializer_count(),
            opsets = opsets.len(),
            "materialized model"
        );
        Ok(ExecutableModel::new(resolved, opsets, metadata))
    }
}

/// Every node domain must have a registered opset
pub(crate) fn check_domains<'a, I>(nodes: I, opsets: &OpsetRegistry) -> Result<()>
where
    I: IntoIterator<Item = &'a OperatorNode>,
{
    for node in nodes {
        if !opsets.contains(node.domain()) {
            return Err(GraphError::MissingOpset(format!(
                "{} (node '{}' of type {})",
                node.domain(),
                node.name(),
                node.op_type()
            )));
        }
    }
    Ok(())
}

fn report_opaque(value: &ValueDescriptor) {
    match value.shape() {
        Some(shape) if shape.element_count().is_some() => {}
        Some(shape) => warn!(
            value = value.name(),
            shape = %shape,
            "shape has symbolic or unknown dimensions; passing through"
        ),
        None => warn!(value = value.name(), "no shape declared; passing through"),
    }
}
