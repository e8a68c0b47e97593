//! Model documents: opsets + main graph + provenance

use super::opset::OpsetRegistry;
use crate::ir::GraphFragment;
use crate::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One applied edit in a document's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEntry {
    /// Position in the edit history, starting at 1
    pub sequence: u32,
    /// Caller-supplied label of the patch
    pub label: String,
    pub nodes_added: usize,
    pub nodes_removed: usize,
    pub initializers_added: usize,
    /// Opsets the patch registered
    pub opsets_added: Vec<(String, i64)>,
}

/// Provenance metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub producer_name: String,
    #[serde(default)]
    pub producer_version: String,
    #[serde(default)]
    pub model_version: i64,
    #[serde(default)]
    pub doc_string: String,
    #[serde(default)]
    pub lineage: Vec<LineageEntry>,
}

impl ModelMetadata {
    /// Metadata stamped with this crate as producer
    pub fn produced_here() -> Self {
        Self {
            producer_name: env!("CARGO_PKG_NAME").to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            ..Default::default()
        }
    }

    /// Append a lineage entry, numbering it after the last one
    pub fn record(&mut self, mut entry: LineageEntry) {
        entry.sequence = self.lineage.last().map(|e| e.sequence + 1).unwrap_or(1);
        self.lineage.push(entry);
    }
}

/// An opset registry plus at most one main graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DocumentParts", into = "DocumentParts")]
pub struct ModelDocument {
    opsets: OpsetRegistry,
    graph: Option<GraphFragment>,
    metadata: ModelMetadata,
}

impl ModelDocument {
    /// Create a document with an opset registry and no graph yet
    pub fn new(opsets: OpsetRegistry) -> Self {
        Self {
            opsets,
            graph: None,
            metadata: ModelMetadata::produced_here(),
        }
    }

    /// Create a document from `(domain, version)` pairs
    pub fn with_opsets<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        Ok(Self::new(OpsetRegistry::new(pairs)?))
    }

    /// Take ownership of the main graph
    ///
    /// Fails with `AlreadyPresent` if the document already owns a graph and
    /// with `InvalidArgument` if the fragment declares no outputs. Zero
    /// inputs are allowed for fully-constant graphs.
    pub fn add_graph(&mut self, graph: GraphFragment) -> Result<()> {
        self.check_graph(&graph)?;

        info!(
            nodes = graph.nodes().len(),
            inputs = graph.inputs().len(),
            outputs = graph.outputs().len(),
            initializers = graph.initializers().len(),
            "graph added to document"
        );
        self.graph = Some(graph);
        Ok(())
    }

    pub(crate) fn check_graph(&self, graph: &GraphFragment) -> Result<()> {
        if self.graph.is_some() {
            return Err(GraphError::AlreadyPresent(
                "document already owns a main graph".to_string(),
            ));
        }
        if graph.outputs().is_empty() {
            return Err(GraphError::InvalidArgument(
                "graph must declare at least one output".to_string(),
            ));
        }
        Ok(())
    }

    /// Register additional opsets; conflicting versions are rejected
    pub fn merge_opsets<'a, I>(&mut self, pairs: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        self.opsets.merge(pairs)
    }

    /// Main graph, once added
    pub fn graph(&self) -> Option<&GraphFragment> {
        self.graph.as_ref()
    }

    /// Opset registry
    pub fn opsets(&self) -> &OpsetRegistry {
        &self.opsets
    }

    /// Provenance metadata
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Set the free-form documentation string
    pub fn set_doc_string(&mut self, doc: impl Into<String>) {
        self.metadata.doc_string = doc.into();
    }

    /// Set the model version
    pub fn set_model_version(&mut self, version: i64) {
        self.metadata.model_version = version;
    }

    /// Split into registry, graph and metadata
    pub fn into_parts(self) -> (OpsetRegistry, Option<GraphFragment>, ModelMetadata) {
        (self.opsets, self.graph, self.metadata)
    }

    pub(crate) fn from_parts(opsets: OpsetRegistry, graph: GraphFragment, metadata: ModelMetadata) -> Self {
        Self {
            opsets,
            graph: Some(graph),
            metadata,
        }
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON, re-checking every builder invariant
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON document from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Save as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[doc(hidden)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentParts {
    #[serde(default)]
    opsets: OpsetRegistry,
    #[serde(default)]
    graph: Option<GraphFragment>,
    #[serde(default)]
    metadata: ModelMetadata,
}

impl TryFrom<DocumentParts> for ModelDocument {
    type Error = GraphError;

    fn try_from(parts: DocumentParts) -> Result<Self> {
        let mut document = ModelDocument::new(parts.opsets);
        document.metadata = parts.metadata;
        if let Some(graph) = parts.graph {
            document.add_graph(graph)?;
        }
        Ok(document)
    }
}

impl From<ModelDocument> for DocumentParts {
    fn from(document: ModelDocument) -> Self {
        Self {
            opsets: document.opsets,
            graph: document.graph,
            metadata: document.metadata,
        }
    }
}
