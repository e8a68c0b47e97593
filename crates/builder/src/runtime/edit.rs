//! Load, patch, finalize
//!
//! An [`EditSession`] owns a resolved base model and applies patches to it
//! one at a time. Each apply is atomic. `finalize` consumes the session, so
//! nothing can be patched after the model has been handed to a session.

use super::session::ReferenceSession;
use crate::config::BuilderConfig;
use crate::graph::{GraphMerger, GraphPatch};
use crate::ir::GraphFragment;
use crate::materialize::{ExecutableModel, Materializer};
use crate::model::ModelDocument;
use crate::Result;
use tracing::info;

#[derive(Debug)]
pub struct EditSession {
    model: ExecutableModel,
    merger: GraphMerger,
    config: BuilderConfig,
    applied: usize,
}

impl EditSession {
    /// Open an already materialized model for editing
    pub fn load(model: ExecutableModel, config: BuilderConfig) -> Self {
        Self {
            model,
            merger: GraphMerger::new(config.merge.clone()),
            config,
            applied: 0,
        }
    }

    /// Materialize a document and open it for editing
    pub fn load_document(document: ModelDocument, config: BuilderConfig) -> Result<Self> {
        let model = Materializer::new().materialize(document)?;
        Ok(Self::load(model, config))
    }

    /// An empty patch to build on
    pub fn new_patch(&self) -> GraphPatch {
        GraphPatch::new(GraphFragment::new())
    }

    /// Merge a patch into the current model
    ///
    /// On failure the current model is unchanged and the session stays
    /// usable.
    pub fn apply(&mut self, patch: GraphPatch) -> Result<()> {
        let merged = self.merger.merge(&self.model, patch)?;
        self.model = merged;
        self.applied += 1;
        Ok(())
    }

    /// Current model
    pub fn model(&self) -> &ExecutableModel {
        &self.model
    }

    /// Number of patches applied so far
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Hand the merged model to a reference session
    pub fn finalize(self) -> ReferenceSession {
        info!(patches = self.applied, "finalized edit session");
        ReferenceSession::new(self.model, self.config.session)
    }

    /// Give up the session and keep the merged model
    pub fn into_model(self) -> ExecutableModel {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ElementType, OperatorNode, ValueDescriptor};
    use crate::runtime::{ExecutionProvider, TensorMap};
    use crate::{GraphError, TensorData};

    fn identity_document() -> ModelDocument {
        let mut graph = GraphFragment::new();
        graph
            .add_input(ValueDescriptor::tensor("x", ElementType::Float, None).unwrap())
            .unwrap();
        graph
            .add_output(ValueDescriptor::tensor("y", ElementType::Float, None).unwrap())
            .unwrap();
        graph
            .add_node(OperatorNode::new("Identity", "", "id", ["x"], ["y"], vec![]).unwrap())
            .unwrap();
        let mut doc = ModelDocument::with_opsets([("", 18)]).unwrap();
        doc.add_graph(graph).unwrap();
        doc
    }

    #[test]
    fn test_failed_apply_keeps_session_usable() {
        let mut session = EditSession::load_document(identity_document(), BuilderConfig::default()).unwrap();

        let mut bad = GraphFragment::new();
        bad.add_node(OperatorNode::new("Relu", "", "r", ["missing"], ["z"], vec![]).unwrap())
            .unwrap();
        assert!(matches!(
            session.apply(GraphPatch::new(bad)),
            Err(GraphError::UnresolvedReference(_))
        ));
        assert_eq!(session.applied(), 0);

        let mut good = GraphFragment::new();
        good.add_node(OperatorNode::new("Relu", "", "r", ["y"], ["z"], vec![]).unwrap())
            .unwrap();
        good.add_output(ValueDescriptor::tensor("z", ElementType::Float, None).unwrap())
            .unwrap();
        session.apply(GraphPatch::new(good)).unwrap();
        assert_eq!(session.applied(), 1);

        let runner = session.finalize();
        let mut inputs = TensorMap::new();
        inputs.insert("x".to_string(), TensorData::from_f32(vec![2], vec![-1.0, 1.0]).unwrap());
        let outputs = runner.run(&inputs).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[1].1.as_f32().unwrap(), &[0.0, 1.0]);
    }

    #[test]
    fn test_new_patch_is_empty() {
        let session = EditSession::load_document(identity_document(), BuilderConfig::default()).unwrap();
        assert!(session.new_patch().fragment().is_empty());
    }
}
