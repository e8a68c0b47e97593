//! Reference session
//!
//! Executes an [`ExecutableModel`] node by node in topological order,
//! caching every intermediate tensor by value name.

use super::kernels;
use super::{ExecutionProvider, TensorMap};
use crate::config::SessionConfig;
use crate::ir::{TensorData, ValueDescriptor};
use crate::materialize::ExecutableModel;
use crate::{GraphError, Result};
use ahash::AHashMap;
use tracing::{debug, info};

/// Small CPU interpreter behind the execution-provider boundary
#[derive(Debug, Clone)]
pub struct ReferenceSession {
    model: ExecutableModel,
    config: SessionConfig,
}

impl ReferenceSession {
    /// Create a session, taking ownership of the model
    pub fn new(model: ExecutableModel, config: SessionConfig) -> Self {
        info!(
            nodes = model.graph().node_count(),
            inputs = model.graph().inputs().len(),
            outputs = model.graph().outputs().len(),
            "created reference session"
        );
        Self { model, config }
    }

    fn check_input(&self, declared: &ValueDescriptor, tensor: &TensorData) -> Result<()> {
        if let Some(elem) = declared.element_type() {
            if elem != tensor.element_type() {
                return Err(GraphError::InvalidArgument(format!(
                    "input '{}' expects {}, got {}",
                    declared.name(),
                    elem,
                    tensor.element_type()
                )));
            }
        }
        if self.config.check_declared_shapes {
            if let Some(shape) = declared.shape() {
                if !shape.accepts(tensor.dims()) {
                    return Err(GraphError::InvalidArgument(format!(
                        "input '{}' expects shape {}, got {:?}",
                        declared.name(),
                        shape,
                        tensor.dims()
                    )));
                }
            }
        }
        Ok(())
    }
}

impl ExecutionProvider for ReferenceSession {
    fn name(&self) -> &str {
        "reference"
    }

    fn model(&self) -> &ExecutableModel {
        &self.model
    }

    fn run(&self, inputs: &TensorMap) -> Result<Vec<(String, TensorData)>> {
        let graph = self.model.graph();

        // Cache for computed values: value name -> tensor
        let mut cache: AHashMap<&str, TensorData> = AHashMap::new();
        for (name, tensor) in graph.initializers() {
            cache.insert(name, tensor.clone());
        }

        for declared in graph.inputs() {
            let tensor = inputs.get(declared.name()).ok_or_else(|| {
                GraphError::InvalidArgument(format!("missing value for graph input '{}'", declared.name()))
            })?;
            self.check_input(declared, tensor)?;
            cache.insert(declared.name(), tensor.clone());
        }
        for name in inputs.keys() {
            if !graph.has_input(name) {
                return Err(GraphError::InvalidArgument(format!(
                    "'{}' is not a graph input",
                    name
                )));
            }
        }

        for node in graph.nodes_in_order() {
            let args: Vec<Option<&TensorData>> = node
                .input_names()
                .iter()
                .map(|name| {
                    if name.is_empty() {
                        Ok(None)
                    } else {
                        cache.get(name.as_str()).map(Some).ok_or_else(|| {
                            GraphError::Execution(format!(
                                "value '{}' for node '{}' was never computed",
                                name,
                                node.name()
                            ))
                        })
                    }
                })
                .collect::<Result<_>>()?;

            let results = kernels::execute(node, &args)?;
            debug!(node = node.name(), op_type = node.op_type(), "executed node");

            for (name, tensor) in node.output_names().iter().zip(results) {
                cache.insert(name.as_str(), tensor);
            }
        }

        graph
            .outputs()
            .iter()
            .map(|declared| {
                cache
                    .get(declared.name())
                    .cloned()
                    .map(|tensor| (declared.name().to_string(), tensor))
                    .ok_or_else(|| {
                        GraphError::Execution(format!("graph output '{}' was never computed", declared.name()))
                    })
            })
            .collect()
    }
}
