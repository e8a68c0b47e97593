//! Graph fragments: the unit of construction and of patching
//!
//! A [`GraphFragment`] owns everything added to it. Every `add_*` method
//! takes its child by value, so the caller's binding is moved-from once the
//! call returns and cannot be used again. On failure the child is dropped
//! together with the error and the fragment is left unchanged.

use super::node::OperatorNode;
use super::tensor::TensorData;
use super::value::ValueDescriptor;
use crate::{GraphError, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A named constant tensor owned by a fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initializer {
    name: String,
    tensor: TensorData,
    /// Explicitly shadows an initializer of the same name in a base graph
    is_override: bool,
}

impl Initializer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tensor(&self) -> &TensorData {
        &self.tensor
    }

    pub fn is_override(&self) -> bool {
        self.is_override
    }

    pub(crate) fn into_parts(self) -> (String, TensorData) {
        (self.name, self.tensor)
    }
}

/// Ordered nodes, named initializers and the declared interface of a graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "FragmentParts", into = "FragmentParts")]
pub struct GraphFragment {
    /// Nodes in insertion order
    nodes: Vec<OperatorNode>,
    initializers: Vec<Initializer>,
    inputs: Vec<ValueDescriptor>,
    outputs: Vec<ValueDescriptor>,

    /// Node instance name → index into `nodes`
    node_index: FxHashMap<String, usize>,
    /// Value name → index of the producing node
    producers: FxHashMap<String, usize>,
    /// Initializer name → index into `initializers`
    initializer_index: FxHashMap<String, usize>,
}

impl GraphFragment {
    /// Create an empty fragment
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a declared graph input
    pub fn add_input(&mut self, value: ValueDescriptor) -> Result<()> {
        self.check_input(&value)?;
        debug!(input = value.name(), "declared graph input");
        self.inputs.push(value);
        Ok(())
    }

    /// Append a declared graph output
    pub fn add_output(&mut self, value: ValueDescriptor) -> Result<()> {
        self.check_output(&value)?;
        debug!(output = value.name(), "declared graph output");
        self.outputs.push(value);
        Ok(())
    }

    /// Add a constant initializer
    ///
    /// Redefining a name is an error; there is no last-write-wins.
    pub fn add_initializer(&mut self, name: impl Into<String>, tensor: TensorData) -> Result<()> {
        self.insert_initializer(name.into(), tensor, false)
    }

    /// Add an initializer that explicitly shadows a base-graph initializer
    ///
    /// Only meaningful when the fragment is merged as a patch.
    pub fn add_override_initializer(&mut self, name: impl Into<String>, tensor: TensorData) -> Result<()> {
        self.insert_initializer(name.into(), tensor, true)
    }

    pub(crate) fn insert_initializer(&mut self, name: String, tensor: TensorData, is_override: bool) -> Result<()> {
        self.check_initializer(&name)?;
        debug!(initializer = %name, dims = ?tensor.dims(), is_override, "added initializer");
        self.initializer_index.insert(name.clone(), self.initializers.len());
        self.initializers.push(Initializer {
            name,
            tensor,
            is_override,
        });
        Ok(())
    }

    /// Add an operator node
    ///
    /// Fails with `DuplicateName` if the instance name is taken or if one
    /// of the node's outputs already has a producer in this fragment.
    pub fn add_node(&mut self, node: OperatorNode) -> Result<()> {
        self.check_node(&node)?;

        let index = self.nodes.len();
        for output in node.output_names() {
            self.producers.insert(output.clone(), index);
        }
        self.node_index.insert(node.name().to_string(), index);
        debug!(node = node.name(), op_type = node.op_type(), "added node");
        self.nodes.push(node);
        Ok(())
    }

    pub(crate) fn check_input(&self, value: &ValueDescriptor) -> Result<()> {
        if self.has_input(value.name()) {
            return Err(GraphError::DuplicateName(format!(
                "graph input '{}' is already declared",
                value.name()
            )));
        }
        Ok(())
    }

    pub(crate) fn check_output(&self, value: &ValueDescriptor) -> Result<()> {
        if self.outputs.iter().any(|v| v.name() == value.name()) {
            return Err(GraphError::DuplicateName(format!(
                "graph output '{}' is already declared",
                value.name()
            )));
        }
        Ok(())
    }

    pub(crate) fn check_initializer(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "initializer name cannot be empty".to_string(),
            ));
        }
        if self.initializer_index.contains_key(name) {
            return Err(GraphError::DuplicateName(format!(
                "initializer '{}' is already defined",
                name
            )));
        }
        Ok(())
    }

    pub(crate) fn check_node(&self, node: &OperatorNode) -> Result<()> {
        node.validate()?;

        if self.node_index.contains_key(node.name()) {
            return Err(GraphError::DuplicateName(format!(
                "node '{}' already exists",
                node.name()
            )));
        }
        for output in node.output_names() {
            if let Some(&producer) = self.producers.get(output) {
                return Err(GraphError::DuplicateName(format!(
                    "value '{}' is produced by both '{}' and '{}'",
                    output,
                    self.nodes[producer].name(),
                    node.name()
                )));
            }
        }
        Ok(())
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[OperatorNode] {
        &self.nodes
    }

    /// Initializers in insertion order
    pub fn initializers(&self) -> &[Initializer] {
        &self.initializers
    }

    /// Declared inputs
    pub fn inputs(&self) -> &[ValueDescriptor] {
        &self.inputs
    }

    /// Declared outputs
    pub fn outputs(&self) -> &[ValueDescriptor] {
        &self.outputs
    }

    /// Get node by instance name
    pub fn node_by_name(&self, name: &str) -> Option<&OperatorNode> {
        self.node_index.get(name).map(|&i| &self.nodes[i])
    }

    /// Get the node producing `value`
    pub fn producer_of(&self, value: &str) -> Option<&OperatorNode> {
        self.producers.get(value).map(|&i| &self.nodes[i])
    }

    /// Get initializer by name
    pub fn initializer(&self, name: &str) -> Option<&Initializer> {
        self.initializer_index.get(name).map(|&i| &self.initializers[i])
    }

    /// Check whether `name` is a declared input
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|v| v.name() == name)
    }

    /// Check whether the fragment contains nothing at all
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.initializers.is_empty() && self.inputs.is_empty() && self.outputs.is_empty()
    }

    /// Check the fragment as a standalone graph
    ///
    /// Every node input must be produced by a node, be a declared input, or
    /// be an initializer. Every declared output must be one of those too.
    /// A name may not be both a declared input and an initializer or node
    /// output.
    pub fn validate(&self) -> Result<()> {
        let initializers: FxHashSet<&str> = self.initializers.iter().map(|i| i.name()).collect();

        for input in &self.inputs {
            if initializers.contains(input.name()) {
                return Err(GraphError::DuplicateName(format!(
                    "'{}' is both a graph input and an initializer",
                    input.name()
                )));
            }
            if let Some(producer) = self.producer_of(input.name()) {
                return Err(GraphError::DuplicateName(format!(
                    "graph input '{}' is also produced by node '{}'",
                    input.name(),
                    producer.name()
                )));
            }
        }
        for init in &self.initializers {
            if let Some(producer) = self.producer_of(init.name()) {
                return Err(GraphError::DuplicateName(format!(
                    "initializer '{}' is also produced by node '{}'",
                    init.name(),
                    producer.name()
                )));
            }
        }

        let defined = |name: &str| {
            self.producers.contains_key(name) || self.has_input(name) || initializers.contains(name)
        };

        for node in &self.nodes {
            for input in node.required_inputs() {
                if !defined(input) {
                    return Err(GraphError::UnresolvedReference(format!(
                        "input '{}' of node '{}' is not produced, declared or initialized",
                        input,
                        node.name()
                    )));
                }
            }
        }
        for output in &self.outputs {
            if !defined(output.name()) {
                return Err(GraphError::UnresolvedReference(format!(
                    "graph output '{}' has no producer",
                    output.name()
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> FragmentParts {
        FragmentParts {
            nodes: self.nodes,
            initializers: self.initializers,
            inputs: self.inputs,
            outputs: self.outputs,
        }
    }
}

impl PartialEq for GraphFragment {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
            && self.initializers == other.initializers
            && self.inputs == other.inputs
            && self.outputs == other.outputs
    }
}

/// Serialized form of a fragment
///
/// Deserialization replays every element through the `add_*` methods so a
/// loaded fragment obeys the same invariants as a built one.
#[doc(hidden)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentParts {
    #[serde(default)]
    pub(crate) nodes: Vec<OperatorNode>,
    #[serde(default)]
    pub(crate) initializers: Vec<Initializer>,
    #[serde(default)]
    pub(crate) inputs: Vec<ValueDescriptor>,
    #[serde(default)]
    pub(crate) outputs: Vec<ValueDescriptor>,
}

impl TryFrom<FragmentParts> for GraphFragment {
    type Error = GraphError;

    fn try_from(parts: FragmentParts) -> Result<Self> {
        let mut fragment = GraphFragment::new();
        for input in parts.inputs {
            input.validate()?;
            fragment.add_input(input)?;
        }
        for output in parts.outputs {
            output.validate()?;
            fragment.add_output(output)?;
        }
        for init in parts.initializers {
            init.tensor.validate()?;
            fragment.insert_initializer(init.name, init.tensor, init.is_override)?;
        }
        for node in parts.nodes {
            fragment.add_node(node)?;
        }
        Ok(fragment)
    }
}

impl From<GraphFragment> for FragmentParts {
    fn from(fragment: GraphFragment) -> Self {
        fragment.into_parts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AttributeValue, ElementType, ShapeDescriptor};

    fn float_value(name: &str, dims: &[i64]) -> ValueDescriptor {
        ValueDescriptor::tensor(name, ElementType::Float, Some(ShapeDescriptor::fixed(dims))).unwrap()
    }

    fn gemm_fragment() -> GraphFragment {
        let mut graph = GraphFragment::new();
        graph.add_input(float_value("X", &[3, 2])).unwrap();
        graph.add_output(float_value("Z", &[3, 3])).unwrap();
        graph
            .add_initializer(
                "Y",
                TensorData::from_f32(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
            )
            .unwrap();
        let alpha = AttributeValue::float("alpha", 2.0).unwrap();
        let node = OperatorNode::new("Gemm", "", "Gemm1", ["X", "Y"], ["Z"], vec![alpha]).unwrap();
        graph.add_node(node).unwrap();
        graph
    }

    #[test]
    fn test_add_increments_counts() {
        let graph = gemm_fragment();
        assert_eq!(graph.inputs().len(), 1);
        assert_eq!(graph.outputs().len(), 1);
        assert_eq!(graph.initializers().len(), 1);
        assert_eq!(graph.nodes().len(), 1);
        assert_eq!(graph.producer_of("Z").map(|n| n.name()), Some("Gemm1"));
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let mut graph = GraphFragment::new();
        graph.add_input(float_value("X", &[1])).unwrap();
        let err = graph.add_input(float_value("X", &[2])).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateName(_)));
        assert_eq!(graph.inputs().len(), 1);
    }

    #[test]
    fn test_initializer_redefinition_rejected() {
        let mut graph = gemm_fragment();
        let err = graph.add_initializer("Y", TensorData::scalar_f32(0.0)).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateName(_)));
        assert_eq!(graph.initializers().len(), 1);
        assert_eq!(graph.initializer("Y").map(|i| i.tensor().len()), Some(6));
    }

    #[test]
    fn test_duplicate_node_name_rejected() {
        let mut graph = gemm_fragment();
        let node = OperatorNode::new("Relu", "", "Gemm1", ["Z"], ["R"], vec![]).unwrap();
        let err = graph.add_node(node).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateName(_)));
        assert_eq!(graph.nodes().len(), 1);
    }

    #[test]
    fn test_second_producer_rejected() {
        let mut graph = gemm_fragment();
        let node = OperatorNode::new("Relu", "", "relu", ["X"], ["Z"], vec![]).unwrap();
        assert!(matches!(graph.add_node(node), Err(GraphError::DuplicateName(_))));
    }

    #[test]
    fn test_forward_reference_resolves_on_validate() {
        let mut graph = GraphFragment::new();
        graph.add_input(float_value("a", &[2])).unwrap();
        graph.add_output(float_value("c", &[2])).unwrap();
        // consumer added before producer
        graph
            .add_node(OperatorNode::new("Relu", "", "second", ["b"], ["c"], vec![]).unwrap())
            .unwrap();
        graph
            .add_node(OperatorNode::new("Relu", "", "first", ["a"], ["b"], vec![]).unwrap())
            .unwrap();
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_unresolved_input() {
        let mut graph = GraphFragment::new();
        graph.add_output(float_value("y", &[2])).unwrap();
        graph
            .add_node(OperatorNode::new("Relu", "", "relu", ["missing"], ["y"], vec![]).unwrap())
            .unwrap();
        assert!(matches!(graph.validate(), Err(GraphError::UnresolvedReference(_))));
    }

    #[test]
    fn test_json_roundtrip_replays_invariants() {
        let graph = gemm_fragment();
        let json = serde_json::to_string(&graph).unwrap();
        let loaded: GraphFragment = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, graph);
        assert_eq!(loaded.producer_of("Z").map(|n| n.name()), Some("Gemm1"));

        let dup = r#"{"inputs":[
            {"name":"X","value_type":{"Tensor":{"elem":"Float","shape":null}}},
            {"name":"X","value_type":{"Tensor":{"elem":"Float","shape":null}}}]}"#;
        assert!(serde_json::from_str::<GraphFragment>(dup).is_err());
    }
}
