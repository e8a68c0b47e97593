// Resolved graph representation
//
// A fragment whose every value name is bound and whose nodes form a DAG,
// stored in a petgraph StableGraph with a cached topological order.

use crate::ir::{GraphFragment, OperatorNode, TensorData, ValueDescriptor};
use crate::{GraphError, Result};
use petgraph::algo::toposort;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Node identifier in the graph (petgraph NodeIndex)
pub type NodeId = NodeIndex;

/// Data dependency: a value flows from one node's output to another's input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Which output slot on the source node
    pub output_slot: u8,
    /// Which input slot on the destination node
    pub input_slot: u8,
}

/// A graph after name resolution and cycle checking
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    graph: StableGraph<OperatorNode, Dependency>,

    /// Value name → (producing node, output slot)
    producers: FxHashMap<String, (NodeId, u8)>,

    /// Node instance name → node ID
    name_to_id: FxHashMap<String, NodeId>,

    inputs: Vec<ValueDescriptor>,
    outputs: Vec<ValueDescriptor>,

    /// Initializers in insertion order
    initializers: Vec<(String, TensorData)>,
    initializer_index: FxHashMap<String, usize>,

    /// Topological execution order
    order: Vec<NodeId>,
}

impl ResolvedGraph {
    /// Resolve a fragment
    ///
    /// Runs the standalone fragment checks, wires a data edge for every
    /// node input produced by another node and rejects cycles.
    pub fn resolve(fragment: GraphFragment) -> Result<Self> {
        let plan = Plan::new(&fragment)?;
        Ok(Self::build(fragment, plan))
    }

    /// Run every check `resolve` runs without taking the fragment
    pub fn check(fragment: &GraphFragment) -> Result<()> {
        Plan::new(fragment).map(|_| ())
    }

    fn build(fragment: GraphFragment, plan: Plan) -> Self {
        let parts = fragment.into_parts();

        // Same insertion order as the plan, so node indices line up
        let mut graph = StableGraph::with_capacity(parts.nodes.len(), plan.edges.len());
        for node in parts.nodes {
            graph.add_node(node);
        }
        for (source, target, dependency) in plan.edges {
            graph.add_edge(source, target, dependency);
        }

        let mut initializers = Vec::with_capacity(parts.initializers.len());
        let mut initializer_index = FxHashMap::default();
        for init in parts.initializers {
            let (name, tensor) = init.into_parts();
            initializer_index.insert(name.clone(), initializers.len());
            initializers.push((name, tensor));
        }

        debug!(
            nodes = plan.order.len(),
            edges = graph.edge_count(),
            "resolved graph"
        );

        Self {
            graph,
            producers: plan.producers,
            name_to_id: plan.name_to_id,
            inputs: parts.inputs,
            outputs: parts.outputs,
            initializers,
            initializer_index,
            order: plan.order,
        }
    }

    /// Rebuild a fragment, nodes in topological order
    pub fn to_fragment(&self) -> Result<GraphFragment> {
        let mut fragment = GraphFragment::new();
        for input in &self.inputs {
            fragment.add_input(input.clone())?;
        }
        for output in &self.outputs {
            fragment.add_output(output.clone())?;
        }
        for (name, tensor) in &self.initializers {
            fragment.add_initializer(name.clone(), tensor.clone())?;
        }
        for node in self.nodes_in_order() {
            fragment.add_node(node.clone())?;
        }
        Ok(fragment)
    }

    /// Nodes in topological order
    pub fn nodes_in_order(&self) -> impl Iterator<Item = &OperatorNode> {
        self.order.iter().map(move |&id| &self.graph[id])
    }

    /// Node IDs in topological order
    pub fn execution_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Get node by ID
    pub fn node(&self, id: NodeId) -> Option<&OperatorNode> {
        self.graph.node_weight(id)
    }

    /// Get node by instance name
    pub fn node_by_name(&self, name: &str) -> Option<&OperatorNode> {
        self.name_to_id.get(name).and_then(|&id| self.node(id))
    }

    /// Get the node producing `value`
    pub fn producer_of(&self, value: &str) -> Option<&OperatorNode> {
        self.producers.get(value).and_then(|&(id, _)| self.node(id))
    }

    /// Nodes consuming the outputs of `id`
    pub fn consumers(&self, id: NodeId) -> Vec<(NodeId, &Dependency)> {
        self.graph
            .edges_directed(id, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Declared inputs
    pub fn inputs(&self) -> &[ValueDescriptor] {
        &self.inputs
    }

    /// Declared outputs
    pub fn outputs(&self) -> &[ValueDescriptor] {
        &self.outputs
    }

    /// Check whether `name` is a declared input
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|v| v.name() == name)
    }

    /// Check whether `name` is a declared output
    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|v| v.name() == name)
    }

    /// Get initializer tensor by name
    pub fn initializer(&self, name: &str) -> Option<&TensorData> {
        self.initializer_index.get(name).map(|&i| &self.initializers[i].1)
    }

    /// Initializers in insertion order
    pub fn initializers(&self) -> impl Iterator<Item = (&str, &TensorData)> {
        self.initializers.iter().map(|(n, t)| (n.as_str(), t))
    }

    /// Number of initializers
    pub fn initializer_count(&self) -> usize {
        self.initializers.len()
    }

    /// Every value name some node consumes
    pub fn consumed_values(&self) -> FxHashSet<&str> {
        self.graph
            .node_indices()
            .flat_map(|id| self.graph[id].required_inputs())
            .collect()
    }

    /// Generate DOT format for visualization
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph G {\n  rankdir=TB;\n");
        for &id in &self.order {
            let node = &self.graph[id];
            dot.push_str(&format!(
                "  n{} [label=\"{}\\n{}\"];\n",
                id.index(),
                node.op_type(),
                node.name()
            ));
        }
        for edge in self.graph.edge_references() {
            let producer = &self.graph[edge.source()];
            let value = producer
                .output_names()
                .get(edge.weight().output_slot as usize)
                .map(String::as_str)
                .unwrap_or("?");
            dot.push_str(&format!(
                "  n{} -> n{} [label=\"{}\"];\n",
                edge.source().index(),
                edge.target().index(),
                value
            ));
        }
        dot.push_str("}\n");
        dot
    }

    /// Get graph statistics
    pub fn statistics(&self) -> GraphStatistics {
        let mut op_type_counts = BTreeMap::new();
        for node in self.nodes_in_order() {
            *op_type_counts.entry(node.op_type().to_string()).or_insert(0) += 1;
        }

        GraphStatistics {
            total_nodes: self.graph.node_count(),
            total_edges: self.graph.edge_count(),
            num_inputs: self.inputs.len(),
            num_outputs: self.outputs.len(),
            num_initializers: self.initializers.len(),
            op_type_counts,
        }
    }
}

/// Indexes, edges and execution order worked out on a borrowed fragment
struct Plan {
    producers: FxHashMap<String, (NodeId, u8)>,
    name_to_id: FxHashMap<String, NodeId>,
    edges: Vec<(NodeId, NodeId, Dependency)>,
    order: Vec<NodeId>,
}

impl Plan {
    fn new(fragment: &GraphFragment) -> Result<Self> {
        fragment.validate()?;

        let mut graph: StableGraph<&str, Dependency> = StableGraph::with_capacity(fragment.nodes().len(), 0);
        let mut producers = FxHashMap::default();
        let mut name_to_id = FxHashMap::default();

        for node in fragment.nodes() {
            let id = graph.add_node(node.name());
            for (slot, output) in node.output_names().iter().enumerate() {
                producers.insert(output.clone(), (id, slot_index(slot)?));
            }
            name_to_id.insert(node.name().to_string(), id);
        }

        for (target, node) in fragment.nodes().iter().enumerate() {
            let target = NodeIndex::new(target);
            for (input_slot, input) in node.input_names().iter().enumerate() {
                if let Some(&(source, output_slot)) = producers.get(input) {
                    let dependency = Dependency {
                        output_slot,
                        input_slot: slot_index(input_slot)?,
                    };
                    graph.add_edge(source, target, dependency);
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            GraphError::CyclicGraph(format!("node '{}' depends on its own output", graph[cycle.node_id()]))
        })?;

        let edges = graph
            .edge_references()
            .map(|e| (e.source(), e.target(), e.weight().clone()))
            .collect();

        Ok(Self {
            producers,
            name_to_id,
            edges,
            order,
        })
    }
}

fn slot_index(slot: usize) -> Result<u8> {
    u8::try_from(slot).map_err(|_| GraphError::Unsupported(format!("node has more than 255 inputs or outputs (slot {})", slot)))
}

/// Graph statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub num_initializers: usize,
    pub op_type_counts: BTreeMap<String, usize>,
}

impl fmt::Display for GraphStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph Statistics:")?;
        writeln!(f, "  Total nodes: {}", self.total_nodes)?;
        writeln!(f, "  Total edges: {}", self.total_edges)?;
        writeln!(f, "  Graph inputs: {}", self.num_inputs)?;
        writeln!(f, "  Graph outputs: {}", self.num_outputs)?;
        writeln!(f, "  Initializers: {}", self.num_initializers)?;
        writeln!(f, "  Operation types:")?;

        let mut sorted_ops: Vec<_> = self.op_type_counts.iter().collect();
        sorted_ops.sort_by(|a, b| b.1.cmp(a.1));

        for (op_type, count) in sorted_ops {
            writeln!(f, "    {}: {}", op_type, count)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ElementType, ShapeDescriptor};

    fn value(name: &str) -> ValueDescriptor {
        ValueDescriptor::tensor(name, ElementType::Float, Some(ShapeDescriptor::fixed(&[2]))).unwrap()
    }

    fn node(name: &str, op: &str, inputs: &[&str], outputs: &[&str]) -> OperatorNode {
        OperatorNode::new(op, "", name, inputs.iter().copied(), outputs.iter().copied(), vec![]).unwrap()
    }

    fn chain() -> GraphFragment {
        let mut graph = GraphFragment::new();
        graph.add_input(value("x")).unwrap();
        graph.add_output(value("z")).unwrap();
        graph.add_initializer("w", TensorData::from_f32(vec![2], vec![1.0, 2.0]).unwrap()).unwrap();
        // inserted out of order on purpose
        graph.add_node(node("relu", "Relu", &["y"], &["z"])).unwrap();
        graph.add_node(node("add", "Add", &["x", "w"], &["y"])).unwrap();
        graph
    }

    #[test]
    fn test_topological_order() {
        let resolved = ResolvedGraph::resolve(chain()).unwrap();
        let order: Vec<_> = resolved.nodes_in_order().map(|n| n.name()).collect();
        assert_eq!(order, vec!["add", "relu"]);
        assert_eq!(resolved.producer_of("y").map(|n| n.name()), Some("add"));
        assert_eq!(resolved.initializer("w").map(|t| t.len()), Some(2));
    }

    #[test]
    fn test_edges_follow_values() {
        let resolved = ResolvedGraph::resolve(chain()).unwrap();
        let add = resolved.execution_order()[0];
        let consumers = resolved.consumers(add);
        assert_eq!(consumers.len(), 1);
        assert_eq!(resolved.node(consumers[0].0).map(|n| n.name()), Some("relu"));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut graph = GraphFragment::new();
        graph.add_output(value("a")).unwrap();
        graph.add_node(node("n1", "Relu", &["b"], &["a"])).unwrap();
        graph.add_node(node("n2", "Relu", &["a"], &["b"])).unwrap();
        assert!(matches!(ResolvedGraph::check(&graph), Err(GraphError::CyclicGraph(_))));
        assert!(matches!(
            ResolvedGraph::resolve(graph),
            Err(GraphError::CyclicGraph(_))
        ));
    }

    #[test]
    fn test_to_fragment_preserves_content() {
        let resolved = ResolvedGraph::resolve(chain()).unwrap();
        let fragment = resolved.to_fragment().unwrap();
        assert_eq!(fragment.nodes()[0].name(), "add");
        assert_eq!(fragment.inputs(), chain().inputs());
        assert!(ResolvedGraph::resolve(fragment).is_ok());
    }

    #[test]
    fn test_statistics() {
        let stats = ResolvedGraph::resolve(chain()).unwrap().statistics();
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.total_edges, 1);
        assert_eq!(stats.op_type_counts.get("Relu"), Some(&1));
        assert!(stats.to_string().contains("Total nodes: 2"));
    }

    #[test]
    fn test_dot_output() {
        let dot = ResolvedGraph::resolve(chain()).unwrap().to_dot();
        assert!(dot.starts_with("digraph G {"));
        assert!(dot.contains("label=\"y\""));
    }
}
