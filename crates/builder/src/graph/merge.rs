// Patch merging
//
// A GraphPatch is merged into a resolved base model by building a working
// copy, validating it completely and only then handing it back. The base
// model is borrowed immutably throughout, so a failed merge cannot touch it.

use super::resolved::ResolvedGraph;
use crate::config::MergeConfig;
use crate::ir::{GraphFragment, OperatorNode, TensorData, ValueDescriptor};
use crate::materialize::{check_domains, ExecutableModel};
use crate::model::LineageEntry;
use crate::{GraphError, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A fragment plus the interface edits needed to merge it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPatch {
    fragment: GraphFragment,
    #[serde(default = "default_label")]
    label: String,
    #[serde(default)]
    required_opsets: Vec<(String, i64)>,
    #[serde(default)]
    removed_nodes: Vec<String>,
    #[serde(default)]
    removed_inputs: Vec<String>,
    #[serde(default)]
    removed_outputs: Vec<String>,
    #[serde(default)]
    kept_inputs: Vec<String>,
    #[serde(default)]
    kept_outputs: Vec<String>,
}

fn default_label() -> String {
    "patch".to_string()
}

impl GraphPatch {
    /// Wrap a fragment, taking ownership of it
    pub fn new(fragment: GraphFragment) -> Self {
        Self {
            fragment,
            label: default_label(),
            required_opsets: Vec::new(),
            removed_nodes: Vec::new(),
            removed_inputs: Vec::new(),
            removed_outputs: Vec::new(),
            kept_inputs: Vec::new(),
            kept_outputs: Vec::new(),
        }
    }

    /// Label recorded in the lineage entry
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Opsets the patch's nodes need
    pub fn require_opsets<'a, I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        self.required_opsets
            .extend(pairs.into_iter().map(|(d, v)| (d.to_string(), v)));
        self
    }

    /// Retire a base node
    pub fn remove_node(mut self, name: impl Into<String>) -> Self {
        self.removed_nodes.push(name.into());
        self
    }

    /// Drop a base declared input
    pub fn remove_input(mut self, name: impl Into<String>) -> Self {
        self.removed_inputs.push(name.into());
        self
    }

    /// Drop a base declared output
    ///
    /// A patch output with the same name is then appended after the
    /// remaining base outputs instead of taking the old position.
    pub fn remove_output(mut self, name: impl Into<String>) -> Self {
        self.removed_outputs.push(name.into());
        self
    }

    /// Keep a base input declared even if nothing consumes it any more
    pub fn keep_input(mut self, name: impl Into<String>) -> Self {
        self.kept_inputs.push(name.into());
        self
    }

    /// Skip the dangling check for a base output
    ///
    /// The output must still resolve in the merged graph.
    pub fn keep_output(mut self, name: impl Into<String>) -> Self {
        self.kept_outputs.push(name.into());
        self
    }

    pub fn fragment(&self) -> &GraphFragment {
        &self.fragment
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn required_opsets(&self) -> &[(String, i64)] {
        &self.required_opsets
    }
}

/// Where a patch node input was bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    PatchNode,
    PatchInput,
    PatchInitializer,
    BaseNode,
    BaseInitializer,
    BaseInput,
}

/// Base-graph facts a merge is checked against
struct BaseView<'a> {
    graph: &'a ResolvedGraph,
    removed_nodes: FxHashSet<&'a str>,
    removed_inputs: FxHashSet<&'a str>,
    removed_outputs: FxHashSet<&'a str>,
    /// Value name → name of the retained base node producing it
    produced: FxHashMap<&'a str, &'a str>,
    /// Base inputs a patch node now produces
    superseded: FxHashSet<&'a str>,
}

impl<'a> BaseView<'a> {
    fn live_input(&self, name: &str) -> bool {
        self.graph.has_input(name) && !self.removed_inputs.contains(name) && !self.superseded.contains(name)
    }
}

/// Merges patches into resolved models
#[derive(Debug, Clone, Default)]
pub struct GraphMerger {
    config: MergeConfig,
}

impl GraphMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Merge `patch` into `base`, producing a new model
    ///
    /// All-or-nothing: on any error `base` is exactly as it was and the
    /// patch is dropped with the error.
    pub fn merge(&self, base: &ExecutableModel, patch: GraphPatch) -> Result<ExecutableModel> {
        let GraphPatch {
            fragment,
            label,
            required_opsets,
            removed_nodes,
            removed_inputs,
            removed_outputs,
            kept_inputs,
            kept_outputs,
        } = patch;
        let graph = base.graph();

        // Opset reconciliation on a copy of the registry
        let mut opsets = base.opsets().clone();
        opsets.merge(required_opsets.iter().map(|(d, v)| (d.as_str(), *v)))?;
        let opsets_added: Vec<(String, i64)> = opsets
            .iter()
            .filter(|(d, _)| !base.opsets().contains(d))
            .map(|(d, v)| (d.to_string(), v))
            .collect();

        let mut view = BaseView {
            graph,
            removed_nodes: checked_names(&removed_nodes, "node", |n| graph.node_by_name(n).is_some())?,
            removed_inputs: checked_names(&removed_inputs, "input", |n| graph.has_input(n))?,
            removed_outputs: checked_names(&removed_outputs, "output", |n| graph.has_output(n))?,
            produced: FxHashMap::default(),
            superseded: FxHashSet::default(),
        };
        let kept_inputs = checked_names(&kept_inputs, "input", |n| graph.has_input(n))?;
        let kept_outputs = checked_names(&kept_outputs, "output", |n| graph.has_output(n))?;

        let retained: Vec<&OperatorNode> = graph
            .nodes_in_order()
            .filter(|n| !view.removed_nodes.contains(n.name()))
            .collect();
        for &node in &retained {
            for output in node.output_names() {
                view.produced.insert(output.as_str(), node.name());
            }
        }

        self.check_names(&view, &fragment)?;
        self.check_initializers(&view, &fragment)?;
        for node in fragment.nodes() {
            for output in node.output_names() {
                if graph.has_input(output) && !view.removed_inputs.contains(output.as_str()) {
                    if let Some(base_input) = graph.inputs().iter().find(|v| v.name() == output) {
                        view.superseded.insert(base_input.name());
                    }
                }
            }
        }

        if self.config.require_registered_domains {
            check_domains(fragment.nodes(), &opsets)?;
        }

        for node in fragment.nodes() {
            for input in node.required_inputs() {
                let source = resolve_source(&view, &fragment, input).ok_or_else(|| {
                    GraphError::UnresolvedReference(format!(
                        "input '{}' of patch node '{}' matches no patch or base value",
                        input,
                        node.name()
                    ))
                })?;
                debug!(node = node.name(), input, ?source, "bound patch input");
            }
        }
        for output in fragment.outputs() {
            if resolve_source(&view, &fragment, output.name()).is_none() {
                return Err(GraphError::UnresolvedReference(format!(
                    "patch output '{}' matches no patch or base value",
                    output.name()
                )));
            }
        }

        let inputs = splice_inputs(&view, &fragment);
        let outputs = splice_outputs(&view, &fragment);
        check_dangling(&view, &fragment, &retained, &inputs, &outputs, &kept_inputs, &kept_outputs)?;

        let retained: Vec<OperatorNode> = retained.into_iter().cloned().collect();
        let nodes_removed = view.removed_nodes.len();
        let base_initializers: Vec<(String, TensorData)> = graph
            .initializers()
            .map(|(n, t)| (n.to_string(), t.clone()))
            .collect();

        // Everything validated against the base; assemble the working copy
        let parts = fragment.into_parts();
        let nodes_added = parts.nodes.len();
        let initializers_added = parts.initializers.len();

        let mut overrides: FxHashMap<String, TensorData> = FxHashMap::default();
        let mut fresh = Vec::new();
        for init in parts.initializers {
            let is_override = init.is_override();
            let (name, tensor) = init.into_parts();
            if is_override {
                overrides.insert(name, tensor);
            } else {
                fresh.push((name, tensor));
            }
        }

        let mut merged = GraphFragment::new();
        for input in inputs {
            merged.add_input(input)?;
        }
        for output in outputs {
            merged.add_output(output)?;
        }
        for (name, tensor) in base_initializers {
            let tensor = overrides.remove(&name).unwrap_or(tensor);
            merged.add_initializer(name, tensor)?;
        }
        for (name, tensor) in fresh {
            merged.add_initializer(name, tensor)?;
        }
        for node in retained.into_iter().chain(parts.nodes) {
            merged.add_node(node)?;
        }

        let resolved = ResolvedGraph::resolve(merged)?;

        let mut metadata = base.metadata().clone();
        metadata.record(LineageEntry {
            sequence: 0,
            label: label.clone(),
            nodes_added,
            nodes_removed,
            initializers_added,
            opsets_added,
        });

        info!(
            patch = %label,
            nodes_added,
            nodes_removed,
            initializers_added,
            total_nodes = resolved.node_count(),
            "merged patch"
        );
        Ok(ExecutableModel::new(resolved, opsets, metadata))
    }

    fn check_names(&self, view: &BaseView<'_>, fragment: &GraphFragment) -> Result<()> {
        for node in fragment.nodes() {
            if view.graph.node_by_name(node.name()).is_some() && !view.removed_nodes.contains(node.name()) {
                return Err(GraphError::DuplicateName(format!(
                    "node '{}' already exists in the base graph",
                    node.name()
                )));
            }
            for output in node.output_names() {
                // Also covers a patch output shadowing a base intermediate
                if let Some(producer) = view.produced.get(output.as_str()) {
                    return Err(GraphError::DuplicateName(format!(
                        "value '{}' of patch node '{}' is already produced by base node '{}'",
                        output,
                        node.name(),
                        producer
                    )));
                }
                if view.graph.initializer(output).is_some() {
                    return Err(GraphError::DuplicateName(format!(
                        "value '{}' of patch node '{}' is a base initializer",
                        output,
                        node.name()
                    )));
                }
            }
        }
        for input in fragment.inputs() {
            if view.produced.contains_key(input.name()) || view.graph.initializer(input.name()).is_some() {
                return Err(GraphError::DuplicateName(format!(
                    "patch input '{}' is already defined in the base graph",
                    input.name()
                )));
            }
        }
        Ok(())
    }

    fn check_initializers(&self, view: &BaseView<'_>, fragment: &GraphFragment) -> Result<()> {
        for init in fragment.initializers() {
            let name = init.name();
            match (view.graph.initializer(name).is_some(), init.is_override()) {
                (true, false) => {
                    return Err(GraphError::DuplicateName(format!(
                        "initializer '{}' exists in the base graph; add it as an override to replace it",
                        name
                    )));
                }
                (false, true) => {
                    return Err(GraphError::InvalidArgument(format!(
                        "override initializer '{}' has no base initializer to replace",
                        name
                    )));
                }
                (true, true) if !self.config.allow_initializer_override => {
                    return Err(GraphError::InvalidArgument(format!(
                        "initializer overrides are disabled (override of '{}')",
                        name
                    )));
                }
                _ => {}
            }
            if view.produced.contains_key(name) || view.live_input(name) {
                return Err(GraphError::DuplicateName(format!(
                    "patch initializer '{}' collides with a base value",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn checked_names<'a, F>(names: &'a [String], what: &str, exists: F) -> Result<FxHashSet<&'a str>>
where
    F: Fn(&str) -> bool,
{
    names
        .iter()
        .map(|name| {
            if exists(name) {
                Ok(name.as_str())
            } else {
                Err(GraphError::UnresolvedReference(format!(
                    "base graph has no {} named '{}'",
                    what, name
                )))
            }
        })
        .collect()
}

fn resolve_source(view: &BaseView<'_>, fragment: &GraphFragment, name: &str) -> Option<Source> {
    if fragment.producer_of(name).is_some() {
        Some(Source::PatchNode)
    } else if fragment.has_input(name) {
        Some(Source::PatchInput)
    } else if fragment.initializer(name).is_some() {
        Some(Source::PatchInitializer)
    } else if view.produced.contains_key(name) {
        Some(Source::BaseNode)
    } else if view.graph.initializer(name).is_some() {
        Some(Source::BaseInitializer)
    } else if view.live_input(name) {
        Some(Source::BaseInput)
    } else {
        None
    }
}

/// Base inputs with same-name patch inputs replaced in place
///
/// The patch's new inputs take the position of the first superseded base
/// input, or are appended if nothing was superseded.
fn splice_inputs(view: &BaseView<'_>, fragment: &GraphFragment) -> Vec<ValueDescriptor> {
    let fresh: Vec<&ValueDescriptor> = fragment
        .inputs()
        .iter()
        .filter(|v| !view.live_input(v.name()))
        .collect();

    let mut inputs = Vec::with_capacity(view.graph.inputs().len() + fresh.len());
    let mut fresh_placed = false;
    for input in view.graph.inputs() {
        let name = input.name();
        if view.removed_inputs.contains(name) {
            continue;
        }
        if view.superseded.contains(name) {
            if !fresh_placed {
                inputs.extend(fresh.iter().map(|v| (*v).clone()));
                fresh_placed = true;
            }
            continue;
        }
        let replacement = fragment.inputs().iter().find(|v| v.name() == name);
        inputs.push(replacement.unwrap_or(input).clone());
    }
    if !fresh_placed {
        inputs.extend(fresh.into_iter().cloned());
    }
    inputs
}

/// Base outputs with same-name patch outputs replaced in place, rest appended
fn splice_outputs(view: &BaseView<'_>, fragment: &GraphFragment) -> Vec<ValueDescriptor> {
    let mut outputs = Vec::new();
    for output in view.graph.outputs() {
        if view.removed_outputs.contains(output.name()) {
            continue;
        }
        let replacement = fragment.outputs().iter().find(|v| v.name() == output.name());
        outputs.push(replacement.unwrap_or(output).clone());
    }
    for output in fragment.outputs() {
        if !outputs.iter().any(|v| v.name() == output.name()) {
            outputs.push(output.clone());
        }
    }
    outputs
}

fn check_dangling(
    view: &BaseView<'_>,
    fragment: &GraphFragment,
    retained: &[&OperatorNode],
    inputs: &[ValueDescriptor],
    outputs: &[ValueDescriptor],
    kept_inputs: &FxHashSet<&str>,
    kept_outputs: &FxHashSet<&str>,
) -> Result<()> {
    let base_consumed = view.graph.consumed_values();
    let consumed: FxHashSet<&str> = retained
        .iter()
        .copied()
        .chain(fragment.nodes())
        .flat_map(|n| n.required_inputs())
        .collect();

    for input in view.graph.inputs() {
        let name = input.name();
        if view.removed_inputs.contains(name) || view.superseded.contains(name) || kept_inputs.contains(name) {
            continue;
        }
        let was_used = base_consumed.contains(name) || view.graph.has_output(name);
        let is_used = consumed.contains(name) || outputs.iter().any(|v| v.name() == name);
        if was_used && !is_used {
            return Err(GraphError::DanglingReference(format!(
                "graph input '{}' is no longer consumed; remove or keep it explicitly",
                name
            )));
        }
    }

    for output in view.graph.outputs() {
        let name = output.name();
        if view.removed_outputs.contains(name) || kept_outputs.contains(name) {
            continue;
        }
        let defined = view.produced.contains_key(name)
            || fragment.producer_of(name).is_some()
            || fragment.initializer(name).is_some()
            || view.graph.initializer(name).is_some()
            || inputs.iter().any(|v| v.name() == name);
        if !defined {
            return Err(GraphError::DanglingReference(format!(
                "graph output '{}' lost its producer; remove it explicitly",
                name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ElementType, ShapeDescriptor};
    use crate::materialize::Materializer;
    use crate::model::ModelDocument;

    fn float(name: &str) -> ValueDescriptor {
        ValueDescriptor::tensor(name, ElementType::Float, Some(ShapeDescriptor::fixed(&[2]))).unwrap()
    }

    fn node(name: &str, op: &str, inputs: &[&str], outputs: &[&str]) -> OperatorNode {
        OperatorNode::new(op, "", name, inputs.iter().copied(), outputs.iter().copied(), vec![]).unwrap()
    }

    /// inputs a, b; w initializer; add(a, b) -> s; mul(s, w) -> out
    fn base() -> ExecutableModel {
        let mut graph = GraphFragment::new();
        graph.add_input(float("a")).unwrap();
        graph.add_input(float("b")).unwrap();
        graph.add_output(float("out")).unwrap();
        graph
            .add_initializer("w", TensorData::from_f32(vec![2], vec![2.0, 2.0]).unwrap())
            .unwrap();
        graph.add_node(node("add", "Add", &["a", "b"], &["s"])).unwrap();
        graph.add_node(node("mul", "Mul", &["s", "w"], &["out"])).unwrap();

        let mut doc = ModelDocument::with_opsets([("", 18)]).unwrap();
        doc.add_graph(graph).unwrap();
        Materializer::new().materialize(doc).unwrap()
    }

    fn counts(model: &ExecutableModel) -> (usize, usize, usize, usize) {
        let g = model.graph();
        (g.node_count(), g.initializer_count(), g.inputs().len(), g.outputs().len())
    }

    fn merger() -> GraphMerger {
        GraphMerger::default()
    }

    #[test]
    fn test_append_node_and_output() {
        let base = base();
        let mut patch = GraphFragment::new();
        patch.add_node(node("relu", "Relu", &["s"], &["r"])).unwrap();
        patch.add_output(float("r")).unwrap();

        let merged = merger().merge(&base, GraphPatch::new(patch).with_label("expose relu")).unwrap();
        let names: Vec<_> = merged.graph().outputs().iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["out", "r"]);
        assert_eq!(merged.graph().node_count(), 3);
        assert_eq!(merged.metadata().lineage.len(), 1);
        assert_eq!(merged.metadata().lineage[0].label, "expose relu");
    }

    #[test]
    fn test_unresolved_reference_leaves_base_unchanged() {
        let base = base();
        let before = counts(&base);
        let mut patch = GraphFragment::new();
        patch.add_node(node("relu", "Relu", &["nowhere"], &["r"])).unwrap();

        let err = merger().merge(&base, GraphPatch::new(patch)).unwrap_err();
        assert!(matches!(err, GraphError::UnresolvedReference(_)));
        assert_eq!(counts(&base), before);
        assert!(base.metadata().lineage.is_empty());
    }

    #[test]
    fn test_node_name_collision() {
        let mut patch = GraphFragment::new();
        patch.add_node(node("add", "Relu", &["s"], &["r"])).unwrap();
        assert!(matches!(
            merger().merge(&base(), GraphPatch::new(patch)),
            Err(GraphError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_output_shadowing_base_intermediate_fails_closed() {
        let mut patch = GraphFragment::new();
        patch.add_node(node("other", "Relu", &["a"], &["s"])).unwrap();
        patch.add_output(float("s")).unwrap();
        assert!(matches!(
            merger().merge(&base(), GraphPatch::new(patch)),
            Err(GraphError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_initializer_override_rules() {
        let weights = || TensorData::from_f32(vec![2], vec![3.0, 3.0]).unwrap();

        let mut plain = GraphFragment::new();
        plain.add_initializer("w", weights()).unwrap();
        assert!(matches!(
            merger().merge(&base(), GraphPatch::new(plain)),
            Err(GraphError::DuplicateName(_))
        ));

        let mut stray = GraphFragment::new();
        stray.add_override_initializer("w2", weights()).unwrap();
        assert!(matches!(
            merger().merge(&base(), GraphPatch::new(stray)),
            Err(GraphError::InvalidArgument(_))
        ));

        let mut good = GraphFragment::new();
        good.add_override_initializer("w", weights()).unwrap();
        let merged = merger().merge(&base(), GraphPatch::new(good.clone())).unwrap();
        assert_eq!(merged.graph().initializer("w").and_then(|t| t.as_f32()), Some(&[3.0, 3.0][..]));
        assert_eq!(merged.graph().initializer_count(), 1);

        let strict = GraphMerger::new(MergeConfig {
            allow_initializer_override: false,
            ..MergeConfig::default()
        });
        assert!(matches!(
            strict.merge(&base(), GraphPatch::new(good)),
            Err(GraphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_supersede_input_keeps_position() {
        let base = base();
        let mut patch = GraphFragment::new();
        patch
            .add_input(ValueDescriptor::tensor("a_raw", ElementType::Int64, None).unwrap())
            .unwrap();
        patch
            .add_node(
                OperatorNode::new(
                    "Cast",
                    "",
                    "cast_a",
                    ["a_raw"],
                    ["a"],
                    vec![crate::ir::AttributeValue::int("to", ElementType::Float.code()).unwrap()],
                )
                .unwrap(),
            )
            .unwrap();

        let merged = merger().merge(&base, GraphPatch::new(patch)).unwrap();
        let names: Vec<_> = merged.graph().inputs().iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["a_raw", "b"]);
        assert_eq!(merged.graph().producer_of("a").map(|n| n.name()), Some("cast_a"));
    }

    #[test]
    fn test_dangling_input_must_be_explicit() {
        let replacement = || {
            let mut patch = GraphFragment::new();
            patch.add_node(node("double", "Add", &["a", "a"], &["s"])).unwrap();
            GraphPatch::new(patch).remove_node("add")
        };

        let err = merger().merge(&base(), replacement()).unwrap_err();
        assert!(matches!(err, GraphError::DanglingReference(_)));

        let kept = merger().merge(&base(), replacement().keep_input("b")).unwrap();
        assert_eq!(kept.graph().inputs().len(), 2);

        let removed = merger().merge(&base(), replacement().remove_input("b")).unwrap();
        let names: Vec<_> = removed.graph().inputs().iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["a"]);
        assert_eq!(removed.metadata().lineage[0].nodes_removed, 1);
    }

    #[test]
    fn test_dangling_output() {
        let patch = GraphPatch::new(GraphFragment::new()).remove_node("mul");
        assert!(matches!(
            merger().merge(&base(), patch),
            Err(GraphError::DanglingReference(_))
        ));
    }

    #[test]
    fn test_kept_output_must_still_resolve() {
        let base = base();
        let before = counts(&base);
        let patch = GraphPatch::new(GraphFragment::new()).remove_node("mul").keep_output("out");

        let err = merger().merge(&base, patch).unwrap_err();
        assert!(matches!(err, GraphError::UnresolvedReference(_)));
        assert_eq!(counts(&base), before);
        assert!(base.metadata().lineage.is_empty());
    }

    #[test]
    fn test_removing_consumed_input() {
        let base = base();
        let before = counts(&base);
        let patch = GraphPatch::new(GraphFragment::new()).remove_input("a");

        let err = merger().merge(&base, patch).unwrap_err();
        assert!(matches!(err, GraphError::UnresolvedReference(_)));
        assert_eq!(counts(&base), before);
        let names: Vec<_> = base.graph().inputs().iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(base.metadata().lineage.is_empty());
    }

    #[test]
    fn test_redeclared_output_is_appended() {
        let mut patch = GraphFragment::new();
        patch.add_node(node("relu", "Relu", &["s"], &["r"])).unwrap();
        patch.add_output(float("r")).unwrap();
        patch.add_output(float("out")).unwrap();

        let merged = merger()
            .merge(&base(), GraphPatch::new(patch).remove_output("out"))
            .unwrap();
        let names: Vec<_> = merged.graph().outputs().iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["r", "out"]);
    }

    #[test]
    fn test_removing_unknown_node() {
        let patch = GraphPatch::new(GraphFragment::new()).remove_node("ghost");
        assert!(matches!(
            merger().merge(&base(), patch),
            Err(GraphError::UnresolvedReference(_))
        ));
    }

    #[test]
    fn test_opset_conflict_keeps_registry() {
        let base = base();
        let mut patch = GraphFragment::new();
        patch.add_node(node("relu", "Relu", &["s"], &["r"])).unwrap();
        let patch = GraphPatch::new(patch).require_opsets([("ai.onnx", 19)]);

        let err = merger().merge(&base, patch).unwrap_err();
        assert!(matches!(err, GraphError::VersionConflict { existing: 18, requested: 19, .. }));
        assert_eq!(base.opsets().version("ai.onnx"), Some(18));
    }

    #[test]
    fn test_custom_domain_needs_opset() {
        let custom = || {
            let mut patch = GraphFragment::new();
            patch
                .add_node(OperatorNode::new("Fancy", "com.example", "fancy", ["s"], ["f"], vec![]).unwrap())
                .unwrap();
            patch.add_output(float("f")).unwrap();
            GraphPatch::new(patch)
        };

        assert!(matches!(
            merger().merge(&base(), custom()),
            Err(GraphError::MissingOpset(_))
        ));

        let merged = merger()
            .merge(&base(), custom().require_opsets([("com.example", 1)]))
            .unwrap();
        assert_eq!(merged.opsets().version("com.example"), Some(1));
        assert_eq!(
            merged.metadata().lineage[0].opsets_added,
            vec![("com.example".to_string(), 1)]
        );
    }

    #[test]
    fn test_cycle_rejected() {
        let mut patch = GraphFragment::new();
        patch.add_node(node("loop", "Relu", &["s"], &["b"])).unwrap();
        let err = merger().merge(&base(), GraphPatch::new(patch)).unwrap_err();
        assert!(matches!(err, GraphError::CyclicGraph(_)));
    }

    #[test]
    fn test_patch_roundtrips_through_json() {
        let mut fragment = GraphFragment::new();
        fragment.add_node(node("relu", "Relu", &["s"], &["r"])).unwrap();
        let patch = GraphPatch::new(fragment).remove_output("out").with_label("json");
        let json = serde_json::to_string(&patch).unwrap();
        let loaded: GraphPatch = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, patch);
    }
}
