//! Shared helpers for the builder integration tests

#![allow(dead_code)]

use hologram_graph_builder::{
    AttributeValue, ElementType, ExecutableModel, GraphFragment, Materializer, ModelDocument, OperatorNode,
    ShapeDescriptor, TensorData, TensorMap, ValueDescriptor,
};

/// Assert two float slices match within `tolerance`
pub fn assert_tensors_equal(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch: actual {} vs expected {}",
        actual.len(),
        expected.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "element {} differs: actual {} vs expected {} (tolerance {})",
            i,
            a,
            e,
            tolerance
        );
    }
}

pub fn float_input(name: &str, dims: &[i64]) -> ValueDescriptor {
    ValueDescriptor::tensor(name, ElementType::Float, Some(ShapeDescriptor::fixed(dims))).unwrap()
}

pub fn float_value(name: &str) -> ValueDescriptor {
    ValueDescriptor::tensor(name, ElementType::Float, None).unwrap()
}

pub fn node(op_type: &str, name: &str, inputs: &[&str], outputs: &[&str]) -> OperatorNode {
    OperatorNode::new(op_type, "", name, inputs.iter().copied(), outputs.iter().copied(), vec![]).unwrap()
}

/// `Z = 2 * X·Y` with `Y` a [2, 3] initializer
pub fn gemm_graph() -> GraphFragment {
    let mut graph = GraphFragment::new();
    graph.add_input(float_input("X", &[3, 2])).unwrap();
    graph
        .add_initializer(
            "Y",
            TensorData::from_f32(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
        )
        .unwrap();
    graph.add_output(float_input("Z", &[3, 3])).unwrap();
    graph
        .add_node(
            OperatorNode::new(
                "Gemm",
                "",
                "gemm",
                ["X", "Y"],
                ["Z"],
                vec![AttributeValue::float("alpha", 2.0).unwrap()],
            )
            .unwrap(),
        )
        .unwrap();
    graph
}

/// `Y = Relu(Orig)` with a single float input
pub fn relu_graph() -> GraphFragment {
    let mut graph = GraphFragment::new();
    graph.add_input(float_input("Orig", &[2])).unwrap();
    graph.add_output(float_value("Y")).unwrap();
    graph.add_node(node("Relu", "relu", &["Orig"], &["Y"])).unwrap();
    graph
}

pub fn materialize(graph: GraphFragment) -> ExecutableModel {
    let mut doc = ModelDocument::with_opsets([("", 18)]).unwrap();
    doc.add_graph(graph).unwrap();
    Materializer::new().materialize(doc).unwrap()
}

pub fn inputs(pairs: Vec<(&str, TensorData)>) -> TensorMap {
    pairs.into_iter().map(|(name, t)| (name.to_string(), t)).collect()
}

pub fn input_names(model: &ExecutableModel) -> Vec<&str> {
    model.graph().inputs().iter().map(|v| v.name()).collect()
}

pub fn output_names(model: &ExecutableModel) -> Vec<&str> {
    model.graph().outputs().iter().map(|v| v.name()).collect()
}
