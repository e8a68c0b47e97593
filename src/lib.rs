//! # Hologram Graph
//!
//! Graph IR toolchain for Hologram: build tensor-model graphs, merge patches
//! into existing models, and run them on the reference session.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Write a small demo model
//! hologram-graph demo --output model.json
//!
//! # Show node counts and interface, or a DOT rendering
//! hologram-graph inspect --model model.json
//! hologram-graph inspect --model model.json --dot
//!
//! # Merge a patch into a model
//! hologram-graph merge --model model.json --patch patch.json --output merged.json
//!
//! # Execute with inputs from a JSON file
//! hologram-graph run --model merged.json --inputs inputs.json
//! ```
//!
//! ## Library Usage
//!
//! ```
//! use hologram_graph::{BuilderConfig, EditSession};
//!
//! let doc = hologram_graph::demo_document()?;
//! let session = EditSession::load_document(doc, BuilderConfig::default())?;
//! assert_eq!(session.model().graph().node_count(), 1);
//! # Ok::<(), hologram_graph::GraphError>(())
//! ```

// Re-export everything from the builder crate
pub use hologram_graph_builder::*;

/// Get the version of hologram-graph
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// `Z = 2 * X·Y`: one Gemm node, input `X` [3, 2], initializer `Y` [2, 3]
pub fn demo_document() -> Result<ModelDocument> {
    let mut graph = GraphFragment::new();
    graph.add_input(ValueDescriptor::tensor(
        "X",
        ElementType::Float,
        Some(ShapeDescriptor::fixed(&[3, 2])),
    )?)?;
    graph.add_initializer(
        "Y",
        TensorData::from_f32(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?,
    )?;
    graph.add_output(ValueDescriptor::tensor(
        "Z",
        ElementType::Float,
        Some(ShapeDescriptor::fixed(&[3, 3])),
    )?)?;
    graph.add_node(OperatorNode::new(
        "Gemm",
        "",
        "gemm",
        ["X", "Y"],
        ["Z"],
        vec![AttributeValue::float("alpha", 2.0)?],
    )?)?;

    let mut doc = ModelDocument::with_opsets([("", 18)])?;
    doc.set_doc_string("Gemm demo: Z = 2 * X·Y");
    doc.add_graph(graph)?;
    Ok(doc)
}
