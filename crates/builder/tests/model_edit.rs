//! Load a model, patch its interface, run the result

mod common;

use common::*;
use hologram_graph_builder::api::{graph_api, Handle, GRAPH_API_VERSION};
use hologram_graph_builder::{
    AttributePayload, AttributeValue, BuilderConfig, EditSession, ElementType, ErrorKind, ExecutionProvider,
    GraphError, GraphFragment, GraphPatch, OperatorNode, TensorData, ValueDescriptor,
};

/// New(int64) -> Cast -> Orig
fn cast_patch() -> GraphFragment {
    let mut patch = GraphFragment::new();
    patch
        .add_input(ValueDescriptor::tensor("New", ElementType::Int64, None).unwrap())
        .unwrap();
    patch
        .add_node(
            OperatorNode::new(
                "Cast",
                "",
                "cast_new",
                ["New"],
                ["Orig"],
                vec![AttributeValue::int("to", ElementType::Float.code()).unwrap()],
            )
            .unwrap(),
        )
        .unwrap();
    patch
}

#[test]
fn test_new_input_replaces_orig() {
    let mut session = EditSession::load(materialize(relu_graph()), BuilderConfig::default());
    session
        .apply(GraphPatch::new(cast_patch()).with_label("cast input"))
        .unwrap();

    let model = session.model();
    assert_eq!(input_names(model), vec!["New"]);
    assert_eq!(output_names(model), vec!["Y"]);
    assert!(model.graph().node_by_name("relu").is_some());
    assert_eq!(model.graph().producer_of("Orig").unwrap().name(), "cast_new");

    let lineage = &model.metadata().lineage;
    assert_eq!(lineage.len(), 1);
    assert_eq!(lineage[0].label, "cast input");
    assert_eq!(lineage[0].nodes_added, 1);

    let runner = session.finalize();
    let outputs = runner
        .run(&inputs(vec![("New", TensorData::from_i64(vec![2], vec![-4, 7]).unwrap())]))
        .unwrap();
    assert_tensors_equal(outputs[0].1.as_f32().unwrap(), &[0.0, 7.0], 0.0);
}

#[test]
fn test_patches_stack() {
    let mut session = EditSession::load(materialize(relu_graph()), BuilderConfig::default());
    session.apply(GraphPatch::new(cast_patch())).unwrap();

    let mut tail = GraphFragment::new();
    tail.add_node(node("Identity", "copy", &["Y"], &["Y2"])).unwrap();
    tail.add_output(float_value("Y2")).unwrap();
    session.apply(GraphPatch::new(tail)).unwrap();

    assert_eq!(session.applied(), 2);
    assert_eq!(output_names(session.model()), vec!["Y", "Y2"]);
    let sequences: Vec<u32> = session.model().metadata().lineage.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);
}

#[test]
fn test_remove_output_and_node() {
    let mut session = EditSession::load(materialize(relu_graph()), BuilderConfig::default());

    let mut replacement = GraphFragment::new();
    replacement.add_node(node("Identity", "pass", &["Orig"], &["Y"])).unwrap();
    session
        .apply(GraphPatch::new(replacement).remove_node("relu"))
        .unwrap();

    let model = session.model();
    assert!(model.graph().node_by_name("relu").is_none());
    assert_eq!(model.graph().producer_of("Y").unwrap().op_type(), "Identity");
    assert_eq!(output_names(model), vec!["Y"]);
}

#[test]
fn test_edit_through_handle_table() {
    let api = graph_api(GRAPH_API_VERSION).unwrap();

    let mut doc = Handle::new(hologram_graph_builder::ModelDocument::with_opsets([("", 18)]).unwrap());
    let mut base = Handle::new(relu_graph());
    assert!((api.model_add_graph)(&mut doc, &mut base).is_ok());

    let mut edit = Handle::null();
    assert!((api.create_edit_session)(&mut doc, &mut edit).is_ok());
    assert!(doc.is_transferred());

    let mut to = Handle::null();
    (api.create_attribute)("to", &AttributePayload::Int(ElementType::Float.code()), &mut to);
    let mut attrs = [to];
    let mut cast = Handle::null();
    (api.create_node)("Cast", "", "cast_new", &["New"], &["Orig"], &mut attrs, &mut cast);

    let mut shape = Handle::null();
    let mut new_input = Handle::null();
    (api.create_value_info)("New", ElementType::Int64, &mut shape, &mut new_input);

    let mut patch = Handle::null();
    (api.create_fragment)(&mut patch);
    (api.fragment_add_input)(&mut patch, &mut new_input);
    (api.fragment_add_node)(&mut patch, &mut cast);

    assert!((api.edit_session_apply)(&mut edit, &mut patch, &[]).is_ok());
    assert!(patch.is_transferred());

    let mut runner = Handle::null();
    assert!((api.edit_session_finalize)(&mut edit, &mut runner).is_ok());
    assert!(edit.is_transferred());

    let status = (api.edit_session_apply)(&mut edit, &mut Handle::new(GraphFragment::new()), &[]);
    assert_eq!(status.kind(), Some(ErrorKind::UseAfterTransfer));

    let feeds = inputs(vec![("New", TensorData::from_i64(vec![2], vec![3, -1]).unwrap())]);
    let mut outputs = Vec::new();
    assert!((api.session_run)(&runner, &feeds, &mut outputs).is_ok());
    assert_tensors_equal(outputs[0].1.as_f32().unwrap(), &[3.0, 0.0], 0.0);
}

#[test]
fn test_patch_with_foreign_opset_conflict() {
    let mut session = EditSession::load(materialize(relu_graph()), BuilderConfig::default());
    let before = session.model().graph().node_count();

    let mut patch = GraphFragment::new();
    patch.add_node(node("Identity", "copy", &["Y"], &["Y2"])).unwrap();
    patch.add_output(float_value("Y2")).unwrap();

    let err = session
        .apply(GraphPatch::new(patch).require_opsets([("", 13)]))
        .unwrap_err();
    assert!(matches!(err, GraphError::VersionConflict { .. }));
    assert_eq!(err.kind(), ErrorKind::VersionConflict);
    assert_eq!(session.model().graph().node_count(), before);
    assert_eq!(session.model().opsets().version(""), Some(18));
}
