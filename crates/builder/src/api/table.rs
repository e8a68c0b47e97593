// Versioned operation table
//
// Slots are only ever appended. Existing slots keep their index, name and
// signature forever; a new version adds slots after the last one.

use super::handle::Handle;
use crate::config::BuilderConfig;
use crate::graph::GraphPatch;
use crate::ir::{
    AttributePayload, AttributeValue, ElementType, GraphFragment, OperatorNode, ShapeDescriptor, TensorData,
    TensorValues, ValueDescriptor,
};
use crate::materialize::Materializer;
use crate::model::ModelDocument;
use crate::runtime::{EditSession, ExecutionProvider, ReferenceSession, TensorMap};
use crate::{ErrorKind, GraphError, Result};
use std::mem::{offset_of, size_of};
use tracing::debug;

/// Highest table version this build provides
pub const GRAPH_API_VERSION: u32 = 1;

/// Outcome of a table call: 0 on success, otherwise an [`ErrorKind`] code
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(u32);

impl Status {
    pub const OK: Status = Status(0);

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Error kind, `None` on success
    pub fn kind(self) -> Option<ErrorKind> {
        ErrorKind::from_code(self.0)
    }

    pub fn code(self) -> u32 {
        self.0
    }
}

impl From<Result<()>> for Status {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Status::OK,
            Err(err) => {
                debug!(error = %err, "graph api call failed");
                Status(err.kind() as u32)
            }
        }
    }
}

/// Slot indices of version 1
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiSlot {
    CreateShape = 0,
    CreateFixedShape = 1,
    ShapeAppendFixed = 2,
    ShapeAppendSymbolic = 3,
    ReleaseShape = 4,
    CreateValueInfo = 5,
    ValueInfoName = 6,
    ReleaseValueInfo = 7,
    CreateAttribute = 8,
    ReleaseAttribute = 9,
    CreateTensor = 10,
    ReleaseTensor = 11,
    CreateNode = 12,
    ReleaseNode = 13,
    CreateFragment = 14,
    FragmentAddInput = 15,
    FragmentAddOutput = 16,
    FragmentAddInitializer = 17,
    FragmentAddNode = 18,
    ReleaseFragment = 19,
    CreateModel = 20,
    ModelAddGraph = 21,
    ModelMergeOpsets = 22,
    ReleaseModel = 23,
    CreateSessionFromModel = 24,
    CreateEditSession = 25,
    EditSessionApply = 26,
    EditSessionFinalize = 27,
    SessionRun = 28,
    ReleaseSession = 29,
    ReleaseEditSession = 30,
}

impl ApiSlot {
    /// Number of slots in version 1
    pub const COUNT_V1: usize = 31;
}

/// The operation table
///
/// Ownership-transferring parameters are `&mut Handle<_>`: on success the
/// callee leaves them `Transferred`, on failure they are untouched.
/// Constructors write into a `Null` out-handle.
#[repr(C)]
pub struct GraphApi {
    pub version: usize,

    pub create_shape: fn(out: &mut Handle<ShapeDescriptor>) -> Status,
    pub create_fixed_shape: fn(dims: &[i64], out: &mut Handle<ShapeDescriptor>) -> Status,
    pub shape_append_fixed: fn(shape: &mut Handle<ShapeDescriptor>, extent: i64) -> Status,
    pub shape_append_symbolic: fn(shape: &mut Handle<ShapeDescriptor>, name: Option<&str>) -> Status,
    pub release_shape: fn(shape: &mut Handle<ShapeDescriptor>),

    pub create_value_info: fn(
        name: &str,
        elem: ElementType,
        shape: &mut Handle<ShapeDescriptor>,
        out: &mut Handle<ValueDescriptor>,
    ) -> Status,
    pub value_info_name: fn(value: &Handle<ValueDescriptor>, out: &mut String) -> Status,
    pub release_value_info: fn(value: &mut Handle<ValueDescriptor>),

    pub create_attribute: fn(name: &str, payload: &AttributePayload, out: &mut Handle<AttributeValue>) -> Status,
    pub release_attribute: fn(attr: &mut Handle<AttributeValue>),

    pub create_tensor: fn(dims: &[i64], values: &TensorValues, out: &mut Handle<TensorData>) -> Status,
    pub release_tensor: fn(tensor: &mut Handle<TensorData>),

    pub create_node: fn(
        op_type: &str,
        domain: &str,
        name: &str,
        inputs: &[&str],
        outputs: &[&str],
        attributes: &mut [Handle<AttributeValue>],
        out: &mut Handle<OperatorNode>,
    ) -> Status,
    pub release_node: fn(node: &mut Handle<OperatorNode>),

    pub create_fragment: fn(out: &mut Handle<GraphFragment>) -> Status,
    pub fragment_add_input: fn(fragment: &mut Handle<GraphFragment>, value: &mut Handle<ValueDescriptor>) -> Status,
    pub fragment_add_output: fn(fragment: &mut Handle<GraphFragment>, value: &mut Handle<ValueDescriptor>) -> Status,
    pub fragment_add_initializer:
        fn(fragment: &mut Handle<GraphFragment>, name: &str, tensor: &mut Handle<TensorData>) -> Status,
    pub fragment_add_node: fn(fragment: &mut Handle<GraphFragment>, node: &mut Handle<OperatorNode>) -> Status,
    pub release_fragment: fn(fragment: &mut Handle<GraphFragment>),

    pub create_model: fn(opsets: &[(&str, i64)], out: &mut Handle<ModelDocument>) -> Status,
    pub model_add_graph: fn(model: &mut Handle<ModelDocument>, graph: &mut Handle<GraphFragment>) -> Status,
    pub model_merge_opsets: fn(model: &mut Handle<ModelDocument>, opsets: &[(&str, i64)]) -> Status,
    pub release_model: fn(model: &mut Handle<ModelDocument>),

    pub create_session_from_model:
        fn(model: &mut Handle<ModelDocument>, out: &mut Handle<ReferenceSession>) -> Status,
    pub create_edit_session: fn(model: &mut Handle<ModelDocument>, out: &mut Handle<EditSession>) -> Status,
    pub edit_session_apply:
        fn(session: &mut Handle<EditSession>, patch: &mut Handle<GraphFragment>, opsets: &[(&str, i64)]) -> Status,
    pub edit_session_finalize: fn(session: &mut Handle<EditSession>, out: &mut Handle<ReferenceSession>) -> Status,
    pub session_run:
        fn(session: &Handle<ReferenceSession>, inputs: &TensorMap, out: &mut Vec<(String, TensorData)>) -> Status,
    pub release_session: fn(session: &mut Handle<ReferenceSession>),
    pub release_edit_session: fn(session: &mut Handle<EditSession>),
}

// Every slot is one function pointer wide and sits at its ApiSlot index
const SLOT: usize = size_of::<fn()>();
const _: () = assert!(offset_of!(GraphApi, create_shape) == size_of::<usize>());
const _: () = assert!(
    offset_of!(GraphApi, create_session_from_model)
        == offset_of!(GraphApi, create_shape) + ApiSlot::CreateSessionFromModel as usize * SLOT
);
const _: () = assert!(
    offset_of!(GraphApi, release_edit_session)
        == offset_of!(GraphApi, create_shape) + ApiSlot::ReleaseEditSession as usize * SLOT
);
const _: () = assert!(size_of::<GraphApi>() == size_of::<usize>() + ApiSlot::COUNT_V1 * SLOT);

static GRAPH_API_V1: GraphApi = GraphApi {
    version: 1,
    create_shape,
    create_fixed_shape,
    shape_append_fixed,
    shape_append_symbolic,
    release_shape: release::<ShapeDescriptor>,
    create_value_info,
    value_info_name,
    release_value_info: release::<ValueDescriptor>,
    create_attribute,
    release_attribute: release::<AttributeValue>,
    create_tensor,
    release_tensor: release::<TensorData>,
    create_node,
    release_node: release::<OperatorNode>,
    create_fragment,
    fragment_add_input,
    fragment_add_output,
    fragment_add_initializer,
    fragment_add_node,
    release_fragment: release::<GraphFragment>,
    create_model,
    model_add_graph,
    model_merge_opsets,
    release_model: release::<ModelDocument>,
    create_session_from_model,
    create_edit_session,
    edit_session_apply,
    edit_session_finalize,
    session_run,
    release_session: release::<ReferenceSession>,
    release_edit_session: release::<EditSession>,
};

/// Get the operation table for a caller built against `version`
///
/// Any version up to [`GRAPH_API_VERSION`] is served by the current table,
/// since slots are only appended.
pub fn graph_api(version: u32) -> Option<&'static GraphApi> {
    if (1..=GRAPH_API_VERSION).contains(&version) {
        Some(&GRAPH_API_V1)
    } else {
        None
    }
}

fn release<T>(handle: &mut Handle<T>) {
    handle.release();
}

/// Check an out-handle before consuming any input handle
fn ensure_empty<T>(out: &Handle<T>) -> Result<()> {
    if out.is_live() {
        return Err(GraphError::InvalidArgument(
            "output handle already owns an object".to_string(),
        ));
    }
    Ok(())
}

fn create_shape(out: &mut Handle<ShapeDescriptor>) -> Status {
    out.put(ShapeDescriptor::new()).into()
}

fn create_fixed_shape(dims: &[i64], out: &mut Handle<ShapeDescriptor>) -> Status {
    out.put(ShapeDescriptor::fixed(dims)).into()
}

fn shape_append_fixed(shape: &mut Handle<ShapeDescriptor>, extent: i64) -> Status {
    (|| -> Result<()> {
        let extent = u64::try_from(extent)
            .map_err(|_| GraphError::InvalidArgument(format!("dimension extent {} is negative", extent)))?;
        shape.get_mut()?.push_fixed(extent);
        Ok(())
    })()
    .into()
}

fn shape_append_symbolic(shape: &mut Handle<ShapeDescriptor>, name: Option<&str>) -> Status {
    shape.get_mut().map(|s| s.push_symbolic(name)).into()
}

fn create_value_info(
    name: &str,
    elem: ElementType,
    shape: &mut Handle<ShapeDescriptor>,
    out: &mut Handle<ValueDescriptor>,
) -> Status {
    (|| -> Result<()> {
        ensure_empty(out)?;
        let value = if shape.is_null() {
            ValueDescriptor::tensor(name, elem, None)?
        } else {
            let shape = shape.take_checked(|_| ValueDescriptor::tensor(name, elem, None).map(drop))?;
            ValueDescriptor::tensor(name, elem, Some(shape))?
        };
        out.put(value)
    })()
    .into()
}

fn value_info_name(value: &Handle<ValueDescriptor>, out: &mut String) -> Status {
    value
        .get()
        .map(|v| {
            out.clear();
            out.push_str(v.name());
        })
        .into()
}

fn create_attribute(name: &str, payload: &AttributePayload, out: &mut Handle<AttributeValue>) -> Status {
    (|| -> Result<()> { out.put(AttributeValue::new(name, payload.clone())?) })().into()
}

fn create_tensor(dims: &[i64], values: &TensorValues, out: &mut Handle<TensorData>) -> Status {
    (|| -> Result<()> { out.put(TensorData::new(dims.to_vec(), values.clone())?) })().into()
}

fn create_node(
    op_type: &str,
    domain: &str,
    name: &str,
    inputs: &[&str],
    outputs: &[&str],
    attributes: &mut [Handle<AttributeValue>],
    out: &mut Handle<OperatorNode>,
) -> Status {
    (|| -> Result<()> {
        ensure_empty(out)?;
        let attrs = attributes
            .iter()
            .map(|h| h.get().cloned())
            .collect::<Result<Vec<_>>>()?;
        let node = OperatorNode::new(op_type, domain, name, inputs.iter().copied(), outputs.iter().copied(), attrs)?;
        for attr in attributes.iter_mut() {
            *attr = Handle::Transferred;
        }
        out.put(node)
    })()
    .into()
}

fn create_fragment(out: &mut Handle<GraphFragment>) -> Status {
    out.put(GraphFragment::new()).into()
}

fn fragment_add_input(fragment: &mut Handle<GraphFragment>, value: &mut Handle<ValueDescriptor>) -> Status {
    (|| -> Result<()> {
        let fragment = fragment.get_mut()?;
        let value = value.take_checked(|v| fragment.check_input(v))?;
        fragment.add_input(value)
    })()
    .into()
}

fn fragment_add_output(fragment: &mut Handle<GraphFragment>, value: &mut Handle<ValueDescriptor>) -> Status {
    (|| -> Result<()> {
        let fragment = fragment.get_mut()?;
        let value = value.take_checked(|v| fragment.check_output(v))?;
        fragment.add_output(value)
    })()
    .into()
}

fn fragment_add_initializer(fragment: &mut Handle<GraphFragment>, name: &str, tensor: &mut Handle<TensorData>) -> Status {
    (|| -> Result<()> {
        let fragment = fragment.get_mut()?;
        let tensor = tensor.take_checked(|_| fragment.check_initializer(name))?;
        fragment.add_initializer(name, tensor)
    })()
    .into()
}

fn fragment_add_node(fragment: &mut Handle<GraphFragment>, node: &mut Handle<OperatorNode>) -> Status {
    (|| -> Result<()> {
        let fragment = fragment.get_mut()?;
        let node = node.take_checked(|n| fragment.check_node(n))?;
        fragment.add_node(node)
    })()
    .into()
}

fn create_model(opsets: &[(&str, i64)], out: &mut Handle<ModelDocument>) -> Status {
    (|| -> Result<()> { out.put(ModelDocument::with_opsets(opsets.iter().copied())?) })().into()
}

fn model_add_graph(model: &mut Handle<ModelDocument>, graph: &mut Handle<GraphFragment>) -> Status {
    (|| -> Result<()> {
        let model = model.get_mut()?;
        let graph = graph.take_checked(|g| model.check_graph(g))?;
        model.add_graph(graph)
    })()
    .into()
}

fn model_merge_opsets(model: &mut Handle<ModelDocument>, opsets: &[(&str, i64)]) -> Status {
    (|| -> Result<()> { model.get_mut()?.merge_opsets(opsets.iter().copied()).map(|_| ()) })().into()
}

fn create_session_from_model(model: &mut Handle<ModelDocument>, out: &mut Handle<ReferenceSession>) -> Status {
    (|| -> Result<()> {
        ensure_empty(out)?;
        let config = BuilderConfig::default();
        let materializer = Materializer::new();
        let doc = model.take_checked(|doc| materializer.check(doc))?;
        out.put(ReferenceSession::new(materializer.materialize(doc)?, config.session))
    })()
    .into()
}

fn create_edit_session(model: &mut Handle<ModelDocument>, out: &mut Handle<EditSession>) -> Status {
    (|| -> Result<()> {
        ensure_empty(out)?;
        let doc = model.take_checked(|doc| Materializer::new().check(doc))?;
        out.put(EditSession::load_document(doc, BuilderConfig::default())?)
    })()
    .into()
}

fn edit_session_apply(
    session: &mut Handle<EditSession>,
    patch: &mut Handle<GraphFragment>,
    opsets: &[(&str, i64)],
) -> Status {
    (|| -> Result<()> {
        let session = session.get_mut()?;
        // A merge can reject the patch after assembling it, so it works on a copy
        patch.transfer_cloned(|fragment| session.apply(GraphPatch::new(fragment).require_opsets(opsets.iter().copied())))
    })()
    .into()
}

fn edit_session_finalize(session: &mut Handle<EditSession>, out: &mut Handle<ReferenceSession>) -> Status {
    (|| -> Result<()> {
        ensure_empty(out)?;
        let edit = session.take()?;
        out.put(edit.finalize())
    })()
    .into()
}

fn session_run(session: &Handle<ReferenceSession>, inputs: &TensorMap, out: &mut Vec<(String, TensorData)>) -> Status {
    (|| -> Result<()> {
        *out = session.get()?.run(inputs)?;
        Ok(())
    })()
    .into()
}
