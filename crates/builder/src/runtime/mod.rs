//! Execution boundary
//!
//! Operator execution belongs to an external session. [`ExecutionProvider`]
//! is that boundary; [`ReferenceSession`] is the in-tree implementation used
//! by tests and the CLI.

pub mod edit;
mod kernels;
pub mod session;

pub use edit::EditSession;
pub use session::ReferenceSession;

use crate::ir::TensorData;
use crate::materialize::ExecutableModel;
use crate::Result;
use ahash::AHashMap;

/// Named tensors passed into a run
pub type TensorMap = AHashMap<String, TensorData>;

/// Something that can execute a materialized model
pub trait ExecutionProvider {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// The model being executed
    fn model(&self) -> &ExecutableModel;

    /// Execute once, returning the declared outputs in order
    fn run(&self, inputs: &TensorMap) -> Result<Vec<(String, TensorData)>>;
}
