//! Handle-based boundary
//!
//! Everything in [`crate::ir`] and [`crate::model`] is also reachable through
//! a flat, versioned table of functions operating on [`Handle`]s. Handles
//! make ownership transfer observable: a handle given to a container becomes
//! `Transferred` and refuses every later use.

pub mod handle;
pub mod table;

pub use handle::Handle;
pub use table::{graph_api, ApiSlot, GraphApi, Status, GRAPH_API_VERSION};
