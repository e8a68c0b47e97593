//! Resolved graphs and patch merging

pub mod merge;
pub mod resolved;

pub use merge::{GraphMerger, GraphPatch};
pub use resolved::{Dependency, GraphStatistics, NodeId, ResolvedGraph};
