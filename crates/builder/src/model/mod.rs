//! Model documents and their opset registries

pub mod document;
pub mod opset;

pub use document::{LineageEntry, ModelDocument, ModelMetadata};
pub use opset::OpsetRegistry;
