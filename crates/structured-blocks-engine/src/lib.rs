pub mod codec;
pub mod collection;
pub mod demo;
pub mod document;
pub mod editing;
pub mod error;
pub mod markup;
pub mod models;
pub mod registry;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use collection::{InstanceCollection, Presenter};
pub use document::{Document, NodeId, Selection, Writer};
pub use editing::StructuredEditing;
pub use error::{EngineError, Result};
pub use models::*;
pub use registry::{BlockDefinition, BlockRegistry, PropertySpec, RandomUids, SequentialUids, UidSource, ValueKind};
