//! Shared helpers for unit tests.

use crate::demo;
use crate::document::{Document, blocks::build_block};
use crate::models::BlockDescriptor;
use crate::registry::{BlockRegistry, SequentialUids};

/// The demo registry with deterministic uids (`b1`, `b2`, ...)
pub fn demo_registry() -> BlockRegistry {
    demo::registry(SequentialUids::new("b")).expect("demo types register cleanly")
}

/// A document holding the given blocks, built directly without an observer
pub fn document_with(registry: &mut BlockRegistry, descriptors: Vec<BlockDescriptor>) -> Document {
    let instances: Vec<_> = descriptors
        .into_iter()
        .map(|descriptor| registry.normalize(descriptor).expect("valid descriptor"))
        .collect();
    let mut document = Document::new();
    document
        .change(|w| {
            let root = w.tree().root();
            for instance in &instances {
                let block = build_block(w, instance)?;
                w.append(block, root)?;
            }
            Ok(())
        })
        .expect("blocks build cleanly");
    document
}
