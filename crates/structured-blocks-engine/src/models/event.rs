use serde::Serialize;

use crate::models::{BlockInstance, Uid};

/// Block lifecycle event emitted by the change observer.
///
/// Within one batch, structural events (`Remove`/`Insert`) come first in
/// document order, followed by at most one `Update` per touched block, followed
/// by a `SelectionChanged` if the selected block changed. Replaying the
/// structural and update events against a collection that mirrors the
/// document before the batch reproduces the document after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChangeEvent {
    Insert {
        index: usize,
        instances: Vec<BlockInstance>,
    },
    Remove {
        index: usize,
        count: usize,
    },
    Update {
        instance: BlockInstance,
    },
    SelectionChanged {
        uid: Option<Uid>,
    },
}

impl ChangeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChangeEvent::Insert { .. } => "insert",
            ChangeEvent::Remove { .. } => "remove",
            ChangeEvent::Update { .. } => "update",
            ChangeEvent::SelectionChanged { .. } => "select",
        }
    }
}
