use crate::document::{Document, blocks};
use crate::models::{ChangeEvent, Uid};

/// Follows which block holds the selection.
///
/// The selected block is the nearest block container at or above the
/// selection anchor; no selection, or a selection outside every block,
/// selects nothing.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    current: Option<Uid>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Uid> {
        self.current.as_ref()
    }

    /// Adopt the document's selection without reporting it
    pub fn prime(&mut self, document: &Document) {
        self.current = selected_block(document);
    }

    /// Report the selected block if it differs from the last one reported
    pub fn observe(&mut self, document: &Document) -> Option<ChangeEvent> {
        let selected = selected_block(document);
        if selected == self.current {
            return None;
        }
        self.current = selected.clone();
        Some(ChangeEvent::SelectionChanged { uid: selected })
    }
}

fn selected_block(document: &Document) -> Option<Uid> {
    let tree = document.tree();
    let anchor = document.selection()?.anchor();
    let block = tree.block_ancestor(anchor)?;
    blocks::uid_of(tree, block)
}
