use std::ops::Range;

use xi_rope::Rope;
use xi_rope::delta::Builder;

use crate::document::{AttributeValue, Entry, NodeData, NodeId, Selection, Tree};
use crate::error::{EngineError, Result};
use crate::markup::{self, Node};

/// One low-level edit recorded during a batch.
///
/// Only edits to nodes attached to the document are recorded; building a
/// detached subtree and then inserting it yields a single `Insert`.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Insert {
        parent: NodeId,
        index: usize,
        nodes: Vec<NodeId>,
    },
    Remove {
        parent: NodeId,
        index: usize,
        nodes: Vec<NodeId>,
    },
    Attribute {
        node: NodeId,
        key: String,
    },
    Text {
        node: NodeId,
    },
}

impl Change {
    /// Node whose content the edit touched
    pub fn location(&self) -> NodeId {
        match self {
            Change::Insert { parent, .. } | Change::Remove { parent, .. } => *parent,
            Change::Attribute { node, .. } | Change::Text { node } => *node,
        }
    }
}

/// Result of a committed batch
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub changes: Vec<Change>,
    pub version: u64,
    pub selection: Option<Selection>,
}

/// Mutation primitives over the staged tree of a batch
pub struct Writer<'a> {
    tree: &'a mut Tree,
    selection: &'a mut Option<Selection>,
    changes: Vec<Change>,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(tree: &'a mut Tree, selection: &'a mut Option<Selection>) -> Self {
        Self {
            tree,
            selection,
            changes: Vec::new(),
        }
    }

    /// The staged tree, including edits made so far in this batch
    pub fn tree(&self) -> &Tree {
        self.tree
    }

    /// Edits recorded so far in this batch
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub(crate) fn into_changes(self) -> Vec<Change> {
        self.changes
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.tree.allocate(NodeData::Element {
            name: name.to_string(),
            attributes: Default::default(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.tree.allocate(NodeData::Text(Rope::from(text)))
    }

    /// Insert a detached node as the `index`th child of `parent`
    pub fn insert(&mut self, child: NodeId, parent: NodeId, index: usize) -> Result<()> {
        self.entry(child)?;
        if child == self.tree.root() {
            return Err(invalid("the root cannot be inserted"));
        }
        if self.tree.parent(child).is_some() {
            return Err(invalid(format!("{child} is already attached; remove it first")));
        }
        if !matches!(self.entry(parent)?.data, NodeData::Element { .. }) {
            return Err(invalid(format!("{parent} is a text node")));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(invalid(format!("inserting {child} into {parent} would create a cycle")));
        }
        let len = self.tree.children(parent).len();
        if index > len {
            return Err(invalid(format!(
                "index {index} out of bounds for {parent} with {len} children"
            )));
        }

        if let Some(entry) = self.tree.entry_mut(parent) {
            entry.children.insert(index, child);
        }
        if let Some(entry) = self.tree.entry_mut(child) {
            entry.parent = Some(parent);
        }
        if self.tree.is_attached(parent) {
            self.changes.push(Change::Insert {
                parent,
                index,
                nodes: vec![child],
            });
        }
        Ok(())
    }

    pub fn append(&mut self, child: NodeId, parent: NodeId) -> Result<()> {
        let index = self.tree.children(parent).len();
        self.insert(child, parent, index)
    }

    /// Detach a node (and its subtree) from its parent
    pub fn remove(&mut self, node: NodeId) -> Result<()> {
        self.entry(node)?;
        let parent = self
            .tree
            .parent(node)
            .ok_or_else(|| invalid(format!("{node} is not attached to a parent")))?;
        let index = self
            .tree
            .index_in_parent(node)
            .ok_or_else(|| EngineError::ConsistencyViolation(format!("{node} missing from its parent")))?;
        let attached = self.tree.is_attached(parent);

        if let Some(entry) = self.tree.entry_mut(parent) {
            entry.children.remove(index);
        }
        if let Some(entry) = self.tree.entry_mut(node) {
            entry.parent = None;
        }
        if attached {
            self.changes.push(Change::Remove {
                parent,
                index,
                nodes: vec![node],
            });
        }
        Ok(())
    }

    /// Move a node; `index` counts positions after the node has been removed
    pub fn move_to(&mut self, node: NodeId, parent: NodeId, index: usize) -> Result<()> {
        let len_after_removal = self.tree.children(parent).len()
            - usize::from(self.tree.parent(node) == Some(parent));
        if index > len_after_removal {
            return Err(invalid(format!(
                "index {index} out of bounds for {parent} with {len_after_removal} children"
            )));
        }
        self.remove(node)?;
        self.insert(node, parent, index)
    }

    /// Replace `node` with the detached element `wrapper`, and put `node` inside it
    pub fn wrap(&mut self, node: NodeId, wrapper: NodeId) -> Result<()> {
        if !self.tree.children(wrapper).is_empty() {
            return Err(invalid(format!("wrapper {wrapper} is not empty")));
        }
        let parent = self
            .tree
            .parent(node)
            .ok_or_else(|| invalid(format!("{node} is not attached to a parent")))?;
        let index = self
            .tree
            .index_in_parent(node)
            .ok_or_else(|| EngineError::ConsistencyViolation(format!("{node} missing from its parent")))?;

        self.remove(node)?;
        self.insert(node, wrapper, 0)?;
        self.insert(wrapper, parent, index)
    }

    /// Set an element attribute. Recorded only when the value changes.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        key: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<()> {
        let value = value.into();
        let attached = self.tree.is_attached(node);
        let entry = self
            .tree
            .entry_mut(node)
            .ok_or_else(|| invalid(format!("unknown node {node}")))?;
        let NodeData::Element { attributes, .. } = &mut entry.data else {
            return Err(invalid(format!("{node} is a text node")));
        };
        if attributes.get(key) == Some(&value) {
            return Ok(());
        }
        attributes.insert(key.to_string(), value);
        if attached {
            self.changes.push(Change::Attribute {
                node,
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Insert text at a byte offset of a text node
    pub fn insert_text(&mut self, node: NodeId, offset: usize, text: &str) -> Result<()> {
        self.edit_text(node, offset..offset, text)
    }

    /// Delete a byte range of a text node
    pub fn delete_text(&mut self, node: NodeId, range: Range<usize>) -> Result<()> {
        self.edit_text(node, range, "")
    }

    fn edit_text(&mut self, node: NodeId, range: Range<usize>, text: &str) -> Result<()> {
        let attached = self.tree.is_attached(node);
        let entry = self
            .tree
            .entry_mut(node)
            .ok_or_else(|| invalid(format!("unknown node {node}")))?;
        let NodeData::Text(rope) = &mut entry.data else {
            return Err(invalid(format!("{node} is not a text node")));
        };

        let content = rope.to_string();
        if range.start > range.end
            || range.end > content.len()
            || !content.is_char_boundary(range.start)
            || !content.is_char_boundary(range.end)
        {
            return Err(invalid(format!(
                "range {range:?} is not valid in a text of {} bytes",
                content.len()
            )));
        }
        if range.is_empty() && text.is_empty() {
            return Ok(());
        }

        let mut builder = Builder::new(rope.len());
        if text.is_empty() {
            builder.delete(range);
        } else {
            builder.replace(range, Rope::from(text));
        }
        *rope = builder.build().apply(&*rope);

        if attached {
            self.changes.push(Change::Text { node });
        }
        Ok(())
    }

    /// Parse markup and insert the resulting nodes at `index` of `parent`
    pub fn insert_markup(&mut self, parent: NodeId, index: usize, source: &str) -> Result<Vec<NodeId>> {
        let nodes = markup::parse_fragment(source)?;
        let mut inserted = Vec::with_capacity(nodes.len());
        for (offset, node) in nodes.iter().enumerate() {
            let id = self.build(node)?;
            self.insert(id, parent, index + offset)?;
            inserted.push(id);
        }
        Ok(inserted)
    }

    fn build(&mut self, node: &Node) -> Result<NodeId> {
        match node {
            Node::Text(text) => Ok(self.create_text(text)),
            Node::Element(element) => {
                let id = self.create_element(&element.name);
                for (key, value) in &element.attributes {
                    self.set_attribute(id, key, value.as_str())?;
                }
                for child in &element.children {
                    let child = self.build(child)?;
                    self.append(child, id)?;
                }
                Ok(id)
            }
        }
    }

    /// Move the selection. The anchor must be attached.
    pub fn set_selection(&mut self, selection: Option<Selection>) -> Result<()> {
        if let Some(selection) = &selection
            && !self.tree.is_attached(selection.anchor())
        {
            return Err(invalid(format!(
                "selection anchor {} is not in the document",
                selection.anchor()
            )));
        }
        *self.selection = selection;
        Ok(())
    }

    fn entry(&self, id: NodeId) -> Result<&Entry> {
        self.tree
            .nodes
            .get(&id)
            .ok_or_else(|| invalid(format!("unknown node {id}")))
    }

    fn is_ancestor_or_self(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.tree.parent(id);
        }
        false
    }
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::InvalidOperation(message.into())
}
