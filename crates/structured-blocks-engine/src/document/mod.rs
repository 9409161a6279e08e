//! # Host document model
//!
//! An in-memory rich-text document: an arena tree of element and text nodes
//! under a single root element. Top-level children of the root are block
//! containers (see [`blocks`]).
//!
//! All mutation goes through [`Document::change`], which runs a closure
//! against a [`Writer`] over a staged copy of the tree. The staged tree only
//! replaces the live one when the closure succeeds, so a failed batch leaves
//! the document untouched.
//!
//! Node identifiers are never reused, which lets callers compare the child
//! sequences of two tree versions by identity.

pub mod blocks;
mod writer;

use std::collections::{BTreeMap, HashMap, HashSet};

use xi_rope::Rope;

pub use writer::{Change, Patch, Writer};

use crate::error::Result;
use crate::markup::{self, Node};
use crate::models::Properties;

pub const ROOT: &str = "$root";
pub const TEXT_BLOCK: &str = "textBlock";
pub const OBJECT_BLOCK: &str = "objectBlock";
pub const BLOCK_SLOT: &str = "blockSlot";

pub const ATTR_TYPE: &str = "blockType";
pub const ATTR_PROPERTIES: &str = "blockProperties";
pub const ATTR_UID: &str = "blockUid";
pub const ATTR_SLOT_NAME: &str = "slotName";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Properties(Properties),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(text) => Some(text),
            AttributeValue::Properties(_) => None,
        }
    }

    pub fn as_properties(&self) -> Option<&Properties> {
        match self {
            AttributeValue::Properties(properties) => Some(properties),
            AttributeValue::Text(_) => None,
        }
    }

    /// Flat string form used when the node is exported as markup
    pub(crate) fn to_markup_value(&self) -> String {
        match self {
            AttributeValue::Text(text) => text.clone(),
            AttributeValue::Properties(properties) => {
                serde_json::to_string(properties).unwrap_or_default()
            }
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Element {
        name: String,
        attributes: BTreeMap<String, AttributeValue>,
    },
    Text(Rope),
}

#[derive(Debug, Clone)]
struct Entry {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Where the user's selection is anchored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Collapsed caret: a byte offset in a text node, or a child offset in an element
    Caret { node: NodeId, offset: usize },
    /// A whole node is selected (e.g. an object block)
    Node(NodeId),
}

impl Selection {
    pub fn caret(node: NodeId, offset: usize) -> Self {
        Selection::Caret { node, offset }
    }

    pub fn anchor(&self) -> NodeId {
        match self {
            Selection::Caret { node, .. } => *node,
            Selection::Node(node) => *node,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: HashMap<NodeId, Entry>,
    root: NodeId,
    next_id: u64,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Entry {
                data: NodeData::Element {
                    name: ROOT.to_string(),
                    attributes: BTreeMap::new(),
                },
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root,
            next_id: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(&id).map(|entry| &entry.data)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|entry| entry.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|entry| entry.parent)
    }

    /// Element name, or `None` for text nodes
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match self.data(id)? {
            NodeData::Element { name, .. } => Some(name),
            NodeData::Text(_) => None,
        }
    }

    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&AttributeValue> {
        match self.data(id)? {
            NodeData::Element { attributes, .. } => attributes.get(key),
            NodeData::Text(_) => None,
        }
    }

    pub fn text_attribute(&self, id: NodeId, key: &str) -> Option<&str> {
        self.attribute(id, key).and_then(AttributeValue::as_text)
    }

    /// Content of a text node
    pub fn text(&self, id: NodeId) -> Option<String> {
        match self.data(id)? {
            NodeData::Text(rope) => Some(rope.to_string()),
            NodeData::Element { .. } => None,
        }
    }

    /// Concatenated text of a node and its descendants
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.data(id) {
            Some(NodeData::Text(rope)) => out.push_str(&rope.to_string()),
            Some(NodeData::Element { .. }) => {
                for child in self.children(id) {
                    self.collect_text(*child, out);
                }
            }
            None => {}
        }
    }

    /// True when the node is reachable from the root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|child| *child == id)
    }

    pub fn is_block(&self, id: NodeId) -> bool {
        matches!(self.name(id), Some(TEXT_BLOCK | OBJECT_BLOCK))
    }

    /// Nearest block container at or above `id`
    pub fn block_ancestor(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.is_block(node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Descendants of `id` in document order, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Children of `id` as markup nodes
    pub fn to_markup_nodes(&self, id: NodeId) -> Vec<Node> {
        self.children(id)
            .iter()
            .filter_map(|child| self.to_markup_node(*child))
            .collect()
    }

    fn to_markup_node(&self, id: NodeId) -> Option<Node> {
        match self.data(id)? {
            NodeData::Text(rope) => Some(Node::Text(rope.to_string())),
            NodeData::Element { name, attributes } => Some(Node::Element(markup::Element {
                name: name.clone(),
                attributes: attributes
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_markup_value()))
                    .collect(),
                children: self.to_markup_nodes(id),
            })),
        }
    }

    /// Canonical markup of the children of `id`
    pub fn children_markup(&self, id: NodeId) -> String {
        markup::to_markup(&self.to_markup_nodes(id))
    }

    fn allocate(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Entry {
                data,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut Entry> {
        self.nodes.get_mut(&id)
    }

    /// Drop every node not reachable from the root
    fn collect_garbage(&mut self) -> usize {
        let mut live = HashSet::new();
        live.insert(self.root);
        live.extend(self.descendants(self.root));
        let before = self.nodes.len();
        self.nodes.retain(|id, _| live.contains(id));
        before - self.nodes.len()
    }
}

/// The host document: a tree, a version counter and an optional selection
#[derive(Debug, Clone, Default)]
pub struct Document {
    tree: Tree,
    version: u64,
    selection: Option<Selection>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Run one atomic mutation batch.
    ///
    /// On success the staged tree replaces the live one, nodes no longer
    /// reachable from the root are dropped, and a selection left pointing
    /// into removed content is cleared. On failure nothing changes.
    pub fn change<T>(&mut self, f: impl FnOnce(&mut Writer<'_>) -> Result<T>) -> Result<(Patch, T)> {
        let mut staged = self.tree.clone();
        let mut selection = self.selection.clone();

        let (value, changes) = {
            let mut writer = Writer::new(&mut staged, &mut selection);
            let value = f(&mut writer)?;
            (value, writer.into_changes())
        };

        let collected = staged.collect_garbage();
        let selection = selection.and_then(|selection| clamp_selection(&staged, selection));

        self.tree = staged;
        self.selection = selection;
        self.version += 1;
        log::trace!(
            "document v{}: {} changes, {} nodes collected",
            self.version,
            changes.len(),
            collected
        );

        Ok((
            Patch {
                changes,
                version: self.version,
                selection: self.selection.clone(),
            },
            value,
        ))
    }
}

fn clamp_selection(tree: &Tree, selection: Selection) -> Option<Selection> {
    if !tree.contains(selection.anchor()) || !tree.is_attached(selection.anchor()) {
        return None;
    }
    match selection {
        Selection::Caret { node, offset } => {
            let len = match tree.data(node)? {
                NodeData::Text(rope) => rope.len(),
                NodeData::Element { .. } => tree.children(node).len(),
            };
            Some(Selection::Caret {
                node,
                offset: offset.min(len),
            })
        }
        Selection::Node(node) => Some(Selection::Node(node)),
    }
}
