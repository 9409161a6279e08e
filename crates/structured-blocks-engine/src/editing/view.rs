//! Editing view: the rendered presentation of every block.
//!
//! Each block is rendered from its type's template. Template elements marked
//! as slots become editable regions whose children mirror the slot content
//! of the document, and a [`Mapper`] links document nodes to view nodes.
//!
//! When a block's properties change, the template is rendered again and the
//! live children of every editable region are moved into the corresponding
//! region of the new tree rather than rebuilt, so per-node view state
//! survives the re-render.

use std::collections::{BTreeMap, HashMap};

use crate::document::blocks::{self, read_instance};
use crate::document::{Document, NodeData, NodeId, Tree};
use crate::error::{EngineError, Result};
use crate::markup::{self, Element, Node};
use crate::models::{BlockKind, ChangeEvent, Properties, Uid};
use crate::registry::BlockRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum ViewData {
    Element {
        name: String,
        attributes: BTreeMap<String, String>,
        /// Slot name when this element is an editable region
        editable: Option<String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct ViewEntry {
    data: ViewData,
    parent: Option<ViewId>,
    children: Vec<ViewId>,
}

/// Two-way link between document nodes and view nodes
#[derive(Debug, Default)]
pub struct Mapper {
    to_view: HashMap<NodeId, ViewId>,
    to_model: HashMap<ViewId, NodeId>,
}

impl Mapper {
    /// Link `model` and `view`, dropping any previous link of either side
    pub fn bind(&mut self, model: NodeId, view: ViewId) {
        if let Some(old_view) = self.to_view.insert(model, view)
            && old_view != view
        {
            self.to_model.remove(&old_view);
        }
        if let Some(old_model) = self.to_model.insert(view, model)
            && old_model != model
            && self.to_view.get(&old_model) == Some(&view)
        {
            self.to_view.remove(&old_model);
        }
    }

    pub fn unbind_view(&mut self, view: ViewId) {
        if let Some(model) = self.to_model.remove(&view)
            && self.to_view.get(&model) == Some(&view)
        {
            self.to_view.remove(&model);
        }
    }

    pub fn to_view(&self, model: NodeId) -> Option<ViewId> {
        self.to_view.get(&model).copied()
    }

    pub fn to_model(&self, view: ViewId) -> Option<NodeId> {
        self.to_model.get(&view).copied()
    }

    pub fn len(&self) -> usize {
        self.to_model.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_model.is_empty()
    }
}

/// Presentation state of one top-level block
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBlock {
    pub root: ViewId,
    pub model: NodeId,
    pub uid: Uid,
    pub type_name: String,
    pub kind: BlockKind,
    pub properties: Properties,
}

#[derive(Debug)]
pub struct EditingView {
    nodes: HashMap<ViewId, ViewEntry>,
    root: ViewId,
    next_id: u64,
    blocks: Vec<RenderedBlock>,
    mapper: Mapper,
}

impl Default for EditingView {
    fn default() -> Self {
        Self::new()
    }
}

impl EditingView {
    pub fn new() -> Self {
        let root = ViewId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            ViewEntry {
                data: ViewData::Element {
                    name: "div".to_string(),
                    attributes: BTreeMap::new(),
                    editable: None,
                },
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root,
            next_id: 1,
            blocks: Vec::new(),
            mapper: Mapper::default(),
        }
    }

    pub fn root(&self) -> ViewId {
        self.root
    }

    pub fn blocks(&self) -> &[RenderedBlock] {
        &self.blocks
    }

    pub fn block(&self, uid: &Uid) -> Option<&RenderedBlock> {
        self.blocks.iter().find(|block| &block.uid == uid)
    }

    pub fn block_root(&self, uid: &Uid) -> Option<ViewId> {
        self.block(uid).map(|block| block.root)
    }

    /// Editable region rendered for the named slot of a block
    pub fn slot_element(&self, uid: &Uid, name: &str) -> Option<ViewId> {
        let root = self.block_root(uid)?;
        self.slot_map(root).get(name).copied()
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn data(&self, id: ViewId) -> Option<&ViewData> {
        self.nodes.get(&id).map(|entry| &entry.data)
    }

    pub fn children(&self, id: ViewId) -> &[ViewId] {
        self.nodes
            .get(&id)
            .map(|entry| entry.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, id: ViewId) -> Option<ViewId> {
        self.nodes.get(&id).and_then(|entry| entry.parent)
    }

    /// Number of live view nodes, the root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn text_content(&self, id: ViewId) -> String {
        match self.data(id) {
            Some(ViewData::Text(text)) => text.clone(),
            Some(ViewData::Element { .. }) => self
                .children(id)
                .iter()
                .map(|child| self.text_content(*child))
                .collect(),
            None => String::new(),
        }
    }

    /// Canonical markup of a view node and its subtree
    pub fn to_markup(&self, id: ViewId) -> String {
        self.to_markup_node(id)
            .map(|node| markup::to_markup(&[node]))
            .unwrap_or_default()
    }

    /// Canonical markup of the children of a view node
    pub fn children_markup(&self, id: ViewId) -> String {
        let nodes: Vec<Node> = self
            .children(id)
            .iter()
            .filter_map(|child| self.to_markup_node(*child))
            .collect();
        markup::to_markup(&nodes)
    }

    fn to_markup_node(&self, id: ViewId) -> Option<Node> {
        match self.data(id)? {
            ViewData::Text(text) => Some(Node::Text(text.clone())),
            ViewData::Element {
                name, attributes, ..
            } => Some(Node::Element(Element {
                name: name.clone(),
                attributes: attributes.clone(),
                children: self
                    .children(id)
                    .iter()
                    .filter_map(|child| self.to_markup_node(*child))
                    .collect(),
            })),
        }
    }

    /// Throw away the current presentation and render every block again
    pub fn render_all(&mut self, document: &Document, registry: &BlockRegistry) -> Result<()> {
        for block in std::mem::take(&mut self.blocks) {
            self.destroy(block.root);
        }
        let tree = document.tree();
        for (index, node) in tree.children(tree.root()).iter().enumerate() {
            let block = self.render_block(tree, registry, *node, index)?;
            self.blocks.push(block);
        }
        Ok(())
    }

    /// Bring the presentation up to date with one batch of events
    pub fn apply(
        &mut self,
        events: &[ChangeEvent],
        document: &Document,
        registry: &BlockRegistry,
    ) -> Result<()> {
        let tree = document.tree();
        for event in events {
            match event {
                ChangeEvent::Remove { index, count } => {
                    let end = index + count;
                    if end > self.blocks.len() {
                        return Err(EngineError::ConsistencyViolation(format!(
                            "view has {} blocks, cannot remove {index}..{end}",
                            self.blocks.len()
                        )));
                    }
                    let removed: Vec<RenderedBlock> = self.blocks.drain(*index..end).collect();
                    for block in removed {
                        self.destroy(block.root);
                    }
                }
                ChangeEvent::Insert { index, instances } => {
                    for (offset, instance) in instances.iter().enumerate() {
                        let node = blocks::find_block(tree, &instance.uid).ok_or_else(|| {
                            EngineError::ConsistencyViolation(format!(
                                "inserted block {} is not in the document",
                                instance.uid
                            ))
                        })?;
                        let position = index + offset;
                        if position > self.blocks.len() {
                            return Err(EngineError::ConsistencyViolation(format!(
                                "view has {} blocks, cannot insert at {position}",
                                self.blocks.len()
                            )));
                        }
                        let block = self.render_block(tree, registry, node, position)?;
                        self.blocks.insert(position, block);
                    }
                }
                ChangeEvent::Update { instance } => {
                    let position = self
                        .blocks
                        .iter()
                        .position(|block| block.uid == instance.uid)
                        .ok_or_else(|| EngineError::UnknownInstance(instance.uid.clone()))?;
                    if self.blocks[position].properties != instance.properties {
                        self.rerender(position, registry, &instance.properties)?;
                    }
                    self.refresh_slots(position, tree)?;
                }
                ChangeEvent::SelectionChanged { .. } => {}
            }
        }
        Ok(())
    }

    fn render_block(
        &mut self,
        tree: &Tree,
        registry: &BlockRegistry,
        node: NodeId,
        index: usize,
    ) -> Result<RenderedBlock> {
        let instance = read_instance(tree, node)?;
        let template = registry.render(&instance.type_name, &instance.properties)?;
        let (root, slots) = self.build_template(&template);

        for (name, slot_view) in &slots {
            let model_slot = match instance.kind {
                BlockKind::TextLike => Some(node),
                BlockKind::ObjectLike => blocks::slot_node(tree, node, name),
            };
            let Some(model_slot) = model_slot else {
                self.destroy(root);
                return Err(EngineError::ConsistencyViolation(format!(
                    "block {} has no slot {name} in the document",
                    instance.uid
                )));
            };
            self.mapper.bind(model_slot, *slot_view);
            self.fill(tree, model_slot, *slot_view);
        }
        if instance.kind == BlockKind::ObjectLike {
            self.mapper.bind(node, root);
        }

        if let Some(entry) = self.nodes.get_mut(&self.root) {
            entry.children.insert(index, root);
        }
        if let Some(entry) = self.nodes.get_mut(&root) {
            entry.parent = Some(self.root);
        }

        Ok(RenderedBlock {
            root,
            model: node,
            uid: instance.uid,
            type_name: instance.type_name,
            kind: instance.kind,
            properties: instance.properties,
        })
    }

    /// Render the block at `position` again with new properties, moving the
    /// live content of each editable region into the new tree.
    fn rerender(
        &mut self,
        position: usize,
        registry: &BlockRegistry,
        properties: &Properties,
    ) -> Result<()> {
        let block = &self.blocks[position];
        let (type_name, old_root, model, kind) =
            (block.type_name.clone(), block.root, block.model, block.kind);

        let template = registry.render(&type_name, properties)?;
        let old_slots = self.slot_map(old_root);
        let (new_root, new_slots) = self.build_template(&template);
        let new_slots: BTreeMap<String, ViewId> = new_slots.into_iter().collect();

        if !old_slots.keys().eq(new_slots.keys()) {
            self.destroy(new_root);
            return Err(EngineError::render(
                &type_name,
                format!(
                    "re-render changed slots from {:?} to {:?}",
                    old_slots.keys().collect::<Vec<_>>(),
                    new_slots.keys().collect::<Vec<_>>()
                ),
            ));
        }

        for (name, old_slot) in &old_slots {
            let new_slot = new_slots[name];
            let content = self
                .nodes
                .get_mut(old_slot)
                .map(|entry| std::mem::take(&mut entry.children))
                .unwrap_or_default();
            for child in &content {
                if let Some(entry) = self.nodes.get_mut(child) {
                    entry.parent = Some(new_slot);
                }
            }
            if let Some(entry) = self.nodes.get_mut(&new_slot) {
                entry.children = content;
            }
            if let Some(model_slot) = self.mapper.to_model(*old_slot) {
                self.mapper.bind(model_slot, new_slot);
            }
        }

        if let Some(entry) = self.nodes.get_mut(&self.root)
            && let Some(slot) = entry.children.iter_mut().find(|child| **child == old_root)
        {
            *slot = new_root;
        }
        if let Some(entry) = self.nodes.get_mut(&new_root) {
            entry.parent = Some(self.root);
        }
        if let Some(entry) = self.nodes.get_mut(&old_root) {
            entry.parent = None;
        }
        self.destroy(old_root);
        if kind == BlockKind::ObjectLike {
            self.mapper.bind(model, new_root);
        }

        let block = &mut self.blocks[position];
        block.root = new_root;
        block.properties = properties.clone();
        log::debug!("re-rendered block {} ({type_name})", block.uid);
        Ok(())
    }

    /// Rebuild the content of every editable region that no longer matches
    /// the document.
    fn refresh_slots(&mut self, position: usize, tree: &Tree) -> Result<()> {
        let root = self.blocks[position].root;
        for slot_view in self.slot_map(root).into_values() {
            let Some(model_slot) = self.mapper.to_model(slot_view) else {
                return Err(EngineError::ConsistencyViolation(format!(
                    "editable region of block {} is not mapped",
                    self.blocks[position].uid
                )));
            };
            if self.children_markup(slot_view) == tree.children_markup(model_slot) {
                continue;
            }
            for child in self.children(slot_view).to_vec() {
                self.destroy(child);
            }
            self.fill(tree, model_slot, slot_view);
        }
        Ok(())
    }

    /// Build a detached view tree from a template, returning its root and
    /// its editable regions in document order.
    fn build_template(&mut self, template: &Element) -> (ViewId, Vec<(String, ViewId)>) {
        let mut slots = Vec::new();
        let root = self.build_element(template, &mut slots);
        (root, slots)
    }

    fn build_element(&mut self, element: &Element, slots: &mut Vec<(String, ViewId)>) -> ViewId {
        let editable = element.slot_name().map(str::to_string);
        let id = self.allocate(ViewData::Element {
            name: element.name.clone(),
            attributes: element.attributes.clone(),
            editable: editable.clone(),
        });
        if let Some(name) = editable {
            // Slot content comes from the document, not the template
            slots.push((name, id));
            return id;
        }
        for child in &element.children {
            let child_id = match child {
                Node::Element(child) => self.build_element(child, slots),
                Node::Text(text) => self.allocate(ViewData::Text(text.clone())),
            };
            self.append(child_id, id);
        }
        id
    }

    /// Mirror the document children of `model` into `view`
    fn fill(&mut self, tree: &Tree, model: NodeId, view: ViewId) {
        for child in tree.children(model) {
            let child_view = self.mirror(tree, *child);
            self.append(child_view, view);
        }
    }

    fn mirror(&mut self, tree: &Tree, model: NodeId) -> ViewId {
        let data = match tree.data(model) {
            Some(NodeData::Text(rope)) => ViewData::Text(rope.to_string()),
            Some(NodeData::Element { name, attributes }) => ViewData::Element {
                name: name.clone(),
                attributes: attributes
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_markup_value()))
                    .collect(),
                editable: None,
            },
            None => ViewData::Text(String::new()),
        };
        let id = self.allocate(data);
        self.mapper.bind(model, id);
        self.fill(tree, model, id);
        id
    }

    fn slot_map(&self, root: ViewId) -> BTreeMap<String, ViewId> {
        let mut slots = BTreeMap::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match self.data(id) {
                Some(ViewData::Element {
                    editable: Some(name),
                    ..
                }) => {
                    slots.insert(name.clone(), id);
                }
                Some(ViewData::Element { .. }) => stack.extend(self.children(id).iter().copied()),
                _ => {}
            }
        }
        slots
    }

    fn allocate(&mut self, data: ViewData) -> ViewId {
        let id = ViewId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            ViewEntry {
                data,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    fn append(&mut self, child: ViewId, parent: ViewId) {
        if let Some(entry) = self.nodes.get_mut(&parent) {
            entry.children.push(child);
        }
        if let Some(entry) = self.nodes.get_mut(&child) {
            entry.parent = Some(parent);
        }
    }

    /// Remove a view subtree and every mapping into it
    fn destroy(&mut self, id: ViewId) {
        if let Some(parent) = self.parent(id)
            && let Some(entry) = self.nodes.get_mut(&parent)
        {
            entry.children.retain(|child| *child != id);
        }
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if let Some(entry) = self.nodes.remove(&node) {
                stack.extend(entry.children);
            }
            self.mapper.unbind_view(node);
        }
    }
}
