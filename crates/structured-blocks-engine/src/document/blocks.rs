//! Block containers in the host document.
//!
//! A block is a top-level `textBlock` or `objectBlock` element carrying its
//! type name, properties and uid as attributes. A text block holds its
//! content directly; an object block holds only `blockSlot` children, each
//! tagged with a `slotName`.

use crate::document::{
    ATTR_PROPERTIES, ATTR_SLOT_NAME, ATTR_TYPE, ATTR_UID, AttributeValue, BLOCK_SLOT, NodeData,
    NodeId, OBJECT_BLOCK, TEXT_BLOCK, Tree, Writer,
};
use crate::error::{EngineError, Result};
use crate::models::{BlockInstance, BlockKind, MAIN_SLOT, Properties, Slots, Uid};

pub fn element_name(kind: BlockKind) -> &'static str {
    match kind {
        BlockKind::TextLike => TEXT_BLOCK,
        BlockKind::ObjectLike => OBJECT_BLOCK,
    }
}

pub fn kind_of(tree: &Tree, node: NodeId) -> Option<BlockKind> {
    match tree.name(node)? {
        TEXT_BLOCK => Some(BlockKind::TextLike),
        OBJECT_BLOCK => Some(BlockKind::ObjectLike),
        _ => None,
    }
}

pub fn uid_of(tree: &Tree, node: NodeId) -> Option<Uid> {
    tree.text_attribute(node, ATTR_UID).map(Uid::from)
}

pub fn type_of(tree: &Tree, node: NodeId) -> Option<&str> {
    tree.text_attribute(node, ATTR_TYPE)
}

/// Properties of a block; an absent attribute means none, anything other
/// than a property map is a consistency violation
pub fn properties_of(tree: &Tree, node: NodeId) -> Result<Properties> {
    match tree.attribute(node, ATTR_PROPERTIES) {
        None => Ok(Properties::new()),
        Some(AttributeValue::Properties(properties)) => Ok(properties.clone()),
        Some(AttributeValue::Text(_)) => Err(EngineError::ConsistencyViolation(format!(
            "{ATTR_PROPERTIES} of block {node} is text, not a property map"
        ))),
    }
}

/// Top-level block with the given uid
pub fn find_block(tree: &Tree, uid: &Uid) -> Option<NodeId> {
    tree.children(tree.root())
        .iter()
        .copied()
        .find(|node| tree.is_block(*node) && uid_of(tree, *node).as_ref() == Some(uid))
}

/// The `blockSlot` child of an object block holding the named slot
pub fn slot_node(tree: &Tree, block: NodeId, name: &str) -> Option<NodeId> {
    tree.children(block).iter().copied().find(|child| {
        tree.name(*child) == Some(BLOCK_SLOT) && tree.text_attribute(*child, ATTR_SLOT_NAME) == Some(name)
    })
}

/// Serialise a block container back into an instance, reading its slot
/// content from the live tree.
pub fn read_instance(tree: &Tree, node: NodeId) -> Result<BlockInstance> {
    let kind = kind_of(tree, node)
        .ok_or_else(|| EngineError::ConsistencyViolation(format!("{node} is not a block container")))?;
    let uid = uid_of(tree, node)
        .ok_or_else(|| EngineError::ConsistencyViolation(format!("block {node} has no uid")))?;
    let type_name = type_of(tree, node)
        .ok_or_else(|| EngineError::ConsistencyViolation(format!("block {uid} has no type")))?
        .to_string();

    let mut slots = Slots::new();
    match kind {
        BlockKind::TextLike => {
            slots.insert(MAIN_SLOT.to_string(), tree.children_markup(node));
        }
        BlockKind::ObjectLike => {
            for child in tree.children(node) {
                let name = match tree.data(*child) {
                    Some(NodeData::Element { name, .. }) if name == BLOCK_SLOT => {
                        tree.text_attribute(*child, ATTR_SLOT_NAME)
                    }
                    _ => None,
                };
                let Some(name) = name else {
                    return Err(EngineError::ConsistencyViolation(format!(
                        "object block {uid} has a child without a slot name"
                    )));
                };
                if slots
                    .insert(name.to_string(), tree.children_markup(*child))
                    .is_some()
                {
                    return Err(EngineError::ConsistencyViolation(format!(
                        "object block {uid} has slot {name} more than once"
                    )));
                }
            }
        }
    }

    Ok(BlockInstance {
        uid,
        type_name,
        kind,
        properties: properties_of(tree, node)?,
        slots,
    })
}

/// Build a detached block container for an instance
pub fn build_block(writer: &mut Writer<'_>, instance: &BlockInstance) -> Result<NodeId> {
    let block = writer.create_element(element_name(instance.kind));
    writer.set_attribute(block, ATTR_TYPE, instance.type_name.as_str())?;
    writer.set_attribute(block, ATTR_UID, instance.uid.as_str())?;
    writer.set_attribute(
        block,
        ATTR_PROPERTIES,
        AttributeValue::Properties(instance.properties.clone()),
    )?;

    match instance.kind {
        BlockKind::TextLike => {
            let content = instance.slot(MAIN_SLOT).unwrap_or_default();
            writer.insert_markup(block, 0, content)?;
        }
        BlockKind::ObjectLike => {
            for (name, content) in &instance.slots {
                let slot = writer.create_element(BLOCK_SLOT);
                writer.set_attribute(slot, ATTR_SLOT_NAME, name.as_str())?;
                writer.insert_markup(slot, 0, content)?;
                writer.append(slot, block)?;
            }
        }
    }
    Ok(block)
}
