//! # Export codec
//!
//! Converts block instances to and from the export markup.
//!
//! Each instance becomes a wrapper element carrying its type name,
//! JSON-encoded properties and uid as data attributes:
//!
//! ```text
//! <block-text data-block-properties="{...}" data-block-type="headline" data-block-uid="b1">
//!   ...main slot content...
//! </block-text>
//! <block-object data-block-properties="{...}" data-block-type="image" data-block-uid="b2">
//!   <div data-block-slot="caption">...</div>
//! </block-object>
//! ```

use crate::error::{EngineError, Result};
use crate::markup::{self, Element, Node, SLOT_ATTRIBUTE};
use crate::models::{BlockDescriptor, BlockInstance, BlockKind, MAIN_SLOT, Properties, Slots, Uid};
use crate::registry::BlockRegistry;

pub const TEXT_TAG: &str = "block-text";
pub const OBJECT_TAG: &str = "block-object";
pub const SLOT_TAG: &str = "div";

pub const TYPE_ATTRIBUTE: &str = "data-block-type";
pub const PROPERTIES_ATTRIBUTE: &str = "data-block-properties";
pub const UID_ATTRIBUTE: &str = "data-block-uid";

/// Instance to export element
pub fn downcast(instance: &BlockInstance) -> Result<Element> {
    let tag = match instance.kind {
        BlockKind::TextLike => TEXT_TAG,
        BlockKind::ObjectLike => OBJECT_TAG,
    };
    let properties = serde_json::to_string(&instance.properties)
        .map_err(|e| EngineError::MalformedData(format!("properties of {}: {e}", instance.uid)))?;
    let mut element = Element::new(tag)
        .with_attribute(TYPE_ATTRIBUTE, instance.type_name.as_str())
        .with_attribute(PROPERTIES_ATTRIBUTE, properties)
        .with_attribute(UID_ATTRIBUTE, instance.uid.as_str());

    match instance.kind {
        BlockKind::TextLike => {
            let content = instance.slot(MAIN_SLOT).unwrap_or_default();
            element.children = markup::parse_fragment(content)?;
        }
        BlockKind::ObjectLike => {
            for (name, content) in &instance.slots {
                let mut slot = Element::new(SLOT_TAG).with_attribute(SLOT_ATTRIBUTE, name.as_str());
                slot.children = markup::parse_fragment(content)?;
                element.children.push(Node::Element(slot));
            }
        }
    }
    Ok(element)
}

pub fn export_instance(instance: &BlockInstance) -> Result<String> {
    Ok(Node::Element(downcast(instance)?).to_string())
}

/// One exported element per line, in document order
pub fn export_document(instances: &[BlockInstance]) -> Result<String> {
    let lines = instances
        .iter()
        .map(export_instance)
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

/// Export element to instance.
///
/// The uid is kept when present and generated otherwise; properties absent
/// from the markup take the type's defaults. Every declared slot must be
/// present exactly once.
pub fn upcast(element: &Element, registry: &mut BlockRegistry) -> Result<BlockInstance> {
    let kind = match element.name.as_str() {
        TEXT_TAG => BlockKind::TextLike,
        OBJECT_TAG => BlockKind::ObjectLike,
        other => {
            return Err(EngineError::MalformedData(format!(
                "<{other}> is not an exported block"
            )));
        }
    };
    let type_name = element.attribute(TYPE_ATTRIBUTE).ok_or_else(|| {
        EngineError::MalformedData(format!("<{}> has no {TYPE_ATTRIBUTE}", element.name))
    })?;
    let properties: Properties = match element.attribute(PROPERTIES_ATTRIBUTE) {
        Some(json) => serde_json::from_str(json).map_err(|e| {
            EngineError::MalformedData(format!("{PROPERTIES_ATTRIBUTE} of {type_name}: {e}"))
        })?,
        None => Properties::new(),
    };

    let mut slots = Slots::new();
    match kind {
        BlockKind::TextLike => {
            slots.insert(MAIN_SLOT.to_string(), markup::to_markup(&element.children));
        }
        BlockKind::ObjectLike => {
            for child in &element.children {
                if child.is_blank_text() {
                    continue;
                }
                let Some(name) = child.as_element().and_then(Element::slot_name) else {
                    return Err(EngineError::ConsistencyViolation(format!(
                        "exported {type_name} has a child without {SLOT_ATTRIBUTE}"
                    )));
                };
                let content = child
                    .as_element()
                    .map(|slot| markup::to_markup(&slot.children))
                    .unwrap_or_default();
                if slots.insert(name.to_string(), content).is_some() {
                    return Err(EngineError::MalformedData(format!(
                        "exported {type_name} holds slot {name} twice"
                    )));
                }
            }
        }
    }

    let definition = registry.definition(type_name)?;
    let declared = definition.kind();
    if declared != kind {
        return Err(EngineError::MalformedData(format!(
            "{type_name} is exported as <{}> but is {declared:?}",
            element.name
        )));
    }
    if let Some(missing) = definition
        .slot_names()
        .iter()
        .find(|name| !slots.contains_key(*name))
    {
        return Err(EngineError::MalformedData(format!(
            "exported {type_name} lacks slot {missing}"
        )));
    }

    registry.normalize(BlockDescriptor {
        type_name: type_name.to_string(),
        uid: element.attribute(UID_ATTRIBUTE).map(Uid::from),
        properties: Some(properties),
        slots: Some(slots),
    })
}

/// Parse exported markup into instances
pub fn import(source: &str, registry: &mut BlockRegistry) -> Result<Vec<BlockInstance>> {
    let mut instances = Vec::new();
    for node in markup::parse_fragment(source)? {
        match node {
            Node::Element(element) => instances.push(upcast(&element, registry)?),
            Node::Text(text) if text.trim().is_empty() => {}
            Node::Text(text) => {
                return Err(EngineError::MalformedData(format!(
                    "unexpected text between exported blocks: {:?}",
                    text.trim()
                )));
            }
        }
    }
    Ok(instances)
}
