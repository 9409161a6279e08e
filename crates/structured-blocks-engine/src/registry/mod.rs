//! # Block registry
//!
//! Maps block type names to their definitions and turns partial, externally
//! supplied descriptors into canonical [`BlockInstance`]s.
//!
//! The registry owns the identifier source. Identifiers are never derived
//! from positions: [`BlockRegistry::generate_uid`] draws from the injected
//! [`UidSource`] and checks every candidate against the caller's view of the
//! live document.

mod definition;
mod uid;

use std::collections::{BTreeSet, HashMap};

pub use definition::{BlockDefinition, PropertySpec, TemplateFn, ValueKind};
pub use uid::{RandomUids, SequentialUids, UidSource};

use crate::error::{EngineError, Result};
use crate::markup::{self, Element, Node};
use crate::models::{BlockDescriptor, BlockInstance, BlockKind, MAIN_SLOT, PropertyValue, Uid};

/// Attempts made to find an identifier not already in use
const UID_ATTEMPTS: usize = 16;

pub struct BlockRegistry {
    definitions: HashMap<String, BlockDefinition>,
    order: Vec<String>,
    default_text_type: Option<String>,
    uids: Box<dyn UidSource>,
}

impl BlockRegistry {
    pub fn new(uids: impl UidSource + 'static) -> Self {
        Self {
            definitions: HashMap::new(),
            order: Vec::new(),
            default_text_type: None,
            uids: Box::new(uids),
        }
    }

    pub fn register(&mut self, definition: BlockDefinition) -> Result<()> {
        let name = definition.type_name().to_string();
        if self.definitions.contains_key(&name) {
            return Err(EngineError::DuplicateType(name));
        }
        self.order.push(name.clone());
        self.definitions.insert(name, definition);
        Ok(())
    }

    pub fn definition(&self, type_name: &str) -> Result<&BlockDefinition> {
        self.definitions
            .get(type_name)
            .ok_or_else(|| EngineError::UnknownType(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.definitions.contains_key(type_name)
    }

    /// Registered type names, in registration order
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Choose the text-like type used to wrap untyped top-level content
    pub fn set_default_text_type(&mut self, type_name: &str) -> Result<()> {
        let definition = self.definition(type_name)?;
        if definition.kind() != BlockKind::TextLike {
            return Err(EngineError::InvalidOperation(format!(
                "default text block type {type_name} is not text-like"
            )));
        }
        self.default_text_type = Some(type_name.to_string());
        Ok(())
    }

    /// The wrapping type: the one chosen explicitly, else the first
    /// registered text-like type.
    pub fn default_text_type(&self) -> Result<&BlockDefinition> {
        if let Some(name) = &self.default_text_type {
            return self.definition(name);
        }
        self.order
            .iter()
            .filter_map(|name| self.definitions.get(name))
            .find(|definition| definition.kind() == BlockKind::TextLike)
            .ok_or_else(|| EngineError::UnknownType("<default text block>".to_string()))
    }

    /// Fill in a descriptor's missing pieces from its definition.
    ///
    /// Properties and slots absent from the descriptor take the definition's
    /// defaults key by key; slot markup is canonicalised so it compares equal
    /// to what the document later reads back.
    pub fn normalize(&mut self, descriptor: BlockDescriptor) -> Result<BlockInstance> {
        let definition = self.definition(&descriptor.type_name)?;

        let mut properties = definition.default_properties().clone();
        properties.extend(descriptor.properties.unwrap_or_default());

        let mut slots = definition.default_slots().clone();
        for (name, content) in descriptor.slots.unwrap_or_default() {
            if !slots.contains_key(&name) {
                return Err(EngineError::MalformedData(format!(
                    "block type {} has no slot named {name}",
                    descriptor.type_name
                )));
            }
            let nodes = markup::parse_fragment(&content).map_err(|e| {
                EngineError::MalformedData(format!("slot {name} of {}: {e}", descriptor.type_name))
            })?;
            slots.insert(name, markup::to_markup(&nodes));
        }

        let kind = definition.kind();
        let uid = match descriptor.uid {
            Some(uid) => uid,
            None => self.uids.next_uid(),
        };

        Ok(BlockInstance {
            uid,
            type_name: descriptor.type_name,
            kind,
            properties,
            slots,
        })
    }

    /// A fresh identifier for which `is_taken` is false
    pub fn generate_uid(&mut self, is_taken: impl Fn(&Uid) -> bool) -> Result<Uid> {
        for _ in 0..UID_ATTEMPTS {
            let uid = self.uids.next_uid();
            if !is_taken(&uid) {
                return Ok(uid);
            }
            log::warn!("uid source produced an identifier already in use: {uid}");
        }
        Err(EngineError::ConsistencyViolation(format!(
            "no unused uid after {UID_ATTEMPTS} attempts"
        )))
    }

    /// Render a block's presentation and check it against its definition.
    ///
    /// The template must produce exactly one root element, and the set of
    /// `data-block-slot` placeholders in it must equal the declared slot set
    /// (`{"main"}` for text-like blocks).
    pub fn render(&self, type_name: &str, properties: &crate::models::Properties) -> Result<Element> {
        let definition = self.definition(type_name)?;
        let source = definition.render_markup(properties);
        let nodes = markup::parse_fragment(&source)
            .map_err(|e| EngineError::render(type_name, format!("template markup: {e}")))?;

        let mut roots = nodes.into_iter().filter(|node| !node.is_blank_text());
        let root = match (roots.next(), roots.next()) {
            (Some(Node::Element(root)), None) => root,
            (None, _) => return Err(EngineError::render(type_name, "template produced no element")),
            (Some(Node::Text(_)), None) => {
                return Err(EngineError::render(type_name, "template produced bare text"));
            }
            (Some(_), Some(_)) => {
                return Err(EngineError::render(
                    type_name,
                    "template produced more than one root node",
                ));
            }
        };

        let produced = slot_names(&root).map_err(|reason| EngineError::render(type_name, reason))?;
        let declared: BTreeSet<&str> = definition.slot_names().iter().map(String::as_str).collect();
        let produced_set: BTreeSet<&str> = produced.iter().map(String::as_str).collect();
        if produced_set != declared {
            return Err(EngineError::render(
                type_name,
                format!("template slots {produced_set:?} do not match declared slots {declared:?}"),
            ));
        }
        debug_assert!(definition.kind() != BlockKind::TextLike || declared.contains(MAIN_SLOT));

        Ok(root)
    }

    /// Check a value against the type's property schema
    pub fn validate_property(
        &self,
        type_name: &str,
        property: &str,
        value: &PropertyValue,
    ) -> Result<()> {
        let definition = self.definition(type_name)?;
        let invalid = |reason: String| EngineError::InvalidProperty {
            type_name: type_name.to_string(),
            property: property.to_string(),
            reason,
        };

        let spec = definition
            .property_spec(property)
            .ok_or_else(|| invalid("property is not declared".to_string()))?;
        if spec.kind.accepts(value) {
            Ok(())
        } else {
            Err(invalid(format!("{value} is not a valid {:?}", spec.kind)))
        }
    }
}

impl std::fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRegistry")
            .field("types", &self.order)
            .field("default_text_type", &self.default_text_type)
            .finish_non_exhaustive()
    }
}

/// Slot placeholder names in document order.
///
/// Fails on a duplicated name or on a slot nested inside another slot.
pub fn slot_names(root: &Element) -> std::result::Result<Vec<String>, String> {
    let mut names = Vec::new();
    collect_slots(root, false, &mut names)?;
    Ok(names)
}

fn collect_slots(
    element: &Element,
    inside_slot: bool,
    names: &mut Vec<String>,
) -> std::result::Result<(), String> {
    let is_slot = match element.slot_name() {
        Some(name) if inside_slot => return Err(format!("slot {name} is nested in another slot")),
        Some(name) if names.iter().any(|n| n == name) => {
            return Err(format!("slot {name} appears more than once"));
        }
        Some(name) => {
            names.push(name.to_string());
            true
        }
        None => false,
    };
    for child in &element.children {
        if let Node::Element(child) = child {
            collect_slots(child, inside_slot || is_slot, names)?;
        }
    }
    Ok(())
}
