use std::fmt;

use crate::models::{BlockKind, MAIN_SLOT, Properties, PropertyValue, Slots};

/// Renders a block's presentation from its properties, as markup with
/// exactly one root element and `data-block-slot` placeholders.
pub type TemplateFn = Box<dyn Fn(&Properties) -> String>;

/// Kind of value a property accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Text,
    Enum(Vec<String>),
}

impl ValueKind {
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        match (self, value) {
            (ValueKind::Number, PropertyValue::Number(n)) => n.is_finite(),
            (ValueKind::Text, PropertyValue::Text(_)) => true,
            (ValueKind::Enum(options), PropertyValue::Text(text)) => options.contains(text),
            _ => false,
        }
    }
}

/// One entry of a block type's property schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: String,
    pub kind: ValueKind,
}

impl PropertySpec {
    pub fn number(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ValueKind::Number,
        }
    }

    pub fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ValueKind::Text,
        }
    }

    pub fn choice(name: &str, options: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: ValueKind::Enum(options.iter().map(|o| o.to_string()).collect()),
        }
    }
}

/// Registry entry describing one block type
pub struct BlockDefinition {
    type_name: String,
    kind: BlockKind,
    slot_names: Vec<String>,
    default_slots: Slots,
    default_properties: Properties,
    schema: Vec<PropertySpec>,
    template: TemplateFn,
}

impl BlockDefinition {
    /// A text-like block: one anonymous `main` slot
    pub fn text(type_name: &str, template: impl Fn(&Properties) -> String + 'static) -> Self {
        Self {
            type_name: type_name.to_string(),
            kind: BlockKind::TextLike,
            slot_names: vec![MAIN_SLOT.to_string()],
            default_slots: Slots::from([(MAIN_SLOT.to_string(), String::new())]),
            default_properties: Properties::new(),
            schema: Vec::new(),
            template: Box::new(template),
        }
    }

    /// An object-like block with the given named slots
    pub fn object(
        type_name: &str,
        slot_names: &[&str],
        template: impl Fn(&Properties) -> String + 'static,
    ) -> Self {
        Self {
            type_name: type_name.to_string(),
            kind: BlockKind::ObjectLike,
            slot_names: slot_names.iter().map(|s| s.to_string()).collect(),
            default_slots: slot_names
                .iter()
                .map(|s| (s.to_string(), String::new()))
                .collect(),
            default_properties: Properties::new(),
            schema: Vec::new(),
            template: Box::new(template),
        }
    }

    /// Default markup for a slot. Ignored for names the block does not declare.
    pub fn with_default_slot(mut self, name: &str, markup: &str) -> Self {
        if self.slot_names.iter().any(|s| s == name) {
            self.default_slots
                .insert(name.to_string(), markup.to_string());
        }
        self
    }

    pub fn with_default_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.default_properties
            .insert(name.to_string(), value.into());
        self
    }

    /// Declares an editable property
    pub fn with_property(mut self, spec: PropertySpec) -> Self {
        self.schema.retain(|existing| existing.name != spec.name);
        self.schema.push(spec);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn slot_names(&self) -> &[String] {
        &self.slot_names
    }

    pub fn default_slots(&self) -> &Slots {
        &self.default_slots
    }

    pub fn default_properties(&self) -> &Properties {
        &self.default_properties
    }

    /// Editable properties, in declaration order
    pub fn schema(&self) -> &[PropertySpec] {
        &self.schema
    }

    pub fn property_spec(&self, name: &str) -> Option<&PropertySpec> {
        self.schema.iter().find(|spec| spec.name == name)
    }

    pub(crate) fn render_markup(&self, properties: &Properties) -> String {
        (self.template)(properties)
    }
}

impl fmt::Debug for BlockDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDefinition")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("slot_names", &self.slot_names)
            .field("default_properties", &self.default_properties)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
