use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::{BlockInstance, Properties, PropertyValue, Slots, Uid};

/// Externally supplied, possibly partial description of a block instance.
///
/// Missing pieces are filled in by `BlockRegistry::normalize`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDescriptor {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<Slots>,
}

impl BlockDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn with_uid(mut self, uid: impl Into<Uid>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties
            .get_or_insert_with(Properties::new)
            .insert(name.to_string(), value.into());
        self
    }

    pub fn with_slot(mut self, name: &str, markup: &str) -> Self {
        self.slots
            .get_or_insert_with(Slots::new)
            .insert(name.to_string(), markup.to_string());
        self
    }
}

impl From<&BlockInstance> for BlockDescriptor {
    fn from(instance: &BlockInstance) -> Self {
        Self {
            type_name: instance.type_name.clone(),
            uid: Some(instance.uid.clone()),
            properties: Some(instance.properties.clone()),
            slots: Some(instance.slots.clone()),
        }
    }
}

/// Read a document payload: an array of descriptors, or the `{ "main": [...] }`
/// envelope keyed by root name.
pub fn descriptors_from_json(payload: &serde_json::Value) -> Result<Vec<BlockDescriptor>> {
    let items = match payload {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(roots) => match roots.get("main") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(EngineError::MalformedData(
                    "payload object has no \"main\" array of block descriptors".to_string(),
                ));
            }
        },
        _ => {
            return Err(EngineError::MalformedData(
                "payload is not a sequence of block descriptors".to_string(),
            ));
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            BlockDescriptor::deserialize(item)
                .map_err(|e| EngineError::MalformedData(format!("descriptor {index}: {e}")))
        })
        .collect()
}
