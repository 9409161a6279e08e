//! Schema-driven property editing and the console listing.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{BlockInstance, PropertyValue, Uid};
use crate::registry::{BlockDefinition, ValueKind};

/// Longest value shown in the listing before it is cut
pub const MAX_VALUE_CHARS: usize = 30;

fn digits() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"^\d+$").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("{0:?} is not a whole number")]
    NotANumber(String),
    #[error("{value:?} is not one of {options:?}")]
    NotAnOption { value: String, options: Vec<String> },
}

/// One editable property of the selected instance
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub kind: ValueKind,
    pub value: Option<PropertyValue>,
}

/// Fields for every property the type declares, in declaration order
pub fn form_fields(definition: &BlockDefinition, instance: &BlockInstance) -> Vec<FormField> {
    definition
        .schema()
        .iter()
        .map(|spec| FormField {
            name: spec.name.clone(),
            kind: spec.kind.clone(),
            value: instance.property(&spec.name).cloned(),
        })
        .collect()
}

/// Convert raw user input to a property value of the given kind
pub fn parse_input(kind: &ValueKind, raw: &str) -> Result<PropertyValue, InputError> {
    let raw = raw.trim();
    match kind {
        ValueKind::Number if digits().is_match(raw) => raw
            .parse::<f64>()
            .map(PropertyValue::Number)
            .map_err(|_| InputError::NotANumber(raw.to_string())),
        ValueKind::Number => Err(InputError::NotANumber(raw.to_string())),
        ValueKind::Enum(options) if options.iter().any(|option| option == raw) => {
            Ok(PropertyValue::from(raw))
        }
        ValueKind::Enum(options) => Err(InputError::NotAnOption {
            value: raw.to_string(),
            options: options.clone(),
        }),
        ValueKind::Text => Ok(PropertyValue::from(raw)),
    }
}

/// Display form of a value, cut to [`MAX_VALUE_CHARS`]
pub fn format_value(value: &str) -> String {
    let mut chars = value.chars();
    let mut out: String = chars.by_ref().take(MAX_VALUE_CHARS).collect();
    if chars.next().is_some() {
        out.push_str("...");
    }
    out
}

/// The console listing of every instance
pub fn listing(
    instances: &[BlockInstance],
    modified: &BTreeSet<Uid>,
    selected: Option<&Uid>,
) -> String {
    let mut out = String::new();
    for instance in instances {
        let marker = if selected == Some(&instance.uid) { '>' } else { ' ' };
        let _ = write!(out, "{marker} #{} {}", instance.uid, instance.type_name);
        if modified.contains(&instance.uid) {
            out.push_str(" *");
        }
        out.push('\n');

        if !instance.properties.is_empty() {
            out.push_str("    properties:\n");
            for (name, value) in &instance.properties {
                let _ = writeln!(out, "      {name:<10} {}", format_value(&value.to_string()));
            }
        }
        if !instance.slots.is_empty() {
            out.push_str("    slots:\n");
            for (name, content) in &instance.slots {
                let _ = writeln!(out, "      {name:<10} {}", format_value(content));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::models::{BlockKind, MAIN_SLOT, Properties, Slots};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(ValueKind::Number, "42", Ok(PropertyValue::Number(42.0)))]
    #[case(ValueKind::Number, " 7 ", Ok(PropertyValue::Number(7.0)))]
    #[case(ValueKind::Number, "-1", Err(InputError::NotANumber("-1".to_string())))]
    #[case(ValueKind::Number, "1.5", Err(InputError::NotANumber("1.5".to_string())))]
    #[case(ValueKind::Text, "hello", Ok(PropertyValue::from("hello")))]
    #[case(ValueKind::Enum(vec!["left".into(), "right".into()]), "left", Ok(PropertyValue::from("left")))]
    fn test_parse_input(
        #[case] kind: ValueKind,
        #[case] raw: &str,
        #[case] expected: Result<PropertyValue, InputError>,
    ) {
        assert_eq!(parse_input(&kind, raw), expected);
    }

    #[test]
    fn test_parse_input_rejects_unknown_option() {
        let kind = ValueKind::Enum(vec!["none".into()]);
        assert!(matches!(
            parse_input(&kind, "left"),
            Err(InputError::NotAnOption { .. })
        ));
    }

    #[test]
    fn test_format_value_truncates() {
        assert_eq!(format_value("short"), "short");
        let long = "x".repeat(40);
        assert_eq!(format_value(&long), format!("{}...", "x".repeat(30)));
    }

    #[test]
    fn test_form_fields_follow_schema() {
        let definition = demo::image();
        let instance = BlockInstance {
            uid: Uid::new("i"),
            type_name: "image".to_string(),
            kind: BlockKind::ObjectLike,
            properties: Properties::from([("align".to_string(), PropertyValue::from("left"))]),
            slots: Slots::new(),
        };

        let fields = form_fields(&definition, &instance);

        assert_eq!(
            fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            vec!["url", "alt", "align"]
        );
        assert_eq!(fields[0].value, None);
        assert_eq!(fields[2].value, Some(PropertyValue::from("left")));
    }

    #[test]
    fn test_listing() {
        let instances = vec![
            BlockInstance {
                uid: Uid::new("h"),
                type_name: "headline".to_string(),
                kind: BlockKind::TextLike,
                properties: Properties::from([("level".to_string(), PropertyValue::from(1))]),
                slots: Slots::from([(MAIN_SLOT.to_string(), "<h2>Hi</h2>".to_string())]),
            },
            BlockInstance {
                uid: Uid::new("t"),
                type_name: "text".to_string(),
                kind: BlockKind::TextLike,
                properties: Properties::new(),
                slots: Slots::from([(MAIN_SLOT.to_string(), "<p>Body</p>".to_string())]),
            },
        ];
        let modified = BTreeSet::from([Uid::new("t")]);

        let text = listing(&instances, &modified, Some(&Uid::new("h")));

        insta::assert_snapshot!(text, @r"
        > #h headline
            properties:
              level      1
            slots:
              main       <h2>Hi</h2>
          #t text *
            slots:
              main       <p>Body</p>
        ");
    }
}
