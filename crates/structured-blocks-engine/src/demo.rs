//! Demo block types: text, headline, image and video.
//!
//! Used by the console inspector and by the test suites.

use html_escape::encode_double_quoted_attribute as attr;

use crate::error::Result;
use crate::models::Properties;
use crate::registry::{BlockDefinition, BlockRegistry, PropertySpec, UidSource};

pub const ALIGN_OPTIONS: &[&str] = &["none", "left", "right"];

fn text_property(properties: &Properties, name: &str) -> String {
    properties
        .get(name)
        .map(|value| value.to_string())
        .unwrap_or_default()
}

pub fn text() -> BlockDefinition {
    BlockDefinition::text("text", |_| {
        r#"<div class="text" data-block-slot="main"></div>"#.to_string()
    })
    .with_default_slot("main", "<p></p>")
}

pub fn headline() -> BlockDefinition {
    BlockDefinition::text("headline", |properties| {
        format!(
            r#"<header class="headline level-{}" data-block-slot="main"></header>"#,
            attr(&text_property(properties, "level"))
        )
    })
    .with_default_property("level", 1)
    .with_default_slot("main", "<h2>Headline</h2>")
    .with_property(PropertySpec::number("level"))
}

pub fn image() -> BlockDefinition {
    BlockDefinition::object("image", &["caption"], |properties| {
        format!(
            r#"<figure class="image align-{}"><img alt="{}" src="{}"><figcaption data-block-slot="caption"></figcaption></figure>"#,
            attr(&text_property(properties, "align")),
            attr(&text_property(properties, "alt")),
            attr(&text_property(properties, "url")),
        )
    })
    .with_default_property("url", "https://placekitten.com/800/300")
    .with_default_property("alt", "")
    .with_default_property("align", "none")
    .with_default_slot("caption", "<p>Caption</p>")
    .with_property(PropertySpec::text("url"))
    .with_property(PropertySpec::text("alt"))
    .with_property(PropertySpec::choice("align", ALIGN_OPTIONS))
}

pub fn video() -> BlockDefinition {
    BlockDefinition::object("video", &["title", "caption"], |properties| {
        format!(
            r#"<div class="video align-{}"><div class="video-title" data-block-slot="title"></div><iframe src="{}"></iframe><div class="video-caption" data-block-slot="caption"></div></div>"#,
            attr(&text_property(properties, "align")),
            attr(&text_property(properties, "url")),
        )
    })
    .with_default_property("url", "")
    .with_default_property("align", "none")
    .with_default_slot("title", "<h3>Video</h3>")
    .with_default_slot("caption", "<p></p>")
    .with_property(PropertySpec::text("url"))
    .with_property(PropertySpec::choice("align", ALIGN_OPTIONS))
}

/// A registry holding every demo type, with `text` as the wrapping type
pub fn registry(uids: impl UidSource + 'static) -> Result<BlockRegistry> {
    let mut registry = BlockRegistry::new(uids);
    registry.register(text())?;
    registry.register(headline())?;
    registry.register(image())?;
    registry.register(video())?;
    registry.set_default_text_type("text")?;
    Ok(registry)
}
