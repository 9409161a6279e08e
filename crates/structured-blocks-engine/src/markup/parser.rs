use std::borrow::Cow;

use super::cursor::Cursor;
use super::{Element, Node, is_void};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkupError {
    #[error("unexpected end of input inside {0}")]
    UnexpectedEof(&'static str),
    #[error("malformed tag at byte {at}")]
    MalformedTag { at: usize },
    #[error("closing tag </{found}> at byte {at} does not match <{expected}>")]
    MismatchedClose {
        expected: String,
        found: String,
        at: usize,
    },
    #[error("closing tag </{name}> at byte {at} has no opening tag")]
    StrayClose { name: String, at: usize },
    #[error("element <{0}> is never closed")]
    Unclosed(String),
}

/// Parse a markup fragment into a list of sibling nodes.
///
/// Comments are dropped, adjacent text is merged and entities are decoded.
pub fn parse_fragment(input: &str) -> Result<Vec<Node>, MarkupError> {
    let mut cursor = Cursor::new(input);
    let mut open: Vec<Element> = Vec::new();
    let mut roots: Vec<Node> = Vec::new();

    while !cursor.eof() {
        if cursor.starts_with(b"<!--") {
            let Some(end) = cursor.find("-->") else {
                return Err(MarkupError::UnexpectedEof("comment"));
            };
            cursor.bump_n(end + 3);
        } else if cursor.starts_with(b"</") {
            let at = cursor.i;
            cursor.bump_n(2);
            let name = cursor.take_while(is_name_byte).to_ascii_lowercase();
            cursor.skip_whitespace();
            if name.is_empty() || !cursor.eat(b">") {
                return Err(MarkupError::MalformedTag { at });
            }
            let Some(element) = open.pop() else {
                return Err(MarkupError::StrayClose { name, at });
            };
            if element.name != name {
                return Err(MarkupError::MismatchedClose {
                    expected: element.name,
                    found: name,
                    at,
                });
            }
            push_node(&mut open, &mut roots, Node::Element(element));
        } else if is_open_tag_start(&cursor) {
            let (element, self_closing) = parse_open_tag(&mut cursor)?;
            if self_closing || is_void(&element.name) {
                push_node(&mut open, &mut roots, Node::Element(element));
            } else {
                open.push(element);
            }
        } else {
            let text = take_text(&mut cursor);
            let decoded = html_escape::decode_html_entities(text);
            push_node(&mut open, &mut roots, Node::Text(decoded.into_owned()));
        }
    }

    if let Some(element) = open.pop() {
        return Err(MarkupError::Unclosed(element.name));
    }

    Ok(roots)
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

fn is_open_tag_start(cursor: &Cursor<'_>) -> bool {
    cursor.peek() == Some(b'<') && cursor.peek_at(1).is_some_and(|b| b.is_ascii_alphabetic())
}

fn is_tag_start(cursor: &Cursor<'_>) -> bool {
    is_open_tag_start(cursor) || cursor.starts_with(b"</") || cursor.starts_with(b"<!--")
}

/// Consumes text up to the next tag. A `<` that does not open a tag is text.
fn take_text<'a>(cursor: &mut Cursor<'a>) -> &'a str {
    let start = cursor.i;
    cursor.bump_n(1);
    while !cursor.eof() && !is_tag_start(cursor) {
        cursor.bump_n(1);
    }
    &cursor.s[start..cursor.i]
}

fn parse_open_tag(cursor: &mut Cursor<'_>) -> Result<(Element, bool), MarkupError> {
    let at = cursor.i;
    cursor.bump_n(1);
    let mut element = Element::new(cursor.take_while(is_name_byte).to_ascii_lowercase());

    loop {
        cursor.skip_whitespace();
        if cursor.eof() {
            return Err(MarkupError::UnexpectedEof("tag"));
        }
        if cursor.eat(b"/>") {
            return Ok((element, true));
        }
        if cursor.eat(b">") {
            return Ok((element, false));
        }

        let key = cursor
            .take_while(|b| !b.is_ascii_whitespace() && !matches!(b, b'=' | b'>' | b'/' | b'"' | b'\''))
            .to_ascii_lowercase();
        if key.is_empty() {
            return Err(MarkupError::MalformedTag { at });
        }

        cursor.skip_whitespace();
        let value: Cow<'_, str> = if cursor.eat(b"=") {
            cursor.skip_whitespace();
            match cursor.peek() {
                Some(quote @ (b'"' | b'\'')) => {
                    cursor.bump_n(1);
                    let raw = cursor.take_while(|b| b != quote);
                    if !cursor.eat(&[quote]) {
                        return Err(MarkupError::UnexpectedEof("attribute value"));
                    }
                    html_escape::decode_html_entities(raw)
                }
                _ => html_escape::decode_html_entities(
                    cursor.take_while(|b| !b.is_ascii_whitespace() && b != b'>'),
                ),
            }
        } else {
            Cow::Borrowed("")
        };

        element.attributes.insert(key, value.into_owned());
    }
}

/// Appends a finished node to the innermost open element (or the roots),
/// merging adjacent text.
fn push_node(open: &mut [Element], roots: &mut Vec<Node>, node: Node) {
    let siblings = match open.last_mut() {
        Some(parent) => &mut parent.children,
        None => roots,
    };
    if let Node::Text(text) = &node
        && let Some(Node::Text(previous)) = siblings.last_mut()
    {
        previous.push_str(text);
        return;
    }
    siblings.push(node);
}
