use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Behaviors, Document, Editor, ElementKind, ElementNode, Marks, Node, TextNode};

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("document value must be an array of nodes")]
    NotAnArray,
    #[error("document root must contain only elements")]
    TextAtRoot,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A Slate-compatible JSON node, the shape documents arrive in from the
/// embedding application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum RawNode {
    Text(RawText),
    Element(RawElement),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct RawElement {
    #[serde(rename = "type", default)]
    kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,

    #[serde(
        default,
        rename = "customNumber",
        skip_serializing_if = "Option::is_none"
    )]
    custom_number: Option<u64>,

    #[serde(default)]
    children: Vec<RawNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct RawText {
    text: String,

    #[serde(default, rename = "isBold", skip_serializing_if = "Option::is_none")]
    is_bold: Option<bool>,
    #[serde(default, rename = "isItalic", skip_serializing_if = "Option::is_none")]
    is_italic: Option<bool>,
    #[serde(
        default,
        rename = "isStrikethrough",
        skip_serializing_if = "Option::is_none"
    )]
    is_strikethrough: Option<bool>,
    #[serde(
        default,
        rename = "backgroundColor",
        skip_serializing_if = "Option::is_none"
    )]
    background_color: Option<String>,
}

/// Reads an initial document value. Unknown element kinds are downgraded to
/// a warning and handled as untyped blocks; a text leaf at the root is a
/// contract violation and rejected.
pub fn document_from_json(value: serde_json::Value) -> Result<Document, ValueError> {
    if !value.is_array() {
        return Err(ValueError::NotAnArray);
    }
    let nodes: Vec<RawNode> = serde_json::from_value(value)?;
    document_from_raw(nodes)
}

pub fn document_from_json_str(s: &str) -> Result<Document, ValueError> {
    let nodes: Vec<RawNode> = serde_json::from_str(s)?;
    document_from_raw(nodes)
}

pub fn document_to_json(doc: &Document) -> serde_json::Value {
    let raw: Vec<RawNode> = doc.children.iter().map(node_to_raw).collect();
    serde_json::to_value(raw).expect("raw nodes serialize to JSON")
}

pub fn document_to_json_string_pretty(doc: &Document) -> Result<String, serde_json::Error> {
    let raw: Vec<RawNode> = doc.children.iter().map(node_to_raw).collect();
    serde_json::to_string_pretty(&raw)
}

/// Builds an editor (no selection yet) from an initial document value.
pub fn editor_from_initial_value(
    value: serde_json::Value,
    behaviors: Behaviors,
) -> Result<Editor, ValueError> {
    Ok(Editor::new(document_from_json(value)?, None, behaviors))
}

fn document_from_raw(nodes: Vec<RawNode>) -> Result<Document, ValueError> {
    let mut children = Vec::with_capacity(nodes.len());
    for raw in nodes {
        match raw {
            RawNode::Text(_) => return Err(ValueError::TextAtRoot),
            RawNode::Element(el) => children.push(element_from_raw(el)),
        }
    }
    Ok(Document { children })
}

fn element_from_raw(raw: RawElement) -> Node {
    let kind = match raw.kind.as_str() {
        "paragraph" => ElementKind::Paragraph,
        "heading" => ElementKind::Heading,
        "bulleted-list" => ElementKind::BulletedList,
        "numbered-list" => ElementKind::NumberedList,
        "list-item" => ElementKind::ListItem,
        "numbered-list-item" => ElementKind::NumberedListItem {
            custom_number: raw.custom_number,
        },
        "code-block" => ElementKind::CodeBlock,
        "code-line" => ElementKind::CodeLine,
        "link" => ElementKind::Link {
            url: raw.url.clone().unwrap_or_default(),
        },
        other => {
            log::warn!("unknown element kind `{other}`; treating it as a paragraph");
            ElementKind::Paragraph
        }
    };
    let children = raw.children.into_iter().map(node_from_raw).collect();
    Node::Element(ElementNode { kind, children })
}

fn node_from_raw(raw: RawNode) -> Node {
    match raw {
        RawNode::Element(el) => element_from_raw(el),
        RawNode::Text(t) => Node::Text(TextNode {
            text: t.text,
            marks: Marks {
                is_bold: t.is_bold.unwrap_or(false),
                is_italic: t.is_italic.unwrap_or(false),
                is_strikethrough: t.is_strikethrough.unwrap_or(false),
                background_color: t.background_color,
            },
        }),
    }
}

fn node_to_raw(node: &Node) -> RawNode {
    match node {
        Node::Text(t) => RawNode::Text(RawText {
            text: t.text.clone(),
            is_bold: t.marks.is_bold.then_some(true),
            is_italic: t.marks.is_italic.then_some(true),
            is_strikethrough: t.marks.is_strikethrough.then_some(true),
            background_color: t.marks.background_color.clone(),
        }),
        Node::Element(el) => {
            let url = match &el.kind {
                ElementKind::Link { url } => Some(url.clone()),
                _ => None,
            };
            let custom_number = match &el.kind {
                ElementKind::NumberedListItem { custom_number } => *custom_number,
                _ => None,
            };
            RawNode::Element(RawElement {
                kind: el.kind.as_ref().to_string(),
                url,
                custom_number,
                children: el.children.iter().map(node_to_raw).collect(),
            })
        }
    }
}
