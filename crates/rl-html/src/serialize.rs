//! Markup serialization for documents, nodes, and fragments.

use crate::tokenizer::TextMode;
use crate::tokenizer::text_mode;
use crate::tree::is_void;
use rl_dom::Document;
use rl_dom::NodeId;
use rl_dom::NodeKind;

/// Doctype plus the document element.
pub fn serialize_document(doc: &Document) -> String {
    serialize_children(doc, doc.root())
}

/// Outer markup of `node`.
pub fn serialize_node(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, node, TextMode::Markup, &mut out);
    out
}

/// Inner markup of `node`; for a template, the markup of its content.
pub fn serialize_children(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    let scope = doc.template_content(node).unwrap_or(node);
    let mode = doc.tag_name(node).map(text_mode).unwrap_or(TextMode::Markup);
    for child in doc.children(scope) {
        write_node(doc, *child, mode, &mut out);
    }
    out
}

fn write_node(doc: &Document, node: NodeId, parent_mode: TextMode, out: &mut String) {
    let Some(kind) = doc.kind(node) else {
        return;
    };

    match kind {
        NodeKind::Document | NodeKind::DocumentFragment => {
            for child in doc.children(node) {
                write_node(doc, *child, TextMode::Markup, out);
            }
        }
        NodeKind::Doctype(name) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(name);
            out.push('>');
        }
        NodeKind::Text(text) => match parent_mode {
            TextMode::Raw => out.push_str(text),
            TextMode::Markup | TextMode::EscapableRaw => escape_text(text, out),
        },
        NodeKind::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeKind::Element(data) => {
            out.push('<');
            out.push_str(&data.tag);
            for (name, value) in &data.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_attribute(value, out);
                out.push('"');
            }
            out.push('>');

            if is_void(&data.tag) {
                return;
            }

            out.push_str(&serialize_children(doc, node));
            out.push_str("</");
            out.push_str(&data.tag);
            out.push('>');
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}
