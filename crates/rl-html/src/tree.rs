//! Stack-based tree construction into an `rl_dom::Document`.

use crate::tokenizer::Token;
use rl_core::LayoutResult;
use rl_dom::Document;
use rl_dom::NodeId;
use rl_dom::NodeKind;

/// Elements that never have children or an end tag.
pub(crate) fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// Elements that belong in `head` when they precede any body content.
fn is_head_content(tag: &str) -> bool {
    matches!(
        tag,
        "base" | "link" | "meta" | "noscript" | "script" | "style" | "template" | "title"
    )
}

#[derive(Debug)]
struct OpenElement {
    tag: String,
    /// Where children go; differs from the element for `template`.
    insert_into: NodeId,
}

/// Appends the nodes described by `tokens` under `container`.
///
/// End tags with no matching open element are ignored; elements still open
/// at the end of input are closed implicitly.
pub(crate) fn build_into(
    doc: &mut Document,
    container: NodeId,
    tokens: Vec<Token>,
) -> LayoutResult<()> {
    let mut stack = vec![OpenElement {
        tag: String::new(),
        insert_into: container,
    }];

    for token in tokens {
        let current = stack
            .last()
            .map(|open| open.insert_into)
            .unwrap_or(container);

        match token {
            Token::Text(text) => {
                let node = doc.create_text(text);
                doc.append_child(current, node)?;
            }
            Token::Comment(text) => {
                let node = doc.create_comment(text);
                doc.append_child(current, node)?;
            }
            Token::Doctype(name) => {
                if current == doc.root() {
                    let node = doc.create_doctype(name);
                    doc.append_child(current, node)?;
                }
            }
            Token::Start {
                name,
                attrs,
                self_closing,
            } => {
                let node = doc.create_element_with_attrs(&name, attrs);
                doc.append_child(current, node)?;

                if !self_closing && !is_void(&name) {
                    let insert_into = doc.template_content(node).unwrap_or(node);
                    stack.push(OpenElement {
                        tag: name,
                        insert_into,
                    });
                }
            }
            Token::End { name } => {
                let Some(position) = stack
                    .iter()
                    .skip(1)
                    .rposition(|open| open.tag == name)
                    .map(|index| index + 1)
                else {
                    continue;
                };
                stack.truncate(position);
            }
        }
    }

    Ok(())
}

/// Gives a parsed document the `html > (head, body)` shape.
pub(crate) fn normalize_document(doc: &mut Document) -> LayoutResult<()> {
    let root = doc.root();

    let html = match doc.document_element() {
        Some(html) => html,
        None => {
            let html = doc.create_element("html");
            let top_level: Vec<NodeId> = doc.children(root).to_vec();
            for child in top_level {
                if !matches!(doc.kind(child), Some(NodeKind::Doctype(_))) {
                    doc.append_child(html, child)?;
                }
            }
            doc.append_child(root, html)?;
            html
        }
    };

    if doc.head().is_none() {
        let head = doc.create_element("head");
        let first = doc.first_child(html);
        doc.insert_before(html, head, first)?;

        if doc.body().is_none() {
            for child in doc.children(html).to_vec() {
                if child == head {
                    continue;
                }
                if is_whitespace_text(doc, child) {
                    doc.remove(child)?;
                    continue;
                }
                let belongs_in_head = doc
                    .tag_name(child)
                    .is_some_and(is_head_content);
                if !belongs_in_head {
                    break;
                }
                doc.append_child(head, child)?;
            }
        }
    }

    let head = doc.head();
    let body = match doc.body() {
        Some(body) => body,
        None => {
            let body = doc.create_element("body");
            let mut started = false;
            for child in doc.children(html).to_vec() {
                if Some(child) == head {
                    continue;
                }
                if !started && is_whitespace_text(doc, child) {
                    doc.remove(child)?;
                    continue;
                }
                started = true;
                doc.append_child(body, child)?;
            }
            doc.append_child(html, body)?;
            body
        }
    };

    // Whitespace ahead of the body is dropped. Everything else around
    // `head`/`body`, including the newline after `</body>`, ends up in the
    // body in order.
    let mut after_body = false;
    for child in doc.children(html).to_vec() {
        if child == body {
            after_body = true;
            continue;
        }
        if Some(child) == head {
            continue;
        }
        if !after_body && is_whitespace_text(doc, child) {
            doc.remove(child)?;
            continue;
        }
        doc.append_child(body, child)?;
    }

    let mut after_html = false;
    for child in doc.children(root).to_vec() {
        if child == html {
            after_html = true;
            continue;
        }
        if matches!(doc.kind(child), Some(NodeKind::Doctype(_))) {
            continue;
        }
        if is_whitespace_text(doc, child) {
            if after_html {
                doc.append_child(body, child)?;
            } else {
                doc.remove(child)?;
            }
        } else if !matches!(doc.kind(child), Some(NodeKind::Comment(_))) {
            doc.append_child(body, child)?;
        }
    }

    Ok(())
}

fn is_whitespace_text(doc: &Document, id: NodeId) -> bool {
    matches!(doc.kind(id), Some(NodeKind::Text(text)) if text.trim().is_empty())
}
