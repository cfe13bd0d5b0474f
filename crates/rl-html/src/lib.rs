//! HTML tokenization, tree construction, and serialization.
//!
//! The parser is deliberately forgiving and small: it understands tags,
//! attributes, comments, doctypes, character references, raw-text elements,
//! void elements, and `template` contents. It does not implement the HTML
//! insertion modes (no implied end tags, no foster parenting), which is also
//! what lets a fragment parse accept `tr` or `td` at the top level.

mod serialize;
mod tokenizer;
mod tree;

pub use serialize::serialize_children;
pub use serialize::serialize_document;
pub use serialize::serialize_node;

use rl_core::LayoutError;
use rl_core::LayoutResult;
use rl_dom::Document;
use rl_dom::NodeId;
use tokenizer::TextMode;
use tokenizer::decode_entities;
use tokenizer::text_mode;
use tokenizer::tokenize;

/// Parses raw HTML into DOM nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlParser;

impl HtmlParser {
    /// Parses a full page into a document shaped as `html > (head, body)`.
    pub fn parse_document(&self, input: &str) -> LayoutResult<Document> {
        let mut doc = Document::new();
        let root = doc.root();
        tree::build_into(&mut doc, root, tokenize(input))?;
        tree::normalize_document(&mut doc)?;
        Ok(doc)
    }

    /// Parses `markup` into a new detached fragment owned by `doc`, as if it
    /// were inserted inside `context`.
    pub fn parse_fragment(
        &self,
        doc: &mut Document,
        context: NodeId,
        markup: &str,
    ) -> LayoutResult<NodeId> {
        if !doc.contains(context) {
            return Err(LayoutError::new(
                "html.context_missing",
                format!("fragment context node {} does not exist", context.index()),
            ));
        }

        let fragment = doc.create_fragment();
        let mode = doc.tag_name(context).map(text_mode).unwrap_or(TextMode::Markup);
        match mode {
            TextMode::Markup => tree::build_into(doc, fragment, tokenize(markup))?,
            TextMode::Raw | TextMode::EscapableRaw => {
                if !markup.is_empty() {
                    let text = if mode == TextMode::Raw {
                        markup.to_owned()
                    } else {
                        decode_entities(markup)
                    };
                    let node = doc.create_text(text);
                    doc.append_child(fragment, node)?;
                }
            }
        }

        Ok(fragment)
    }
}
