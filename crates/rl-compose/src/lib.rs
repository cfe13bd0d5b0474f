//! Slot-based layout composition.
//!
//! [`compose`] takes a document whose body holds ordinary content and
//! `<template>` elements, parses a layout containing `<slot>` placeholders,
//! and rebuilds the body from the layout: a named slot receives the content
//! of the template whose `id` matches its `name`, an unnamed slot receives
//! the original body content.

mod pool;
mod source;

pub use pool::BodyPartition;
pub use pool::TemplateEntry;
pub use pool::TemplatePool;
pub use pool::partition_body;
pub use source::LayoutSource;

use rl_core::LayoutError;
use rl_core::LayoutResult;
use rl_dom::Document;
use rl_dom::Event;
use rl_dom::NodeId;
use rl_html::HtmlParser;

/// Bubbling, payload-less event dispatched on the body once composition is done.
pub const RENDERED_EVENT: &str = "renderLayoutRendered";

/// What a composition consumed and filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositionReport {
    pub templates: usize,
    pub body_nodes: usize,
    pub named_slots_filled: usize,
    pub named_slots_unmatched: usize,
    pub unnamed_slots: usize,
    /// Unnamed slots after the first; they find the body content already moved.
    pub unnamed_slots_starved: usize,
}

/// True once the body exists and holds more than one child node.
///
/// A body whose first child is also its last one is treated as "the parser
/// has not got far yet".
pub fn is_ready(doc: &Document) -> bool {
    doc.body()
        .is_some_and(|body| doc.first_child(body) != doc.last_child(body))
}

/// Rebuilds the body of `doc` from `source`.
///
/// The body is emptied destructively, so a second call does not see the
/// original content again.
pub fn compose(doc: &mut Document, source: LayoutSource) -> LayoutResult<CompositionReport> {
    let body = doc.body().ok_or_else(|| {
        LayoutError::new(
            "compose.body_missing",
            "document has no body to compose into",
        )
    })?;

    let markup = source.resolve();
    let partition = partition_body(doc, body)?;
    let layout = HtmlParser.parse_fragment(doc, body, &markup)?;

    let mut report = CompositionReport {
        templates: partition.templates.len(),
        body_nodes: partition.content_len,
        ..CompositionReport::default()
    };

    for slot in doc.elements_by_tag(layout, "slot") {
        let name = doc.attribute(slot, "name").unwrap_or_default().to_owned();
        if name.is_empty() {
            fill_unnamed_slot(doc, slot, partition.content, &mut report)?;
        } else {
            fill_named_slot(doc, slot, &name, &partition.templates, &mut report)?;
        }
    }

    doc.append_child(body, layout)?;

    let mut event = Event::bubbling(RENDERED_EVENT);
    doc.dispatch_event(body, &mut event)?;

    tracing::debug!(
        templates = report.templates,
        body_nodes = report.body_nodes,
        named_filled = report.named_slots_filled,
        named_unmatched = report.named_slots_unmatched,
        unnamed = report.unnamed_slots,
        "layout composed"
    );
    Ok(report)
}

fn fill_named_slot(
    doc: &mut Document,
    slot: NodeId,
    name: &str,
    templates: &TemplatePool,
    report: &mut CompositionReport,
) -> LayoutResult<()> {
    match templates.find(name) {
        Some(content) => {
            report.named_slots_filled += 1;
            doc.replace_with(slot, &[content])
        }
        None => {
            report.named_slots_unmatched += 1;
            tracing::debug!(slot = name, "no template for named slot");
            doc.replace_with(slot, &[])
        }
    }
}

fn fill_unnamed_slot(
    doc: &mut Document,
    slot: NodeId,
    content: NodeId,
    report: &mut CompositionReport,
) -> LayoutResult<()> {
    report.unnamed_slots += 1;
    if report.unnamed_slots > 1 {
        report.unnamed_slots_starved += 1;
        tracing::warn!(
            position = report.unnamed_slots,
            "unnamed slot receives nothing; body content already went to the first unnamed slot"
        );
    }
    doc.replace_with(slot, &[content])
}
