//! Destructive partition of the body into templates and content.

use rl_core::LayoutResult;
use rl_dom::Document;
use rl_dom::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    /// The template's `id` attribute; empty when absent.
    pub id: String,
    pub content: NodeId,
}

/// Templates in document order. Duplicate ids are kept; lookup is
/// first-match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplatePool {
    entries: Vec<TemplateEntry>,
}

impl TemplatePool {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TemplateEntry] {
        &self.entries
    }

    /// Content fragment of the first template whose id equals `name`.
    /// An empty name never matches.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        if name.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|entry| entry.id == name)
            .map(|entry| entry.content)
    }
}

/// Everything that was in the body before composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPartition {
    pub templates: TemplatePool,
    /// Detached fragment holding the non-template children, in order.
    pub content: NodeId,
    pub content_len: usize,
}

/// Empties `body` in one pass, front to back. Each child is detached before
/// the next one is looked at.
pub fn partition_body(doc: &mut Document, body: NodeId) -> LayoutResult<BodyPartition> {
    let content = doc.create_fragment();
    let mut templates = TemplatePool::default();
    let mut content_len = 0_usize;

    while let Some(child) = doc.first_child(body) {
        match doc.template_content(child) {
            Some(fragment) => {
                let id = doc.attribute(child, "id").unwrap_or_default().to_owned();
                templates.entries.push(TemplateEntry {
                    id,
                    content: fragment,
                });
                doc.remove(child)?;
            }
            None => {
                doc.append_child(content, child)?;
                content_len += 1;
            }
        }
    }

    Ok(BodyPartition {
        templates,
        content,
        content_len,
    })
}

#[cfg(test)]
mod tests {
    use super::partition_body;
    use rl_dom::Document;
    use rl_html::HtmlParser;

    #[test]
    fn splits_templates_from_content_in_order() {
        let doc = HtmlParser.parse_document(
            "<body>a<template id=\"x\">X</template><p>b</p><template>anon</template>c</body>",
        );
        let mut doc = match doc {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let body = doc.body().unwrap_or_else(|| unreachable!());

        let partition = partition_body(&mut doc, body);
        let partition = match partition {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };

        assert!(doc.children(body).is_empty());
        assert_eq!(partition.content_len, 3);
        assert_eq!(doc.children(partition.content).len(), 3);
        assert_eq!(partition.templates.len(), 2);
        assert_eq!(partition.templates.entries()[0].id, "x");
        assert_eq!(partition.templates.entries()[1].id, "");
        assert!(partition.templates.find("").is_none());
        assert_eq!(
            partition.templates.find("x"),
            Some(partition.templates.entries()[0].content)
        );
    }

    #[test]
    fn duplicate_ids_resolve_to_first_template() {
        let mut doc = Document::new();
        let html = doc.create_element("html");
        let body = doc.create_element("body");
        let root = doc.root();
        assert!(doc.append_child(root, html).is_ok());
        assert!(doc.append_child(html, body).is_ok());

        let first = doc.create_element_with_attrs("template", vec![("id".into(), "dup".into())]);
        let second = doc.create_element_with_attrs("template", vec![("id".into(), "dup".into())]);
        assert!(doc.append_child(body, first).is_ok());
        assert!(doc.append_child(body, second).is_ok());

        let partition = match partition_body(&mut doc, body) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(partition.templates.find("dup"), doc.template_content(first));
    }

    #[test]
    fn non_template_elements_join_the_content_set() {
        let mut doc = Document::new();
        let html = doc.create_element("html");
        let body = doc.create_element("body");
        let root = doc.root();
        assert!(doc.append_child(root, html).is_ok());
        assert!(doc.append_child(html, body).is_ok());
        let div = doc.create_element("div");
        assert!(doc.append_child(body, div).is_ok());

        let partition = match partition_body(&mut doc, body) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(partition.templates.is_empty());
        assert_eq!(doc.children(partition.content), &[div]);
    }
}
