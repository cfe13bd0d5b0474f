//! DOM tree data structures.
//!
//! Nodes live in an arena owned by [`Document`] and are addressed by
//! [`NodeId`]. Detached nodes (removed children, fragments, template
//! contents) stay in the arena and can be re-inserted; insertion always
//! moves, never clones.

mod event;

pub use event::Event;
pub use event::ListenerId;
pub use event::ListenerOptions;
pub use event::READY_STATE_CHANGE_EVENT;

use event::ListenerRegistry;
use rl_core::LayoutError;
use rl_core::LayoutResult;

/// ID used to address nodes in the DOM arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Tag name plus attributes in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl ElementData {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    DocumentFragment,
    Doctype(String),
    Element(ElementData),
    Text(String),
    Comment(String),
}

impl NodeKind {
    fn accepts_children(&self) -> bool {
        matches!(
            self,
            Self::Document | Self::DocumentFragment | Self::Element(_)
        )
    }
}

/// Document loading progress, ordered from earliest to latest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Interactive => "interactive",
            Self::Complete => "complete",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "loading" => Some(Self::Loading),
            "interactive" => Some(Self::Interactive),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    template_content: Option<NodeId>,
}

/// Arena-backed HTML document.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
    root: NodeId,
    ready_state: ReadyState,
    listeners: ListenerRegistry,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
                template_content: None,
            }],
            root: NodeId(0),
            ready_state: ReadyState::Loading,
            listeners: ListenerRegistry::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes ever allocated, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0).map(|node| &node.kind)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.kind(id) {
            Some(NodeKind::Element(data)) => Some(data),
            _ => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|data| data.tag.as_str())
    }

    pub fn is_element_named(&self, id: NodeId, tag: &str) -> bool {
        self.tag_name(id)
            .is_some_and(|name| name.eq_ignore_ascii_case(tag))
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|data| data.attr(name))
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> LayoutResult<()> {
        let node = self.node_mut(id)?;
        let NodeKind::Element(data) = &mut node.kind else {
            return Err(LayoutError::new(
                "dom.not_an_element",
                format!("node {} cannot carry attributes", id.0),
            ));
        };

        let name = name.to_ascii_lowercase();
        match data.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value.to_owned(),
            None => data.attrs.push((name, value.to_owned())),
        }
        Ok(())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.create_element_with_attrs(tag, Vec::new())
    }

    /// Creates a detached element. A `template` element also gets its own
    /// detached content fragment.
    pub fn create_element_with_attrs(&mut self, tag: &str, attrs: Vec<(String, String)>) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let template_content = if tag == "template" {
            Some(self.create_fragment())
        } else {
            None
        };

        let id = self.push(NodeKind::Element(ElementData { tag, attrs }));
        self.nodes[id.0].template_content = template_content;
        id
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Comment(text.into()))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.push(NodeKind::DocumentFragment)
    }

    pub fn create_doctype(&mut self, name: impl Into<String>) -> NodeId {
        self.push(NodeKind::Doctype(name.into()))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            template_content: None,
        });
        id
    }

    /// The root `html` element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root)
            .iter()
            .copied()
            .find(|child| self.is_element_named(*child, "html"))
    }

    /// The first `body` child of the document element.
    pub fn body(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.children(html)
            .iter()
            .copied()
            .find(|child| self.is_element_named(*child, "body"))
    }

    pub fn head(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.children(html)
            .iter()
            .copied()
            .find(|child| self.is_element_named(*child, "head"))
    }

    /// Content fragment of a template-capable node.
    ///
    /// The check is structural: any element named `template` that owns a
    /// content fragment qualifies, regardless of how it was created.
    pub fn template_content(&self, id: NodeId) -> Option<NodeId> {
        let node = self.nodes.get(id.0)?;
        match &node.kind {
            NodeKind::Element(data) if data.tag == "template" => node.template_content,
            _ => None,
        }
    }

    pub fn is_template(&self, id: NodeId) -> bool {
        self.template_content(id).is_some()
    }

    /// Descendants of `scope` in tree order, excluding `scope` itself.
    /// Template contents are separate trees and are never entered.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }

        out
    }

    /// Static snapshot of every descendant element named `tag`.
    pub fn elements_by_tag(&self, scope: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|id| self.is_element_named(*id, tag))
            .collect()
    }

    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(NodeKind::Text(text)) = self.kind(id) {
            return text.clone();
        }

        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(NodeKind::Text(text)) = self.kind(node) {
                out.push_str(text);
            }
        }
        out
    }

    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> LayoutResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Inserts `child` under `parent` before `reference` (or last).
    ///
    /// A fragment contributes its children, in order, and is left empty.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> LayoutResult<()> {
        self.ensure_insertable(parent, child)?;

        if let Some(reference) = reference
            && self.parent(reference) != Some(parent)
        {
            return Err(LayoutError::new(
                "dom.reference_not_child",
                format!(
                    "reference node {} is not a child of node {}",
                    reference.0, parent.0
                ),
            ));
        }

        let moving = if matches!(self.node(child)?.kind, NodeKind::DocumentFragment) {
            let taken = std::mem::take(&mut self.nodes[child.0].children);
            for moved in &taken {
                self.nodes[moved.0].parent = None;
            }
            taken
        } else {
            vec![child]
        };

        // Inserting a node before itself keeps its position.
        let reference = match reference {
            Some(reference) if moving.contains(&reference) => self.next_sibling(reference),
            other => other,
        };

        for node in &moving {
            self.detach(*node);
        }

        let mut index = match reference {
            Some(reference) => self.child_index(parent, reference)?,
            None => self.nodes[parent.0].children.len(),
        };

        for node in moving {
            self.nodes[node.0].parent = Some(parent);
            self.nodes[parent.0].children.insert(index, node);
            index += 1;
        }

        Ok(())
    }

    /// Detaches `id` from its parent. Parentless nodes are left as they are.
    pub fn remove(&mut self, id: NodeId) -> LayoutResult<()> {
        self.node(id)?;
        self.detach(id);
        Ok(())
    }

    /// Replaces `node` with `replacement`, in order. Fragments contribute
    /// their children. A parentless `node` is left untouched.
    pub fn replace_with(&mut self, node: NodeId, replacement: &[NodeId]) -> LayoutResult<()> {
        self.node(node)?;
        let Some(parent) = self.parent(node) else {
            return Ok(());
        };

        for item in replacement {
            if *item == node {
                continue;
            }
            self.insert_before(parent, *item, Some(node))?;
        }

        if !replacement.contains(&node) {
            self.detach(node);
        }
        Ok(())
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// Advances the ready state and fires `readystatechange` at the document.
    /// Returns false when the state was already current.
    pub fn set_ready_state(&mut self, state: ReadyState) -> LayoutResult<bool> {
        if state < self.ready_state {
            return Err(LayoutError::new(
                "dom.ready_state_regression",
                format!(
                    "ready state cannot move from `{}` back to `{}`",
                    self.ready_state.as_str(),
                    state.as_str()
                ),
            ));
        }

        if state == self.ready_state {
            return Ok(false);
        }

        self.ready_state = state;
        let mut event = Event::new(READY_STATE_CHANGE_EVENT);
        self.dispatch_event(self.root, &mut event)?;
        Ok(true)
    }

    pub fn add_event_listener<F>(
        &mut self,
        target: NodeId,
        event_type: &str,
        options: ListenerOptions,
        callback: F,
    ) -> ListenerId
    where
        F: FnMut(&Event) + 'static,
    {
        self.listeners
            .add(target, event_type, options, Box::new(callback))
    }

    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self, target: NodeId, event_type: &str) -> usize {
        self.listeners.count(target, event_type)
    }

    /// Runs listeners on `target`, then on each ancestor when the event bubbles.
    pub fn dispatch_event(&mut self, target: NodeId, event: &mut Event) -> LayoutResult<()> {
        self.node(target)?;
        event.begin_dispatch(target);

        let mut path = vec![target];
        if event.bubbles() {
            let mut cursor = self.parent(target);
            while let Some(ancestor) = cursor {
                path.push(ancestor);
                cursor = self.parent(ancestor);
            }
        }

        for node in path {
            event.set_current_target(Some(node));
            self.listeners.invoke(node, event);
            if event.propagation_stopped() {
                break;
            }
        }

        event.set_current_target(None);
        Ok(())
    }

    fn node(&self, id: NodeId) -> LayoutResult<&NodeData> {
        self.nodes.get(id.0).ok_or_else(|| missing_node(id))
    }

    fn node_mut(&mut self, id: NodeId) -> LayoutResult<&mut NodeData> {
        self.nodes.get_mut(id.0).ok_or_else(|| missing_node(id))
    }

    fn ensure_insertable(&self, parent: NodeId, child: NodeId) -> LayoutResult<()> {
        if !self.node(parent)?.kind.accepts_children() {
            return Err(LayoutError::new(
                "dom.hierarchy_request",
                format!("node {} cannot have children", parent.0),
            ));
        }

        if matches!(self.node(child)?.kind, NodeKind::Document) {
            return Err(LayoutError::new(
                "dom.hierarchy_request",
                "the document node cannot be inserted",
            ));
        }

        if self.is_inclusive_ancestor(child, parent) {
            return Err(LayoutError::new(
                "dom.hierarchy_request",
                format!(
                    "node {} is an inclusive ancestor of node {}",
                    child.0, parent.0
                ),
            ));
        }

        Ok(())
    }

    fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|sibling| *sibling == id)?;
        siblings.get(index + 1).copied()
    }

    fn child_index(&self, parent: NodeId, child: NodeId) -> LayoutResult<usize> {
        self.children(parent)
            .iter()
            .position(|candidate| *candidate == child)
            .ok_or_else(|| {
                LayoutError::new(
                    "dom.reference_not_child",
                    format!("node {} is not a child of node {}", child.0, parent.0),
                )
            })
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get(id.0).and_then(|node| node.parent) else {
            return;
        };

        self.nodes[parent.0].children.retain(|child| *child != id);
        self.nodes[id.0].parent = None;
    }
}

fn missing_node(id: NodeId) -> LayoutError {
    LayoutError::new(
        "dom.node_missing",
        format!("node {} does not exist in this document", id.0),
    )
}

#[cfg(test)]
mod tests {
    use super::Document;
    use super::Event;
    use super::ListenerOptions;
    use super::NodeKind;
    use super::READY_STATE_CHANGE_EVENT;
    use super::ReadyState;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn skeleton() -> (Document, super::NodeId) {
        let mut doc = Document::new();
        let html = doc.create_element("html");
        let body = doc.create_element("body");
        let root = doc.root();
        assert!(doc.append_child(root, html).is_ok());
        assert!(doc.append_child(html, body).is_ok());
        (doc, body)
    }

    #[test]
    fn body_is_found_under_document_element() {
        let (doc, body) = skeleton();
        assert_eq!(doc.body(), Some(body));
        assert_eq!(doc.tag_name(body), Some("body"));
    }

    #[test]
    fn appending_fragment_moves_children_in_order() {
        let (mut doc, body) = skeleton();
        let fragment = doc.create_fragment();
        let a = doc.create_text("a");
        let b = doc.create_element("b");
        assert!(doc.append_child(fragment, a).is_ok());
        assert!(doc.append_child(fragment, b).is_ok());

        assert!(doc.append_child(body, fragment).is_ok());
        assert_eq!(doc.children(body), &[a, b]);
        assert!(doc.children(fragment).is_empty());
        assert_eq!(doc.parent(a), Some(body));
    }

    #[test]
    fn insertion_moves_node_from_previous_parent() {
        let (mut doc, body) = skeleton();
        let div = doc.create_element("div");
        let span = doc.create_element("span");
        assert!(doc.append_child(body, div).is_ok());
        assert!(doc.append_child(body, span).is_ok());
        assert!(doc.append_child(div, span).is_ok());

        assert_eq!(doc.children(body), &[div]);
        assert_eq!(doc.children(div), &[span]);
    }

    #[test]
    fn rejects_inserting_ancestor_into_descendant() {
        let (mut doc, body) = skeleton();
        let div = doc.create_element("div");
        assert!(doc.append_child(body, div).is_ok());

        let inserted = doc.append_child(div, body);
        assert!(inserted.is_err());
        if let Err(error) = inserted {
            assert_eq!(error.code, "dom.hierarchy_request");
        }
    }

    #[test]
    fn replace_with_splices_replacement_at_slot_position() {
        let (mut doc, body) = skeleton();
        let before = doc.create_text("before");
        let slot = doc.create_element("slot");
        let after = doc.create_text("after");
        for node in [before, slot, after] {
            assert!(doc.append_child(body, node).is_ok());
        }

        let x = doc.create_element("x");
        let y = doc.create_element("y");
        assert!(doc.replace_with(slot, &[x, y]).is_ok());
        assert_eq!(doc.children(body), &[before, x, y, after]);
        assert_eq!(doc.parent(slot), None);
    }

    #[test]
    fn replace_with_nothing_removes_node() {
        let (mut doc, body) = skeleton();
        let slot = doc.create_element("slot");
        assert!(doc.append_child(body, slot).is_ok());
        assert!(doc.replace_with(slot, &[]).is_ok());
        assert!(doc.children(body).is_empty());
    }

    #[test]
    fn template_owns_detached_content_fragment() {
        let mut doc = Document::new();
        let template = doc.create_element("TEMPLATE");
        let content = doc.template_content(template);
        assert!(content.is_some());
        let content = content.unwrap_or_else(|| unreachable!());
        assert_eq!(doc.kind(content), Some(&NodeKind::DocumentFragment));
        assert_eq!(doc.parent(content), None);

        let div = doc.create_element("div");
        assert!(!doc.is_template(div));
    }

    #[test]
    fn elements_by_tag_skips_template_contents() {
        let (mut doc, body) = skeleton();
        let template = doc.create_element("template");
        let content = doc.template_content(template).unwrap_or_else(|| unreachable!());
        let hidden = doc.create_element("slot");
        let visible = doc.create_element("slot");
        assert!(doc.append_child(content, hidden).is_ok());
        assert!(doc.append_child(body, template).is_ok());
        assert!(doc.append_child(body, visible).is_ok());

        assert_eq!(doc.elements_by_tag(body, "slot"), vec![visible]);
    }

    #[test]
    fn bubbling_event_reaches_ancestors_and_once_listener_runs_once() {
        let (mut doc, body) = skeleton();
        let root = doc.root();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&seen);
        doc.add_event_listener(root, "ping", ListenerOptions::default(), move |event| {
            log.borrow_mut()
                .push(format!("root:{:?}", event.current_target()));
        });
        let log = Rc::clone(&seen);
        doc.add_event_listener(body, "ping", ListenerOptions::once(), move |_| {
            log.borrow_mut().push("body".to_owned());
        });

        let mut event = Event::bubbling("ping");
        assert!(doc.dispatch_event(body, &mut event).is_ok());
        let mut event = Event::bubbling("ping");
        assert!(doc.dispatch_event(body, &mut event).is_ok());

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], "body");
        assert_eq!(seen[1], format!("root:{:?}", Some(root)));
        assert_eq!(doc.listener_count(body, "ping"), 0);
    }

    #[test]
    fn non_bubbling_event_stays_on_target() {
        let (mut doc, body) = skeleton();
        let root = doc.root();
        let hits = Rc::new(RefCell::new(0_u32));
        let counter = Rc::clone(&hits);
        doc.add_event_listener(root, "quiet", ListenerOptions::default(), move |_| {
            *counter.borrow_mut() += 1;
        });

        let mut event = Event::new("quiet");
        assert!(doc.dispatch_event(body, &mut event).is_ok());
        assert_eq!(*hits.borrow(), 0);
        assert_eq!(event.target(), Some(body));
    }

    #[test]
    fn removed_listener_is_not_invoked() {
        let (mut doc, body) = skeleton();
        let hits = Rc::new(RefCell::new(0_u32));
        let counter = Rc::clone(&hits);
        let id = doc.add_event_listener(body, "x", ListenerOptions::default(), move |_| {
            *counter.borrow_mut() += 1;
        });

        assert!(doc.remove_event_listener(id));
        assert!(!doc.remove_event_listener(id));
        let mut event = Event::new("x");
        assert!(doc.dispatch_event(body, &mut event).is_ok());
        assert_eq!(*hits.borrow(), 0);
    }

    #[test]
    fn ready_state_changes_fire_event_and_refuse_regression() {
        let mut doc = Document::new();
        let root = doc.root();
        let states = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&states);
        doc.add_event_listener(
            root,
            READY_STATE_CHANGE_EVENT,
            ListenerOptions::default(),
            move |event| log.borrow_mut().push(event.event_type().to_owned()),
        );

        assert_eq!(doc.set_ready_state(ReadyState::Interactive), Ok(true));
        assert_eq!(doc.set_ready_state(ReadyState::Interactive), Ok(false));
        assert_eq!(doc.set_ready_state(ReadyState::Complete), Ok(true));
        assert_eq!(states.borrow().len(), 2);

        let regressed = doc.set_ready_state(ReadyState::Loading);
        assert!(regressed.is_err());
        if let Err(error) = regressed {
            assert_eq!(error.code, "dom.ready_state_regression");
        }
    }

    #[test]
    fn set_attribute_overwrites_existing_value() {
        let mut doc = Document::new();
        let slot = doc.create_element("slot");
        assert!(doc.set_attribute(slot, "NAME", "header").is_ok());
        assert!(doc.set_attribute(slot, "name", "footer").is_ok());
        assert_eq!(doc.attribute(slot, "name"), Some("footer"));

        let text = doc.create_text("t");
        assert!(doc.set_attribute(text, "name", "x").is_err());
    }
}
