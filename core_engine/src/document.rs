//! Arena-backed text tree standing in for the rendered page.
//!
//! Node ids come from a monotonic counter and are never reused, so side
//! tables keyed by [`NodeId`] cannot alias a different node after a
//! replacement. Subtrees dropped by [`Document::replace`] or
//! [`Document::remove`] are freed; their ids simply stop resolving.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Host-supplied description of a subtree. A bare JSON string is a text node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum NodeSpec {
    Text(String),
    Element(ElementSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementSpec {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn text(text: impl Into<String>) -> Self {
        NodeSpec::Text(text.into())
    }

    pub fn element(tag: impl Into<String>, children: Vec<NodeSpec>) -> Self {
        NodeSpec::Element(ElementSpec {
            tag: tag.into(),
            id: None,
            classes: Vec::new(),
            children,
        })
    }
}

/// A child insertion under `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: HashMap<NodeId, Node>,
    next_id: usize,
    root: NodeId,
    lang: Option<String>,
    mutations: Vec<MutationRecord>,
}

impl Document {
    pub fn new() -> Self {
        let mut document = Self {
            nodes: HashMap::new(),
            next_id: 0,
            root: NodeId(0),
            lang: None,
            mutations: Vec::new(),
        };
        document.root = document.create_element("body");
        document
    }

    /// Builds a document from a host snapshot. A `body` element becomes the
    /// root itself; anything else is placed under a fresh `body`.
    pub fn from_spec(spec: &NodeSpec, lang: Option<String>) -> Self {
        let mut document = Self::new();
        document.lang = lang;
        match spec {
            NodeSpec::Element(element) if element.tag.eq_ignore_ascii_case("body") => {
                let root = document.root;
                if let Some(NodeKind::Element(body)) =
                    document.nodes.get_mut(&root).map(|node| &mut node.kind)
                {
                    body.id = element.id.clone();
                    body.classes = element.classes.clone();
                }
                for child in &element.children {
                    let child = document.build(child);
                    document.attach(root, child);
                }
            }
            other => {
                let child = document.build(other);
                document.attach(document.root, child);
            }
        }
        document
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Number of live nodes, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.node(id)?.kind {
            NodeKind::Element(element) => Some(element),
            NodeKind::Text(_) => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element(_) => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id)
            .is_some_and(|element| element.classes.iter().any(|c| c == class))
    }

    /// The node itself followed by each of its ancestors up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).map(|_| id), move |current| self.parent(*current))
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.ancestors(id).any(|ancestor| ancestor == self.root)
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.node(id).map(|node| &node.kind) {
            Some(NodeKind::Text(text)) => out.push_str(text),
            Some(NodeKind::Element(_)) => {
                for child in self.children(id) {
                    self.collect_text(*child, out);
                }
            }
            None => {}
        }
    }

    pub fn find_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.descendants(self.root).into_iter().find(|id| {
            self.element(*id)
                .is_some_and(|element| element.id.as_deref() == Some(element_id))
        })
    }

    pub fn find_by_class(&self, class: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.has_class(*id, class))
            .collect()
    }

    /// Pre-order list of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.node(current).is_none() {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element(Element {
            tag: tag.to_ascii_lowercase(),
            id: None,
            classes: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    pub fn set_element_id(&mut self, id: NodeId, element_id: &str) {
        if let Some(NodeKind::Element(element)) = self.nodes.get_mut(&id).map(|node| &mut node.kind) {
            element.id = Some(element_id.to_string());
        }
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if let Some(NodeKind::Element(element)) = self.nodes.get_mut(&id).map(|node| &mut node.kind) {
            if !element.classes.iter().any(|c| c == class) {
                element.classes.push(class.to_string());
            }
        }
    }

    /// Materializes a detached subtree from a host description.
    pub fn build(&mut self, spec: &NodeSpec) -> NodeId {
        match spec {
            NodeSpec::Text(text) => self.create_text(text),
            NodeSpec::Element(element) => {
                let id = self.create_element(&element.tag);
                if let Some(element_id) = &element.id {
                    self.set_element_id(id, element_id);
                }
                for class in &element.classes {
                    self.add_class(id, class);
                }
                for child in &element.children {
                    let child = self.build(child);
                    self.attach(id, child);
                }
                id
            }
        }
    }

    /// Appends `child` to `parent`, logging the insertion when it lands in the
    /// live tree. Returns false when `parent` is not an element or the
    /// insertion would create a cycle.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.element(parent).is_none()
            || self.node(child).is_none()
            || self.ancestors(parent).any(|ancestor| ancestor == child)
        {
            return false;
        }
        self.detach(child);
        self.attach(parent, child);
        if self.is_attached(parent) {
            self.mutations.push(MutationRecord {
                target: parent,
                added: vec![child],
            });
        }
        true
    }

    /// Puts `replacement` where `old` was and frees the subtree under `old`.
    /// Returns false when `old` is already detached.
    pub fn replace(&mut self, old: NodeId, replacement: NodeId) -> bool {
        if old == replacement || self.node(replacement).is_none() {
            return false;
        }
        let Some(parent) = self.parent(old) else {
            return false;
        };
        self.detach(replacement);
        let Some(position) = self.children(parent).iter().position(|c| *c == old) else {
            return false;
        };
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children[position] = replacement;
        }
        if let Some(node) = self.nodes.get_mut(&replacement) {
            node.parent = Some(parent);
        }
        self.free(old);
        self.mutations.push(MutationRecord {
            target: parent,
            added: vec![replacement],
        });
        true
    }

    /// Detaches and frees `id` with everything below it. The root stays.
    pub fn remove(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        self.detach(id);
        self.free(id);
    }

    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    /// HTML-like serialization used for snapshots.
    pub fn markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: NodeId, out: &mut String) {
        match self.node(id).map(|node| &node.kind) {
            Some(NodeKind::Text(text)) => out.push_str(&escape(text)),
            Some(NodeKind::Element(element)) => {
                let _ = write!(out, "<{}", element.tag);
                if let Some(element_id) = &element.id {
                    let _ = write!(out, " id=\"{}\"", escape(element_id));
                }
                if !element.classes.is_empty() {
                    let _ = write!(out, " class=\"{}\"", escape(&element.classes.join(" ")));
                }
                out.push('>');
                for child in self.children(id) {
                    self.write_markup(*child, out);
                }
                let _ = write!(out, "</{}>", element.tag);
            }
            None => {}
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                kind,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|c| *c != id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = None;
        }
    }

    /// Drops a detached subtree.
    fn free(&mut self, id: NodeId) {
        for node in self.descendants(id) {
            self.nodes.remove(&node);
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let spec: NodeSpec = serde_json::from_str(
            r#"{"tag":"body","children":[{"tag":"p","id":"intro","children":["Hello <World>"]},"tail"]}"#,
        )
        .unwrap();
        Document::from_spec(&spec, Some("en".to_string()))
    }

    #[test]
    fn builds_from_spec_and_renders() {
        let document = sample();
        assert_eq!(document.lang(), Some("en"));
        assert_eq!(
            document.markup(document.root()),
            r#"<body><p id="intro">Hello &lt;World&gt;</p>tail</body>"#
        );
        assert_eq!(document.text_content(document.root()), "Hello <World>tail");
    }

    #[test]
    fn append_logs_mutation_and_rejects_cycles() {
        let mut document = sample();
        let intro = document.find_by_id("intro").unwrap();
        let extra = document.build(&NodeSpec::element("em", vec![NodeSpec::text("x")]));
        assert!(document.append_child(intro, extra));
        assert!(!document.append_child(extra, intro));
        assert_eq!(
            document.take_mutations(),
            vec![MutationRecord {
                target: intro,
                added: vec![extra]
            }]
        );
        assert!(document.take_mutations().is_empty());
    }

    #[test]
    fn replace_swaps_in_place() {
        let mut document = sample();
        let intro = document.find_by_id("intro").unwrap();
        let text = document.children(intro)[0];
        let span = document.create_element("span");
        assert!(document.replace(text, span));
        assert_eq!(document.children(intro), &[span]);
        assert!(!document.is_attached(text));
        assert!(document.is_attached(span));
        assert!(!document.replace(text, span));
        assert!(document.node(text).is_none());
    }

    #[test]
    fn replaced_and_removed_subtrees_are_freed() {
        let mut document = sample();
        let live = document.len();
        let intro = document.find_by_id("intro").unwrap();
        for _ in 0..1000 {
            let text = document.children(intro)[0];
            let wrapper = document.build(&NodeSpec::element("span", vec![NodeSpec::text("Hello")]));
            assert!(document.replace(text, wrapper));
            let plain = document.create_text("Hello <World>");
            assert!(document.replace(wrapper, plain));
        }
        assert_eq!(document.len(), live);

        document.remove(intro);
        assert_eq!(document.len(), live - 2);
        assert!(document.find_by_id("intro").is_none());
        document.remove(document.root());
        assert!(document.node(document.root()).is_some());
    }

    #[test]
    fn non_body_root_is_wrapped() {
        let document = Document::from_spec(&NodeSpec::text("plain"), None);
        assert_eq!(document.markup(document.root()), "<body>plain</body>");
    }
}
