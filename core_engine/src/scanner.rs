//! Two-phase annotation of text segments.
//!
//! [`DocumentScanner::scan`] only reads the tree and produces a batch of
//! replacements. [`commit`] applies a batch in one go at the next idle
//! opportunity. Nodes recorded in a batch are marked immediately, so
//! scanning the same subtree again before or after the commit yields nothing
//! new.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::classifier::is_candidate;
use crate::document::{Document, NodeId, NodeKind};

pub const HIGHLIGHT_CLASS: &str = "highlightable-word";
pub const PROCESSED_CLASS: &str = "word-highlighter-processed";
pub const UI_ID_PREFIX: &str = "word-highlighter";
pub const TOGGLE_ID: &str = "word-highlighter-toggle";

const OPAQUE_TAGS: [&str; 6] = ["script", "style", "noscript", "iframe", "svg", "code"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WhitespacePolicy {
    /// Rebuild segments with single spaces between words.
    #[default]
    Collapse,
    /// Keep the original whitespace runs.
    Preserve,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Plain(String),
    Highlight(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotatedFragment {
    pieces: Vec<Piece>,
}

impl AnnotatedFragment {
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    pub fn highlight_count(&self) -> usize {
        self.pieces
            .iter()
            .filter(|piece| matches!(piece, Piece::Highlight(_)))
            .count()
    }

    pub fn text(&self) -> String {
        self.pieces
            .iter()
            .map(|piece| match piece {
                Piece::Plain(text) | Piece::Highlight(text) => text.as_str(),
            })
            .collect()
    }

    fn push_plain(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.pieces.last_mut() {
            Some(Piece::Plain(existing)) => existing.push_str(text),
            _ => self.pieces.push(Piece::Plain(text.to_string())),
        }
    }

    fn push_word(&mut self, word: &str) {
        if is_candidate(word) {
            self.pieces.push(Piece::Highlight(word.to_string()));
        } else {
            self.push_plain(word);
        }
    }
}

pub fn annotate(text: &str, policy: WhitespacePolicy) -> AnnotatedFragment {
    let mut fragment = AnnotatedFragment::default();
    match policy {
        WhitespacePolicy::Collapse => {
            for (index, word) in text.split_whitespace().enumerate() {
                if index > 0 {
                    fragment.push_plain(" ");
                }
                fragment.push_word(word);
            }
        }
        WhitespacePolicy::Preserve => {
            let mut rest = text;
            while !rest.is_empty() {
                let gap = rest.find(|ch: char| !ch.is_whitespace()).unwrap_or(rest.len());
                fragment.push_plain(&rest[..gap]);
                rest = &rest[gap..];
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                if end > 0 {
                    fragment.push_word(&rest[..end]);
                }
                rest = &rest[end..];
            }
        }
    }
    fragment
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub original: NodeId,
    pub segment: String,
    pub fragment: AnnotatedFragment,
}

#[derive(Debug, Clone, Default)]
pub struct ScanBatch {
    pub container: Option<NodeId>,
    pub replacements: Vec<Replacement>,
}

impl ScanBatch {
    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    pub fn highlight_count(&self) -> usize {
        self.replacements
            .iter()
            .map(|replacement| replacement.fragment.highlight_count())
            .sum()
    }
}

/// Text nodes that have already been scanned.
#[derive(Debug, Default)]
pub struct ProcessedMarks(HashSet<NodeId>);

impl ProcessedMarks {
    pub fn mark(&mut self, id: NodeId) {
        self.0.insert(id);
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Forgets segments that have since been freed.
    pub fn retain_live(&mut self, document: &Document) {
        self.0.retain(|id| document.node(*id).is_some());
    }
}

/// Containers whose hover and click events reach the presenter.
#[derive(Debug, Default)]
pub struct HandlerRegistry(HashSet<NodeId>);

impl HandlerRegistry {
    /// Returns false if the container was already listening.
    pub fn register(&mut self, container: NodeId) -> bool {
        self.0.insert(container)
    }

    pub fn covers(&self, document: &Document, node: NodeId) -> bool {
        document.ancestors(node).any(|id| self.0.contains(&id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn retain_live(&mut self, document: &Document) {
        self.0.retain(|id| document.node(*id).is_some());
    }
}

pub fn is_engine_ui(document: &Document, id: NodeId) -> bool {
    document.ancestors(id).any(|ancestor| {
        document
            .element(ancestor)
            .and_then(|element| element.id.as_deref())
            .is_some_and(|element_id| element_id.starts_with(UI_ID_PREFIX))
    })
}

pub fn is_inside_processed(document: &Document, id: NodeId) -> bool {
    document
        .ancestors(id)
        .any(|ancestor| document.has_class(ancestor, PROCESSED_CLASS))
}

/// The candidate token span containing `id`, if any.
pub fn highlight_target(document: &Document, id: NodeId) -> Option<NodeId> {
    document
        .ancestors(id)
        .find(|ancestor| document.has_class(*ancestor, HIGHLIGHT_CLASS))
}

fn prunes_subtree(document: &Document, id: NodeId) -> bool {
    let Some(element) = document.element(id) else {
        return false;
    };
    OPAQUE_TAGS.contains(&element.tag.as_str())
        || element.classes.iter().any(|class| class == PROCESSED_CLASS)
        || element
            .id
            .as_deref()
            .is_some_and(|element_id| element_id.starts_with(UI_ID_PREFIX))
}

#[derive(Debug, Clone, Default)]
pub struct DocumentScanner {
    policy: WhitespacePolicy,
}

impl DocumentScanner {
    pub fn new(policy: WhitespacePolicy) -> Self {
        Self { policy }
    }

    pub fn scan(&self, document: &Document, root: NodeId, marks: &mut ProcessedMarks) -> ScanBatch {
        let container = match document.node(root).map(|node| &node.kind) {
            Some(NodeKind::Element(_)) => Some(root),
            Some(NodeKind::Text(_)) => document.parent(root),
            None => return ScanBatch::default(),
        };
        let mut batch = ScanBatch {
            container,
            replacements: Vec::new(),
        };
        if document.ancestors(root).any(|id| prunes_subtree(document, id)) {
            return batch;
        }

        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if prunes_subtree(document, id) {
                continue;
            }
            let Some(segment) = document.text(id) else {
                stack.extend(document.children(id).iter().rev().copied());
                continue;
            };
            if marks.contains(id) || segment.trim().is_empty() {
                continue;
            }

            let fragment = annotate(segment, self.policy);
            if fragment.highlight_count() > 0 || fragment.text() != segment {
                marks.mark(id);
                batch.replacements.push(Replacement {
                    original: id,
                    segment: segment.to_string(),
                    fragment,
                });
            }
        }

        tracing::trace!(
            root = root.0,
            segments = batch.replacements.len(),
            highlights = batch.highlight_count(),
            "scanned subtree"
        );
        batch
    }
}

/// Applies a scan batch. Segments detached since the scan are skipped.
/// Returns the number of segments replaced.
pub fn commit(document: &mut Document, batch: ScanBatch, handlers: &mut HandlerRegistry) -> usize {
    let mut committed = 0;
    for replacement in batch.replacements {
        if !document.is_attached(replacement.original) {
            continue;
        }
        let wrapper = document.create_element("span");
        document.add_class(wrapper, PROCESSED_CLASS);
        for piece in replacement.fragment.pieces() {
            let child = match piece {
                Piece::Plain(text) => document.create_text(text),
                Piece::Highlight(word) => {
                    let span = document.create_element("span");
                    document.add_class(span, HIGHLIGHT_CLASS);
                    let text = document.create_text(word);
                    document.append_child(span, text);
                    span
                }
            };
            document.append_child(wrapper, child);
        }
        if document.replace(replacement.original, wrapper) {
            committed += 1;
        }
    }

    if committed > 0 {
        if let Some(container) = batch.container {
            handlers.register(container);
        }
    }
    committed
}

/// Unwraps every processed container back into plain text and forgets all
/// scan state. Returns the number of containers removed.
pub fn remove_highlights(
    document: &mut Document,
    marks: &mut ProcessedMarks,
    handlers: &mut HandlerRegistry,
) -> usize {
    let containers = document.find_by_class(PROCESSED_CLASS);
    for container in &containers {
        let text = document.text_content(*container);
        let plain = document.create_text(&text);
        document.replace(*container, plain);
    }
    marks.clear();
    handlers.clear();
    containers.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::NodeSpec;

    fn page() -> Document {
        let spec: NodeSpec = serde_json::from_str(
            r#"{"tag":"body","children":[
                {"tag":"p","children":["The Installation guide covers API setup"]},
                {"tag":"script","children":["Installation Script"]},
                {"tag":"div","id":"word-highlighter-toggle","children":["Stop Highlighting"]},
                {"tag":"p","children":["   "]},
                {"tag":"p","children":["plain words only"]}
            ]}"#,
        )
        .unwrap();
        Document::from_spec(&spec, None)
    }

    #[test]
    fn annotate_wraps_candidates() {
        let fragment = annotate("The  Installation of API", WhitespacePolicy::Collapse);
        assert_eq!(
            fragment.pieces(),
            &[
                Piece::Plain("The ".to_string()),
                Piece::Highlight("Installation".to_string()),
                Piece::Plain(" of ".to_string()),
                Piece::Highlight("API".to_string()),
            ]
        );
        assert_eq!(fragment.text(), "The Installation of API");
    }

    #[test]
    fn preserve_policy_keeps_text_identical() {
        let text = "  The\tInstallation \n of API ";
        let fragment = annotate(text, WhitespacePolicy::Preserve);
        assert_eq!(fragment.text(), text);
        assert_eq!(fragment.highlight_count(), 2);
    }

    #[test]
    fn scan_skips_opaque_ui_and_blank_segments() {
        let document = page();
        let mut marks = ProcessedMarks::default();
        let batch = DocumentScanner::default().scan(&document, document.root(), &mut marks);
        assert_eq!(batch.replacements.len(), 1);
        assert_eq!(
            batch.replacements[0].segment,
            "The Installation guide covers API setup"
        );
        assert_eq!(batch.highlight_count(), 2);
        assert_eq!(marks.len(), 1);
        assert_eq!(batch.container, Some(document.root()));
    }

    #[test]
    fn scan_does_not_touch_the_tree() {
        let document = page();
        let before = document.markup(document.root());
        let mut marks = ProcessedMarks::default();
        DocumentScanner::default().scan(&document, document.root(), &mut marks);
        assert_eq!(document.markup(document.root()), before);
    }

    #[test]
    fn rescanning_is_idempotent() {
        let mut document = page();
        let scanner = DocumentScanner::default();
        let mut marks = ProcessedMarks::default();
        let mut handlers = HandlerRegistry::default();

        let first = scanner.scan(&document, document.root(), &mut marks);
        let second = scanner.scan(&document, document.root(), &mut marks);
        assert!(second.is_empty());

        assert_eq!(commit(&mut document, first, &mut handlers), 1);
        let committed = document.markup(document.root());
        let third = scanner.scan(&document, document.root(), &mut marks);
        assert!(third.is_empty());
        assert_eq!(commit(&mut document, third, &mut handlers), 0);
        assert_eq!(document.markup(document.root()), committed);
    }

    #[test]
    fn commit_wraps_and_registers_container_once() {
        let mut document = page();
        let scanner = DocumentScanner::default();
        let mut marks = ProcessedMarks::default();
        let mut handlers = HandlerRegistry::default();
        let batch = scanner.scan(&document, document.root(), &mut marks);
        commit(&mut document, batch, &mut handlers);

        let markup = document.markup(document.root());
        assert!(markup.starts_with(
            r#"<body><p><span class="word-highlighter-processed">The <span class="highlightable-word">Installation</span> guide covers <span class="highlightable-word">API</span> setup</span></p>"#
        ));
        assert_eq!(handlers.len(), 1);

        let highlight = document.find_by_class(HIGHLIGHT_CLASS)[0];
        assert!(handlers.covers(&document, highlight));
        assert_eq!(highlight_target(&document, document.children(highlight)[0]), Some(highlight));
    }

    #[test]
    fn highlight_cycles_keep_the_page_bounded() {
        let mut document = page();
        let live = document.len();
        let mut marks = ProcessedMarks::default();
        let mut handlers = HandlerRegistry::default();
        let scanner = DocumentScanner::default();

        for _ in 0..1000 {
            let batch = scanner.scan(&document, document.root(), &mut marks);
            assert!(commit(&mut document, batch, &mut handlers) > 0);
            marks.retain_live(&document);
            assert!(marks.is_empty());
            assert!(remove_highlights(&mut document, &mut marks, &mut handlers) > 0);
        }
        assert_eq!(document.len(), live);
    }

    #[test]
    fn commit_skips_detached_segments() {
        let mut document = page();
        let mut marks = ProcessedMarks::default();
        let mut handlers = HandlerRegistry::default();
        let batch = DocumentScanner::default().scan(&document, document.root(), &mut marks);
        let paragraph = document.parent(batch.replacements[0].original).unwrap();
        document.remove(paragraph);
        assert_eq!(commit(&mut document, batch, &mut handlers), 0);
        assert!(handlers.is_empty());
    }

    #[test]
    fn collapse_marks_whitespace_only_changes() {
        let spec = NodeSpec::element("p", vec![NodeSpec::text("  plain   words ")]);
        let mut document = Document::from_spec(&spec, None);
        let mut marks = ProcessedMarks::default();
        let batch = DocumentScanner::new(WhitespacePolicy::Collapse).scan(
            &document,
            document.root(),
            &mut marks,
        );
        assert_eq!(batch.replacements.len(), 1);
        assert_eq!(batch.highlight_count(), 0);

        marks.clear();
        let preserved = DocumentScanner::new(WhitespacePolicy::Preserve).scan(
            &document,
            document.root(),
            &mut marks,
        );
        assert!(preserved.is_empty());
        document.take_mutations();
    }

    #[test]
    fn remove_highlights_restores_text() {
        let mut document = page();
        let scanner = DocumentScanner::default();
        let mut marks = ProcessedMarks::default();
        let mut handlers = HandlerRegistry::default();
        let batch = scanner.scan(&document, document.root(), &mut marks);
        commit(&mut document, batch, &mut handlers);

        assert_eq!(remove_highlights(&mut document, &mut marks, &mut handlers), 1);
        assert!(marks.is_empty());
        assert!(handlers.is_empty());
        assert!(document.find_by_class(PROCESSED_CLASS).is_empty());
        assert!(document
            .markup(document.root())
            .starts_with("<body><p>The Installation guide covers API setup</p>"));

        let again = scanner.scan(&document, document.root(), &mut marks);
        assert_eq!(again.replacements.len(), 1);
    }

    #[test]
    fn scan_from_inside_excluded_root_is_empty() {
        let document = page();
        let toggle = document.find_by_id(TOGGLE_ID).unwrap();
        let mut marks = ProcessedMarks::default();
        let batch = DocumentScanner::default().scan(&document, toggle, &mut marks);
        assert!(batch.is_empty());
    }
}
