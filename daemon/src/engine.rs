use std::sync::Arc;
use std::time::Instant;

use lexilight_core::scanner::{self, highlight_target, TOGGLE_ID};
use lexilight_core::{
    Document, DocumentScanner, HandlerRegistry, HoverRequest, IdleQueue, MutationCoordinator,
    NodeId, NodeSpec, Point, ProcessedMarks, Rect, ScanBatch, SelectionRequest, TimerId,
    TooltipPresenter, TooltipView,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{HighlightConfig, ModelConfig};
use crate::generator::{build_client, GenerativeClient};
use crate::pipeline::AnalysisPipeline;

const TOGGLE_LABEL: &str = "Stop Highlighting";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Handled,
    HighlightingStopped,
}

/// Owns the page, the scan state, the tooltip and the request pipeline.
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    model: ModelConfig,
    highlight: HighlightConfig,
    pipeline: AnalysisPipeline,
    state: Mutex<EngineState>,
}

struct EngineState {
    document: Document,
    marks: ProcessedMarks,
    handlers: HandlerRegistry,
    scanner: DocumentScanner,
    coordinator: MutationCoordinator,
    idle: IdleQueue<NodeId>,
    pending_commits: Vec<ScanBatch>,
    idle_scheduled: bool,
    presenter: TooltipPresenter,
    hover_timer: Option<JoinHandle<()>>,
    highlighting_enabled: bool,
    auto_highlight: bool,
    observing: bool,
}

impl EngineState {
    /// Drops every annotation and any scan work that has not landed yet.
    fn reset_highlights(&mut self) {
        let removed =
            scanner::remove_highlights(&mut self.document, &mut self.marks, &mut self.handlers);
        self.coordinator.clear();
        self.idle.clear();
        self.pending_commits.clear();
        self.document.take_mutations();
        if removed > 0 {
            debug!(removed, "removed highlights");
        }
    }

    fn ensure_toggle(&mut self) {
        if self.document.find_by_id(TOGGLE_ID).is_some() {
            return;
        }
        let button = self.document.create_element("button");
        self.document.set_element_id(button, TOGGLE_ID);
        let label = self.document.create_text(TOGGLE_LABEL);
        self.document.append_child(button, label);
        let root = self.document.root();
        self.document.append_child(root, button);
        self.document.take_mutations();
    }

    fn remove_toggle(&mut self) {
        if let Some(button) = self.document.find_by_id(TOGGLE_ID) {
            self.document.remove(button);
        }
    }

    fn cancel_hover_timer(&mut self) {
        if let Some(timer) = self.hover_timer.take() {
            timer.abort();
        }
    }

    fn disable(&mut self) {
        self.highlighting_enabled = false;
        self.observing = false;
        self.remove_toggle();
        self.reset_highlights();
    }
}

impl Engine {
    pub fn new(model: ModelConfig, highlight: HighlightConfig) -> Self {
        let state = EngineState {
            document: Document::new(),
            marks: ProcessedMarks::default(),
            handlers: HandlerRegistry::default(),
            scanner: DocumentScanner::new(highlight.whitespace),
            coordinator: MutationCoordinator::new(highlight.mutation_delay()),
            idle: IdleQueue::new(),
            pending_commits: Vec::new(),
            idle_scheduled: false,
            presenter: TooltipPresenter::new(highlight.stale_guard),
            hover_timer: None,
            highlighting_enabled: false,
            auto_highlight: true,
            observing: false,
        };
        Self {
            inner: Arc::new(Inner {
                pipeline: AnalysisPipeline::new(&highlight),
                model,
                highlight,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.pipeline.is_configured()
    }

    pub fn highlighting_enabled(&self) -> bool {
        self.inner.state.lock().highlighting_enabled
    }

    /// Installs a client for `api_key`, or tears everything down when the key
    /// is absent. Returns false when the client could not be built.
    pub fn configure(
        &self,
        api_key: Option<&str>,
        enable_highlighting: bool,
        auto_highlight: bool,
    ) -> bool {
        let Some(api_key) = api_key.filter(|key| !key.trim().is_empty()) else {
            self.teardown();
            return true;
        };
        match build_client(&self.inner.model, api_key) {
            Ok(client) => self.install(client, enable_highlighting, auto_highlight),
            Err(error) => {
                warn!("failed to configure generation client: {error:#}");
                return false;
            }
        }
        true
    }

    pub(crate) fn install(
        &self,
        client: Arc<dyn GenerativeClient>,
        enable_highlighting: bool,
        auto_highlight: bool,
    ) {
        self.inner.pipeline.set_client(Some(client));
        let mut state = self.inner.state.lock();
        state.auto_highlight = auto_highlight;
        if enable_highlighting {
            state.reset_highlights();
            state.highlighting_enabled = true;
            state.ensure_toggle();
            self.initialize_scanning(&mut state);
        } else {
            state.disable();
        }
        info!(
            enable_highlighting,
            auto_highlight, "generation client configured"
        );
    }

    /// Forgets the client and removes every annotation and piece of engine UI.
    pub fn teardown(&self) {
        self.inner.pipeline.set_client(None);
        let mut state = self.inner.state.lock();
        state.cancel_hover_timer();
        state.disable();
        state.presenter.dismiss();
        info!("generation client cleared");
    }

    pub fn start_highlighting(&self, auto_highlight: bool) {
        let mut state = self.inner.state.lock();
        state.auto_highlight = auto_highlight;
        state.reset_highlights();
        state.highlighting_enabled = true;
        state.ensure_toggle();
        self.initialize_scanning(&mut state);
    }

    pub fn stop_highlighting(&self) {
        let mut state = self.inner.state.lock();
        state.disable();
        info!("highlighting stopped");
    }

    pub fn set_auto_highlight(&self, auto_highlight: bool) {
        let mut state = self.inner.state.lock();
        state.auto_highlight = auto_highlight;
        state.reset_highlights();
        self.initialize_scanning(&mut state);
    }

    /// Replaces the page. Highlighting state carries over to the new page.
    pub fn load_document(&self, spec: &NodeSpec, lang: Option<String>) -> NodeId {
        self.inner.pipeline.set_locale(lang.clone());
        let mut state = self.inner.state.lock();
        state.cancel_hover_timer();
        state.document = Document::from_spec(spec, lang);
        state.marks.clear();
        state.handlers.clear();
        state.reset_highlights();
        state.presenter.dismiss();
        if state.highlighting_enabled {
            state.ensure_toggle();
            self.initialize_scanning(&mut state);
        }
        state.document.root()
    }

    /// Host-side insertion of new content. Returns `None` if `parent` is not
    /// an element of the page.
    pub fn insert_nodes(&self, parent: NodeId, specs: &[NodeSpec]) -> Option<Vec<NodeId>> {
        let mut state = self.inner.state.lock();
        if state.document.element(parent).is_none() {
            return None;
        }
        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let node = state.document.build(spec);
            state.document.append_child(parent, node);
            ids.push(node);
        }

        let records = state.document.take_mutations();
        if state.observing {
            let state = &mut *state;
            if let Some(deadline) = state.coordinator.observe(&state.document, records, now()) {
                self.spawn_mutation_timer(deadline);
            }
        }
        Some(ids)
    }

    pub fn pointer_over(&self, node: NodeId, at: Point) {
        let mut state = self.inner.state.lock();
        let Some((token, context)) = hover_subject(&state, node) else {
            return;
        };
        state.cancel_hover_timer();
        let timer = state.presenter.hover_enter(&token, &context, at);
        let engine = self.clone();
        let delay = self.inner.highlight.hover_delay();
        state.hover_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.fire_hover_timer(timer);
        }));
    }

    pub fn pointer_out(&self) {
        let mut state = self.inner.state.lock();
        state.cancel_hover_timer();
        state.presenter.hover_leave();
    }

    pub fn click(&self, node: Option<NodeId>, on_tooltip: bool, at: Point) -> ClickOutcome {
        let mut state = self.inner.state.lock();
        if let Some(node) = node {
            let on_toggle = state
                .document
                .find_by_id(TOGGLE_ID)
                .is_some_and(|toggle| state.document.ancestors(node).any(|id| id == toggle));
            if on_toggle {
                state.disable();
                info!("highlighting stopped from page");
                return ClickOutcome::HighlightingStopped;
            }
            if let Some((token, _)) = hover_subject(&state, node) {
                state.cancel_hover_timer();
                let ticket = state.presenter.click(&token, at);
                let engine = self.clone();
                tokio::spawn(async move {
                    let outcome = engine.inner.pipeline.click_analyze(&token).await;
                    engine.inner.state.lock().presenter.resolve(ticket, outcome);
                });
                return ClickOutcome::Handled;
            }
        }
        if !on_tooltip {
            state.cancel_hover_timer();
            state.presenter.dismiss();
        }
        ClickOutcome::Handled
    }

    pub fn selection_change(&self, text: &str, rect: Option<Rect>) {
        let timer = self.inner.state.lock().presenter.selection_changed(text, rect);
        let engine = self.clone();
        let delay = self.inner.highlight.selection_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.fire_selection_timer(timer).await;
        });
    }

    /// Explains arbitrary text outside the live selection path. Returns
    /// whether the result reached the tooltip.
    pub async fn analyze_text(&self, text: &str) -> bool {
        let request = self.inner.state.lock().presenter.analyze_text(text);
        self.run_selection(request).await
    }

    pub fn render(&self) -> (String, TooltipView) {
        let state = self.inner.state.lock();
        (
            state.document.markup(state.document.root()),
            state.presenter.view().clone(),
        )
    }

    #[cfg(test)]
    pub fn tooltip_state(&self) -> lexilight_core::TooltipState {
        self.inner.state.lock().presenter.state().clone()
    }

    /// Runs all queued scans and commits them immediately.
    #[cfg(test)]
    pub fn flush_idle(&self) -> usize {
        self.run_idle_scans();
        self.commit_pending()
    }

    fn initialize_scanning(&self, state: &mut EngineState) {
        state.observing = state.highlighting_enabled && state.auto_highlight;
        if state.observing {
            let root = state.document.root();
            self.schedule_idle(state, [root]);
        }
    }

    fn schedule_idle(&self, state: &mut EngineState, roots: impl IntoIterator<Item = NodeId>) {
        state.idle.schedule_all(roots);
        if state.idle_scheduled || state.idle.is_empty() {
            return;
        }
        state.idle_scheduled = true;
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            engine.run_idle_scans();
            tokio::task::yield_now().await;
            engine.commit_pending();
        });
    }

    fn run_idle_scans(&self) {
        let mut state = self.inner.state.lock();
        state.idle_scheduled = false;
        let state = &mut *state;
        for root in state.idle.drain() {
            let batch = state.scanner.scan(&state.document, root, &mut state.marks);
            if !batch.is_empty() {
                state.pending_commits.push(batch);
            }
        }
    }

    fn commit_pending(&self) -> usize {
        let mut state = self.inner.state.lock();
        let state = &mut *state;
        let mut committed = 0;
        for batch in std::mem::take(&mut state.pending_commits) {
            committed += scanner::commit(&mut state.document, batch, &mut state.handlers);
        }
        state.document.take_mutations();
        state.marks.retain_live(&state.document);
        state.handlers.retain_live(&state.document);
        if committed > 0 {
            debug!(committed, "committed annotated segments");
        }
        committed
    }

    fn spawn_mutation_timer(&self, deadline: Instant) {
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            engine.release_mutations();
        });
    }

    fn release_mutations(&self) {
        let mut state = self.inner.state.lock();
        if !state.observing {
            return;
        }
        let roots = state.coordinator.take_due(now());
        if !roots.is_empty() {
            debug!(roots = roots.len(), "rescanning inserted subtrees");
            self.schedule_idle(&mut state, roots);
        }
    }

    fn fire_hover_timer(&self, timer: TimerId) {
        let request = {
            let mut state = self.inner.state.lock();
            state.hover_timer = None;
            state.presenter.hover_timer_fired(timer)
        };
        if let Some(request) = request {
            let engine = self.clone();
            tokio::spawn(async move { engine.run_hover(request).await });
        }
    }

    async fn run_hover(&self, request: HoverRequest) {
        let outcome = self
            .inner
            .pipeline
            .hover_analyze(&request.token, &request.context)
            .await;
        self.inner
            .state
            .lock()
            .presenter
            .resolve(request.ticket, outcome);
    }

    async fn fire_selection_timer(&self, timer: TimerId) {
        let request = {
            let mut state = self.inner.state.lock();
            let enabled = state.highlighting_enabled;
            state.presenter.selection_timer_fired(timer, enabled)
        };
        if let Some(request) = request {
            self.run_selection(request).await;
        }
    }

    async fn run_selection(&self, request: SelectionRequest) -> bool {
        let outcome = self.inner.pipeline.selection_analyze(&request.text).await;
        self.inner
            .state
            .lock()
            .presenter
            .resolve(request.ticket, outcome)
    }
}

/// Token text and surrounding context for a node inside a listening
/// candidate span.
fn hover_subject(state: &EngineState, node: NodeId) -> Option<(String, String)> {
    let target = highlight_target(&state.document, node)?;
    if !state.handlers.covers(&state.document, target) {
        return None;
    }
    let token = state.document.text_content(target);
    let context = state
        .document
        .parent(target)
        .map(|parent| state.document.text_content(parent))
        .unwrap_or_default();
    Some((token, context))
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
