//! Tooltip state machine.
//!
//! The presenter never sleeps or performs requests itself. Methods return
//! timer ids and request tickets, and the owner runs the timers and feeds
//! the outcomes back through [`TooltipPresenter::hover_timer_fired`],
//! [`TooltipPresenter::selection_timer_fired`] and
//! [`TooltipPresenter::resolve`].

use serde::{Deserialize, Serialize};

use crate::errors::ErrorInfo;
use crate::language::{detect, localize};

const POINTER_OFFSET: f64 = 10.0;
const SELECTION_GAP: f64 = 5.0;
const MIN_SELECTION_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Ticket(pub u64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Which resolved responses may still write into the tooltip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StaleGuard {
    /// Any response lands while the tooltip is visible; the last one to
    /// resolve wins.
    Visibility,
    /// Only the response for the most recently started request lands.
    #[default]
    Ticket,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TooltipState {
    Hidden,
    Pending {
        token: String,
        timer: Option<TimerId>,
        ticket: Ticket,
    },
    Shown(String),
    ErrorShown(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TooltipView {
    pub visible: bool,
    pub text: String,
    pub is_error: bool,
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverRequest {
    pub token: String,
    pub context: String,
    pub ticket: Ticket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub text: String,
    pub ticket: Ticket,
}

#[derive(Debug, Clone)]
struct PendingSelection {
    timer: TimerId,
    text: String,
    rect: Option<Rect>,
}

#[derive(Debug)]
pub struct TooltipPresenter {
    state: TooltipState,
    view: TooltipView,
    guard: StaleGuard,
    hover_context: String,
    selection: Option<PendingSelection>,
    next_id: u64,
    latest_ticket: Ticket,
}

impl TooltipPresenter {
    pub fn new(guard: StaleGuard) -> Self {
        Self {
            state: TooltipState::Hidden,
            view: TooltipView::default(),
            guard,
            hover_context: String::new(),
            selection: None,
            next_id: 0,
            latest_ticket: Ticket(0),
        }
    }

    pub fn state(&self) -> &TooltipState {
        &self.state
    }

    pub fn view(&self) -> &TooltipView {
        &self.view
    }

    /// Pointer entered a candidate token. Shows the working placeholder right
    /// away and arms the hover delay.
    pub fn hover_enter(&mut self, token: &str, context: &str, at: Point) -> TimerId {
        let timer = TimerId(self.bump());
        let ticket = self.issue_ticket();
        self.hover_context = context.to_string();
        self.state = TooltipState::Pending {
            token: token.to_string(),
            timer: Some(timer),
            ticket,
        };
        self.show(
            "Analyzing...",
            false,
            Point {
                x: at.x + POINTER_OFFSET,
                y: at.y + POINTER_OFFSET,
            },
        );
        timer
    }

    /// Pointer left a candidate token. Returns the hover timer that was
    /// still armed, if any.
    pub fn hover_leave(&mut self) -> Option<TimerId> {
        let cancelled = self.armed_hover_timer();
        self.hide();
        cancelled
    }

    pub fn hover_timer_fired(&mut self, fired: TimerId) -> Option<HoverRequest> {
        let TooltipState::Pending {
            token,
            timer,
            ticket,
        } = &mut self.state
        else {
            return None;
        };
        if *timer != Some(fired) {
            return None;
        }
        *timer = None;
        Some(HoverRequest {
            token: token.clone(),
            context: self.hover_context.clone(),
            ticket: *ticket,
        })
    }

    /// Click on a candidate token. Supersedes any pending hover.
    pub fn click(&mut self, token: &str, at: Point) -> Ticket {
        let ticket = self.issue_ticket();
        self.state = TooltipState::Pending {
            token: token.to_string(),
            timer: None,
            ticket,
        };
        let placeholder = localize(
            "Načítám detailní analýzu...",
            "Loading detailed analysis...",
            detect(token),
        );
        self.show(
            placeholder,
            false,
            Point {
                x: at.x + POINTER_OFFSET,
                y: at.y + POINTER_OFFSET,
            },
        );
        ticket
    }

    /// Selection changed. Re-arms the selection debounce; the previous timer,
    /// if any, becomes stale.
    pub fn selection_changed(&mut self, text: &str, rect: Option<Rect>) -> TimerId {
        let timer = TimerId(self.bump());
        self.selection = Some(PendingSelection {
            timer,
            text: text.to_string(),
            rect,
        });
        timer
    }

    pub fn selection_timer_fired(
        &mut self,
        fired: TimerId,
        highlighting_enabled: bool,
    ) -> Option<SelectionRequest> {
        if self.selection.as_ref().map(|pending| pending.timer) != Some(fired) {
            return None;
        }
        let pending = self.selection.take()?;
        let text = pending.text.trim();
        let Some(rect) = pending.rect.filter(|_| highlighting_enabled && !text.is_empty()) else {
            self.dismiss();
            return None;
        };
        if text.chars().count() <= MIN_SELECTION_CHARS {
            return None;
        }
        self.view.position = Point {
            x: rect.left,
            y: rect.bottom + SELECTION_GAP,
        };
        Some(self.begin_selection(text))
    }

    /// Analysis of arbitrary text requested by the host rather than by a
    /// live selection. Keeps the current position.
    pub fn analyze_text(&mut self, text: &str) -> SelectionRequest {
        self.begin_selection(text.trim())
    }

    /// Commits a resolved request. Returns whether the tooltip changed.
    pub fn resolve(&mut self, ticket: Ticket, outcome: Result<String, ErrorInfo>) -> bool {
        let accepted = match self.guard {
            StaleGuard::Visibility => self.view.visible,
            StaleGuard::Ticket => self.view.visible && ticket == self.latest_ticket,
        };
        if !accepted {
            tracing::debug!(ticket = ticket.0, "dropping stale tooltip response");
            return false;
        }
        let position = self.view.position;
        match outcome {
            Ok(text) => {
                self.show(&text, false, position);
                self.state = TooltipState::Shown(text);
            }
            Err(error) => {
                self.show(&error.message, true, position);
                self.state = TooltipState::ErrorShown(error.message);
            }
        }
        true
    }

    /// Click outside any token and outside the tooltip, or a collapsed
    /// selection.
    pub fn dismiss(&mut self) {
        self.hide();
    }

    pub fn armed_hover_timer(&self) -> Option<TimerId> {
        match &self.state {
            TooltipState::Pending { timer, .. } => *timer,
            _ => None,
        }
    }

    fn begin_selection(&mut self, text: &str) -> SelectionRequest {
        let ticket = self.issue_ticket();
        self.state = TooltipState::Pending {
            token: text.to_string(),
            timer: None,
            ticket,
        };
        let placeholder = localize("Načítám analýzu...", "Loading analysis...", detect(text));
        self.show(placeholder, false, self.view.position);
        SelectionRequest {
            text: text.to_string(),
            ticket,
        }
    }

    fn show(&mut self, text: &str, is_error: bool, position: Point) {
        self.view = TooltipView {
            visible: true,
            text: text.to_string(),
            is_error,
            position,
        };
    }

    fn hide(&mut self) {
        self.state = TooltipState::Hidden;
        self.view.visible = false;
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.latest_ticket = Ticket(self.bump());
        self.latest_ticket
    }

    fn bump(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl Default for TooltipPresenter {
    fn default() -> Self {
        Self::new(StaleGuard::default())
    }
}
