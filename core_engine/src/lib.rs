//! Core of lexilight: decides which words on a page deserve an explanation,
//! annotates the page incrementally, and tracks the tooltip that shows the
//! explanations. Everything here is synchronous; time-dependent operations
//! take an explicit `Instant` so the daemon can drive them from its clock.

pub mod cache;
pub mod classifier;
pub mod document;
pub mod errors;
pub mod language;
pub mod mutation;
pub mod presenter;
pub mod rate_limit;
pub mod scanner;
pub mod schedule;

pub use cache::{cache_key, AnnotationCache};
pub use classifier::{classify, is_candidate, Token};
pub use document::{Document, MutationRecord, NodeId, NodeSpec};
pub use errors::{classify as classify_error, ErrorInfo, ErrorKind};
pub use language::{detect, Language};
pub use mutation::MutationCoordinator;
pub use presenter::{
    HoverRequest, Point, Rect, SelectionRequest, StaleGuard, Ticket, TimerId, TooltipPresenter,
    TooltipState, TooltipView,
};
pub use rate_limit::RateLimiter;
pub use scanner::{
    DocumentScanner, HandlerRegistry, ProcessedMarks, ScanBatch, WhitespacePolicy,
};
pub use schedule::IdleQueue;
