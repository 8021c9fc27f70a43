//! Phase state definitions for the two-stage crawl
//!
//! Each phase is a small state machine over one persisted queue. The enums
//! exist so transitions are explicit and logged rather than implied by
//! callback nesting.

use std::fmt;

/// States of the subject-enumeration phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectPhaseState {
    /// Issue the single fixed listing request
    Start,
    /// Response received, nodes not yet extracted
    Fetched,
    /// Subject records built and queued in memory
    Extracted,
    /// Queue flushed to the `subjects` slot (terminal)
    Persisted,
}

impl SubjectPhaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Persisted)
    }
}

impl fmt::Display for SubjectPhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Fetched => "fetched",
            Self::Extracted => "extracted",
            Self::Persisted => "persisted",
        };
        write!(f, "{}", name)
    }
}

/// States of the per-subject book-enumeration loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookPhaseState {
    /// Pop the next subject from the queue slot
    LoadQueue,
    /// One subject's listing request is in flight
    IssueRequest,
    /// Listing response received for the current subject
    Fetched,
    /// Book records built for the current subject
    Extracted,
    /// Queue drained (terminal)
    Idle,
}

impl BookPhaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for BookPhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadQueue => "load_queue",
            Self::IssueRequest => "issue_request",
            Self::Fetched => "fetched",
            Self::Extracted => "extracted",
            Self::Idle => "idle",
        };
        write!(f, "{}", name)
    }
}

/// Logs and applies a phase transition.
pub(crate) fn advance<S: fmt::Display>(state: &mut S, next: S) {
    tracing::debug!(from = %state, to = %next, "phase transition");
    *state = next;
}
