/// Per-page crawl task state definitions
///
/// A task moves `Pending -> Fetching -> {Analyzed | HttpFailed |
/// UnsupportedContent | FatalError} -> Discovering -> Spawning -> Joining ->
/// {Done | Cancelled}`. Only `Analyzed` continues to link discovery.
use std::fmt;

/// Represents the current state of a page analysis task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    // ===== Active States =====
    /// Task is created and waiting for a pool permit or its pacing delay
    Pending,

    /// Page is currently being fetched
    Fetching,

    // ===== Fetch Outcomes =====
    /// Page content was fetched and its lemmas committed
    Analyzed,

    /// Server answered with an error status
    HttpFailed,

    /// Response was not text
    UnsupportedContent,

    /// Network, parse or storage failure that fails the whole site
    FatalError,

    // ===== Tree States =====
    /// Links of the page are being collected
    Discovering,

    /// Child tasks are being created
    Spawning,

    /// Waiting for child tasks to finish
    Joining,

    // ===== Terminal States =====
    /// Task and its whole subtree finished
    Done,

    /// Task stopped early because of a cancel request or a failed site
    Cancelled,
}

impl TaskState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// Returns true if the transition follows the task lifecycle
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;

        if next == Cancelled {
            return !self.is_terminal();
        }

        match (*self, next) {
            (Pending, Fetching) => true,
            (Fetching, Analyzed | HttpFailed | UnsupportedContent | FatalError) => true,
            (HttpFailed | UnsupportedContent | FatalError, Done) => true,
            (Analyzed, Discovering) | (Analyzed, Done) => true,
            (Discovering, Spawning) => true,
            (Spawning, Joining) => true,
            (Joining, Done) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Analyzed => "analyzed",
            Self::HttpFailed => "http_failed",
            Self::UnsupportedContent => "unsupported_content",
            Self::FatalError => "fatal_error",
            Self::Discovering => "discovering",
            Self::Spawning => "spawning",
            Self::Joining => "joining",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
