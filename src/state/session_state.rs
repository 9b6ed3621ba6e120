/// Session state definitions for one crawl run
///
/// A session moves `Init -> Fetching -> Parsing -> Advancing` and then either
/// loops back to `Fetching` or stops in `Done` / `Failed`.
use std::fmt;

/// Represents the current state of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    // ===== Active States =====
    /// Initial page request is being built
    Init,

    /// A page request is in flight
    Fetching,

    /// A fetched snapshot is being turned into results
    Parsing,

    /// Metrics, cursor and pagination are being updated
    Advancing,

    // ===== Terminal States =====
    /// Pagination finished normally
    Done,

    /// Fetch attempts exhausted, cursor write failed, or run budget exceeded
    Failed,
}

impl SessionState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the session is still working
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Checks whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Init, Fetching)
                | (Init, Done)
                | (Fetching, Parsing)
                | (Fetching, Failed)
                | (Parsing, Advancing)
                | (Advancing, Fetching)
                | (Advancing, Done)
                | (Advancing, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Advancing => "advancing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!SessionState::Init.is_terminal());
        assert!(!SessionState::Fetching.is_terminal());
        assert!(!SessionState::Parsing.is_terminal());
        assert!(!SessionState::Advancing.is_terminal());

        assert!(SessionState::Done.is_terminal());
        assert!(SessionState::Failed.is_terminal());
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(SessionState::Init.can_transition_to(SessionState::Fetching));
        assert!(SessionState::Fetching.can_transition_to(SessionState::Parsing));
        assert!(SessionState::Parsing.can_transition_to(SessionState::Advancing));
        assert!(SessionState::Advancing.can_transition_to(SessionState::Fetching));
        assert!(SessionState::Advancing.can_transition_to(SessionState::Done));
    }

    #[test]
    fn test_parsing_never_fails_the_session() {
        assert!(!SessionState::Parsing.can_transition_to(SessionState::Failed));
        assert!(!SessionState::Parsing.can_transition_to(SessionState::Fetching));
    }

    #[test]
    fn test_terminal_states_are_sinks() {
        for next in [
            SessionState::Init,
            SessionState::Fetching,
            SessionState::Parsing,
            SessionState::Advancing,
            SessionState::Done,
            SessionState::Failed,
        ] {
            assert!(!SessionState::Done.can_transition_to(next));
            assert!(!SessionState::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::Advancing.to_string(), "advancing");
    }
}
