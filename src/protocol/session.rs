use crate::error::{NemoriaError, Result};
use std::fmt;

/// Per-connection protocol state.
///
/// ```text
/// Connected -> Authenticating -> Authenticated <-> Serving
///      \______________\________________\_____________\___-> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket accepted, hello not yet sent
    Connected,
    /// Hello sent, waiting for the client's credential
    Authenticating,
    /// Idle and ready for the next request
    Authenticated,
    /// A request is being processed
    Serving,
    /// Terminal
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Connected => "connected",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
            SessionState::Serving => "serving",
            SessionState::Closed => "closed",
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connected, Authenticating)
                | (Authenticating, Authenticated)
                | (Authenticated, Serving)
                | (Serving, Authenticated)
                | (Connected | Authenticating | Authenticated | Serving, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication/sequence tracker for one connection.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    peer: String,
}

impl Session {
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            state: SessionState::Connected,
            peer: peer.into(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state,
            SessionState::Authenticated | SessionState::Serving
        )
    }

    /// Move to `next`, failing on an illegal transition.
    pub fn advance(&mut self, next: SessionState) -> Result<()> {
        if self.state.can_transition_to(next) {
            self.state = next;
            Ok(())
        } else {
            Err(NemoriaError::ProtocolViolation(format!(
                "illegal session transition {} -> {next}",
                self.state
            )))
        }
    }

    /// Closing is always allowed and idempotent.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut session = Session::new("127.0.0.1:5000");
        session.advance(SessionState::Authenticating).unwrap();
        assert!(!session.is_authenticated());
        session.advance(SessionState::Authenticated).unwrap();
        for _ in 0..3 {
            session.advance(SessionState::Serving).unwrap();
            session.advance(SessionState::Authenticated).unwrap();
        }
        assert!(session.is_authenticated());
        session.advance(SessionState::Closed).unwrap();
    }

    #[test]
    fn cannot_serve_before_authenticating() {
        let mut session = Session::new("peer");
        assert!(session.advance(SessionState::Serving).is_err());
        session.advance(SessionState::Authenticating).unwrap();
        assert!(session.advance(SessionState::Serving).is_err());
    }

    #[test]
    fn closed_is_terminal() {
        let mut session = Session::new("peer");
        session.close();
        assert!(session.advance(SessionState::Authenticating).is_err());
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
    }
}
