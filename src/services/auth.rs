//! Session access for markshelf.
//!
//! Authentication itself happens elsewhere (the hosted backend's auth flow);
//! this module only records who is signed in and hands the session to the
//! components that need it.

use std::sync::RwLock;

use crate::types::errors::AuthError;
use crate::types::session::Session;

/// Trait answering "who is signed in right now".
pub trait SessionProvider: Send + Sync {
    fn current_session(&self) -> Option<Session>;

    /// The current session, or `AuthError::NoSession`.
    fn require_session(&self) -> Result<Session, AuthError> {
        self.current_session().ok_or(AuthError::NoSession)
    }
}

/// In-process session holder updated by sign-in and sign-out events.
#[derive(Default)]
pub struct SessionStore {
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that starts signed in.
    pub fn signed_in(session: Session) -> Self {
        Self {
            current: RwLock::new(Some(session)),
        }
    }

    pub fn sign_in(&self, session: Session) {
        let mut current = self.current.write().unwrap_or_else(|p| p.into_inner());
        *current = Some(session);
    }

    pub fn sign_out(&self) {
        let mut current = self.current.write().unwrap_or_else(|p| p.into_inner());
        *current = None;
    }
}

impl SessionProvider for SessionStore {
    fn current_session(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}
