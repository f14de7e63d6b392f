//! # Session
//!
//! Explicit sign-in state.
//!
//! There is no process-wide "current user". A `Session` value is handed to
//! every operation that mutates user data, and long-lived consumers watch a
//! `SessionContext` through a `Subscription` that stops when dropped.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::store::{StoreError, StoreResult};

/// Who is making a request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    user_id: Option<String>,
}

impl Session {
    /// A signed-out session
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    /// A signed-in session; a blank id counts as signed out
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let user_id = user_id.trim();
        Self {
            user_id: (!user_id.is_empty()).then(|| user_id.to_string()),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// The user id, or `Unauthorized` for a signed-out session
    pub fn require_user(&self) -> StoreResult<&str> {
        self.user_id().ok_or(StoreError::Unauthorized)
    }
}

/// Observable holder of the current session
pub struct SessionContext {
    tx: watch::Sender<Session>,
}

impl SessionContext {
    pub fn new(initial: Session) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Snapshot of the current session
    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        self.replace(Session::authenticated(user_id));
    }

    pub fn sign_out(&self) {
        self.replace(Session::anonymous());
    }

    fn replace(&self, session: Session) {
        self.tx.send_if_modified(|current| {
            if *current == session {
                false
            } else {
                *current = session;
                true
            }
        });
    }

    /// Receiver for callers that prefer to await changes themselves
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Call `on_change` after every session change until the subscription is dropped
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&Session) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let session = rx.borrow_and_update().clone();
                on_change(&session);
            }
            debug!("session context closed, ending subscription");
        });
        Subscription { task }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(Session::anonymous())
    }
}

/// Live session subscription; unsubscribes on drop
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop receiving changes
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
