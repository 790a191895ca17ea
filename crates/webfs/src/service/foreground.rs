//! Foreground thread identity.
//!
//! Mounting and unmounting belong to the foreground (UI) thread; inline
//! fetches must stay off it so they never block the UI.

use std::thread::{self, ThreadId};

use crate::error::{WebFsError, WebFsResult};

/// The thread that owns the volume list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForegroundContext {
    thread: ThreadId,
}

impl ForegroundContext {
    /// Treat the calling thread as the foreground.
    pub fn current() -> Self {
        Self {
            thread: thread::current().id(),
        }
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread
    }

    /// Fail unless called on the foreground thread.
    pub fn require(&self, what: &'static str) -> WebFsResult<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(WebFsError::WrongThread(what))
        }
    }

    /// Fail when called on the foreground thread.
    pub fn forbid(&self, what: &'static str) -> WebFsResult<()> {
        if self.is_current() {
            Err(WebFsError::WrongThread(what))
        } else {
            Ok(())
        }
    }
}
