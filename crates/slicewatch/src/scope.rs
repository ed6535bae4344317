#![forbid(unsafe_code)]

//! Caller-owned lifecycle scopes.
//!
//! A [`Scope`] collects teardown actions and runs them when the scope ends,
//! either explicitly through [`Scope::close`] or implicitly on drop. The
//! attach helper uses it to release source subscriptions; it knows nothing
//! about any particular UI framework lifecycle.
//!
//! # Invariants
//!
//! 1. Each deferred teardown runs exactly once.
//! 2. Teardowns run in reverse registration order.
//! 3. Deferring onto a closed scope runs the teardown immediately.
//!
//! # Failure Modes
//!
//! - **Teardown panics**: the remaining teardowns still run. The first panic
//!   is re-raised once all of them have finished, so one bad teardown cannot
//!   leave other subscriptions live.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

type Teardown = Box<dyn FnOnce()>;

/// A lifecycle scope that releases what was bound to it when it ends.
#[derive(Default)]
pub struct Scope {
    teardowns: RefCell<Vec<Teardown>>,
    closed: Cell<bool>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("pending", &self.pending())
            .field("closed", &self.closed.get())
            .finish()
    }
}

impl Scope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `teardown` to run when the scope closes.
    pub fn defer(&self, teardown: impl FnOnce() + 'static) {
        if self.closed.get() {
            teardown();
            return;
        }
        self.teardowns.borrow_mut().push(Box::new(teardown));
    }

    /// Run all pending teardowns. Later calls are no-ops.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        // Teardowns may defer onto this scope; those run immediately since
        // the scope is already marked closed.
        let pending = std::mem::take(&mut *self.teardowns.borrow_mut());
        let mut first_panic = None;
        for teardown in pending.into_iter().rev() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(teardown)) {
                first_panic.get_or_insert(payload);
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Number of teardowns waiting for the scope to close.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.teardowns.borrow().len()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.close();
    }
}
