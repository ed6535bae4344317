#![forbid(unsafe_code)]

//! Wiring a [`DiffEngine`] to a push source for the lifetime of a [`Scope`].
//!
//! [`SharedDiffEngine<S>`] is a reference-counted handle to an engine. Its
//! [`attach_to`](SharedDiffEngine::attach_to) subscribes a forwarding callback
//! on a [`SnapshotSource`] that ingests every delivered value, and defers the
//! matching unsubscribe onto the scope.
//!
//! The forwarding callback holds a `Weak` reference. Once every handle is
//! dropped, values the source still delivers are ignored.
//!
//! A source may deliver its current value from inside `subscribe` (see
//! [`SnapshotChannel::with_replay`](crate::SnapshotChannel::with_replay)).
//! That value primes the engine, so observers must be registered before the
//! engine is attached. [`DiffEngine::attach`] consumes a configured engine for
//! this reason.
//!
//! # Failure Modes
//!
//! - **Forwarded ingestion fails**: the source callback has nowhere to return
//!   an error, so the failure is logged at WARN and kept until
//!   [`take_last_error`](SharedDiffEngine::take_last_error) is called.
//! - **Re-entrant access**: a callback running inside a forwarded ingestion
//!   must not call back into the same handle. The engine is mutably borrowed
//!   at that point and the call panics.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::engine::{DiffEngine, Ingestion};
use crate::error::{BoxError, DiffError, Result};
use crate::scope::Scope;
use crate::source::{SnapshotSource, SubscriptionId};

struct Shared<S> {
    engine: RefCell<DiffEngine<S>>,
    last_error: RefCell<Option<DiffError>>,
}

impl<S> Shared<S> {
    fn forward(&self, state: S) {
        let result = self.engine.borrow_mut().ingest(state);
        if let Err(err) = result {
            tracing::warn!(
                message = "slicewatch.forward_failed",
                error = %err,
                failed = ?err.failed_indices()
            );
            *self.last_error.borrow_mut() = Some(err);
        }
    }
}

/// Shared handle to a [`DiffEngine`].
///
/// Cloning a `SharedDiffEngine` creates a new handle to the **same** engine.
pub struct SharedDiffEngine<S> {
    inner: Rc<Shared<S>>,
}

impl<S> Clone for SharedDiffEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for SharedDiffEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDiffEngine")
            .field("engine", &*self.inner.engine.borrow())
            .field("has_error", &self.inner.last_error.borrow().is_some())
            .finish()
    }
}

impl<S> From<DiffEngine<S>> for SharedDiffEngine<S> {
    fn from(engine: DiffEngine<S>) -> Self {
        Self::new(engine)
    }
}

impl<S> SharedDiffEngine<S> {
    #[must_use]
    pub fn new(engine: DiffEngine<S>) -> Self {
        Self {
            inner: Rc::new(Shared {
                engine: RefCell::new(engine),
                last_error: RefCell::new(None),
            }),
        }
    }

    /// Ingest a snapshot directly, bypassing any source.
    ///
    /// # Errors
    ///
    /// See [`DiffEngine::ingest`].
    pub fn ingest(&self, state: S) -> Result<Ingestion> {
        self.inner.engine.borrow_mut().ingest(state)
    }

    /// Run `f` with shared access to the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&DiffEngine<S>) -> R) -> R {
        f(&self.inner.engine.borrow())
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.engine.borrow().generation()
    }

    #[must_use]
    pub fn is_primed(&self) -> bool {
        self.inner.engine.borrow().is_primed()
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.engine.borrow().observer_count()
    }

    /// The error from the most recent failed forwarded ingestion, if any.
    pub fn take_last_error(&self) -> Option<DiffError> {
        self.inner.last_error.borrow_mut().take()
    }

    fn downgrade(&self) -> Weak<Shared<S>> {
        Rc::downgrade(&self.inner)
    }
}

impl<S: 'static> SharedDiffEngine<S> {
    /// Register an observer. See [`DiffEngine::register`].
    pub fn register<T, F, C>(&self, selector: F, on_change: C) -> &Self
    where
        T: PartialEq + 'static,
        F: Fn(&S) -> T + 'static,
        C: FnMut(T) + 'static,
    {
        self.inner.engine.borrow_mut().register(selector, on_change);
        self
    }

    /// Register a fallible observer. See [`DiffEngine::try_register`].
    pub fn try_register<T, E, F, C>(&self, selector: F, on_change: C) -> &Self
    where
        T: PartialEq + 'static,
        E: Into<BoxError>,
        F: Fn(&S) -> T + 'static,
        C: FnMut(T) -> Result<(), E> + 'static,
    {
        self.inner.engine.borrow_mut().try_register(selector, on_change);
        self
    }

    /// By-value form of [`register`](Self::register) for builder chains.
    #[must_use]
    pub fn with_observer<T, F, C>(self, selector: F, on_change: C) -> Self
    where
        T: PartialEq + 'static,
        F: Fn(&S) -> T + 'static,
        C: FnMut(T) + 'static,
    {
        self.register(selector, on_change);
        self
    }

    /// Forward every value `source` delivers into this engine until `scope`
    /// closes.
    ///
    /// If `scope` is already closed the subscription is released before this
    /// returns. A replaying source delivers its current value before this
    /// returns.
    pub fn attach_to<Src>(&self, source: &Src, scope: &Scope) -> SubscriptionId
    where
        Src: SnapshotSource<S> + Clone + 'static,
    {
        let weak = self.downgrade();
        let id = source.subscribe(Box::new(move |state| {
            if let Some(shared) = weak.upgrade() {
                shared.forward(state);
            }
        }));
        tracing::debug!(message = "slicewatch.attach", subscription = %id);

        let source = source.clone();
        scope.defer(move || match source.unsubscribe(id) {
            Ok(()) => tracing::debug!(message = "slicewatch.detach", subscription = %id),
            Err(err) => tracing::debug!(
                message = "slicewatch.detach_skipped",
                subscription = %id,
                error = %err
            ),
        });
        id
    }
}

impl<S: 'static> DiffEngine<S> {
    /// Feed this engine from `source` for the lifetime of `scope`.
    ///
    /// Register observers before attaching: the first value the source
    /// delivers, possibly during this call, fires every observer registered
    /// at that point and no others.
    pub fn attach<Src>(self, source: &Src, scope: &Scope) -> SharedDiffEngine<S>
    where
        Src: SnapshotSource<S> + Clone + 'static,
    {
        let shared = SharedDiffEngine::new(self);
        shared.attach_to(source, scope);
        shared
    }

    /// Move this engine behind a shared handle.
    #[must_use]
    pub fn into_shared(self) -> SharedDiffEngine<S> {
        SharedDiffEngine::new(self)
    }
}
