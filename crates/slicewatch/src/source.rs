#![forbid(unsafe_code)]

//! Push-based snapshot sources.
//!
//! A [`SnapshotSource`] is anything that can hand successive state snapshots to
//! a registered callback. The engine never pulls from a source; it only needs a
//! callback slot and a way to give that slot back.
//!
//! [`SnapshotChannel`] is the in-crate implementation: a single-threaded,
//! reference-counted fan-out channel. A channel built with
//! [`SnapshotChannel::with_replay`] keeps its latest value and hands it to
//! each new subscriber from inside `subscribe`.
//!
//! # Invariants
//!
//! 1. Subscribers receive values in the order they were published.
//! 2. Within one publish, subscribers are called in subscription order.
//! 3. A subscriber released during a publish receives no further values, not
//!    even the one currently being delivered, if it has not been reached yet.
//! 4. Subscription ids are never reused by the same channel.
//! 5. A replaying channel delivers its latest value, if any, to a new
//!    subscriber exactly once, before `subscribe` returns.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::SourceError;

/// Opaque handle returned by [`SnapshotSource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// A host-provided push source of state snapshots.
pub trait SnapshotSource<S> {
    /// Register `callback` to be invoked with every value produced from now on.
    fn subscribe(&self, callback: Box<dyn FnMut(S)>) -> SubscriptionId;

    /// Release a subscription previously returned by [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::UnknownSubscription`] if `id` was never issued by
    /// this source or has already been released.
    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SourceError>;
}

type Callback<S> = Rc<RefCell<Box<dyn FnMut(S)>>>;

struct ChannelInner<S> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback<S>)>,
    published: u64,
    /// Latest published value; only kept by replaying channels.
    latest: Option<S>,
    replay: bool,
}

impl<S> ChannelInner<S> {
    fn is_live(&self, id: SubscriptionId) -> bool {
        self.subscribers.iter().any(|(sub, _)| *sub == id)
    }
}

/// Single-threaded fan-out channel of state snapshots.
///
/// Cloning a `SnapshotChannel` creates a new handle to the **same** channel.
pub struct SnapshotChannel<S> {
    inner: Rc<RefCell<ChannelInner<S>>>,
}

impl<S> Clone for SnapshotChannel<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S> Default for SnapshotChannel<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for SnapshotChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SnapshotChannel")
            .field("subscribers", &inner.subscribers.len())
            .field("published", &inner.published)
            .field("replay", &inner.replay)
            .finish()
    }
}

impl<S> SnapshotChannel<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::build(false)
    }

    /// A channel that replays its latest value to each new subscriber.
    #[must_use]
    pub fn with_replay() -> Self {
        Self::build(true)
    }

    fn build(replay: bool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ChannelInner {
                next_id: 1,
                subscribers: Vec::new(),
                published: 0,
                latest: None,
                replay,
            })),
        }
    }

    #[must_use]
    pub fn is_replaying(&self) -> bool {
        self.inner.borrow().replay
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Total number of values published so far.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.inner.borrow().published
    }
}

impl<S: Clone> SnapshotChannel<S> {
    /// Deliver `value` to every live subscriber.
    ///
    /// Subscribers may subscribe or unsubscribe from inside their callback.
    /// Subscribers added during a publish first see the next value.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber publishes to the same channel from inside its
    /// own callback (re-entrant borrow of that subscriber).
    pub fn publish(&self, value: S) {
        let targets: Vec<(SubscriptionId, Callback<S>)> = {
            let mut inner = self.inner.borrow_mut();
            inner.published += 1;
            if inner.replay {
                inner.latest = Some(value.clone());
            }
            inner
                .subscribers
                .iter()
                .map(|(id, cb)| (*id, Rc::clone(cb)))
                .collect()
        };

        for (id, callback) in targets {
            if !self.inner.borrow().is_live(id) {
                continue;
            }
            (&mut *callback.borrow_mut())(value.clone());
        }
    }

    /// The value a replaying channel would hand to a new subscriber.
    #[must_use]
    pub fn latest(&self) -> Option<S> {
        self.inner.borrow().latest.clone()
    }
}

impl<S: Clone> SnapshotSource<S> for SnapshotChannel<S> {
    fn subscribe(&self, callback: Box<dyn FnMut(S)>) -> SubscriptionId {
        let callback: Callback<S> = Rc::new(RefCell::new(callback));
        let (id, replayed) = {
            let mut inner = self.inner.borrow_mut();
            let id = SubscriptionId::new(inner.next_id);
            inner.next_id += 1;
            inner.subscribers.push((id, Rc::clone(&callback)));
            (id, inner.latest.clone())
        };
        if let Some(value) = replayed {
            (&mut *callback.borrow_mut())(value);
        }
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SourceError> {
        let mut inner = self.inner.borrow_mut();
        let pos = inner
            .subscribers
            .iter()
            .position(|(sub, _)| *sub == id)
            .ok_or(SourceError::UnknownSubscription(id))?;
        inner.subscribers.remove(pos);
        Ok(())
    }
}
