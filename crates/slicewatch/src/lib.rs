#![forbid(unsafe_code)]

//! Per-slice change detection for single-state applications.
//!
//! A host keeps its whole state in one snapshot type `S` and pushes every new
//! snapshot into a [`DiffEngine`]. Observers subscribe to one derived value
//! (a slice) each and are called only when that slice actually changes.
//!
//! - [`DiffEngine`]: holds the prior snapshot and the ordered observers.
//! - [`SnapshotSource`] / [`SnapshotChannel`]: push sources of snapshots.
//! - [`Scope`]: caller-owned lifecycle that releases source subscriptions.
//! - [`SharedDiffEngine`]: shared handle used when an engine is attached to a
//!   source.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use slicewatch::{DiffEngine, Scope, SnapshotChannel};
//!
//! #[derive(Clone)]
//! struct State {
//!     title: String,
//!     unread: Option<u32>,
//! }
//!
//! let channel: SnapshotChannel<State> = SnapshotChannel::new();
//! let scope = Scope::new();
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! let titles = Rc::clone(&log);
//! let badges = Rc::clone(&log);
//! let _engine = DiffEngine::new()
//!     .with_observer(|s: &State| s.title.clone(), move |t| titles.borrow_mut().push(t))
//!     .with_observer(|s: &State| s.unread, move |u| badges.borrow_mut().push(format!("{u:?}")))
//!     .attach(&channel, &scope);
//!
//! channel.publish(State { title: "Inbox".into(), unread: None });
//! channel.publish(State { title: "Inbox".into(), unread: Some(3) });
//!
//! assert_eq!(*log.borrow(), vec!["Inbox", "None", "Some(3)"]);
//!
//! // Ending the scope releases the subscription.
//! drop(scope);
//! assert_eq!(channel.subscriber_count(), 0);
//! ```

pub mod attach;
pub mod engine;
pub mod error;
pub mod scope;
pub mod source;

pub use attach::SharedDiffEngine;
pub use engine::{DiffEngine, EngineConfig, FailurePolicy, Ingestion};
pub use error::{BoxError, DiffError, ObserverFailure, Result, SourceError};
pub use scope::Scope;
pub use source::{SnapshotChannel, SnapshotSource, SubscriptionId};
