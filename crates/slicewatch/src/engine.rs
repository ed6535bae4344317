#![forbid(unsafe_code)]

//! The per-slice diffing engine.
//!
//! # Design
//!
//! [`DiffEngine<S>`] keeps the last ingested snapshot and an ordered list of
//! observers. Each observer pairs a selector (`&S -> T`) with a change
//! callback (`T -> ()`). On every [`ingest`](DiffEngine::ingest) the selector
//! runs against the new snapshot and, once primed, against the prior one; the
//! callback fires only when the two slices differ.
//!
//! Observers of different slice types live in one `Vec` behind the
//! [`ObserverSlot`] trait. The link between a selector's output type and its
//! callback's input type is checked at registration and erased afterwards.
//!
//! "No value" slices are modelled as `Option<T>`. Its `PartialEq` makes two
//! `None`s equal and a `None` unequal to any `Some`, so null transitions in
//! both directions count as changes.
//!
//! # Invariants
//!
//! 1. No callback runs outside of `ingest`.
//! 2. The first `ingest` fires every observer it reaches, whatever the
//!    selected value.
//! 3. Observers are evaluated in registration order, one at a time.
//! 4. After the n-th successful ingestion the prior snapshot is exactly the
//!    n-th snapshot and `generation() == n`.
//! 5. Observers registered later are evaluated from the next ingestion on,
//!    never retroactively.
//!
//! # Failure Modes
//!
//! - **Selector or callback panics**: the panic unwinds out of `ingest`.
//!   Observers later in registration order are not evaluated and the prior
//!   snapshot is not replaced. Callbacks that already ran are not undone.
//! - **Fallible callback returns `Err`**: handled per [`FailurePolicy`]. The
//!   prior snapshot is not replaced in either policy.

use std::fmt;
use std::marker::PhantomData;

use crate::error::{BoxError, DiffError, ObserverFailure, Result};

/// What `ingest` does when a fallible callback reports an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failing observer and return its error.
    #[default]
    AbortOnFirst,
    /// Evaluate every observer, then report all failures together.
    CollectAll,
}

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Name recorded on the ingestion span.
    pub label: Option<String>,
    pub failure_policy: FailurePolicy,
}

impl EngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// Summary of one completed ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingestion {
    /// 1-based index of this ingestion.
    pub generation: u64,
    /// Observers evaluated.
    pub evaluated: usize,
    /// Callbacks invoked.
    pub fired: usize,
    /// Whether this ingestion primed a fresh engine.
    pub first: bool,
}

/// Type-erased observer record.
trait ObserverSlot<S> {
    /// Compare the selected slice of `next` against `prior` and fire the
    /// callback on change. Returns whether the callback was invoked.
    fn diff(&mut self, prior: Option<&S>, next: &S) -> Result<bool, BoxError>;
}

struct Slice<S, T, F, C> {
    selector: F,
    on_change: C,
    _slice: PhantomData<fn(&S) -> T>,
}

impl<S, T, F, C> ObserverSlot<S> for Slice<S, T, F, C>
where
    T: PartialEq,
    F: Fn(&S) -> T,
    C: FnMut(T) -> Result<(), BoxError>,
{
    fn diff(&mut self, prior: Option<&S>, next: &S) -> Result<bool, BoxError> {
        let new_value = (self.selector)(next);
        let changed = match prior {
            None => true,
            Some(prior) => (self.selector)(prior) != new_value,
        };
        if changed {
            (self.on_change)(new_value)?;
        }
        Ok(changed)
    }
}

/// Holds the prior snapshot and dispatches per-slice change callbacks.
///
/// The engine is single-threaded and not `Sync`; the host must serialize all
/// calls to [`register`](Self::register) and [`ingest`](Self::ingest).
pub struct DiffEngine<S> {
    prior: Option<S>,
    observers: Vec<Box<dyn ObserverSlot<S>>>,
    generation: u64,
    config: EngineConfig,
}

impl<S> Default for DiffEngine<S> {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

impl<S> fmt::Debug for DiffEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffEngine")
            .field("observers", &self.observers.len())
            .field("primed", &self.is_primed())
            .field("generation", &self.generation)
            .field("config", &self.config)
            .finish()
    }
}

impl<S> DiffEngine<S> {
    /// Create a fresh engine with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            prior: None,
            observers: Vec::new(),
            generation: 0,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Whether at least one snapshot has been ingested.
    #[must_use]
    pub fn is_primed(&self) -> bool {
        self.prior.is_some()
    }

    /// Number of successful ingestions so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The most recently ingested snapshot.
    #[must_use]
    pub fn prior_state(&self) -> Option<&S> {
        self.prior.as_ref()
    }

    /// Feed a new complete snapshot and fire callbacks for changed slices.
    ///
    /// On a fresh engine every observer fires. Afterwards an observer fires
    /// only if its selector yields a different value for `state` than for the
    /// prior snapshot. The prior snapshot is replaced by `state` once all
    /// observers have run, even if none fired.
    ///
    /// # Errors
    ///
    /// Returns a [`DiffError`] if a callback registered through
    /// [`try_register`](Self::try_register) fails. The prior snapshot is kept.
    /// Engines with only infallible observers never return `Err`.
    ///
    /// # Panics
    ///
    /// Panics raised by selectors or callbacks propagate unchanged.
    pub fn ingest(&mut self, state: S) -> Result<Ingestion> {
        let first = self.prior.is_none();
        let generation = self.generation + 1;
        let _span = tracing::debug_span!(
            "slicewatch.ingest",
            label = self.config.label.as_deref().unwrap_or(""),
            generation
        )
        .entered();

        let mut evaluated = 0;
        let mut fired = 0;
        let mut failures = Vec::new();

        for (index, observer) in self.observers.iter_mut().enumerate() {
            evaluated += 1;
            match observer.diff(self.prior.as_ref(), &state) {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(source) => match self.config.failure_policy {
                    FailurePolicy::AbortOnFirst => {
                        tracing::debug!(message = "slicewatch.abort", index, evaluated);
                        return Err(ObserverFailure { index, source }.into());
                    }
                    FailurePolicy::CollectAll => {
                        fired += 1;
                        failures.push(ObserverFailure { index, source });
                    }
                },
            }
        }

        if let Some(err) = DiffError::from_failures(failures) {
            tracing::debug!(message = "slicewatch.failed", evaluated, fired);
            return Err(err);
        }

        self.prior = Some(state);
        self.generation = generation;
        tracing::trace!(message = "slicewatch.ingest", generation, evaluated, fired, first);

        Ok(Ingestion {
            generation,
            evaluated,
            fired,
            first,
        })
    }
}

impl<S: 'static> DiffEngine<S> {
    /// Register an observer for the slice chosen by `selector`.
    ///
    /// Duplicates are allowed; each registration fires independently.
    pub fn register<T, F, C>(&mut self, selector: F, mut on_change: C) -> &mut Self
    where
        T: PartialEq + 'static,
        F: Fn(&S) -> T + 'static,
        C: FnMut(T) + 'static,
    {
        self.push_slot(selector, move |value| {
            on_change(value);
            Ok(())
        })
    }

    /// Register an observer whose callback may fail.
    ///
    /// A failure surfaces from [`ingest`](Self::ingest) as a [`DiffError`].
    pub fn try_register<T, E, F, C>(&mut self, selector: F, mut on_change: C) -> &mut Self
    where
        T: PartialEq + 'static,
        E: Into<BoxError>,
        F: Fn(&S) -> T + 'static,
        C: FnMut(T) -> Result<(), E> + 'static,
    {
        self.push_slot(selector, move |value| on_change(value).map_err(Into::into))
    }

    /// By-value form of [`register`](Self::register) for builder chains.
    #[must_use]
    pub fn with_observer<T, F, C>(mut self, selector: F, on_change: C) -> Self
    where
        T: PartialEq + 'static,
        F: Fn(&S) -> T + 'static,
        C: FnMut(T) + 'static,
    {
        self.register(selector, on_change);
        self
    }

    fn push_slot<T, F, C>(&mut self, selector: F, on_change: C) -> &mut Self
    where
        T: PartialEq + 'static,
        F: Fn(&S) -> T + 'static,
        C: FnMut(T) -> Result<(), BoxError> + 'static,
    {
        self.observers.push(Box::new(Slice {
            selector,
            on_change,
            _slice: PhantomData,
        }));
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
