//! Shared cell plumbing: identifiers, subscriber slots, dependency edges,
//! and the read/write trait seams that operators and lenses build on.

use std::cell::RefCell;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use crate::error::CellError;
use crate::hooks::{self, CellInfo};
use crate::runtime;

// ============================================================================
// Identity
// ============================================================================

/// Unique identifier for a cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct CellId(pub(crate) u64);

impl CellId {
    /// Allocate a fresh id.
    ///
    /// Cell types implemented outside this crate (lenses, operator outputs
    /// with their own identity) use this to mint a diagnostic identity
    /// before announcing themselves through the hook record.
    pub fn allocate() -> Self {
        runtime::next_id()
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What kind of cell an id belongs to, for instrumentation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CellKind {
    Source,
    Derived,
    Effect,
    Lens,
}

// ============================================================================
// Internal graph views
// ============================================================================

/// Dependency edge from a reader cell to one of its dependencies.
///
/// Edges hold `Weak` handles: the reader's compute closure owns strong
/// handles to everything it reads, so an edge can only dangle once the
/// reader itself is gone.
#[derive(Clone)]
pub(crate) struct Edge {
    pub dep: Weak<dyn AnyCell>,
    pub dep_id: CellId,
    pub seen_version: u64,
}

/// Erased view of a cell, used for edge registration and verification.
pub(crate) trait AnyCell {
    fn id(&self) -> CellId;
    fn version(&self) -> u64;
    fn is_disposed(&self) -> bool;
    /// Recompute if stale. Never registers tracking edges.
    fn ensure_fresh(&self);
    fn add_dependent(&self, reader: CellId);
    fn remove_dependent(&self, reader: CellId);
}

/// A cell that reacts to upstream version bumps.
pub(crate) trait Dependent {
    /// Mark stale, continue the invalidation wave through this cell's own
    /// dependents, and enqueue a verification job when the cell is live
    /// (eager, or observed by subscribers).
    fn mark_stale(&self);
    /// Run a queued verification: refresh if a dependency actually moved.
    fn verify(&self);
}

// ============================================================================
// Subscribers
// ============================================================================

/// Slot-based listener list. Subscription order is the slot order; detaching
/// clears a slot without shifting the others.
pub(crate) struct Listeners {
    slots: RefCell<Vec<Option<Rc<dyn Fn()>>>>,
}

impl Listeners {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            slots: RefCell::new(Vec::new()),
        })
    }

    pub fn add(&self, listener: Rc<dyn Fn()>) -> usize {
        let mut slots = self.slots.borrow_mut();
        slots.push(Some(listener));
        slots.len() - 1
    }

    /// Clear one slot. Returns false when the slot was already empty.
    pub fn remove(&self, slot: usize) -> bool {
        let mut slots = self.slots.borrow_mut();
        match slots.get_mut(slot) {
            Some(entry) => entry.take().is_some(),
            None => false,
        }
    }

    pub fn clear(&self) {
        self.slots.borrow_mut().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().iter().all(Option::is_none)
    }

    /// Deliver one notification to every listener attached right now, in
    /// subscription order. A panicking listener does not stop its siblings;
    /// the first panic per delivery is reported through the hook record.
    pub fn notify(&self, info: &CellInfo) {
        let snapshot: Vec<Rc<dyn Fn()>> =
            self.slots.borrow().iter().flatten().cloned().collect();
        let mut reported = false;
        for listener in snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener())) {
                if !reported {
                    reported = true;
                    let message = panic_message(&panic);
                    tracing::error!(cell = %info.name, %message, "subscriber panicked");
                    hooks::emit_error(info, &CellError::compute(&*info.name, &message));
                }
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("panic of unknown type")
    }
}

/// Handle returned by `on`. Call [`Subscription::unsubscribe`] to detach the
/// listener; dropping the handle leaves the listener attached (matching the
/// rest of the kernel, where nothing is torn down implicitly on drop).
pub struct Subscription {
    detach: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(detach: impl FnOnce() + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription that was never attached (listener added to a disposed
    /// cell). Unsubscribing it is a no-op.
    pub(crate) fn detached() -> Self {
        Self { detach: None }
    }

    /// Detach the listener. Consumes the handle, so exactly one registration
    /// is removed exactly once.
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

// ============================================================================
// Disposal handles
// ============================================================================

/// Type-erased disposal handle for a cell, used by scopes and by owner
/// cells that cascade disposal to the children they created.
#[derive(Clone)]
pub struct Disposer {
    run: Rc<dyn Fn()>,
    query: Rc<dyn Fn() -> bool>,
}

impl Disposer {
    pub fn new(dispose: impl Fn() + 'static, disposed: impl Fn() -> bool + 'static) -> Self {
        Self {
            run: Rc::new(dispose),
            query: Rc::new(disposed),
        }
    }

    /// Erase any readable cell into a disposal handle.
    pub fn of<C: Readable>(cell: &C) -> Self {
        let target = cell.clone();
        let probe = cell.clone();
        Self::new(move || target.dispose(), move || probe.disposed())
    }

    pub fn dispose(&self) {
        (self.run)();
    }

    pub fn disposed(&self) -> bool {
        (self.query)()
    }
}

// ============================================================================
// Read / write seams
// ============================================================================

/// The readable face of a cell.
///
/// Handles are cheap clones (`Rc` inside); cloning shares the same cell.
pub trait Readable: Clone + 'static {
    type Value: Clone + 'static;

    /// Read the current value by reference. Registers a dependency edge when
    /// called during another cell's computation.
    ///
    /// Panics if the cell holds a stored computation error; use
    /// [`Readable::try_get`] to observe errors.
    fn with<R>(&self, f: impl FnOnce(&Self::Value) -> R) -> R;

    /// Clone out the current value.
    fn get(&self) -> Self::Value {
        self.with(Self::Value::clone)
    }

    /// Like [`Readable::get`], but surfaces a stored computation error
    /// instead of panicking.
    fn try_get(&self) -> Result<Self::Value, CellError> {
        Ok(self.get())
    }

    /// Subscribe a listener, called after each change to this cell's value.
    fn on(&self, listener: impl Fn() + 'static) -> Subscription;

    /// Tear the cell down. Idempotent.
    fn dispose(&self);

    fn disposed(&self) -> bool;

    /// Diagnostic label.
    fn display_name(&self) -> Rc<str>;
}

/// The writable face of a cell (sources and lenses).
pub trait Writable: Readable {
    /// Write a value. Fails on disposed cells and on rejected validations.
    fn try_set(&self, value: Self::Value) -> Result<(), CellError>;

    /// Write a value. Failures are reported through the hook record and
    /// otherwise dropped.
    fn set(&self, value: Self::Value) {
        let _ = self.try_set(value);
    }

    /// Update through a closure over the current value.
    fn update(&self, f: impl FnOnce(&mut Self::Value)) {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn listeners_fire_in_subscription_order() {
        let listeners = Listeners::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            listeners.add(Rc::new(move || log.borrow_mut().push(tag)));
        }

        let info = CellInfo {
            id: CellId(0),
            name: Rc::from("test"),
            kind: CellKind::Source,
        };
        listeners.notify(&info);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn removing_a_slot_is_idempotent() {
        let listeners = Listeners::new();
        let slot = listeners.add(Rc::new(|| {}));
        assert!(listeners.remove(slot));
        assert!(!listeners.remove(slot));
        assert!(listeners.is_empty());
    }

    #[test]
    fn a_panicking_listener_does_not_starve_siblings() {
        let listeners = Listeners::new();
        let ran = Rc::new(Cell::new(false));

        listeners.add(Rc::new(|| panic!("boom")));
        let ran_probe = Rc::clone(&ran);
        listeners.add(Rc::new(move || ran_probe.set(true)));

        let info = CellInfo {
            id: CellId(0),
            name: Rc::from("test"),
            kind: CellKind::Source,
        };
        listeners.notify(&info);
        assert!(ran.get());
    }
}
