//! Scope factories: create a group of cells and bundle their disposal.
//!
//! A scope runs a factory under a hook that collects every cell the factory
//! creates, then owns their collective teardown. Disposal is LIFO, so cells
//! that subscribe to earlier cells go down first.
//!
//! Two deferred-disposal affordances make speculative creation cheap for
//! hosts that may immediately recreate a scope:
//!
//! - debug builds sweep a scope nobody [`commit`](Scope::commit)ted at the
//!   next [`tick`](crate::runtime::tick);
//! - [`Scope::schedule_dispose`] defers teardown by one tick and is
//!   cancelled by a `commit` inside the window, making remount cycles
//!   idempotent.
//!
//! # Example
//!
//! ```ignore
//! let handle = scope(|| {
//!     let count = Signal::new(0);
//!     let reader = count.clone();
//!     let doubled = Derived::new(move |_| reader.get() * 2);
//!     (count, doubled)
//! });
//! handle.commit();
//!
//! // later
//! handle.dispose(); // doubled goes down first, then count
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::hooks::{self, Hooks};
use crate::node::Disposer;
use crate::runtime;

/// A factory-bounded group of cells sharing a disposal lifetime.
pub struct Scope<R> {
    inner: Rc<ScopeInner>,
    result: R,
}

struct ScopeInner {
    owned: RefCell<Vec<Disposer>>,
    disposed: Cell<bool>,
    committed: Cell<bool>,
    dispose_generation: Cell<u64>,
}

impl ScopeInner {
    fn teardown(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let owned: Vec<_> = self.owned.borrow_mut().drain(..).collect();
        for cell in owned.iter().rev() {
            cell.dispose();
        }
    }
}

/// Run `factory` and bundle every cell it creates into a [`Scope`].
pub fn scope<R>(factory: impl FnOnce() -> R) -> Scope<R> {
    Scope::new(factory)
}

impl<R> Scope<R> {
    pub fn new(factory: impl FnOnce() -> R) -> Self {
        match Self::try_new(|| Ok::<R, std::convert::Infallible>(factory())) {
            Ok(scope) => scope,
            Err(never) => match never {},
        }
    }

    /// Run a fallible factory. On `Err`, everything it created before
    /// failing is disposed immediately and the error propagates; no scope
    /// is built. The same sweep runs if the factory panics.
    pub fn try_new<E>(factory: impl FnOnce() -> Result<R, E>) -> Result<Self, E> {
        let collected: Rc<RefCell<Vec<Disposer>>> = Rc::new(RefCell::new(Vec::new()));

        struct Sweep {
            collected: Rc<RefCell<Vec<Disposer>>>,
            armed: bool,
        }
        impl Drop for Sweep {
            fn drop(&mut self) {
                if !self.armed {
                    return;
                }
                let owned: Vec<_> = self.collected.borrow_mut().drain(..).collect();
                for cell in owned.iter().rev() {
                    cell.dispose();
                }
            }
        }

        let mut sweep = Sweep {
            collected: Rc::clone(&collected),
            armed: true,
        };

        let sink = Rc::clone(&collected);
        let outcome = hooks::with_hooks(
            move |prior| {
                let forward = prior.on_create.clone();
                Hooks {
                    on_create: Some(Rc::new(move |info, disposer| {
                        sink.borrow_mut().push(disposer.clone());
                        if let Some(f) = &forward {
                            f(info, disposer);
                        }
                    })),
                    ..prior
                }
            },
            factory,
        );

        match outcome {
            Ok(result) => {
                sweep.armed = false;
                let inner = Rc::new(ScopeInner {
                    owned: RefCell::new(collected.borrow_mut().drain(..).collect()),
                    disposed: Cell::new(false),
                    committed: Cell::new(false),
                    dispose_generation: Cell::new(0),
                });
                #[cfg(debug_assertions)]
                {
                    // Orphan sweep: a scope no caller committed is torn down
                    // at the next tick. Catches adapters that invoke a
                    // factory twice and keep only one result.
                    let probe = Rc::clone(&inner);
                    runtime::defer(move || {
                        if !probe.committed.get() && !probe.disposed.get() {
                            tracing::debug!("disposing uncommitted scope");
                            probe.teardown();
                        }
                    });
                }
                Ok(Scope { inner, result })
            }
            Err(err) => Err(err),
        }
    }

    /// The factory's return value.
    pub fn result(&self) -> &R {
        &self.result
    }

    /// Keep the scope: cancels the orphan sweep and any scheduled disposal
    /// that has not fired yet.
    pub fn commit(&self) {
        self.inner.committed.set(true);
        self.inner
            .dispose_generation
            .set(self.inner.dispose_generation.get() + 1);
    }

    /// Dispose at the next tick unless [`Scope::commit`] runs first.
    pub fn schedule_dispose(&self) {
        let generation = self.inner.dispose_generation.get() + 1;
        self.inner.dispose_generation.set(generation);
        let probe = Rc::clone(&self.inner);
        runtime::defer(move || {
            if probe.dispose_generation.get() == generation && !probe.disposed.get() {
                probe.teardown();
            }
        });
    }

    /// Dispose now: every collected cell goes down, most recent first.
    /// Idempotent.
    pub fn dispose(&self) {
        self.inner.teardown();
    }

    pub fn disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived::Derived;
    use crate::error::CellError;
    use crate::node::{Readable, Writable};
    use crate::runtime::tick;
    use crate::signal::Signal;

    #[test]
    fn scope_disposal_is_lifo_and_silences_the_group() {
        let runs = Rc::new(Cell::new(0));

        let counter = Rc::clone(&runs);
        let handle = scope(move || {
            let source = Signal::new(0);
            let reader = source.clone();
            let doubled = Derived::new(move |_| {
                counter.set(counter.get() + 1);
                reader.get() * 2
            });
            let _sub = doubled.on(|| {});
            (source, doubled)
        });
        handle.commit();
        assert_eq!(runs.get(), 1);

        let (source, doubled) = handle.result().clone();
        handle.dispose();
        assert!(source.disposed());
        assert!(doubled.disposed());

        // Writes to a captured reference are no-ops and never reach the
        // derived computation.
        source.set(10);
        assert_eq!(runs.get(), 1);
        assert_eq!(doubled.get(), 0);
    }

    #[test]
    fn dispose_order_is_reverse_creation_order() {
        let order = Rc::new(RefCell::new(Vec::new()));

        let handle = scope(|| {
            let first = Signal::new(1);
            let second = Signal::new(2);
            let log = Rc::clone(&order);
            first.on_dispose(move || log.borrow_mut().push("first"));
            let log = Rc::clone(&order);
            second.on_dispose(move || log.borrow_mut().push("second"));
            (first, second)
        });
        handle.commit();
        handle.dispose();
        handle.dispose(); // idempotent

        assert_eq!(*order.borrow(), vec!["second", "first"]);
    }

    #[test]
    fn a_failing_factory_disposes_what_it_created() {
        let leaked: Rc<RefCell<Option<Signal<i32>>>> = Rc::new(RefCell::new(None));

        let sink = Rc::clone(&leaked);
        let outcome: Result<Scope<()>, CellError> = Scope::try_new(move || {
            let cell = Signal::new(1);
            *sink.borrow_mut() = Some(cell);
            Err(CellError::compute("factory", "boom"))
        });

        assert!(outcome.is_err());
        assert!(leaked.borrow().as_ref().unwrap().disposed());
    }

    #[cfg(debug_assertions)]
    #[test]
    fn uncommitted_scopes_are_swept_at_the_next_tick() {
        let handle = scope(|| Signal::new(1));
        let cell = handle.result().clone();

        tick();
        assert!(handle.disposed());
        assert!(cell.disposed());
    }

    #[test]
    fn committed_scopes_survive_the_tick() {
        let handle = scope(|| Signal::new(1));
        handle.commit();

        tick();
        assert!(!handle.disposed());
        assert!(!handle.result().disposed());
    }

    #[test]
    fn scheduled_disposal_fires_one_tick_later() {
        let handle = scope(|| Signal::new(1));
        handle.commit();

        handle.schedule_dispose();
        assert!(!handle.disposed());
        tick();
        assert!(handle.disposed());
    }

    #[test]
    fn recommit_inside_the_window_cancels_scheduled_disposal() {
        let handle = scope(|| Signal::new(1));
        handle.commit();

        handle.schedule_dispose();
        handle.commit();
        tick();
        assert!(!handle.disposed());
    }
}
