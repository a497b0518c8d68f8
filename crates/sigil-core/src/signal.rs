//! Source cells: directly-assigned reactive values.
//!
//! A [`Signal`] is the writable leaf of the cell graph. Reading it inside a
//! derived computation registers a dependency edge; writing it bumps its
//! version and queues exactly one notification per logical change. Writes
//! that compare equal under the cell's equality policy are complete no-ops.
//!
//! # Example
//!
//! ```ignore
//! let count = Signal::new(0);
//!
//! let sub = count.on(|| println!("changed"));
//! count.set(1);          // prints "changed"
//! count.set(1);          // equal write: nothing happens
//! count.update(|n| *n += 1);
//! sub.unsubscribe();
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::CellError;
use crate::hooks::{self, CellInfo};
use crate::node::{
    AnyCell, CellId, CellKind, Disposer, Listeners, Readable, Subscription, Writable,
};
use crate::options::CellOptions;
use crate::runtime;

/// A writable source cell.
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

pub(crate) struct SignalInner<T> {
    info: CellInfo,
    value: RefCell<T>,
    version: Cell<u64>,
    equals: crate::equality::Equality<T>,
    disposed: Cell<bool>,
    listeners: Rc<Listeners>,
    dependents: RefCell<Vec<CellId>>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl<T: Clone + 'static> Signal<T> {
    /// Create a source cell gated by `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(value, CellOptions::new())
    }

    /// Create a source cell with explicit options (name, equality policy).
    pub fn with_options(value: T, options: CellOptions<T>) -> Self {
        let id = runtime::next_id();
        let name = options.name.unwrap_or_else(|| format!("signal{id}"));
        let inner = Rc::new(SignalInner {
            info: CellInfo {
                id,
                name: Rc::from(name.as_str()),
                kind: CellKind::Source,
            },
            value: RefCell::new(value),
            version: Cell::new(1),
            equals: options.equals,
            disposed: Cell::new(false),
            listeners: Listeners::new(),
            dependents: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
        });
        let signal = Self { inner };
        let disposer = Disposer::of(&signal);
        hooks::emit_create(&signal.inner.info, &disposer);
        runtime::adopt(disposer);
        signal
    }

    /// A read-only view over the same cell.
    pub fn read_only(&self) -> ReadOnly<T> {
        ReadOnly {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Register a callback to run when this cell is disposed, most recent
    /// first. Runs immediately if the cell is already disposed.
    pub fn on_dispose(&self, f: impl FnOnce() + 'static) {
        if self.inner.disposed.get() {
            f();
        } else {
            self.inner.cleanups.borrow_mut().push(Box::new(f));
        }
    }
}

impl<T: Clone + 'static> SignalInner<T> {
    fn read<R>(this: &Rc<Self>, f: impl FnOnce(&T) -> R) -> R {
        hooks::emit_before_read(&this.info);
        let erased: Rc<dyn AnyCell> = this.clone() as Rc<dyn AnyCell>;
        if let Some(reader) = runtime::track_read(erased) {
            this.add_dependent(reader);
        }
        let out = f(&this.value.borrow());
        hooks::emit_after_read(&this.info);
        out
    }

    fn write(&self, next: T) -> Result<(), CellError> {
        if self.disposed.get() {
            tracing::warn!(cell = %self.info.name, "write to disposed cell ignored");
            let err = CellError::Disposed(self.info.name.clone());
            hooks::emit_error(&self.info, &err);
            return Err(err);
        }
        let unchanged = {
            let current = self.value.borrow();
            self.equals.eq(&current, &next)
        };
        if unchanged {
            return Ok(());
        }
        *self.value.borrow_mut() = next;
        self.version.set(self.version.get() + 1);
        runtime::enqueue_notify(self.info.clone(), Rc::clone(&self.listeners));
        let dependents = self.dependents.borrow().clone();
        runtime::propagate_stale(dependents);
        runtime::flush_if_idle();
        Ok(())
    }

    fn teardown(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let cleanups: Vec<_> = self.cleanups.borrow_mut().drain(..).collect();
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
        self.listeners.clear();
        self.dependents.borrow_mut().clear();
        hooks::emit_dispose(&self.info);
    }

    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Subscription {
        if self.disposed.get() {
            return Subscription::detached();
        }
        let slot = self.listeners.add(listener);
        let listeners = Rc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(list) = listeners.upgrade() {
                list.remove(slot);
            }
        })
    }
}

impl<T: Clone + 'static> AnyCell for SignalInner<T> {
    fn id(&self) -> CellId {
        self.info.id
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn ensure_fresh(&self) {}

    fn add_dependent(&self, reader: CellId) {
        let mut dependents = self.dependents.borrow_mut();
        if !dependents.contains(&reader) {
            dependents.push(reader);
        }
    }

    fn remove_dependent(&self, reader: CellId) {
        self.dependents.borrow_mut().retain(|d| *d != reader);
    }
}

impl<T: Clone + 'static> Readable for Signal<T> {
    type Value = T;

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        SignalInner::read(&self.inner, f)
    }

    fn on(&self, listener: impl Fn() + 'static) -> Subscription {
        self.inner.subscribe(Rc::new(listener))
    }

    fn dispose(&self) {
        self.inner.teardown();
    }

    fn disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    fn display_name(&self) -> Rc<str> {
        self.inner.info.name.clone()
    }
}

impl<T: Clone + 'static> Writable for Signal<T> {
    fn try_set(&self, value: T) -> Result<(), CellError> {
        self.inner.write(value)
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.inner.info.name)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

impl<T: fmt::Display> fmt::Display for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner.value.borrow(), f)
    }
}

/// Read-only view over a source cell. Used as the output type of the
/// emission-gating operators, which drive their output internally but must
/// not expose `set`.
pub struct ReadOnly<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T: Clone + 'static> Readable for ReadOnly<T> {
    type Value = T;

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        SignalInner::read(&self.inner, f)
    }

    fn on(&self, listener: impl Fn() + 'static) -> Subscription {
        self.inner.subscribe(Rc::new(listener))
    }

    fn dispose(&self) {
        self.inner.teardown();
    }

    fn disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    fn display_name(&self) -> Rc<str> {
        self.inner.info.name.clone()
    }
}

impl<T> Clone for ReadOnly<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadOnly<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnly")
            .field("name", &self.inner.info.name)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}
