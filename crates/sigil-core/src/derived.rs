//! Derived cells: memoized computations over tracked dependencies.
//!
//! A [`Derived`] holds a compute function and the value it last produced.
//! Every read a computation performs registers a dependency edge carrying
//! the version observed; the edge set is rebuilt on each run, so
//! conditional dependencies come and go correctly. Invalidation is
//! push-mark / pull-verify: an upstream version bump marks the cell stale,
//! and the next read (or the scheduler, when the cell is observed) verifies
//! whether a dependency actually moved before recomputing.
//!
//! # Example
//!
//! ```ignore
//! let price = Signal::new(12.0);
//! let count = Signal::new(2);
//!
//! // Ambient tracking: reads inside the closure become dependencies.
//! let total = Derived::new(move |_ctx| price.get() * count.get() as f64);
//! assert_eq!(total.get(), 24.0);
//!
//! // Declared dependencies: the snapshot is read before each run.
//! let label = Derived::with_deps((total.clone(),), |(total,), _ctx| {
//!     format!("{total:.2}")
//! });
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::context::{AbortSignal, Ctx};
use crate::equality::Equality;
use crate::error::CellError;
use crate::hooks::{self, CellInfo};
use crate::node::{
    AnyCell, CellId, CellKind, Dependent, Disposer, Edge, Listeners, Readable, Subscription,
};
use crate::options::CellOptions;
use crate::runtime;

pub(crate) type ComputeFn<T> = Box<dyn Fn(&Ctx) -> Result<T, CellError>>;

/// A cell whose value is produced by a compute function over its tracked
/// dependencies.
pub struct Derived<T> {
    inner: Rc<DerivedInner<T>>,
}

pub(crate) struct DerivedInner<T> {
    info: CellInfo,
    compute: ComputeFn<T>,
    value: RefCell<Option<Result<T, CellError>>>,
    version: Cell<u64>,
    equals: Equality<T>,
    stale: Cell<bool>,
    computing: Cell<bool>,
    queued: Cell<bool>,
    /// Eager cells (effects) recompute from the invalidation wave even
    /// without subscribers.
    eager: bool,
    disposed: Cell<bool>,
    listeners: Rc<Listeners>,
    dependents: RefCell<Vec<CellId>>,
    edges: RefCell<Vec<Edge>>,
    owned: RefCell<Vec<Disposer>>,
    cleanups: Rc<RefCell<Vec<Box<dyn FnOnce()>>>>,
    dispose_hooks: RefCell<Vec<Box<dyn FnOnce()>>>,
    abort: RefCell<Option<AbortSignal>>,
    weak_self: Weak<DerivedInner<T>>,
}

impl<T: Clone + 'static> Derived<T> {
    /// Create a derived cell with ambient tracking and the `PartialEq` gate.
    /// Computes immediately; pass `lazy` options to defer.
    pub fn new(f: impl Fn(&Ctx) -> T + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(f, CellOptions::new())
    }

    pub fn with_options(f: impl Fn(&Ctx) -> T + 'static, options: CellOptions<T>) -> Self {
        Self::try_with_options(move |ctx| Ok(f(ctx)), options)
    }

    /// Create a derived cell whose computation can fail. A failure is stored
    /// and re-returned by `try_get` until a later run succeeds.
    pub fn try_new(f: impl Fn(&Ctx) -> Result<T, CellError> + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::try_with_options(f, CellOptions::new())
    }

    pub fn try_with_options(
        f: impl Fn(&Ctx) -> Result<T, CellError> + 'static,
        options: CellOptions<T>,
    ) -> Self {
        Self::build(Box::new(f), options, CellKind::Derived, false)
    }

    /// Create a derived cell over a declared dependency group. The snapshot
    /// is read (and therefore tracked) before each run.
    pub fn with_deps<D, F>(deps: D, f: F) -> Self
    where
        T: PartialEq,
        D: DepGroup,
        F: Fn(&D::Snapshot, &Ctx) -> T + 'static,
    {
        Self::with_deps_options(deps, f, CellOptions::new())
    }

    pub fn with_deps_options<D, F>(deps: D, f: F, options: CellOptions<T>) -> Self
    where
        D: DepGroup,
        F: Fn(&D::Snapshot, &Ctx) -> T + 'static,
    {
        Self::with_options(
            move |ctx| {
                let snapshot = deps.snapshot();
                f(&snapshot, ctx)
            },
            options,
        )
    }

    pub(crate) fn build(
        compute: ComputeFn<T>,
        options: CellOptions<T>,
        kind: CellKind,
        eager: bool,
    ) -> Self {
        let id = runtime::next_id();
        let prefix = match kind {
            CellKind::Effect => "effect",
            _ => "derived",
        };
        let name = options.name.unwrap_or_else(|| format!("{prefix}{id}"));
        let inner = Rc::new_cyclic(|weak| DerivedInner {
            info: CellInfo {
                id,
                name: Rc::from(name.as_str()),
                kind,
            },
            compute,
            value: RefCell::new(None),
            version: Cell::new(0),
            equals: options.equals,
            stale: Cell::new(false),
            computing: Cell::new(false),
            queued: Cell::new(false),
            eager,
            disposed: Cell::new(false),
            listeners: Listeners::new(),
            dependents: RefCell::new(Vec::new()),
            edges: RefCell::new(Vec::new()),
            owned: RefCell::new(Vec::new()),
            cleanups: Rc::new(RefCell::new(Vec::new())),
            dispose_hooks: RefCell::new(Vec::new()),
            abort: RefCell::new(None),
            weak_self: weak.clone(),
        });
        let cell = Self { inner };
        let dependent: Weak<dyn Dependent> = Rc::downgrade(&(cell.inner.clone() as Rc<dyn Dependent>));
        runtime::register_dependent(id, dependent);
        let disposer = Disposer::of(&cell);
        hooks::emit_create(&cell.inner.info, &disposer);
        runtime::adopt(disposer);
        if !options.lazy {
            cell.inner.freshen();
        }
        cell
    }

    /// Register a callback to run once, when this cell is disposed (most
    /// recent first). Runs immediately if already disposed.
    pub fn on_dispose(&self, f: impl FnOnce() + 'static) {
        if self.inner.disposed.get() {
            f();
        } else {
            self.inner.dispose_hooks.borrow_mut().push(Box::new(f));
        }
    }

    /// Run the computation now, regardless of staleness.
    pub(crate) fn force(&self) {
        if self.inner.disposed.get() || self.inner.computing.get() {
            return;
        }
        self.inner.recompute();
    }
}

impl<T: Clone + 'static> DerivedInner<T> {
    fn strong(&self) -> Option<Rc<Self>> {
        self.weak_self.upgrade()
    }

    fn live(&self) -> bool {
        (self.eager && self.value.borrow().is_some()) || !self.listeners.is_empty()
    }

    fn report_cycle(&self) {
        tracing::warn!(cell = %self.info.name, "dependency cycle: cell read during its own computation");
        hooks::emit_error(&self.info, &CellError::Cycle(self.info.name.clone()));
    }

    fn try_read(&self) -> Result<T, CellError> {
        hooks::emit_before_read(&self.info);
        let out = if self.computing.get() {
            // Reentrant read: hand back the previous value, register nothing.
            self.report_cycle();
            match &*self.value.borrow() {
                Some(result) => result.clone(),
                None => Err(CellError::Cycle(self.info.name.clone())),
            }
        } else {
            self.freshen();
            if let Some(this) = self.strong() {
                let erased: Rc<dyn AnyCell> = this;
                if let Some(reader) = runtime::track_read(erased) {
                    self.add_dependent(reader);
                }
            }
            match &*self.value.borrow() {
                Some(result) => result.clone(),
                // Disposed before ever computing; nothing to hand back.
                None => Err(CellError::Disposed(self.info.name.clone())),
            }
        };
        hooks::emit_after_read(&self.info);
        out
    }

    /// Recompute if stale. Verifies edge versions first so an upstream
    /// recomputation that produced an equal value costs nothing here.
    fn freshen(&self) {
        if self.disposed.get() || self.computing.get() {
            return;
        }
        if self.value.borrow().is_none() {
            self.recompute();
            return;
        }
        if !self.stale.get() {
            return;
        }
        let edges: Vec<Edge> = self.edges.borrow().clone();
        let mut moved = false;
        for edge in &edges {
            if let Some(dep) = edge.dep.upgrade() {
                dep.ensure_fresh();
                if dep.version() != edge.seen_version {
                    moved = true;
                    break;
                }
            }
        }
        if moved {
            self.recompute();
        } else {
            self.stale.set(false);
        }
    }

    fn recompute(&self) {
        if self.disposed.get() {
            return;
        }

        // Cancel the previous invocation before anything else runs.
        if let Some(prior) = self.abort.borrow_mut().take() {
            prior.trigger();
        }
        self.drain_cleanups();
        self.drop_owned();
        self.sever_edges();

        let abort = AbortSignal::new();
        *self.abort.borrow_mut() = Some(abort.clone());
        let weak = self.weak_self.clone();
        let alive: Rc<dyn Fn() -> bool> =
            Rc::new(move || weak.upgrade().is_some_and(|cell| !cell.disposed.get()));
        let ctx = Ctx::new(Rc::clone(&self.cleanups), alive, abort);

        struct ComputingGuard<'a>(&'a Cell<bool>);
        impl Drop for ComputingGuard<'_> {
            fn drop(&mut self) {
                self.0.set(false);
            }
        }

        self.computing.set(true);
        self.stale.set(false);
        let _guard = ComputingGuard(&self.computing);
        let (result, frame) = runtime::run_in_frame(self.info.id, || (self.compute)(&ctx));
        drop(_guard);

        *self.edges.borrow_mut() = frame.edges;
        *self.owned.borrow_mut() = frame.owned;

        let (first, changed) = {
            let prior = self.value.borrow();
            match (&*prior, &result) {
                (Some(Ok(a)), Ok(b)) => (false, !self.equals.eq(a, b)),
                (Some(_), _) => (false, true),
                (None, _) => (true, true),
            }
        };
        *self.value.borrow_mut() = Some(result);
        if changed {
            self.version.set(self.version.get() + 1);
            if !first {
                runtime::enqueue_notify(self.info.clone(), Rc::clone(&self.listeners));
                let dependents = self.dependents.borrow().clone();
                runtime::propagate_stale(dependents);
            }
        }
        runtime::flush_if_idle();
    }

    fn drain_cleanups(&self) {
        let cleanups: Vec<_> = self.cleanups.borrow_mut().drain(..).collect();
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }

    fn drop_owned(&self) {
        let owned: Vec<_> = self.owned.borrow_mut().drain(..).collect();
        for child in owned.iter().rev() {
            child.dispose();
        }
    }

    fn sever_edges(&self) {
        let edges: Vec<Edge> = self.edges.borrow_mut().drain(..).collect();
        for edge in &edges {
            if let Some(dep) = edge.dep.upgrade() {
                dep.remove_dependent(self.info.id);
            }
        }
    }

    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Subscription {
        if self.disposed.get() {
            return Subscription::detached();
        }
        // First subscriber of a lazy cell performs the initial computation.
        if self.value.borrow().is_none() {
            self.freshen();
        }
        let slot = self.listeners.add(listener);
        let listeners = Rc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(list) = listeners.upgrade() {
                list.remove(slot);
            }
        })
    }

    fn teardown(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.listeners.clear();
        self.sever_edges();
        self.drain_cleanups();
        let dispose_hooks: Vec<_> = self.dispose_hooks.borrow_mut().drain(..).collect();
        for hook in dispose_hooks.into_iter().rev() {
            hook();
        }
        self.drop_owned();
        if let Some(abort) = self.abort.borrow_mut().take() {
            abort.trigger();
        }
        runtime::forget_dependent(self.info.id);
        hooks::emit_dispose(&self.info);
    }
}

impl<T: Clone + 'static> AnyCell for DerivedInner<T> {
    fn id(&self) -> CellId {
        self.info.id
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn ensure_fresh(&self) {
        self.freshen();
    }

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

impl<T: Clone + 'static> Dependent for DerivedInner<T> {
    fn mark_stale(&self) {
        if self.disposed.get() || self.stale.replace(true) {
            return;
        }
        if self.live() && !self.queued.replace(true) {
            let queued: Weak<dyn Dependent> = self.weak_self.clone();
            runtime::enqueue_verify(queued);
        }
        let dependents = self.dependents.borrow().clone();
        runtime::propagate_stale(dependents);
    }

    fn verify(&self) {
        self.queued.set(false);
        if self.disposed.get() || self.value.borrow().is_none() {
            return;
        }
        self.freshen();
    }
}

impl<T: Clone + 'static> Readable for Derived<T> {
    type Value = T;

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        // The value is cloned out first: `f` is user code and must not run
        // while the slot is borrowed.
        match self.inner.try_read() {
            Ok(value) => f(&value),
            Err(err) => panic!("read of `{}` failed: {err}", self.inner.info.name),
        }
    }

    fn try_get(&self) -> Result<T, CellError> {
        self.inner.try_read()
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

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("name", &self.inner.info.name)
            .field("value", &*self.inner.value.borrow())
            .field("stale", &self.inner.stale.get())
            .finish()
    }
}

// ============================================================================
// Declared dependency groups
// ============================================================================

/// Tuples of cells usable as a declared dependency group for
/// [`Derived::with_deps`]. The snapshot is read inside the tracking frame,
/// so each member's version is captured on an edge.
pub trait DepGroup: 'static {
    type Snapshot;
    fn snapshot(&self) -> Self::Snapshot;
}

impl<A: Readable> DepGroup for (A,) {
    type Snapshot = (A::Value,);
    fn snapshot(&self) -> Self::Snapshot {
        (self.0.get(),)
    }
}

impl<A: Readable, B: Readable> DepGroup for (A, B) {
    type Snapshot = (A::Value, B::Value);
    fn snapshot(&self) -> Self::Snapshot {
        (self.0.get(), self.1.get())
    }
}

impl<A: Readable, B: Readable, C: Readable> DepGroup for (A, B, C) {
    type Snapshot = (A::Value, B::Value, C::Value);
    fn snapshot(&self) -> Self::Snapshot {
        (self.0.get(), self.1.get(), self.2.get())
    }
}

impl<A: Readable, B: Readable, C: Readable, D: Readable> DepGroup for (A, B, C, D) {
    type Snapshot = (A::Value, B::Value, C::Value, D::Value);
    fn snapshot(&self) -> Self::Snapshot {
        (self.0.get(), self.1.get(), self.2.get(), self.3.get())
    }
}
