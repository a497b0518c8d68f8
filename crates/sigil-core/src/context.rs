//! Per-invocation compute context and cancellation tokens.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Cancellation token for one invocation of a compute function.
///
/// The kernel aborts the token before the next recomputation of the same
/// cell and on disposal, so async work launched from a superseded
/// computation can observe the abort and bail out.
#[derive(Clone)]
pub struct AbortSignal {
    inner: Rc<AbortState>,
}

struct AbortState {
    aborted: Cell<bool>,
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl AbortSignal {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(AbortState {
                aborted: Cell::new(false),
                callbacks: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.get()
    }

    /// Register a callback to run on abort. Runs immediately when the token
    /// is already aborted.
    pub fn on_abort(&self, f: impl FnOnce() + 'static) {
        if self.is_aborted() {
            f();
        } else {
            self.inner.callbacks.borrow_mut().push(Box::new(f));
        }
    }

    pub(crate) fn trigger(&self) {
        if self.inner.aborted.replace(true) {
            return;
        }
        let callbacks: Vec<_> = self.inner.callbacks.borrow_mut().drain(..).collect();
        for callback in callbacks {
            callback();
        }
    }
}

/// Context handed to every derived computation.
///
/// Clonable so it can be captured by settlement callbacks of async work
/// started inside the computation.
#[derive(Clone)]
pub struct Ctx {
    cleanups: Rc<RefCell<Vec<Box<dyn FnOnce()>>>>,
    alive: Rc<dyn Fn() -> bool>,
    abort: AbortSignal,
}

impl Ctx {
    pub(crate) fn new(
        cleanups: Rc<RefCell<Vec<Box<dyn FnOnce()>>>>,
        alive: Rc<dyn Fn() -> bool>,
        abort: AbortSignal,
    ) -> Self {
        Self {
            cleanups,
            alive,
            abort,
        }
    }

    /// Register a cleanup, run before the next recomputation and on
    /// disposal, most recent first.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) {
        self.cleanups.borrow_mut().push(Box::new(f));
    }

    /// Run `f` only while the owning cell is live and this invocation has
    /// not been superseded. This is the guard for writing results of async
    /// work back into the graph.
    pub fn safe<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if (self.alive)() && !self.abort.is_aborted() {
            Some(f())
        } else {
            None
        }
    }

    /// The cancellation token for this invocation.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }
}
