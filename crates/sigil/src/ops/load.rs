//! Async projection operators over promise-valued cells.
//!
//! A cell whose computation is asynchronous holds a [`Promise`]. These
//! operators project such a cell without blocking:
//!
//! - [`then`] maps the resolved value into a new promise, memoized per
//!   upstream promise so settled work is never re-awaited;
//! - [`loadable`] flattens the promise into an explicit
//!   loading/success/error record that flips as settlement callbacks are
//!   delivered on `tick`.
//!
//! Settlement callbacks are guarded by `ctx.safe`, so work belonging to a
//! superseded or disposed computation never writes back into the graph.

use std::cell::RefCell;
use std::rc::Rc;

use sigil_core::{
    CellError, CellOptions, Derived, Promise, PromiseId, Readable, Signal, Writable,
};

use crate::pipe::Operator;

/// Discriminated projection of a promise-valued cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Loadable<T> {
    Loading,
    Success(T),
    Error(CellError),
}

impl<T> Loadable<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Loadable::Loading)
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Loadable::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CellError> {
        match self {
            Loadable::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Project a promise-valued cell into a [`Loadable`].
pub fn loadable() -> LoadableOp {
    LoadableOp
}

pub struct LoadableOp;

impl<C, T> Operator<C> for LoadableOp
where
    C: Readable<Value = Promise<T>>,
    T: Clone + PartialEq + 'static,
{
    type Output = Derived<Loadable<T>>;

    fn apply(self, source: C) -> Self::Output {
        let name = format!("loadable({})", source.display_name());
        let pulse = Signal::with_options(0u64, CellOptions::new().name(format!("{name}.pulse")));
        let settled: Rc<RefCell<Option<(PromiseId, Result<T, CellError>)>>> =
            Rc::new(RefCell::new(None));

        let pulse_reader = pulse.clone();
        let cache = Rc::clone(&settled);
        let out = Derived::with_options(
            move |ctx| {
                // Settlement bumps the pulse, which re-runs this computation.
                let _ = pulse_reader.get();
                let promise = source.get();
                if let Some((id, result)) = &*cache.borrow() {
                    if *id == promise.id() {
                        return match result {
                            Ok(value) => Loadable::Success(value.clone()),
                            Err(err) => Loadable::Error(err.clone()),
                        };
                    }
                }
                let id = promise.id();
                let cache = Rc::clone(&cache);
                let waker = pulse_reader.clone();
                let ctx = ctx.clone();
                promise.on_settle(move |result| {
                    ctx.safe(|| {
                        *cache.borrow_mut() = Some((id, result.clone()));
                        waker.update(|n| *n += 1);
                    });
                });
                Loadable::Loading
            },
            CellOptions::new().name(name),
        );
        out.on_dispose(move || pulse.dispose());
        out
    }
}

/// Map the resolved value of a promise-valued cell. The mapped promise is
/// memoized by upstream promise identity, so an already-settled promise is
/// never re-awaited on later reads.
pub fn then<F>(selector: F) -> Then<F> {
    Then {
        selector: Rc::new(selector),
    }
}

pub struct Then<F> {
    selector: Rc<F>,
}

impl<C, T, U, F> Operator<C> for Then<F>
where
    C: Readable<Value = Promise<T>>,
    T: Clone + 'static,
    U: Clone + 'static,
    F: Fn(T) -> U + 'static,
{
    type Output = Derived<Promise<U>>;

    fn apply(self, source: C) -> Self::Output {
        let name = format!("then({})", source.display_name());
        let memo: Rc<RefCell<Option<(PromiseId, Promise<U>)>>> = Rc::new(RefCell::new(None));
        let selector = self.selector;
        Derived::with_options(
            move |ctx| {
                let upstream = source.get();
                if let Some((id, mapped)) = &*memo.borrow() {
                    if *id == upstream.id() {
                        return mapped.clone();
                    }
                }
                let (mapped, resolver) = Promise::pending();
                let selector = Rc::clone(&selector);
                let ctx = ctx.clone();
                upstream.on_settle(move |result| {
                    ctx.safe(|| match result {
                        Ok(value) => resolver.resolve(selector(value.clone())),
                        Err(err) => resolver.reject(err.clone()),
                    });
                });
                *memo.borrow_mut() = Some((upstream.id(), mapped.clone()));
                mapped
            },
            CellOptions::new().name(name),
        )
    }
}
