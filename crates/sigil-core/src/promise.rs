//! Settle-once async values integrated with the cell graph.
//!
//! A [`Promise`] is the value a compute function returns when its work is
//! asynchronous: the cell holds the promise itself, and the async operators
//! project it into loading/success/error states as it settles. Settlement
//! callbacks are never delivered synchronously; they run at the next
//! [`tick`](crate::runtime::tick), so an observer that subscribes to an
//! already-settled promise still sees a consistent "pending first" sequence.
//!
//! Futures are supported two ways:
//!
//! - [`Promise::spawn`] runs a future on a thread-local single-threaded
//!   executor that is driven from `tick`;
//! - `Promise` itself implements [`Future`], so consumers that live inside
//!   an async host can simply `.await` it. This is where the suspense
//!   boundary lives: the kernel never blocks or yields.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;

use crate::error::CellError;
use crate::runtime;

thread_local! {
    static EXECUTOR: RefCell<LocalPool> = RefCell::new(LocalPool::new());
    // Separate slot so a running task can spawn without touching the pool.
    static SPAWNER: LocalSpawner = EXECUTOR.with(|pool| pool.borrow().spawner());
    static NEXT_PROMISE_ID: Cell<u64> = const { Cell::new(0) };
}

/// Drive spawned futures until they stall. Called from `tick`.
pub(crate) fn drive_executor() {
    EXECUTOR.with(|pool| {
        // Reentrant ticks (a spawned future calling tick) skip the pool.
        if let Ok(mut pool) = pool.try_borrow_mut() {
            pool.run_until_stalled();
        }
    });
}

/// Identity of a promise, used by operators to memoize per-promise work.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PromiseId(u64);

enum Settle<T> {
    Pending,
    Done(Result<T, CellError>),
}

struct PromiseInner<T> {
    id: PromiseId,
    state: RefCell<Settle<T>>,
    callbacks: RefCell<Vec<Box<dyn FnOnce(&Result<T, CellError>)>>>,
    wakers: RefCell<Vec<Waker>>,
}

/// A clonable handle to a value that settles exactly once.
pub struct Promise<T> {
    inner: Rc<PromiseInner<T>>,
}

/// The producing half of a [`Promise`]; settles it exactly once.
pub struct Resolver<T> {
    inner: Rc<PromiseInner<T>>,
}

impl<T: Clone + 'static> Promise<T> {
    /// A promise and the resolver that settles it.
    pub fn pending() -> (Self, Resolver<T>) {
        let id = NEXT_PROMISE_ID.with(|next| {
            next.set(next.get() + 1);
            PromiseId(next.get())
        });
        let inner = Rc::new(PromiseInner {
            id,
            state: RefCell::new(Settle::Pending),
            callbacks: RefCell::new(Vec::new()),
            wakers: RefCell::new(Vec::new()),
        });
        (
            Self {
                inner: Rc::clone(&inner),
            },
            Resolver { inner },
        )
    }

    /// An already-resolved promise. Settlement callbacks still run deferred.
    pub fn resolved(value: T) -> Self {
        let (promise, resolver) = Self::pending();
        resolver.resolve(value);
        promise
    }

    /// An already-rejected promise.
    pub fn rejected(error: CellError) -> Self {
        let (promise, resolver) = Self::pending();
        resolver.reject(error);
        promise
    }

    /// Run a future on the thread-local executor; the returned promise
    /// settles with its output. The executor is driven from `tick`.
    pub fn spawn(future: impl Future<Output = Result<T, CellError>> + 'static) -> Self {
        let (promise, resolver) = Self::pending();
        let spawned = SPAWNER.with(|spawner| {
            spawner.spawn_local(async move {
                resolver.settle(future.await);
            })
        });
        if let Err(err) = spawned {
            tracing::error!(%err, "failed to spawn promise future");
        }
        promise
    }

    /// Like [`Promise::spawn`] for futures that cannot fail.
    pub fn spawn_value(future: impl Future<Output = T> + 'static) -> Self {
        Self::spawn(async move { Ok(future.await) })
    }

    pub fn id(&self) -> PromiseId {
        self.inner.id
    }

    /// The settled result, if any. Never blocks.
    pub fn poll_settled(&self) -> Option<Result<T, CellError>> {
        match &*self.inner.state.borrow() {
            Settle::Pending => None,
            Settle::Done(result) => Some(result.clone()),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*self.inner.state.borrow(), Settle::Done(_))
    }

    /// Register a settlement callback. Delivery is always deferred to the
    /// next `tick`, even when the promise has already settled.
    pub fn on_settle(&self, f: impl FnOnce(&Result<T, CellError>) + 'static) {
        match &*self.inner.state.borrow() {
            Settle::Pending => {
                self.inner.callbacks.borrow_mut().push(Box::new(f));
            }
            Settle::Done(result) => {
                let result = result.clone();
                runtime::defer(move || f(&result));
            }
        }
    }
}

impl<T: Clone + 'static> Resolver<T> {
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(&self, error: CellError) {
        self.settle(Err(error));
    }

    fn settle(&self, result: Result<T, CellError>) {
        {
            let mut state = self.inner.state.borrow_mut();
            if matches!(&*state, Settle::Done(_)) {
                return;
            }
            *state = Settle::Done(result.clone());
        }
        let callbacks: Vec<_> = self.inner.callbacks.borrow_mut().drain(..).collect();
        for callback in callbacks {
            let result = result.clone();
            runtime::defer(move || callback(&result));
        }
        let wakers: Vec<Waker> = self.inner.wakers.borrow_mut().drain(..).collect();
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T: Clone + 'static> Future for Promise<T> {
    type Output = Result<T, CellError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &*self.inner.state.borrow() {
            Settle::Done(result) => Poll::Ready(result.clone()),
            Settle::Pending => {
                self.inner.wakers.borrow_mut().push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Promises compare by identity: two handles are equal when they settle
/// together. This is what lets memoizing operators reuse per-promise work.
impl<T> PartialEq for Promise<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.state.borrow() {
            Settle::Pending => "pending",
            Settle::Done(Ok(_)) => "resolved",
            Settle::Done(Err(_)) => "rejected",
        };
        f.debug_struct("Promise")
            .field("id", &self.inner.id)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::tick;

    #[test]
    fn resolve_settles_exactly_once() {
        let (promise, resolver) = Promise::pending();
        assert!(!promise.is_settled());

        resolver.resolve(1);
        resolver.resolve(2);
        resolver.reject(CellError::Aborted);
        assert_eq!(promise.poll_settled(), Some(Ok(1)));
    }

    #[test]
    fn settlement_callbacks_are_deferred_to_the_next_tick() {
        let promise = Promise::resolved(42);
        let seen = Rc::new(RefCell::new(None));

        let sink = Rc::clone(&seen);
        promise.on_settle(move |result| {
            *sink.borrow_mut() = Some(result.clone());
        });
        assert!(seen.borrow().is_none(), "delivery must not be synchronous");

        tick();
        assert_eq!(*seen.borrow(), Some(Ok(42)));
    }

    #[test]
    fn callbacks_registered_before_settlement_fire_after_it() {
        let (promise, resolver) = Promise::pending();
        let seen = Rc::new(RefCell::new(None));

        let sink = Rc::clone(&seen);
        promise.on_settle(move |result: &Result<i32, CellError>| {
            *sink.borrow_mut() = Some(result.clone());
        });

        resolver.reject(CellError::Aborted);
        assert!(seen.borrow().is_none());
        tick();
        assert_eq!(*seen.borrow(), Some(Err(CellError::Aborted)));
    }

    #[test]
    fn spawned_futures_settle_during_tick() {
        let promise = Promise::spawn_value(async { 5 });
        assert!(!promise.is_settled());

        tick();
        assert_eq!(promise.poll_settled(), Some(Ok(5)));
    }

    #[test]
    fn promises_compare_by_identity() {
        let a = Promise::resolved(1);
        let b = Promise::resolved(1);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[tokio::test]
    async fn promises_can_be_awaited_under_a_foreign_executor() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let (promise, resolver) = Promise::<i32>::pending();
                let waiter = tokio::task::spawn_local(async move { promise.await });
                tokio::task::yield_now().await;
                resolver.resolve(7);
                assert_eq!(waiter.await.unwrap(), Ok(7));
            })
            .await;
    }
}
