//! Thread-local reactive runtime.
//!
//! The runtime owns everything that is global to the cell graph:
//!
//! - the **reader stack** of tracking frames (one per in-flight computation),
//!   which is how reads register dependency edges;
//! - the **notification queue**, a single FIFO drained on the caller's task.
//!   A write enqueues the written cell's own listener batch first, then the
//!   verification jobs of its dependents; a listener that writes during
//!   notification appends to the same queue, so its effects run after the
//!   current listener list completes;
//! - the **deferred queue** drained by [`tick`], the cooperative checkpoint
//!   used for promise settlement delivery and scheduled disposal;
//! - id allocation and the dependent registry.
//!
//! Everything is single-threaded and synchronous; no cell operation yields.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use crate::hooks::CellInfo;
use crate::node::{AnyCell, CellId, Dependent, Disposer, Edge, Listeners};
use crate::promise;

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

/// Tracking frame for one in-flight computation.
pub(crate) struct Frame {
    pub id: CellId,
    /// Dependency edges registered by reads inside the computation.
    pub edges: Vec<Edge>,
    /// Disposers of cells created inside the computation; the computing
    /// cell adopts them and cascades disposal.
    pub owned: Vec<Disposer>,
}

enum Job {
    Notify {
        info: CellInfo,
        listeners: Rc<Listeners>,
    },
    Verify(Weak<dyn Dependent>),
}

struct Runtime {
    next_id: u64,
    frames: Vec<Frame>,
    untracked_depth: u32,
    batch_depth: u32,
    flushing: bool,
    queue: VecDeque<Job>,
    deferred: VecDeque<Box<dyn FnOnce()>>,
    dependents: HashMap<CellId, Weak<dyn Dependent>>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            next_id: 0,
            frames: Vec::new(),
            untracked_depth: 0,
            batch_depth: 0,
            flushing: false,
            queue: VecDeque::new(),
            deferred: VecDeque::new(),
            dependents: HashMap::new(),
        }
    }
}

pub(crate) fn next_id() -> CellId {
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        rt.next_id += 1;
        CellId(rt.next_id)
    })
}

// ============================================================================
// Dependent registry
// ============================================================================

pub(crate) fn register_dependent(id: CellId, dependent: Weak<dyn Dependent>) {
    RUNTIME.with(|rt| {
        rt.borrow_mut().dependents.insert(id, dependent);
    });
}

pub(crate) fn forget_dependent(id: CellId) {
    RUNTIME.with(|rt| {
        rt.borrow_mut().dependents.remove(&id);
    });
}

pub(crate) fn dependent_handle(id: CellId) -> Option<Rc<dyn Dependent>> {
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        match rt.dependents.get(&id).map(Weak::upgrade) {
            Some(Some(handle)) => Some(handle),
            Some(None) => {
                rt.dependents.remove(&id);
                None
            }
            None => None,
        }
    })
}

/// Mark every listed dependent stale. Each dependent continues the wave
/// through its own dependents from inside `mark_stale`.
pub(crate) fn propagate_stale(ids: Vec<CellId>) {
    for id in ids {
        if let Some(dependent) = dependent_handle(id) {
            dependent.mark_stale();
        }
    }
}

// ============================================================================
// Reader stack
// ============================================================================

/// Register a read of `dep` with the innermost tracking frame, if any.
/// Returns the reading cell's id so the dependency can record it.
pub(crate) fn track_read(dep: Rc<dyn AnyCell>) -> Option<CellId> {
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        if rt.untracked_depth > 0 {
            return None;
        }
        let frame = rt.frames.last_mut()?;
        let dep_id = dep.id();
        if frame.id == dep_id {
            // Self-read during the cell's own computation: no edge.
            return None;
        }
        let seen_version = dep.version();
        match frame.edges.iter_mut().find(|e| e.dep_id == dep_id) {
            Some(edge) => edge.seen_version = seen_version,
            None => frame.edges.push(Edge {
                dep: Rc::downgrade(&dep),
                dep_id,
                seen_version,
            }),
        }
        Some(frame.id)
    })
}

/// Hand a freshly created cell's disposer to the innermost computing cell,
/// if a computation is in flight; the computing cell owns it from then on
/// and cascades disposal. Cell types implemented outside this crate call
/// this right after announcing themselves through the hook record.
pub fn adopt(disposer: Disposer) {
    RUNTIME.with(|rt| {
        if let Some(frame) = rt.borrow_mut().frames.last_mut() {
            frame.owned.push(disposer);
        }
    });
}

/// Run `f` under a fresh tracking frame and hand the collected edges and
/// owned children back. If `f` panics, the frame is popped and the children
/// it created so far are disposed, so the graph stays consistent.
pub(crate) fn run_in_frame<R>(id: CellId, f: impl FnOnce() -> R) -> (R, Frame) {
    struct FrameGuard;
    impl Drop for FrameGuard {
        fn drop(&mut self) {
            if let Some(frame) = RUNTIME.with(|rt| rt.borrow_mut().frames.pop()) {
                for child in frame.owned.iter().rev() {
                    child.dispose();
                }
            }
        }
    }

    RUNTIME.with(|rt| {
        rt.borrow_mut().frames.push(Frame {
            id,
            edges: Vec::new(),
            owned: Vec::new(),
        });
    });
    let guard = FrameGuard;
    let out = f();
    std::mem::forget(guard);
    let frame = RUNTIME.with(|rt| rt.borrow_mut().frames.pop()).expect("tracking frame vanished");
    (out, frame)
}

/// Run `f` without registering dependency edges for the reads inside it.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct Guard;
    impl Drop for Guard {
        fn drop(&mut self) {
            RUNTIME.with(|rt| rt.borrow_mut().untracked_depth -= 1);
        }
    }

    RUNTIME.with(|rt| rt.borrow_mut().untracked_depth += 1);
    let _guard = Guard;
    f()
}

// ============================================================================
// Notification queue
// ============================================================================

pub(crate) fn enqueue_notify(info: CellInfo, listeners: Rc<Listeners>) {
    RUNTIME.with(|rt| {
        rt.borrow_mut().queue.push_back(Job::Notify { info, listeners });
    });
}

/// Enqueue a verification job for a live dependent. The caller is
/// responsible for not enqueueing the same cell twice (`queued` flag).
pub(crate) fn enqueue_verify(dependent: Weak<dyn Dependent>) {
    RUNTIME.with(|rt| {
        rt.borrow_mut().queue.push_back(Job::Verify(dependent));
    });
}

/// Drain the notification queue unless a batch, an outer flush, or an
/// in-flight computation is in charge. Deferring while a tracking frame is
/// active keeps listener code from registering edges on the computing cell;
/// the outermost recomputation drains the queue once its frame is gone.
pub(crate) fn flush_if_idle() {
    let start = RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        if rt.flushing || rt.batch_depth > 0 || !rt.frames.is_empty() {
            false
        } else {
            rt.flushing = true;
            true
        }
    });
    if !start {
        return;
    }

    struct FlushGuard;
    impl Drop for FlushGuard {
        fn drop(&mut self) {
            RUNTIME.with(|rt| rt.borrow_mut().flushing = false);
        }
    }
    let _guard = FlushGuard;

    loop {
        let job = RUNTIME.with(|rt| rt.borrow_mut().queue.pop_front());
        match job {
            Some(Job::Notify { info, listeners }) => listeners.notify(&info),
            Some(Job::Verify(weak)) => {
                if let Some(dependent) = weak.upgrade() {
                    dependent.verify();
                }
            }
            None => break,
        }
    }
}

/// Group several writes; notifications are delivered once, after the
/// outermost batch completes.
///
/// # Example
///
/// ```ignore
/// batch(|| {
///     first.set(1);
///     second.set("two".into());
/// });
/// // subscribers of both cells have run exactly once here
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    struct Guard;
    impl Drop for Guard {
        fn drop(&mut self) {
            RUNTIME.with(|rt| rt.borrow_mut().batch_depth -= 1);
        }
    }

    RUNTIME.with(|rt| rt.borrow_mut().batch_depth += 1);
    let out = {
        let _guard = Guard;
        f()
    };
    flush_if_idle();
    out
}

// ============================================================================
// Deferred work
// ============================================================================

pub(crate) fn defer(f: impl FnOnce() + 'static) {
    RUNTIME.with(|rt| {
        rt.borrow_mut().deferred.push_back(Box::new(f));
    });
}

/// Run the cooperative checkpoint: drive spawned promise futures to a stall,
/// then drain the deferred queue, repeating until both are quiet. Promise
/// settlement callbacks, scheduled disposals, and orphan-scope cleanup all
/// run here.
pub fn tick() {
    loop {
        promise::drive_executor();
        let tasks: Vec<Box<dyn FnOnce()>> =
            RUNTIME.with(|rt| rt.borrow_mut().deferred.drain(..).collect());
        if tasks.is_empty() {
            break;
        }
        for task in tasks {
            task();
        }
    }
    flush_if_idle();
}
