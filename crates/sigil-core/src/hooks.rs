//! Process-wide instrumentation hooks.
//!
//! A single slot holds the active [`Hooks`] record. Installers receive the
//! previously installed record, so chains compose: wrap the callbacks you
//! care about and forward to the prior ones. This is the contract DevTools
//! and the scope auto-tracking facility build on.
//!
//! # Example
//!
//! ```ignore
//! use sigil_core::{install_hooks, Hooks};
//! use std::rc::Rc;
//!
//! install_hooks(|prior| {
//!     let forward = prior.on_create.clone();
//!     Hooks {
//!         on_create: Some(Rc::new(move |info, disposer| {
//!             println!("created {}", info.name);
//!             if let Some(f) = &forward {
//!                 f(info, disposer);
//!             }
//!         })),
//!         ..prior
//!     }
//! });
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::CellError;
use crate::node::{CellId, CellKind, Disposer};

/// Identity of a cell as seen by instrumentation.
#[derive(Clone, Debug)]
pub struct CellInfo {
    pub id: CellId,
    pub name: Rc<str>,
    pub kind: CellKind,
}

type CreateFn = Rc<dyn Fn(&CellInfo, &Disposer)>;
type InfoFn = Rc<dyn Fn(&CellInfo)>;
type ErrorFn = Rc<dyn Fn(&CellInfo, &CellError)>;

/// The pluggable instrumentation record.
#[derive(Clone, Default)]
pub struct Hooks {
    /// Called when a cell is created. Receives the cell's disposer so
    /// collectors (scopes, auto-disposal instrumentation) can adopt it.
    pub on_create: Option<CreateFn>,
    /// Called once when a cell is disposed.
    pub on_dispose: Option<InfoFn>,
    pub on_before_read: Option<InfoFn>,
    pub on_after_read: Option<InfoFn>,
    /// Called for contained failures: dependency cycles, writes to disposed
    /// cells, rejected lens writes, and panicking subscribers.
    pub on_error: Option<ErrorFn>,
    /// Advisory flag for instrumentation: drop records of disposed cells
    /// instead of retaining them for inspection.
    pub forget_disposed: bool,
}

thread_local! {
    static HOOKS: RefCell<Rc<Hooks>> = RefCell::new(Rc::new(Hooks::default()));
}

fn current() -> Rc<Hooks> {
    HOOKS.with(|slot| slot.borrow().clone())
}

/// Replace the active hook record. The installer receives the prior record.
pub fn install_hooks(installer: impl FnOnce(Hooks) -> Hooks) {
    HOOKS.with(|slot| {
        let prior = (**slot.borrow()).clone();
        *slot.borrow_mut() = Rc::new(installer(prior));
    });
}

/// Run `f` with a temporarily installed hook record, restoring the prior
/// record afterwards (also on unwind).
pub fn with_hooks<R>(installer: impl FnOnce(Hooks) -> Hooks, f: impl FnOnce() -> R) -> R {
    struct Restore(Rc<Hooks>);
    impl Drop for Restore {
        fn drop(&mut self) {
            HOOKS.with(|slot| *slot.borrow_mut() = self.0.clone());
        }
    }

    let prior = current();
    install_hooks(installer);
    let _restore = Restore(prior);
    f()
}

// Emission helpers. Public so cell types implemented outside this crate
// (lenses, custom operator outputs) can participate in instrumentation.

pub fn emit_create(info: &CellInfo, disposer: &Disposer) {
    if let Some(f) = current().on_create.clone() {
        f(info, disposer);
    }
}

pub fn emit_dispose(info: &CellInfo) {
    if let Some(f) = current().on_dispose.clone() {
        f(info);
    }
}

pub fn emit_before_read(info: &CellInfo) {
    if let Some(f) = current().on_before_read.clone() {
        f(info);
    }
}

pub fn emit_after_read(info: &CellInfo) {
    if let Some(f) = current().on_after_read.clone() {
        f(info);
    }
}

pub fn emit_error(info: &CellInfo, err: &CellError) {
    if let Some(f) = current().on_error.clone() {
        f(info, err);
    }
}
