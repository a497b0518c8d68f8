//! Sigil — fine-grained reactive state for Rust.
//!
//! Sigil models application state as a graph of *cells*: writable sources,
//! memoized derivations, side-effecting cells, and bidirectional lenses.
//! Reads register dependencies automatically, writes deliver at most one
//! notification per logical change, and recomputation is lazy and
//! version-verified.
//!
//! This crate is the user-facing surface over [`sigil_core`]: it re-exports
//! the kernel and adds the operator pipeline and the focus lens.
//!
//! # Quick Start
//!
//! ```ignore
//! use sigil::prelude::*;
//!
//! let count = Signal::new(1);
//!
//! let reader = count.clone();
//! let doubled = Derived::new(move |_| reader.get() * 2);
//!
//! let _sub = doubled.on(|| println!("changed"));
//! count.set(5); // prints "changed"; doubled.get() == 10
//! ```
//!
//! # Operators
//!
//! Cells chain through [`Pipe::pipe`]:
//!
//! | Operator | Purpose |
//! |----------|---------|
//! | [`map`] / [`select`] | pure projection, lazily recomputed |
//! | [`skip`] / [`skip_while`] / [`skip_last`] / [`skip_until`] | emission gating |
//! | [`then`] | map the resolved value of a promise-valued cell |
//! | [`loadable`] | project a promise into loading/success/error |
//! | [`focus`] | bidirectional lens along a document path |
//!
//! # Focus
//!
//! ```ignore
//! use sigil::prelude::*;
//! use serde_json::json;
//!
//! let root = Signal::new(Value::from(json!({ "user": { "name": "Alice" } })));
//! let name = root.pipe(focus("user.name"));
//!
//! name.set(Value::from("Bob"));
//! assert_eq!(root.get().at("user.name").unwrap().as_str(), Some("Bob"));
//! ```

pub mod focus;
pub mod ops;
pub mod pipe;

pub use focus::{
    Focus, FocusOptions, Lens, LensPair, focus, focus_with, focus_with_options, lens,
    lens_with_fallback,
};
pub use focus::path::Segment;
pub use focus::value::Value;
pub use ops::{
    Loadable, Notifier, loadable, map, map_with, select, skip, skip_last, skip_until,
    skip_until_any, skip_while, then,
};
pub use pipe::{Operator, Pipe};

// Re-export the kernel at the crate root.
pub use sigil_core::{
    AbortSignal, CellError, CellId, CellInfo, CellKind, CellOptions, Ctx, DepGroup, Derived,
    Disposer, Effect, Equality, Hooks, Promise, PromiseId, ReadOnly, Readable, Resolver, Scope,
    ShallowEq, Signal, Subscription, Writable, batch, derived, install_hooks, scope, signal, tick,
    untracked, with_hooks,
};

pub mod prelude {
    //! Common imports for sigil applications.
    pub use crate::focus::value::Value;
    pub use crate::focus::{FocusOptions, Lens, focus, focus_with, lens};
    pub use crate::ops::{
        Loadable, loadable, map, select, skip, skip_last, skip_until, skip_while, then,
    };
    pub use crate::pipe::Pipe;
    pub use sigil_core::{
        CellError, CellOptions, Ctx, Derived, Effect, Equality, Promise, Readable, Scope,
        ShallowEq, Signal, Writable, batch, derived, scope, signal, tick, untracked,
    };
}
