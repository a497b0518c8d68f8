//! Core reactive kernel for sigil.
//!
//! State is modeled as a graph of *cells*: [`Signal`] sources hold assigned
//! values, [`Derived`] cells memoize computations over tracked dependencies,
//! and [`Effect`] cells run computations for their side effects. Reads
//! register dependency edges automatically; writes bump versions and deliver
//! at most one notification per logical change; recomputation is lazy and
//! version-verified, so an upstream change that produces an equal value
//! costs nothing downstream.
//!
//! # Core Concepts
//!
//! - **Signal**: writable source cell, gated by an equality policy
//! - **Derived**: memoized computation; recomputes when a dependency's
//!   version moves past the one stored on its edge
//! - **Effect**: eager derived cell over `()`, run for side effects
//! - **Scope**: factory-bounded group of cells sharing a disposal lifetime
//! - **Promise**: settle-once async value; cells may hold one while work is
//!   in flight
//!
//! # Example
//!
//! ```ignore
//! use sigil_core::*;
//!
//! let count = Signal::new(1);
//!
//! let reader = count.clone();
//! let doubled = Derived::new(move |_ctx| reader.get() * 2);
//! assert_eq!(doubled.get(), 2);
//!
//! count.set(5);
//! assert_eq!(doubled.get(), 10);
//! ```

pub mod context;
pub mod derived;
pub mod effect;
pub mod equality;
pub mod error;
pub mod hooks;
pub mod node;
pub mod options;
pub mod promise;
pub mod runtime;
pub mod scope;
pub mod signal;

pub use context::{AbortSignal, Ctx};
pub use derived::{DepGroup, Derived};
pub use effect::Effect;
pub use equality::{Equality, ShallowEq};
pub use error::CellError;
pub use hooks::{CellInfo, Hooks, install_hooks, with_hooks};
pub use node::{CellId, CellKind, Disposer, Readable, Subscription, Writable};
pub use options::CellOptions;
pub use promise::{Promise, PromiseId, Resolver};
pub use runtime::{adopt, batch, tick, untracked};
pub use scope::{Scope, scope};
pub use signal::{ReadOnly, Signal};

/// Create a source cell. Shorthand for [`Signal::new`].
pub fn signal<T: Clone + PartialEq + 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

/// Create a derived cell with ambient tracking. Shorthand for
/// [`Derived::new`].
pub fn derived<T, F>(f: F) -> Derived<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn(&Ctx) -> T + 'static,
{
    Derived::new(f)
}
