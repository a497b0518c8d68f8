//! Operator chaining over readable cells.
//!
//! An [`Operator`] turns one cell into another; [`Pipe::pipe`] applies one
//! and returns its output, so chains read left to right:
//!
//! ```ignore
//! let spoken = count
//!     .pipe(skip(1))
//!     .pipe(map(|n: &Option<i32>, _: &Ctx| n.unwrap_or(0) * 2));
//! ```

use sigil_core::{Ctx, Derived, Readable};

use crate::ops::map::map;

/// A unary cell transformer: source cell in, derived construct out.
pub trait Operator<In> {
    type Output;

    fn apply(self, source: In) -> Self::Output;
}

/// Chaining entry point, implemented for every readable cell.
pub trait Pipe: Readable + Sized {
    /// Apply one operator to this cell.
    fn pipe<Op: Operator<Self>>(&self, op: Op) -> Op::Output {
        op.apply(self.clone())
    }

    /// Shorthand for `pipe(map(f))`. The selector receives the computation
    /// context like any compute function.
    fn to<U, F>(&self, f: F) -> Derived<U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&Self::Value, &Ctx) -> U + 'static,
    {
        self.pipe(map(f))
    }
}

impl<C: Readable> Pipe for C {}
