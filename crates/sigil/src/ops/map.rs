//! Pure projection operators.

use sigil_core::{CellOptions, Ctx, Derived, Readable};

use crate::pipe::Operator;

/// Project the source value through `f`. The output is a pull-based derived
/// cell, so the projection runs lazily and is gated by `PartialEq`.
///
/// Selectors receive the computation context like any other compute
/// function, so they can register cleanup or forward the abort token:
///
/// ```ignore
/// let label = count.pipe(map(|n: &i32, ctx: &Ctx| {
///     ctx.on_cleanup(|| println!("superseded"));
///     format!("count: {n}")
/// }));
/// ```
pub fn map<F>(f: F) -> Map<F> {
    Map { f }
}

/// Alias for [`map`], for pipelines that read better as selection.
pub fn select<F>(f: F) -> Map<F> {
    map(f)
}

/// Like [`map`] with explicit cell options (name, equality policy).
pub fn map_with<U, F>(f: F, options: CellOptions<U>) -> MapWith<U, F> {
    MapWith { f, options }
}

pub struct Map<F> {
    f: F,
}

impl<C, U, F> Operator<C> for Map<F>
where
    C: Readable,
    U: Clone + PartialEq + 'static,
    F: Fn(&C::Value, &Ctx) -> U + 'static,
{
    type Output = Derived<U>;

    fn apply(self, source: C) -> Derived<U> {
        let options = CellOptions::new().name(format!("map({})", source.display_name()));
        let f = self.f;
        Derived::with_options(move |ctx| source.with(|value| f(value, ctx)), options)
    }
}

pub struct MapWith<U, F> {
    f: F,
    options: CellOptions<U>,
}

impl<C, U, F> Operator<C> for MapWith<U, F>
where
    C: Readable,
    U: Clone + 'static,
    F: Fn(&C::Value, &Ctx) -> U + 'static,
{
    type Output = Derived<U>;

    fn apply(self, source: C) -> Derived<U> {
        let mut options = self.options;
        if options.name.is_none() {
            options = options.name(format!("map({})", source.display_name()));
        }
        let f = self.f;
        Derived::with_options(move |ctx| source.with(|value| f(value, ctx)), options)
    }
}
