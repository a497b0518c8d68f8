//! Equality policies used to gate writes and recomputations.
//!
//! A write (or a recomputation result) that compares equal to the current
//! value under the cell's policy is a complete no-op: no version bump, no
//! notifications, no downstream recomputation.
//!
//! Four policies are independently selectable:
//!
//! - [`Equality::identity`] — reference-style identity at the top level
//!   (allocation identity for shared aggregates, plain equality for
//!   scalars);
//! - [`Equality::shallow`] — one level deep: same shape and keys,
//!   element-wise identity, never recursing further;
//! - [`Equality::deep`] — full structural equality via `PartialEq`
//!   (alias [`Equality::value`], the default of the plain constructors);
//! - [`Equality::with`] — a custom predicate.
//!
//! [`Equality::never`] additionally opts out of gating entirely, for
//! event-like cells and types with no usable comparison.

use std::rc::Rc;

/// How a cell decides whether a new value is "the same" as the old one.
pub struct Equality<T: ?Sized> {
    cmp: Option<Rc<dyn Fn(&T, &T) -> bool>>,
}

impl<T: ?Sized> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self {
            cmp: self.cmp.clone(),
        }
    }
}

impl<T: 'static> Equality<T> {
    /// Compare with `PartialEq`.
    pub fn value() -> Self
    where
        T: PartialEq,
    {
        Self {
            cmp: Some(Rc::new(|a: &T, b: &T| a == b)),
        }
    }

    /// Full structural equality. Alias of [`Equality::value`], named for
    /// symmetry with [`Equality::identity`] and [`Equality::shallow`].
    pub fn deep() -> Self
    where
        T: PartialEq,
    {
        Self::value()
    }

    /// Top-level identity: allocation identity for shared aggregates,
    /// plain equality for scalars. See [`ShallowEq::identity_eq`].
    pub fn identity() -> Self
    where
        T: ShallowEq,
    {
        Self::with(T::identity_eq)
    }

    /// One level deep: same shape and keys, element-wise identity, no
    /// recursion. See [`ShallowEq::shallow_eq`].
    pub fn shallow() -> Self
    where
        T: ShallowEq,
    {
        Self::with(T::shallow_eq)
    }

    /// Every write is a change.
    pub fn never() -> Self {
        Self { cmp: None }
    }

    /// Compare with a custom predicate.
    pub fn with(f: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            cmp: Some(Rc::new(f)),
        }
    }

    pub fn eq(&self, a: &T, b: &T) -> bool {
        match &self.cmp {
            Some(f) => f(a, b),
            None => false,
        }
    }
}

impl<T: 'static> Equality<Rc<T>> {
    /// Pointer identity on `Rc` payloads.
    pub fn by_rc_ptr() -> Self {
        Self {
            cmp: Some(Rc::new(|a: &Rc<T>, b: &Rc<T>| Rc::ptr_eq(a, b))),
        }
    }
}

/// Identity and one-level equality for values held in cells.
///
/// Scalars are their own identity, so both methods collapse to plain
/// equality for them. Aggregate types (documents, shared containers)
/// implement `identity_eq` as allocation identity and `shallow_eq` as
/// same-shape plus element-wise identity, without recursing into children.
pub trait ShallowEq {
    /// Top-level identity.
    fn identity_eq(&self, other: &Self) -> bool;

    /// One level deep; never recurses. Defaults to [`ShallowEq::identity_eq`],
    /// which is right for every non-aggregate type.
    fn shallow_eq(&self, other: &Self) -> bool {
        self.identity_eq(other)
    }
}

macro_rules! scalar_shallow_eq {
    ($($ty:ty),* $(,)?) => {$(
        impl ShallowEq for $ty {
            fn identity_eq(&self, other: &Self) -> bool {
                self == other
            }
        }
    )*};
}

scalar_shallow_eq!(bool, char, i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64, String);

impl<T> ShallowEq for Rc<T> {
    fn identity_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ShallowEq> ShallowEq for Vec<T> {
    fn identity_eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.as_ptr(), other.as_ptr()) && self.len() == other.len()
    }

    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a.identity_eq(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_compares_with_partial_eq() {
        let eq = Equality::<i32>::value();
        assert!(eq.eq(&1, &1));
        assert!(!eq.eq(&1, &2));
    }

    #[test]
    fn never_reports_every_write_as_change() {
        let eq = Equality::<i32>::never();
        assert!(!eq.eq(&1, &1));
    }

    #[test]
    fn identity_is_allocation_identity_for_shared_payloads() {
        let eq = Equality::<Rc<String>>::identity();
        let a = Rc::new(String::from("x"));
        let b = Rc::new(String::from("x"));
        assert!(eq.eq(&a, &a.clone()));
        assert!(!eq.eq(&a, &b));
    }

    #[test]
    fn identity_collapses_to_plain_equality_for_scalars() {
        let eq = Equality::<i32>::identity();
        assert!(eq.eq(&1, &1));
        assert!(!eq.eq(&1, &2));
    }

    #[test]
    fn shallow_compares_one_level_of_a_container_by_identity() {
        let shallow = Equality::<Vec<Rc<i32>>>::shallow();
        let deep = Equality::<Vec<Rc<i32>>>::deep();

        let one = Rc::new(1);
        let two = Rc::new(2);
        let first = vec![Rc::clone(&one), Rc::clone(&two)];
        // A rebuilt container with the same children: shallow-equal.
        let rebuilt = vec![Rc::clone(&one), Rc::clone(&two)];
        assert!(shallow.eq(&first, &rebuilt));

        // Same structure, fresh child allocations: deep-equal only.
        let copied = vec![Rc::new(1), Rc::new(2)];
        assert!(!shallow.eq(&first, &copied));
        assert!(deep.eq(&first, &copied));

        let shorter = vec![Rc::clone(&one)];
        assert!(!shallow.eq(&first, &shorter));
    }

    #[test]
    fn rc_ptr_ignores_structural_equality() {
        let eq = Equality::<Rc<String>>::by_rc_ptr();
        let a = Rc::new(String::from("x"));
        let b = Rc::new(String::from("x"));
        assert!(eq.eq(&a, &a.clone()));
        assert!(!eq.eq(&a, &b));
    }

    #[test]
    fn custom_predicate_wins() {
        let eq = Equality::with(|a: &f64, b: &f64| (a - b).abs() < 0.5);
        assert!(eq.eq(&1.0, &1.2));
        assert!(!eq.eq(&1.0, &2.0));
    }
}
