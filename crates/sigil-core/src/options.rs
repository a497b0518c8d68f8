//! Construction options shared by sources and derivations.

use crate::equality::Equality;

/// Options accepted by `with_options` constructors.
pub struct CellOptions<T> {
    /// Diagnostic label; a generated one is used when absent.
    pub name: Option<String>,
    /// Write/recompute gate. See [`Equality`].
    pub equals: Equality<T>,
    /// Defer the first computation until first read or first subscriber.
    /// Ignored by source cells.
    pub lazy: bool,
}

impl<T> Clone for CellOptions<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            equals: self.equals.clone(),
            lazy: self.lazy,
        }
    }
}

impl<T: 'static> CellOptions<T> {
    /// Options with the `PartialEq` gate, the same default the plain
    /// constructors use.
    pub fn new() -> Self
    where
        T: PartialEq,
    {
        Self {
            name: None,
            equals: Equality::value(),
            lazy: false,
        }
    }

    /// Options for types without `PartialEq`, or for event-like cells where
    /// every write must notify.
    pub fn ungated() -> Self {
        Self {
            name: None,
            equals: Equality::never(),
            lazy: false,
        }
    }

    pub fn with_equality(equals: Equality<T>) -> Self {
        Self {
            name: None,
            equals,
            lazy: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn equals(mut self, equals: Equality<T>) -> Self {
        self.equals = equals;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }
}

impl<T: PartialEq + 'static> Default for CellOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}
