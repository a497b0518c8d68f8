//! Effect cells: computations run for their side effects.
//!
//! An [`Effect`] is an eager derived cell over `()`: it runs immediately on
//! creation, re-runs whenever a tracked dependency changes, and never
//! notifies anything downstream (unit values always compare equal). Cleanup
//! registered through the context runs before every re-run and on disposal.
//!
//! # Example
//!
//! ```ignore
//! let count = Signal::new(0);
//!
//! let reader = count.clone();
//! let logger = Effect::new(move |_ctx| {
//!     println!("count is {}", reader.get());
//! });
//!
//! count.set(1); // prints "count is 1"
//! logger.dispose();
//! count.set(2); // prints nothing
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::Ctx;
use crate::derived::Derived;
use crate::node::{CellKind, Readable};
use crate::options::CellOptions;

/// A side-effecting cell.
pub struct Effect {
    cell: Derived<()>,
}

impl Effect {
    /// Create an effect and run it immediately.
    pub fn new(f: impl FnMut(&Ctx) + 'static) -> Self {
        Self::build(f, None, false)
    }

    /// Create an effect with a diagnostic name.
    pub fn named(name: impl Into<String>, f: impl FnMut(&Ctx) + 'static) -> Self {
        Self::build(f, Some(name.into()), false)
    }

    /// Create an effect that stays dormant until [`Effect::run`] is called.
    pub fn new_deferred(f: impl FnMut(&Ctx) + 'static) -> Self {
        Self::build(f, None, true)
    }

    fn build(f: impl FnMut(&Ctx) + 'static, name: Option<String>, deferred: bool) -> Self {
        let func = RefCell::new(f);
        let mut options = CellOptions::<()>::new().lazy(deferred);
        if let Some(name) = name {
            options = options.name(name);
        }
        let cell = Derived::build(
            Box::new(move |ctx| {
                (func.borrow_mut())(ctx);
                Ok(())
            }),
            options,
            CellKind::Effect,
            true,
        );
        Self { cell }
    }

    /// Run the effect now. Activates a deferred effect.
    pub fn run(&self) {
        self.cell.force();
    }

    /// Stop the effect permanently. Idempotent.
    pub fn dispose(&self) {
        self.cell.dispose();
    }

    pub fn disposed(&self) -> bool {
        self.cell.disposed()
    }

    pub fn display_name(&self) -> Rc<str> {
        self.cell.display_name()
    }
}
