//! Emission-gating operators.
//!
//! These operators forward a subset of the source's emissions into a
//! read-only output cell. The output holds `Option<T>`: `None` until the
//! gate lets a first value through. Gating is push-driven, so only values
//! the source actually notifies about count; the source's initial value is
//! not an emission.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use sigil_core::{CellOptions, Equality, ReadOnly, Readable, Signal, Subscription, Writable};

use crate::pipe::Operator;

/// Wire the gating listener and disposal plumbing shared by the skip family.
fn gated<C, G>(source: &C, label: &str, gate: G) -> Signal<Option<C::Value>>
where
    C: Readable,
    G: FnMut(C::Value) -> Option<C::Value> + 'static,
{
    let out: Signal<Option<C::Value>> = Signal::with_options(
        None,
        CellOptions::with_equality(Equality::never())
            .name(format!("{label}({})", source.display_name())),
    );
    let gate = RefCell::new(gate);
    let upstream = source.clone();
    let writer = out.clone();
    let sub = source.on(move || {
        let value = upstream.get();
        if let Some(forward) = (gate.borrow_mut())(value) {
            writer.set(Some(forward));
        }
    });
    out.on_dispose(move || sub.unsubscribe());
    out
}

/// Drop the first `count` emissions, forward the rest.
pub fn skip(count: usize) -> Skip {
    Skip { count }
}

pub struct Skip {
    count: usize,
}

impl<C: Readable> Operator<C> for Skip {
    type Output = ReadOnly<Option<C::Value>>;

    fn apply(self, source: C) -> Self::Output {
        let count = self.count;
        let mut dropped = 0usize;
        gated(&source, "skip", move |value| {
            if dropped < count {
                dropped += 1;
                None
            } else {
                Some(value)
            }
        })
        .read_only()
    }
}

/// Drop emissions while `pred` holds; once it fails, forward everything.
pub fn skip_while<P>(pred: P) -> SkipWhile<P> {
    SkipWhile { pred }
}

pub struct SkipWhile<P> {
    pred: P,
}

impl<C, P> Operator<C> for SkipWhile<P>
where
    C: Readable,
    P: Fn(&C::Value) -> bool + 'static,
{
    type Output = ReadOnly<Option<C::Value>>;

    fn apply(self, source: C) -> Self::Output {
        let pred = self.pred;
        let mut open = false;
        gated(&source, "skip_while", move |value| {
            if open || !pred(&value) {
                open = true;
                Some(value)
            } else {
                None
            }
        })
        .read_only()
    }
}

/// Hold back the trailing `count` emissions: each emission is buffered and
/// the value that falls out of a full buffer is forwarded. `skip_last(0)` is
/// the identity on emissions.
pub fn skip_last(count: usize) -> SkipLast {
    SkipLast { count }
}

pub struct SkipLast {
    count: usize,
}

impl<C: Readable> Operator<C> for SkipLast {
    type Output = ReadOnly<Option<C::Value>>;

    fn apply(self, source: C) -> Self::Output {
        let count = self.count;
        let mut buffer: VecDeque<C::Value> = VecDeque::new();
        gated(&source, "skip_last", move |value| {
            buffer.push_back(value);
            if buffer.len() > count {
                buffer.pop_front()
            } else {
                None
            }
        })
        .read_only()
    }
}

/// An erased subscription source used by [`skip_until`].
pub struct Notifier {
    subscribe: Rc<dyn Fn(Rc<dyn Fn()>) -> Subscription>,
}

impl Notifier {
    pub fn of<C: Readable>(cell: &C) -> Self {
        let cell = cell.clone();
        Self {
            subscribe: Rc::new(move |f: Rc<dyn Fn()>| cell.on(move || f())),
        }
    }
}

/// Forward nothing until the notifier changes at least once after
/// subscription; from then on forward every emission.
pub fn skip_until<C: Readable>(notifier: &C) -> SkipUntil {
    SkipUntil {
        notifiers: vec![Notifier::of(notifier)],
    }
}

/// Like [`skip_until`], opened by whichever notifier changes first.
pub fn skip_until_any(notifiers: impl IntoIterator<Item = Notifier>) -> SkipUntil {
    SkipUntil {
        notifiers: notifiers.into_iter().collect(),
    }
}

pub struct SkipUntil {
    notifiers: Vec<Notifier>,
}

impl<C: Readable> Operator<C> for SkipUntil {
    type Output = ReadOnly<Option<C::Value>>;

    fn apply(self, source: C) -> Self::Output {
        let open = Rc::new(Cell::new(false));
        let flag = Rc::clone(&open);
        let out = gated(&source, "skip_until", move |value| {
            if flag.get() { Some(value) } else { None }
        });
        for notifier in &self.notifiers {
            let flag = Rc::clone(&open);
            let sub = (notifier.subscribe)(Rc::new(move || flag.set(true)));
            out.on_dispose(move || sub.unsubscribe());
        }
        out.read_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Pipe;

    fn record<T: Clone + 'static>(cell: &ReadOnly<Option<T>>) -> Rc<RefCell<Vec<Option<T>>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let reader = cell.clone();
        // Subscriptions live as long as the cell; the handle is dropped
        // without detaching.
        let _ = cell.on(move || sink.borrow_mut().push(reader.get()));
        log
    }

    #[test]
    fn skip_drops_the_first_n_emissions() {
        let source = Signal::new(0);
        let gated = source.pipe(skip(2));
        let log = record(&gated);

        for n in 1..=4 {
            source.set(n);
        }
        assert_eq!(*log.borrow(), vec![Some(3), Some(4)]);
    }

    #[test]
    fn skip_zero_forwards_everything() {
        let source = Signal::new(0);
        let gated = source.pipe(skip(0));
        let log = record(&gated);

        source.set(1);
        source.set(2);
        assert_eq!(*log.borrow(), vec![Some(1), Some(2)]);
    }

    #[test]
    fn skip_while_opens_permanently_on_first_failure() {
        let source = Signal::new(0);
        let gated = source.pipe(skip_while(|n: &i32| *n < 10));
        let log = record(&gated);

        source.set(5);
        source.set(12);
        source.set(3); // pred holds again, but the gate stays open
        assert_eq!(*log.borrow(), vec![Some(12), Some(3)]);
    }

    #[test]
    fn skip_last_emits_what_falls_out_of_the_buffer() {
        let source = Signal::new(-1);
        let gated = source.pipe(skip_last(2));
        let log = record(&gated);

        for n in 0..=4 {
            source.set(n);
        }
        // Emissions 0..=4; the first two stay buffered, then each new
        // emission pushes the oldest out.
        assert_eq!(*log.borrow(), vec![Some(0), Some(1), Some(2)]);
        assert_eq!(gated.get(), Some(2));
    }

    #[test]
    fn skip_last_zero_is_the_identity_on_emissions() {
        let source = Signal::new(0);
        let gated = source.pipe(skip_last(0));
        let log = record(&gated);

        source.set(7);
        source.set(8);
        assert_eq!(*log.borrow(), vec![Some(7), Some(8)]);
    }

    #[test]
    fn skip_until_forwards_nothing_while_the_notifier_is_quiet() {
        let source = Signal::new(0);
        let notifier = Signal::new(false);
        let gated = source.pipe(skip_until(&notifier));
        let log = record(&gated);

        source.set(1);
        source.set(2);
        assert!(log.borrow().is_empty());
        assert_eq!(gated.get(), None);

        notifier.set(true);
        source.set(3);
        assert_eq!(*log.borrow(), vec![Some(3)]);
    }

    #[test]
    fn skip_until_any_opens_on_whichever_notifier_fires_first() {
        let source = Signal::new(0);
        let quiet = Signal::new(0);
        let noisy = Signal::new(0);
        let gated = source.pipe(skip_until_any([
            Notifier::of(&quiet),
            Notifier::of(&noisy),
        ]));

        source.set(1);
        assert_eq!(gated.get(), None);

        noisy.set(1);
        source.set(2);
        assert_eq!(gated.get(), Some(2));
    }

    #[test]
    fn disposing_the_gate_severs_the_upstream_subscription() {
        let source = Signal::new(0);
        let gated = source.pipe(skip(0));

        source.set(1);
        assert_eq!(gated.get(), Some(1));

        gated.dispose();
        source.set(2);
        assert_eq!(gated.get(), Some(1));
    }
}
