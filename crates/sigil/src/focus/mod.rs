//! Bidirectional lenses over writable cells.
//!
//! A lens projects a parent cell's value along a path (or through a pair of
//! accessor closures) and writes back through it, rebuilding the parent
//! value with structural sharing. Both directions are loop-free: a write
//! through the lens updates the parent exactly once and fires the lens's
//! own listeners exactly once, and the parent-change echo of that write is
//! suppressed.
//!
//! # Example
//!
//! ```ignore
//! let root = Signal::with_options(
//!     Value::from(json!({ "user": { "name": "Alice", "age": 30 } })),
//!     CellOptions::new().name("root"),
//! );
//! let name = root.pipe(focus("user.name"));
//!
//! name.set(Value::from("Bob"));
//! assert_eq!(root.get().at("user.name").unwrap().as_str(), Some("Bob"));
//! ```

pub mod path;
pub mod value;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use sigil_core::hooks::{emit_after_read, emit_before_read, emit_create, emit_dispose, emit_error};
use sigil_core::{
    CellError, CellId, CellInfo, CellKind, CellOptions, Disposer, Equality, Readable, Signal,
    Subscription, Writable, adopt, untracked,
};

use crate::pipe::{Operator, Pipe};
use path::Segment;
use value::Value;

// ============================================================================
// Options
// ============================================================================

/// Options for lens construction.
pub struct FocusOptions<T> {
    pub name: Option<String>,
    /// Gate for both directions: parent echoes and lens writes that compare
    /// equal to the current projection are dropped.
    pub equals: Equality<T>,
    /// Runs before the equality gate; a `false` veto skips the write and
    /// reports through `on_error`.
    pub validate: Option<Rc<dyn Fn(&T) -> bool>>,
    /// Called for rejected writes and writes against a dead source.
    pub on_error: Option<Rc<dyn Fn(&CellError)>>,
}

impl<T> Clone for FocusOptions<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            equals: self.equals.clone(),
            validate: self.validate.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<T: 'static> FocusOptions<T> {
    pub fn new() -> Self
    where
        T: PartialEq,
    {
        Self {
            name: None,
            equals: Equality::value(),
            validate: None,
            on_error: None,
        }
    }

    pub fn ungated() -> Self {
        Self {
            name: None,
            equals: Equality::never(),
            validate: None,
            on_error: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn validate(mut self, f: impl Fn(&T) -> bool + 'static) -> Self {
        self.validate = Some(Rc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&CellError) + 'static) -> Self {
        self.on_error = Some(Rc::new(f));
        self
    }

    pub fn equals(mut self, equals: Equality<T>) -> Self {
        self.equals = equals;
        self
    }
}

impl<T: PartialEq + 'static> Default for FocusOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// The lens cell
// ============================================================================

/// A writable projection over a parent cell.
pub struct Lens<T> {
    inner: Rc<LensInner<T>>,
}

struct LensInner<T> {
    info: CellInfo,
    /// Last projection delivered to listeners; also the value served after
    /// the source dies.
    mirror: RefCell<Option<T>>,
    /// Internal notification carrier for the lens's own listeners.
    ping: Signal<u64>,
    equals: Equality<T>,
    validate: Option<Rc<dyn Fn(&T) -> bool>>,
    on_error: Option<Rc<dyn Fn(&CellError)>>,
    read_parent: Box<dyn Fn() -> Option<T>>,
    write_parent: Box<dyn Fn(T) -> Result<(), CellError>>,
    parent_alive: Box<dyn Fn() -> bool>,
    parent_sub: RefCell<Option<Subscription>>,
    writing: Cell<bool>,
    disposed: Cell<bool>,
}

/// Build a lens from accessor closures over any writable parent. `get`
/// must be a total projection; `set` receives the parent's current value
/// and the new projection and returns the rebuilt parent value.
pub fn focus_with<W, A, G, S>(parent: &W, get: G, set: S) -> Lens<A>
where
    W: Writable,
    A: Clone + PartialEq + 'static,
    G: Fn(&W::Value) -> A + 'static,
    S: Fn(&W::Value, A) -> W::Value + 'static,
{
    focus_with_options(parent, get, set, FocusOptions::new())
}

pub fn focus_with_options<W, A, G, S>(
    parent: &W,
    get: G,
    set: S,
    options: FocusOptions<A>,
) -> Lens<A>
where
    W: Writable,
    A: Clone + 'static,
    G: Fn(&W::Value) -> A + 'static,
    S: Fn(&W::Value, A) -> W::Value + 'static,
{
    Lens::build(parent, get, set, options)
}

impl<T: Clone + 'static> Lens<T> {
    fn build<W, G, S>(parent: &W, get: G, set: S, options: FocusOptions<T>) -> Self
    where
        W: Writable,
        G: Fn(&W::Value) -> T + 'static,
        S: Fn(&W::Value, T) -> W::Value + 'static,
    {
        let id = CellId::allocate();
        let name = options
            .name
            .unwrap_or_else(|| format!("focus({})", parent.display_name()));
        let info = CellInfo {
            id,
            name: Rc::from(name.as_str()),
            kind: CellKind::Lens,
        };
        let ping = Signal::with_options(0u64, CellOptions::new().name(format!("{name}.ping")));

        let reader = parent.clone();
        let read_parent = Box::new(move || {
            if reader.disposed() {
                None
            } else {
                Some(reader.with(|current| get(current)))
            }
        });
        let writer = parent.clone();
        let write_parent = Box::new(move |next: T| -> Result<(), CellError> {
            let root = untracked(|| writer.with(|current| set(current, next)));
            writer.try_set(root)
        });
        let probe = parent.clone();
        let parent_alive = Box::new(move || !probe.disposed());

        let inner = Rc::new(LensInner {
            info,
            mirror: RefCell::new(None),
            ping,
            equals: options.equals,
            validate: options.validate,
            on_error: options.on_error,
            read_parent,
            write_parent,
            parent_alive,
            parent_sub: RefCell::new(None),
            writing: Cell::new(false),
            disposed: Cell::new(false),
        });

        *inner.mirror.borrow_mut() = (inner.read_parent)();

        let echo = Rc::downgrade(&inner);
        let sub = parent.on(move || {
            if let Some(lens) = echo.upgrade() {
                lens.parent_changed();
            }
        });
        *inner.parent_sub.borrow_mut() = Some(sub);

        let lens = Lens { inner };
        let disposer = Disposer::of(&lens);
        emit_create(&lens.inner.info, &disposer);
        adopt(disposer);
        lens
    }
}

impl<T: Clone + PartialEq + 'static> Lens<T> {
    /// Add get/set transforms, producing a lens over the transformed value.
    /// The transformed lens composes like any other: it is itself a
    /// writable cell backed by this one.
    pub fn map<B, G, S>(&self, get: G, set: S) -> Lens<B>
    where
        B: Clone + PartialEq + 'static,
        G: Fn(&T) -> B + 'static,
        S: Fn(&T, B) -> T + 'static,
    {
        focus_with(self, get, set)
    }
}

impl<T: Clone + 'static> LensInner<T> {
    fn parent_changed(&self) {
        if self.disposed.get() || self.writing.get() {
            return;
        }
        let Some(projection) = (self.read_parent)() else {
            // Parent gone; fold over lazily on the next read or write.
            return;
        };
        let changed = match &*self.mirror.borrow() {
            Some(current) => !self.equals.eq(current, &projection),
            None => true,
        };
        if changed {
            *self.mirror.borrow_mut() = Some(projection);
            self.ping.update(|n| *n += 1);
        }
    }

    fn fail(&self, err: CellError) -> CellError {
        emit_error(&self.info, &err);
        match &self.on_error {
            Some(handler) => handler(&err),
            None => tracing::warn!(lens = %self.info.name, %err, "lens write dropped"),
        }
        err
    }

    fn last_known(&self) -> T {
        match &*self.mirror.borrow() {
            Some(value) => value.clone(),
            None => panic!(
                "read of lens `{}` whose source died before a first value",
                self.info.name
            ),
        }
    }

    fn read(&self) -> T {
        emit_before_read(&self.info);
        let out = if self.disposed.get() {
            self.last_known()
        } else {
            match (self.read_parent)() {
                Some(projection) => projection,
                None => {
                    // Source died: fold over, keep serving the last value.
                    self.teardown();
                    self.last_known()
                }
            }
        };
        emit_after_read(&self.info);
        out
    }

    fn try_write(&self, next: T) -> Result<(), CellError> {
        if self.disposed.get() {
            return Err(self.fail(CellError::Disposed(self.info.name.clone())));
        }
        if !(self.parent_alive)() {
            self.teardown();
            return Err(self.fail(CellError::Disposed(self.info.name.clone())));
        }
        // Validation runs before the equality gate: a veto always reports.
        if let Some(validate) = &self.validate {
            if !validate(&next) {
                return Err(self.fail(CellError::Rejected(self.info.name.clone())));
            }
        }
        let unchanged = match (self.read_parent)() {
            Some(current) => self.equals.eq(&current, &next),
            None => false,
        };
        if unchanged {
            return Ok(());
        }

        struct WriteGuard<'a>(&'a Cell<bool>);
        impl Drop for WriteGuard<'_> {
            fn drop(&mut self) {
                self.0.set(false);
            }
        }

        self.writing.set(true);
        let outcome = {
            let _guard = WriteGuard(&self.writing);
            (self.write_parent)(next.clone())
        };
        if let Err(err) = outcome {
            return Err(self.fail(err));
        }
        *self.mirror.borrow_mut() = Some(next);
        self.ping.update(|n| *n += 1);
        Ok(())
    }

    fn teardown(&self) {
        if self.disposed.replace(true) {
            return;
        }
        if let Some(sub) = self.parent_sub.borrow_mut().take() {
            sub.unsubscribe();
        }
        self.ping.dispose();
        emit_dispose(&self.info);
    }
}

impl<T: Clone + 'static> Readable for Lens<T> {
    type Value = T;

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.read())
    }

    fn get(&self) -> T {
        self.inner.read()
    }

    fn on(&self, listener: impl Fn() + 'static) -> Subscription {
        // The ping carries lens notifications; once the lens is disposed the
        // ping is too, and the subscription comes back detached.
        self.inner.ping.on(listener)
    }

    fn dispose(&self) {
        self.inner.teardown();
    }

    fn disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    fn display_name(&self) -> Rc<str> {
        self.inner.info.name.clone()
    }
}

impl<T: Clone + 'static> Writable for Lens<T> {
    fn try_set(&self, value: T) -> Result<(), CellError> {
        self.inner.try_write(value)
    }
}

impl<T> Clone for Lens<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lens<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lens")
            .field("name", &self.inner.info.name)
            .field("value", &*self.inner.mirror.borrow())
            .finish()
    }
}

// ============================================================================
// Path focus
// ============================================================================

/// Focus a [`Value`]-typed cell along a dot path. Missing or null steps
/// project to the fallback (if any) on read, and are materialized on write.
pub fn focus(path: &str) -> Focus {
    Focus {
        path: path.to_string(),
        fallback: None,
        options: None,
    }
}

pub struct Focus {
    path: String,
    fallback: Option<Rc<dyn Fn() -> Value>>,
    options: Option<FocusOptions<Value>>,
}

impl Focus {
    /// Fallback for projections that traverse null or missing steps.
    /// Evaluated at most once per lens; never used for `false`, `0`, or
    /// empty strings.
    pub fn with_fallback(mut self, f: impl Fn() -> Value + 'static) -> Self {
        self.fallback = Some(Rc::new(f));
        self
    }

    pub fn with_options(mut self, options: FocusOptions<Value>) -> Self {
        self.options = Some(options);
        self
    }
}

impl<W> Operator<W> for Focus
where
    W: Writable<Value = Value>,
{
    type Output = Lens<Value>;

    fn apply(self, source: W) -> Lens<Value> {
        let label = self.path.clone();
        let segments = path::parse(&self.path);

        let fallback = self.fallback;
        let memo: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
        let read_segments = segments.clone();
        let get = move |root: &Value| -> Value {
            match project(root, &read_segments) {
                Some(projection) => projection,
                None => match &fallback {
                    Some(factory) => memo.borrow_mut().get_or_insert_with(|| factory()).clone(),
                    None => Value::Null,
                },
            }
        };
        let set = move |root: &Value, next: Value| rebuild(root, &segments, next);

        let mut options = self.options.unwrap_or_else(FocusOptions::new);
        if options.name.is_none() {
            options.name = Some(format!("focus({}:{label})", source.display_name()));
        }
        focus_with_options(&source, get, set, options)
    }
}

/// Traverse `root` along `segments`. `None` when any step is missing or
/// null, or when the projected leaf itself is null.
fn project(root: &Value, segments: &[Segment]) -> Option<Value> {
    let mut current = root;
    for segment in segments {
        match current.get(segment) {
            Some(child) if !child.is_null() => current = child,
            _ => return None,
        }
    }
    if current.is_null() {
        None
    } else {
        Some(current.clone())
    }
}

/// Rebuild `current` with `leaf` at the path, cloning only the containers on
/// the path and materializing missing intermediates (numeric segment makes a
/// list, anything else a map).
fn rebuild(current: &Value, segments: &[Segment], leaf: Value) -> Value {
    match segments.split_first() {
        None => leaf,
        Some((segment, rest)) => {
            let base = current.get(segment).cloned().unwrap_or(Value::Null);
            let child = rebuild(&base, rest, leaf);
            current.with_child(segment, child)
        }
    }
}

// ============================================================================
// Convenience pair
// ============================================================================

/// A `[read, write]` affordance over a path lens.
pub struct LensPair<T> {
    lens: Lens<T>,
}

/// Focus `source` at `path` and hand back a read/write pair.
pub fn lens<W: Writable<Value = Value>>(source: &W, path: &str) -> LensPair<Value> {
    LensPair {
        lens: source.pipe(focus(path)),
    }
}

/// Like [`lens`], with a fallback for null projections.
pub fn lens_with_fallback<W: Writable<Value = Value>>(
    source: &W,
    path: &str,
    fallback: impl Fn() -> Value + 'static,
) -> LensPair<Value> {
    LensPair {
        lens: source.pipe(focus(path).with_fallback(fallback)),
    }
}

impl<T: Clone + PartialEq + 'static> LensPair<T> {
    pub fn read(&self) -> T {
        self.lens.get()
    }

    pub fn write(&self, value: T) {
        self.lens.set(value);
    }

    /// Add get/set transforms, keeping the pair shape.
    pub fn map<B, G, S>(&self, get: G, set: S) -> LensPair<B>
    where
        B: Clone + PartialEq + 'static,
        G: Fn(&T) -> B + 'static,
        S: Fn(&T, B) -> T + 'static,
    {
        LensPair {
            lens: self.lens.map(get, set),
        }
    }

    /// The underlying lens cell.
    pub fn cell(&self) -> Lens<T> {
        self.lens.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_doc() -> Value {
        Value::from(json!({
            "user": { "name": "Alice", "age": 30 },
            "settings": { "theme": "dark" },
        }))
    }

    #[test]
    fn lens_write_rebuilds_the_root_with_structural_sharing() {
        let root = Signal::with_options(user_doc(), CellOptions::new().name("root"));
        let name = root.pipe(focus("user.name"));

        let before = root.get();
        let fired = Rc::new(Cell::new(0));
        let probe = Rc::clone(&fired);
        let _sub = root.on(move || probe.set(probe.get() + 1));

        name.set(Value::from("Bob"));

        let after = root.get();
        assert_eq!(after.at("user.name").and_then(Value::as_str), Some("Bob"));
        assert_eq!(after.at("user.age").and_then(Value::as_f64), Some(30.0));
        assert_eq!(name.get().as_str(), Some("Bob"));
        assert_eq!(fired.get(), 1, "root notified exactly once");

        // The old document is untouched, and siblings off the path keep
        // their identity in the new one.
        assert_eq!(before.at("user.name").and_then(Value::as_str), Some("Alice"));
        assert!(before.at("settings").unwrap().ptr_eq(after.at("settings").unwrap()));
    }

    #[test]
    fn writing_the_current_projection_is_a_no_op() {
        let root = Signal::new(user_doc());
        let name = root.pipe(focus("user.name"));

        let fired = Rc::new(Cell::new(0));
        let probe = Rc::clone(&fired);
        let _sub = root.on(move || probe.set(probe.get() + 1));

        name.set(root.get().at("user.name").unwrap().clone());
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn parent_changes_reach_lens_listeners_only_when_the_projection_moves() {
        let root = Signal::new(user_doc());
        let name = root.pipe(focus("user.name"));

        let fired = Rc::new(Cell::new(0));
        let probe = Rc::clone(&fired);
        let _sub = name.on(move || probe.set(probe.get() + 1));

        // A change elsewhere in the document: projection unchanged.
        root.set(Value::from(json!({
            "user": { "name": "Alice", "age": 31 },
            "settings": { "theme": "dark" },
        })));
        assert_eq!(fired.get(), 0);

        root.set(Value::from(json!({
            "user": { "name": "Carol", "age": 31 },
            "settings": { "theme": "dark" },
        })));
        assert_eq!(fired.get(), 1);
        assert_eq!(name.get().as_str(), Some("Carol"));
    }

    #[test]
    fn fallback_applies_only_to_null_projections_and_is_memoized() {
        let root = Signal::new(Value::from(json!({
            "count": 0, "label": "", "flag": false,
        })));

        let evaluations = Rc::new(Cell::new(0));
        let counter = Rc::clone(&evaluations);
        let missing = root.pipe(focus("absent.path").with_fallback(move || {
            counter.set(counter.get() + 1);
            Value::from("placeholder")
        }));
        assert_eq!(missing.get().as_str(), Some("placeholder"));
        assert_eq!(missing.get().as_str(), Some("placeholder"));
        assert_eq!(evaluations.get(), 1, "fallback evaluated once");

        // Falsy-but-present values are not nullish.
        let count = root.pipe(focus("count").with_fallback(|| Value::from(99)));
        assert_eq!(count.get().as_f64(), Some(0.0));
        let label = root.pipe(focus("label").with_fallback(|| Value::from("x")));
        assert_eq!(label.get().as_str(), Some(""));
        let flag = root.pipe(focus("flag").with_fallback(|| Value::from(true)));
        assert_eq!(flag.get().as_bool(), Some(false));
    }

    #[test]
    fn writes_materialize_missing_intermediates() {
        let root = Signal::new(Value::from(json!({})));
        let deep = root.pipe(focus("users.0.name"));

        deep.set(Value::from("Dora"));
        assert_eq!(
            serde_json::Value::from(&root.get()),
            json!({ "users": [{ "name": "Dora" }] })
        );
    }

    #[test]
    fn validator_vetoes_the_write_and_reports() {
        let root = Signal::new(user_doc());
        let errors = Rc::new(Cell::new(0));
        let probe = Rc::clone(&errors);
        let age = root.pipe(focus("user.age").with_options(
            FocusOptions::new()
                .validate(|v: &Value| v.as_f64().is_some_and(|n| n >= 0.0))
                .on_error(move |_| probe.set(probe.get() + 1)),
        ));

        assert!(age.try_set(Value::from(-5)).is_err());
        assert_eq!(errors.get(), 1);
        assert_eq!(root.get().at("user.age").and_then(Value::as_f64), Some(30.0));

        age.set(Value::from(40));
        assert_eq!(root.get().at("user.age").and_then(Value::as_f64), Some(40.0));
    }

    #[test]
    fn disposing_the_lens_leaves_the_source_alive() {
        let root = Signal::new(user_doc());
        let name = root.pipe(focus("user.name"));

        name.dispose();
        assert!(name.disposed());
        assert!(!root.disposed());
        root.set(Value::from(json!({ "user": { "name": "Eve" } })));
    }

    #[test]
    fn a_dead_source_folds_the_lens_over_lazily() {
        let root = Signal::new(user_doc());
        let name = root.pipe(focus("user.name"));
        assert_eq!(name.get().as_str(), Some("Alice"));

        let errors = Rc::new(Cell::new(0));
        root.dispose();

        // Reads keep serving the last known projection.
        assert_eq!(name.get().as_str(), Some("Alice"));
        assert!(name.disposed());

        // Writes are dead.
        let probe = Rc::clone(&errors);
        let other = root.pipe(focus("user.age").with_options(
            FocusOptions::new().on_error(move |_| probe.set(probe.get() + 1)),
        ));
        assert!(other.try_set(Value::from(1)).is_err());
        assert_eq!(errors.get(), 1);
    }

    #[test]
    fn lenses_compose() {
        let root = Signal::new(user_doc());
        let user = root.pipe(focus("user"));
        let name = user.pipe(focus("name"));

        name.set(Value::from("Bob"));
        assert_eq!(root.get().at("user.name").and_then(Value::as_str), Some("Bob"));
        assert_eq!(user.get().at("name").and_then(Value::as_str), Some("Bob"));
    }

    #[test]
    fn map_adds_get_set_transforms() {
        let root = Signal::new(user_doc());
        let age = root.pipe(focus("user.age")).map(
            |v: &Value| v.as_f64().unwrap_or(0.0) as i64,
            |_, n| Value::from(n),
        );

        assert_eq!(age.get(), 30);
        age.set(31);
        assert_eq!(root.get().at("user.age").and_then(Value::as_f64), Some(31.0));
    }

    #[test]
    fn the_pair_form_reads_writes_and_maps() {
        let root = Signal::new(user_doc());
        let theme = lens(&root, "settings.theme");

        assert_eq!(theme.read().as_str(), Some("dark"));
        theme.write(Value::from("light"));
        assert_eq!(
            root.get().at("settings.theme").and_then(Value::as_str),
            Some("light")
        );

        let upper = theme.map(
            |v: &Value| v.as_str().unwrap_or("").to_uppercase(),
            |_, s: String| Value::from(s.to_lowercase()),
        );
        assert_eq!(upper.read(), "LIGHT");
        upper.write(String::from("SOLAR"));
        assert_eq!(
            root.get().at("settings.theme").and_then(Value::as_str),
            Some("solar")
        );
    }
}
