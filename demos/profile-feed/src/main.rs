//! A small profile editor driven entirely by the cell graph: a document
//! source, lenses into it, a derived summary, an effect that renders, and
//! an async "fetch" projected through `loadable`.

use serde_json::json;
use sigil::prelude::*;

fn main() {
    let handle = scope(|| {
        let profile = Signal::with_options(
            Value::from(json!({
                "user": { "name": "Alice", "age": 30 },
                "status": "offline",
            })),
            CellOptions::new().name("profile"),
        );

        let name = profile.pipe(focus("user.name"));
        let status = lens(&profile, "status");

        let reader = profile.clone();
        let summary = Derived::new(move |_| {
            reader.with(|doc| {
                format!(
                    "{} ({}) is {}",
                    doc.at("user.name").and_then(Value::as_str).unwrap_or("?"),
                    doc.at("user.age").and_then(Value::as_f64).unwrap_or(0.0),
                    doc.at("status").and_then(Value::as_str).unwrap_or("?"),
                )
            })
        });

        let view = summary.clone();
        let render = Effect::new(move |_| println!("-> {}", view.get()));

        (profile, name, status, summary, render)
    });
    handle.commit();
    let (profile, name, status, _summary, _render) = handle.result();

    // Edits through lenses rebuild the document with structural sharing and
    // notify the render effect exactly once per change.
    name.set(Value::from("Bob"));
    status.write(Value::from("online"));

    batch(|| {
        name.set(Value::from("Carol"));
        status.write(Value::from("away"));
    });

    // An async fetch: the cell holds the promise, `loadable` projects it.
    let fetched = Signal::with_options(
        Promise::spawn_value(async { String::from("signing off") }),
        CellOptions::ungated().name("fetch"),
    );
    let state = fetched.pipe(loadable());

    let target = profile.clone();
    let reader = state.clone();
    let apply = Effect::new(move |_| {
        if let Loadable::Success(text) = reader.get() {
            lens(&target, "status").write(Value::from(text));
        }
    });

    println!("fetch pending: {}", state.get().is_loading());
    tick(); // settle the spawned future and deliver its callbacks
    println!(
        "fetched status: {}",
        profile.get().at("status").and_then(Value::as_str).unwrap_or("?")
    );

    apply.dispose();
    handle.dispose();

    // Disposed cells keep their last value and ignore writes.
    name.set(Value::from("Zoe"));
    println!("after teardown: {}", profile.get().at("user.name").and_then(Value::as_str).unwrap_or("?"));
}
