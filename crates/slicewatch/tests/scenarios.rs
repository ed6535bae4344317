//! End-to-end scenarios for slice change detection.
//!
//! State shape: `{ foo: String, bar: i32, baz: Option<bool> }` with one
//! observer per field, registered in field order.

#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::rc::Rc;

use slicewatch::{DiffEngine, Scope, SnapshotChannel};

#[derive(Debug, Clone, PartialEq)]
struct State {
    foo: String,
    bar: i32,
    baz: Option<bool>,
}

fn state(foo: &str, bar: i32, baz: Option<bool>) -> State {
    State {
        foo: foo.to_string(),
        bar,
        baz,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Foo(String),
    Bar(i32),
    Baz(Option<bool>),
}

type Calls = Rc<RefCell<Vec<Call>>>;

fn observed_engine() -> (DiffEngine<State>, Calls) {
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    let (foo, bar, baz) = (Rc::clone(&calls), Rc::clone(&calls), Rc::clone(&calls));
    let engine = DiffEngine::new()
        .with_observer(|s: &State| s.foo.clone(), move |v| foo.borrow_mut().push(Call::Foo(v)))
        .with_observer(|s: &State| s.bar, move |v| bar.borrow_mut().push(Call::Bar(v)))
        .with_observer(|s: &State| s.baz, move |v| baz.borrow_mut().push(Call::Baz(v)));
    (engine, calls)
}

#[test]
fn no_callback_before_first_ingest() {
    let (engine, calls) = observed_engine();
    assert!(calls.borrow().is_empty());
    assert_eq!(engine.observer_count(), 3);
}

#[test]
fn first_state_fires_all_callbacks() {
    let (mut engine, calls) = observed_engine();
    engine.ingest(state("a", 1, None)).unwrap();
    assert_eq!(
        *calls.borrow(),
        vec![Call::Foo("a".into()), Call::Bar(1), Call::Baz(None)]
    );
}

#[test]
fn non_null_change_fires_only_its_observer() {
    let (mut engine, calls) = observed_engine();
    engine.ingest(state("a", 1, None)).unwrap();
    engine.ingest(state("b", 1, None)).unwrap();
    assert_eq!(
        *calls.borrow(),
        vec![
            Call::Foo("a".into()),
            Call::Bar(1),
            Call::Baz(None),
            Call::Foo("b".into()),
        ]
    );
}

#[test]
fn nullable_change_fires_only_its_observer() {
    let (mut engine, calls) = observed_engine();
    engine.ingest(state("a", 1, None)).unwrap();
    engine.ingest(state("a", 1, Some(true))).unwrap();
    assert_eq!(
        *calls.borrow(),
        vec![
            Call::Foo("a".into()),
            Call::Bar(1),
            Call::Baz(None),
            Call::Baz(Some(true)),
        ]
    );
}

#[test]
fn value_to_null_fires() {
    let (mut engine, calls) = observed_engine();
    engine.ingest(state("a", 1, Some(false))).unwrap();
    engine.ingest(state("a", 1, None)).unwrap();
    assert_eq!(calls.borrow().last(), Some(&Call::Baz(None)));
    assert_eq!(calls.borrow().len(), 4);
}

#[test]
fn identical_snapshot_fires_nothing() {
    let (mut engine, calls) = observed_engine();
    engine.ingest(state("a", 1, None)).unwrap();
    let report = engine.ingest(state("a", 1, None)).unwrap();
    assert_eq!(report.fired, 0);
    assert_eq!(report.evaluated, 3);
    assert_eq!(calls.borrow().len(), 3);
}

#[test]
fn attached_channel_runs_the_same_scenario() {
    let channel: SnapshotChannel<State> = SnapshotChannel::new();
    let scope = Scope::new();
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    let (foo, baz) = (Rc::clone(&calls), Rc::clone(&calls));

    let engine = DiffEngine::new()
        .with_observer(|s: &State| s.foo.clone(), move |v| foo.borrow_mut().push(Call::Foo(v)))
        .with_observer(|s: &State| s.baz, move |v| baz.borrow_mut().push(Call::Baz(v)))
        .attach(&channel, &scope);

    channel.publish(state("a", 1, None));
    channel.publish(state("b", 2, None));
    channel.publish(state("b", 3, Some(true)));
    drop(scope);
    channel.publish(state("c", 4, None));

    assert_eq!(
        *calls.borrow(),
        vec![
            Call::Foo("a".into()),
            Call::Baz(None),
            Call::Foo("b".into()),
            Call::Baz(Some(true)),
        ]
    );
    assert_eq!(engine.generation(), 3);
}

#[test]
fn replaying_source_primes_with_every_observer() {
    let channel: SnapshotChannel<State> = SnapshotChannel::with_replay();
    channel.publish(state("a", 1, None));
    let scope = Scope::new();

    let (engine, calls) = observed_engine();
    let engine = engine.attach(&channel, &scope);

    assert_eq!(
        *calls.borrow(),
        vec![Call::Foo("a".into()), Call::Bar(1), Call::Baz(None)]
    );

    channel.publish(state("a", 1, Some(true)));
    assert_eq!(calls.borrow().last(), Some(&Call::Baz(Some(true))));
    assert_eq!(calls.borrow().len(), 4);
    assert_eq!(engine.generation(), 2);
}
