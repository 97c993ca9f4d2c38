//! End-to-end behaviour of root and derived bindings

use std::sync::{Arc, Mutex};

use blinc_binding::prelude::*;

#[derive(Clone, Debug, PartialEq)]
struct Profile {
    name: String,
    age: u32,
}

#[derive(Clone, Debug, PartialEq)]
struct Point {
    a: i64,
    b: i64,
}

fn recorder<T: BindingValue>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |v: &T| sink.lock().unwrap().push(v.clone()))
}

#[test]
fn test_profile_age_scenario() {
    let root = MutableBinding::new(Profile {
        name: "A".into(),
        age: 1,
    });
    let age = root.project(lens!(Profile, age));

    let (seen, record) = recorder::<u32>();
    let _sub = age.subscribe(record);

    age.set(2);
    root.set(Profile {
        name: "B".into(),
        age: 3,
    });

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(root.get().name, "B");
}

#[test]
fn test_derived_write_updates_parent_once() {
    let parent = MutableBinding::new(Point { a: 0, b: 0 });
    let a = parent.project(lens!(Point, a));

    let (parent_seen, record_parent) = recorder::<Point>();
    let (derived_seen, record_derived) = recorder::<i64>();
    let _p = parent.subscribe(record_parent);
    let _d = a.subscribe(record_derived);

    a.set(5);

    assert_eq!(parent.current_value().a, 5);
    assert_eq!(*derived_seen.lock().unwrap(), vec![0, 5]);
    assert_eq!(parent_seen.lock().unwrap().len(), 2);
}

#[test]
fn test_stored_subscriptions_release_with_owner() {
    struct Header {
        cancellables: CancellableStore,
    }

    impl Owner for Header {
        fn cancellables(&self) -> &CancellableStore {
            &self.cancellables
        }
    }

    let title = MutableBinding::new(String::from("Inbox"));
    let (seen, record) = recorder::<String>();

    let header = Header {
        cancellables: CancellableStore::new(),
    };
    header.with_scope("title", || title.subscribe(record));
    title.set("Archive".into());

    drop(header);
    title.set("Trash".into());

    assert_eq!(*seen.lock().unwrap(), vec!["Inbox", "Archive"]);
}

#[test]
fn test_collect_gathers_every_subscription() {
    let store = CancellableStore::new();
    let source = ValueCell::new(0);
    let (seen, record) = recorder::<i32>();
    let record = Arc::new(record);

    store.collect("rows", || {
        for _ in 0..3 {
            let record = Arc::clone(&record);
            source.subscribe(move |v| record(v)).store();
        }
    });
    assert_eq!(source.subscriber_count(), 3);

    source.send(1);
    let composite = store.remove("rows").unwrap();
    composite.cancel();
    composite.cancel();
    source.send(2);

    assert_eq!(source.subscriber_count(), 0);
    assert_eq!(*seen.lock().unwrap(), vec![0, 0, 0, 1, 1, 1]);
}

#[test]
fn test_replacing_stored_subscription_stops_old_callbacks() {
    let store = CancellableStore::new();
    let source = ValueCell::new(0);
    let (old_seen, old_record) = recorder::<i32>();
    let (new_seen, new_record) = recorder::<i32>();

    store.store("label", source.subscribe(old_record));
    store.store("label", source.subscribe(new_record));
    source.send(1);

    assert_eq!(*old_seen.lock().unwrap(), vec![0]);
    assert_eq!(*new_seen.lock().unwrap(), vec![0, 1]);
}

#[test]
fn test_nested_binding_field_resubscribes() {
    #[derive(Clone)]
    struct Row {
        title: MutableBinding<String>,
    }

    let first = MutableBinding::new(String::from("first"));
    let second = MutableBinding::new(String::from("second"));
    let row = MutableBinding::new(Row {
        title: first.clone(),
    });
    let title = row.project_binding(|r: &Row| r.title.clone());

    let (seen, record) = recorder::<String>();
    let _sub = title.subscribe(record);

    row.set(Row {
        title: second.clone(),
    });
    first.set("ignored".into());
    title.set("edited".into());

    assert_eq!(second.get(), "edited");
    assert_eq!(first.get(), "ignored");
    assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "edited"]);
}

#[test]
fn test_derived_binding_from_foreign_stream() {
    let backing = ValueCell::new(10u8);
    let reader = backing.clone();
    let writer = backing.clone();
    let volume = MutableBinding::from_parts(
        AnySubject::new(backing.clone()),
        move || reader.read(),
        move |v| writer.send(v),
    );
    let label = volume.map(|v: &u8| format!("{v}%"));

    volume.set(40);
    assert_eq!(label.get(), "40%");
    assert_eq!(backing.read(), 40);
}
