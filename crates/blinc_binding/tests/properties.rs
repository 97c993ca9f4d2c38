//! Property tests for derived-binding convergence and duplicate suppression

use std::sync::{Arc, Mutex};

use blinc_binding::prelude::*;
use proptest::prelude::*;

#[derive(Clone, Debug, PartialEq)]
struct Pair {
    a: i32,
    b: i32,
}

#[derive(Clone, Debug)]
enum Edit {
    Root(i32, i32),
    DerivedA(i32),
    DerivedB(i32),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (any::<i32>(), any::<i32>()).prop_map(|(a, b)| Edit::Root(a, b)),
        any::<i32>().prop_map(Edit::DerivedA),
        any::<i32>().prop_map(Edit::DerivedB),
    ]
}

proptest! {
    #[test]
    fn derived_bindings_track_parent(edits in proptest::collection::vec(edit_strategy(), 0..40)) {
        let parent = MutableBinding::new(Pair { a: 0, b: 0 });
        let a = parent.project(lens!(Pair, a));
        let b = parent.project(lens!(Pair, b));

        let emissions = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&emissions);
        let _sub = a.subscribe(move |_| *counter.lock().unwrap() += 1);

        for edit in &edits {
            match *edit {
                Edit::Root(x, y) => parent.set(Pair { a: x, b: y }),
                Edit::DerivedA(x) => a.set(x),
                Edit::DerivedB(y) => b.set(y),
            }
            let current = parent.get();
            prop_assert_eq!(a.get(), current.a);
            prop_assert_eq!(b.get(), current.b);
        }

        // One initial delivery plus exactly one per edit
        prop_assert_eq!(*emissions.lock().unwrap(), edits.len() + 1);
    }

    #[test]
    fn dedupe_never_delivers_equal_neighbours(values in proptest::collection::vec(0u8..4, 0..60)) {
        let source = MutableBinding::new(0u8);
        let deduped = source.decorated(Decorations::REMOVES_DUPLICATES);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = deduped.subscribe(move |v: &u8| sink.lock().unwrap().push(*v));

        for v in &values {
            source.set(*v);
        }

        let mut expected = vec![0u8];
        for v in &values {
            if expected.last() != Some(v) {
                expected.push(*v);
            }
        }
        let seen = seen.lock().unwrap().clone();
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn cancel_is_idempotent(cancels in 1usize..5) {
        let source = ValueCell::new(0);
        let hits = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&hits);
        let handle = source.subscribe(move |_| *counter.lock().unwrap() += 1);

        for _ in 0..cancels {
            handle.cancel();
        }
        source.send(1);

        prop_assert!(handle.is_cancelled());
        prop_assert_eq!(*hits.lock().unwrap(), 1);
        prop_assert_eq!(source.subscriber_count(), 0);
    }
}
