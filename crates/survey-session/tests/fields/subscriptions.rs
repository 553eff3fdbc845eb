//! FieldStore change notifications and dirty tracking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use survey_session::fields::FieldStore;
use survey_session::types::{FieldMap, FieldValue, SessionKey};

fn store() -> FieldStore {
    FieldStore::new(SessionKey::new("u", "2024"))
}

#[test]
fn each_effective_write_notifies_once() {
    let s = store();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let _unsub = s.subscribe(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    s.set("a", "1").unwrap();
    s.set("a", "1").unwrap();
    s.set("b", true).unwrap();
    s.remove("missing").unwrap();
    s.remove("a").unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn revisions_in_events_increase() {
    let s = store();
    let revisions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&revisions);
    let _unsub = s.subscribe(move |c| sink.lock().push(c.revision));
    for i in 0..4 {
        s.set("n", format!("{i}")).unwrap();
    }
    assert_eq!(*revisions.lock(), vec![1, 2, 3, 4]);
}

#[test]
fn subscriber_can_read_the_store() {
    let s = Arc::new(store());
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let reader = Arc::clone(&s);
    let _unsub = s.subscribe(move |c| {
        *sink.lock() = reader.get(&c.name);
    });
    s.set("firm_name", "Acme").unwrap();
    assert_eq!(*seen.lock(), Some(FieldValue::text("Acme")));
}

#[test]
fn hydrate_replaces_contents_and_normalizes_lists() {
    let s = store();
    s.set("old", "x").unwrap();
    let mut map = FieldMap::new();
    map.insert(
        "countries".into(),
        FieldValue::List(vec!["KE".into(), "UG".into(), "KE".into()]),
    );
    s.hydrate(map);
    assert!(s.get("old").is_none());
    assert_eq!(s.get("countries"), Some(FieldValue::list(["KE", "UG"])));
    assert!(!s.is_dirty());
}
