//! End-to-end autosave cycles through an editing session.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use survey_session::autosave::{SaveOutcome, SaveStatus};
use survey_session::config::StatusResetDelays;
use survey_session::types::FieldValue;
use survey_session::SessionOptions;

use crate::common::{quiet_period, Harness};

#[tokio::test(start_paused = true)]
async fn single_edit_is_saved_after_quiet_period() {
    let h = Harness::new();
    let session = h.open_editing().await;

    session.set("firm_name", "Acme").unwrap();
    assert_eq!(h.drafts.writes(), 0);
    quiet_period().await;

    assert_eq!(h.drafts.writes(), 1);
    let row = h.drafts.last_written().unwrap();
    assert_eq!(row.fields["firm_name"], FieldValue::text("Acme"));
    assert_eq!(session.save_status(), SaveStatus::Saved);
    assert!(session.last_saved_at().is_some());
    assert!(session.dirty_fields().is_empty());
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_produces_one_write_with_all_values() {
    let h = Harness::new();
    let session = h.open_editing().await;

    let names = ["firm_name", "fund_name", "hq_country", "team_size", "vintage"];
    for (i, name) in names.iter().enumerate() {
        session.set(name, format!("value-{i}")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    quiet_period().await;

    assert_eq!(h.drafts.writes(), 1);
    let row = h.drafts.last_written().unwrap();
    for (i, name) in names.iter().enumerate() {
        assert_eq!(row.fields[*name], FieldValue::text(format!("value-{i}")));
    }
}

#[tokio::test(start_paused = true)]
async fn remote_failure_keeps_local_copy_and_reports_error() {
    let h = Harness::new();
    let session = h.open_editing().await;
    h.drafts.set_fail_writes(true);

    session.set("firm_name", "Acme").unwrap();
    quiet_period().await;

    assert_eq!(session.save_status(), SaveStatus::Error);
    assert_eq!(h.drafts.writes(), 0);
    let local = h.manager.local_store().read(session.key()).unwrap();
    assert_eq!(
        local.fields.unwrap().fields["firm_name"],
        FieldValue::text("Acme")
    );
    assert_eq!(session.dirty_fields(), vec!["firm_name"]);
    drop(session);

    // Reload with the remote still down: the edit comes back from local.
    let reloaded = h.reload();
    let session = reloaded.open_editing().await;
    assert_eq!(session.get("firm_name"), Some(FieldValue::text("Acme")));
}

#[tokio::test(start_paused = true)]
async fn next_cycle_retries_after_failure() {
    let h = Harness::new();
    let session = h.open_editing().await;
    h.drafts.set_fail_writes(true);
    session.set("firm_name", "Acme").unwrap();
    quiet_period().await;
    assert_eq!(session.save_status(), SaveStatus::Error);

    h.drafts.set_fail_writes(false);
    session.set("fund_name", "Fund I").unwrap();
    quiet_period().await;

    assert_eq!(session.save_status(), SaveStatus::Saved);
    let row = h.drafts.last_written().unwrap();
    assert_eq!(row.fields["firm_name"], FieldValue::text("Acme"));
    assert_eq!(row.fields["fund_name"], FieldValue::text("Fund I"));
}

#[tokio::test(start_paused = true)]
async fn saving_is_entered_before_the_remote_call() {
    let h = Harness::new();
    let session = h.open_editing().await;
    h.drafts.set_write_delay(Duration::from_millis(1000));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _unsub = session.on_save_status(move |t| sink.lock().push(t.to));

    session.set("firm_name", "Acme").unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(session.save_status(), SaveStatus::Saving);
    assert_eq!(h.drafts.writes(), 0);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(*seen.lock(), vec![SaveStatus::Saving, SaveStatus::Saved]);
}

#[tokio::test(start_paused = true)]
async fn edits_during_in_flight_save_stay_dirty_and_save_next() {
    let h = Harness::new();
    let session = h.open_editing().await;
    h.drafts.set_write_delay(Duration::from_millis(1000));

    session.set("firm_name", "Acme").unwrap();
    tokio::time::sleep(Duration::from_millis(2200)).await;
    session.set("fund_name", "Fund I").unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(h.drafts.writes(), 1);
    assert!(!h.drafts.last_written().unwrap().fields.contains_key("fund_name"));
    assert_eq!(session.dirty_fields(), vec!["fund_name"]);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(h.drafts.writes(), 2);
    assert!(session.dirty_fields().is_empty());
    assert_eq!(
        h.drafts
            .max_in_flight
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn save_now_skips_when_nothing_changed() {
    let h = Harness::new();
    let session = h.open_editing().await;

    session.set("firm_name", "Acme").unwrap();
    let first = session.save_now().await.unwrap();
    assert!(matches!(first, SaveOutcome::Saved { .. }));
    let second = session.save_now().await.unwrap();
    assert_eq!(second, SaveOutcome::Unchanged);
    assert_eq!(h.drafts.writes(), 1);

    quiet_period().await;
    assert_eq!(h.drafts.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn navigation_alone_does_not_write_remote() {
    let h = Harness::new();
    let session = h.open_editing().await;
    session.go_to(3);
    session.set_scroll_offset(500);
    quiet_period().await;
    assert_eq!(h.drafts.writes(), 0);

    session.set("firm_name", "Acme").unwrap();
    quiet_period().await;
    let row = h.drafts.last_written().unwrap();
    assert_eq!(row.section_index, 3);
    assert_eq!(row.scroll_offset, 500);
}

#[tokio::test(start_paused = true)]
async fn status_returns_to_idle_when_reset_is_configured() {
    let h = Harness::with_options(SessionOptions {
        status_reset: Some(StatusResetDelays::default()),
        ..Default::default()
    });
    let session = h.open_editing().await;
    let mut rx = session.watch_save_status();

    session.set("firm_name", "Acme").unwrap();
    quiet_period().await;
    assert_eq!(session.save_status(), SaveStatus::Saved);
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(session.save_status(), SaveStatus::Idle);
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), SaveStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn closing_cancels_pending_autosave() {
    let h = Harness::new();
    let session = h.open_editing().await;
    session.set("firm_name", "Acme").unwrap();
    session.close();
    quiet_period().await;
    assert_eq!(h.drafts.writes(), 0);
    assert!(!session.has_pending_save());
}
