//! Submission: validation, finalization, read-only afterwards.

use std::sync::atomic::Ordering;
use std::time::Duration;

use survey_session::autosave::SaveOutcome;
use survey_session::error::{SubmissionStage, SurveyError};
use survey_session::types::{FieldValue, SessionStatus};

use crate::common::{key, quiet_period, Harness};

fn fill_required(session: &survey_session::EditingSession) {
    session.set("firm_name", "Acme Capital").unwrap();
    session.set("email_address", "ops@acme.vc").unwrap();
}

#[tokio::test(start_paused = true)]
async fn successful_submit_completes_and_clears_local() {
    let h = Harness::new();
    let session = h.open_editing().await;
    fill_required(&session);
    for section in 2..=7 {
        session.go_to(section);
    }

    let record = session.submit().await.unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert!(record.completed_at.is_some());
    assert_eq!(record.email, "ops@acme.vc");
    assert!(session.is_completed());

    assert!(h.manager.local_store().read(&key()).is_none());
    assert_eq!(h.drafts.inner.len(), 1);

    let opened = h.reload().manager.open("2024").await.unwrap();
    assert!(opened.is_completed());
    let done = opened.into_completed().unwrap();
    assert_eq!(done.get("firm_name"), Some(&FieldValue::text("Acme Capital")));
    assert!(done.completed_at().is_some());
}

#[tokio::test(start_paused = true)]
async fn validation_failure_persists_nothing() {
    let h = Harness::new();
    let session = h.open_editing().await;
    session.set("email_address", "not-an-email").unwrap();

    let err = session.submit().await.unwrap_err();
    let SurveyError::Validation(errors) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errors.fields(), vec!["firm_name", "email_address"]);
    assert_eq!(h.drafts.inner.len(), 0);
    assert!(!session.is_completed());
}

#[tokio::test(start_paused = true)]
async fn completed_session_rejects_edits_and_saves() {
    let h = Harness::new();
    let session = h.open_editing().await;
    fill_required(&session);
    session.submit().await.unwrap();
    let writes = h.drafts.writes();

    let err = session.set("firm_name", "Changed").unwrap_err();
    assert!(matches!(err, SurveyError::ReadOnly { .. }));
    assert_eq!(session.get("firm_name"), Some(FieldValue::text("Acme Capital")));
    assert!(!session.go_to(3));
    assert_eq!(session.save_now().await.unwrap(), SaveOutcome::Skipped);

    quiet_period().await;
    assert_eq!(h.drafts.writes(), writes);

    assert!(matches!(
        session.submit().await.unwrap_err(),
        SurveyError::ReadOnly { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn submit_over_existing_draft_updates_instead_of_inserting() {
    let h = Harness::new();
    let session = h.open_editing().await;
    session.set("firm_name", "Acme").unwrap();
    quiet_period().await;
    assert_eq!(h.drafts.inserts.load(Ordering::SeqCst), 1);

    session.set("email_address", "ops@acme.vc").unwrap();
    session.submit().await.unwrap();

    assert_eq!(h.drafts.inserts.load(Ordering::SeqCst), 1);
    assert_eq!(h.drafts.inner.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn storage_failure_keeps_draft_and_allows_retry() {
    let h = Harness::new();
    let session = h.open_editing().await;
    fill_required(&session);
    h.drafts.fail_completion.store(true, Ordering::SeqCst);

    let err = session.submit().await.unwrap_err();
    let SurveyError::Submission(sub) = err else {
        panic!("expected submission error, got {err:?}");
    };
    assert_eq!(sub.stage, SubmissionStage::Finalize);
    assert!(!session.is_completed());
    assert_eq!(session.get("firm_name"), Some(FieldValue::text("Acme Capital")));
    let stored = h.drafts.last_written().unwrap();
    assert_eq!(stored.status, SessionStatus::Draft);

    session.set("fund_name", "Fund II").unwrap();
    h.drafts.fail_completion.store(false, Ordering::SeqCst);
    let record = session.submit().await.unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.fields["fund_name"], FieldValue::text("Fund II"));
}

#[tokio::test(start_paused = true)]
async fn upsert_failure_is_reported_with_its_stage() {
    let h = Harness::new();
    let session = h.open_editing().await;
    fill_required(&session);
    h.drafts.set_fail_writes(true);

    let err = session.submit().await.unwrap_err();
    let SurveyError::Submission(sub) = err else {
        panic!("expected submission error, got {err:?}");
    };
    assert_eq!(sub.stage, SubmissionStage::Upsert);
    assert!(!session.is_completed());
}

#[tokio::test(start_paused = true)]
async fn submit_waits_for_in_flight_autosave() {
    let h = Harness::new();
    let session = h.open_editing().await;
    fill_required(&session);
    h.drafts.set_write_delay(Duration::from_millis(1000));

    tokio::time::sleep(Duration::from_millis(2200)).await;
    assert_eq!(h.drafts.in_flight.load(Ordering::SeqCst), 1);

    session.submit().await.unwrap();
    assert_eq!(h.drafts.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(h.drafts.inner.len(), 1);
    assert!(session.is_completed());
}

#[tokio::test(start_paused = true)]
async fn resubmit_confirms_finalize_whose_reply_was_lost() {
    let h = Harness::new();
    let session = h.open_editing().await;
    fill_required(&session);
    h.drafts.drop_completion_ack.store(true, Ordering::SeqCst);

    let err = session.submit().await.unwrap_err();
    let SurveyError::Submission(sub) = err else {
        panic!("expected submission error, got {err:?}");
    };
    assert_eq!(sub.stage, SubmissionStage::Finalize);
    assert!(!session.is_completed());
    assert_eq!(
        h.drafts.last_written().unwrap().status,
        SessionStatus::Completed
    );

    let record = session.submit().await.unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert!(session.is_completed());
    assert!(h.manager.local_store().read(&key()).is_none());
    assert!(matches!(
        session.set("firm_name", "Changed").unwrap_err(),
        SurveyError::ReadOnly { .. }
    ));
    assert_eq!(h.drafts.inner.len(), 1);
}
