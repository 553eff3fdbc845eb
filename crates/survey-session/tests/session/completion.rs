//! CompletionIndex caching.

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use survey_session::types::{SurveyKey, UserId};

use crate::common::{Harness, USER};

fn editions() -> Vec<SurveyKey> {
    ["2021", "2022", "2023", "2024"]
        .into_iter()
        .map(SurveyKey::from)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn reports_completed_editions() {
    let h = Harness::new();
    let session = h.open_editing().await;
    session.set("firm_name", "Acme").unwrap();
    session.set("email_address", "ops@acme.vc").unwrap();
    session.submit().await.unwrap();

    let index = h.manager.completion_index(editions());
    let user = UserId::from(USER);
    let done = index.completed(&user).await;
    assert_eq!(done.into_iter().collect::<Vec<_>>(), vec![SurveyKey::from("2024")]);
    assert!(!index.is_completed(&user, &SurveyKey::from("2023")).await);
}

#[tokio::test(start_paused = true)]
async fn answers_are_cached_for_thirty_seconds() {
    let h = Harness::new();
    let index = h.manager.completion_index(editions());
    let user = UserId::from(USER);

    index.completed(&user).await;
    let after_first = h.drafts.finds.load(Ordering::SeqCst);
    index.completed(&user).await;
    assert_eq!(h.drafts.finds.load(Ordering::SeqCst), after_first);

    tokio::time::sleep(Duration::from_secs(31)).await;
    index.completed(&user).await;
    assert_eq!(h.drafts.finds.load(Ordering::SeqCst), after_first * 2);
}

#[tokio::test(start_paused = true)]
async fn invalidate_forces_refresh() {
    let h = Harness::new();
    let index = h.manager.completion_index(editions());
    let user = UserId::from(USER);

    assert!(index.completed(&user).await.is_empty());

    let session = h.open_editing().await;
    session.set("firm_name", "Acme").unwrap();
    session.set("email_address", "ops@acme.vc").unwrap();
    session.submit().await.unwrap();

    assert!(index.completed(&user).await.is_empty(), "cached answer expected");
    index.invalidate(&user);
    assert!(index.is_completed(&user, &SurveyKey::from("2024")).await);
}

#[tokio::test(start_paused = true)]
async fn lookup_failures_count_as_not_completed() {
    let h = Harness::new();
    h.drafts.set_fail_reads(true);
    let index = h.manager.completion_index(editions());
    assert!(index.completed(&UserId::from(USER)).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_lookup() {
    let h = Harness::new();
    h.drafts.set_read_delay(Duration::from_millis(100));
    let index = h.manager.completion_index(editions());
    let user = UserId::from(USER);

    let (a, b) = tokio::join!(index.completed(&user), index.completed(&user));
    assert_eq!(a, b);
    assert_eq!(h.drafts.finds.load(Ordering::SeqCst), editions().len());
}

#[tokio::test(start_paused = true)]
async fn editions_are_looked_up_concurrently() {
    let h = Harness::new();
    h.drafts.set_read_delay(Duration::from_millis(100));
    let index = h.manager.completion_index(editions());

    let started = tokio::time::Instant::now();
    index.completed(&UserId::from(USER)).await;
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn subscribers_hear_only_changed_answers() {
    let h = Harness::new();
    let index = h.manager.completion_index(editions());
    let user = UserId::from(USER);
    let seen: Arc<Mutex<Vec<BTreeSet<SurveyKey>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _unsubscribe = index.subscribe(move |change| sink.lock().push(change.completed.clone()));

    index.completed(&user).await;
    index.completed(&user).await;

    let session = h.open_editing().await;
    session.set("firm_name", "Acme").unwrap();
    session.set("email_address", "ops@acme.vc").unwrap();
    session.submit().await.unwrap();

    index.invalidate(&user);
    index.completed(&user).await;
    index.invalidate(&user);
    index.completed(&user).await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].is_empty());
    assert_eq!(seen[1], BTreeSet::from([SurveyKey::from("2024")]));
}
