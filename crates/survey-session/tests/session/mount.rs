//! SessionManager::open: restoring a session on mount.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use survey_session::session::RestoreSource;
use survey_session::storage::MemorySnapshotBackend;
use survey_session::types::{FieldMap, FieldValue, SectionPosition, SessionStatus, SurveySession};
use survey_session::SessionOptions;

use crate::common::{key, quiet_period, Harness, MockDraftBackend};

#[tokio::test(start_paused = true)]
async fn fresh_user_starts_empty_at_section_one() {
    let h = Harness::new();
    let session = h.open_editing().await;

    assert_eq!(session.current_section(), 1);
    assert!(session.fields().is_empty());
    assert_eq!(session.to_session().status, SessionStatus::Draft);
    assert_eq!(session.restored_from(), RestoreSource::Fresh);

    quiet_period().await;
    assert_eq!(h.drafts.writes(), 0, "mount alone must not autosave");
}

#[tokio::test(start_paused = true)]
async fn remote_draft_is_restored_without_triggering_autosave() {
    let h = Harness::new();
    {
        let session = h.open_editing().await;
        session.set("firm_name", "Acme").unwrap();
        session.set("sectors", FieldValue::list(["Health"])).unwrap();
        session.save_now().await.unwrap();
    }
    h.manager.local_store().clear(&key());

    let reloaded = h.reload();
    let session = reloaded.open_editing().await;
    assert_eq!(session.restored_from(), RestoreSource::Remote);
    assert_eq!(session.get("firm_name"), Some(FieldValue::text("Acme")));
    assert!(session.dirty_fields().is_empty());

    quiet_period().await;
    assert_eq!(h.drafts.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn newer_local_snapshot_beats_stale_remote_and_is_pushed() {
    let h = Harness::new();
    {
        let session = h.open_editing().await;
        session.set("firm_name", "Acme").unwrap();
        session.save_now().await.unwrap();

        h.drafts.set_fail_writes(true);
        session.set("firm_name", "Acme Capital").unwrap();
        session.save_now().await.unwrap();
    }
    h.drafts.set_fail_writes(false);

    let reloaded = h.reload();
    let session = reloaded.open_editing().await;
    assert_eq!(session.restored_from(), RestoreSource::Local);
    assert_eq!(session.get("firm_name"), Some(FieldValue::text("Acme Capital")));

    quiet_period().await;
    let row = h.drafts.last_written().unwrap();
    assert_eq!(row.fields["firm_name"], FieldValue::text("Acme Capital"));
}

#[tokio::test(start_paused = true)]
async fn remote_wins_when_local_is_older() {
    let drafts = Arc::new(MockDraftBackend::new());
    let snapshots = Arc::new(MemorySnapshotBackend::new());
    let h = Harness::with_backends(SessionOptions::default(), drafts, snapshots);

    let mut old_local = FieldMap::new();
    old_local.insert("firm_name".into(), FieldValue::text("Old name"));
    h.manager.local_store().write_fields(
        &key(),
        &old_local,
        Utc::now() - chrono::Duration::hours(1),
    );

    let mut remote = SurveySession::new(key());
    remote.fields.insert("firm_name".into(), FieldValue::text("New name"));
    h.manager.remote_store().upsert_draft(&remote, None).await.unwrap();

    let session = h.open_editing().await;
    assert_eq!(session.restored_from(), RestoreSource::Remote);
    assert_eq!(session.get("firm_name"), Some(FieldValue::text("New name")));
}

#[tokio::test(start_paused = true)]
async fn section_restored_from_local_position() {
    let h = Harness::new();
    {
        let session = h.open_editing().await;
        session.go_to(4);
        session.set_scroll_offset(250);
    }
    let session = h.reload().open_editing().await;
    assert_eq!(
        session.position(),
        SectionPosition {
            section: 4,
            scroll_offset: 250
        }
    );
}

#[tokio::test(start_paused = true)]
async fn section_falls_back_to_remote_record() {
    let h = Harness::new();
    let mut remote = SurveySession::new(key());
    remote.current_section = 5;
    h.manager.remote_store().upsert_draft(&remote, None).await.unwrap();

    let session = h.open_editing().await;
    assert_eq!(session.current_section(), 5);
}

#[tokio::test(start_paused = true)]
async fn out_of_range_saved_section_is_clamped() {
    let h = Harness::with_options(SessionOptions {
        total_sections: Some(3),
        ..Default::default()
    });
    h.manager
        .local_store()
        .write_position(&key(), SectionPosition { section: 9, scroll_offset: 0 });
    let session = h.open_editing().await;
    assert_eq!(session.current_section(), 3);
    assert!(!session.go_to(0));
    assert!(!session.go_to(4));
    assert_eq!(session.current_section(), 3);
}

#[tokio::test(start_paused = true)]
async fn unreachable_remote_degrades_to_local() {
    let h = Harness::new();
    let mut fields = FieldMap::new();
    fields.insert("firm_name".into(), FieldValue::text("Offline edit"));
    h.manager.local_store().write_fields(&key(), &fields, Utc::now());
    h.drafts.set_fail_reads(true);

    let session = h.open_editing().await;
    assert_eq!(session.get("firm_name"), Some(FieldValue::text("Offline edit")));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.save_status(), survey_session::autosave::SaveStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn sessions_for_different_editions_are_independent() {
    let h = Harness::new();
    let s2024 = h.open_editing().await;
    let s2023 = h
        .manager
        .open("2023")
        .await
        .unwrap()
        .into_editing()
        .unwrap();

    s2024.set("firm_name", "A").unwrap();
    s2023.set("firm_name", "B").unwrap();
    quiet_period().await;

    assert_eq!(h.drafts.inner.len(), 2);
    assert_eq!(s2024.get("firm_name"), Some(FieldValue::text("A")));
    assert_eq!(s2023.get("firm_name"), Some(FieldValue::text("B")));
}

#[tokio::test(start_paused = true)]
async fn each_edition_fills_its_own_identity_columns() {
    let h = Harness::new();
    let s2024 = h.open_editing().await;
    let s2022 = h
        .manager
        .open("2022")
        .await
        .unwrap()
        .into_editing()
        .unwrap();

    s2024.set("email_address", "ops@acme.vc").unwrap();
    s2022.set("email", "gp@fund.org").unwrap();
    s2022.set("organisation", "Fund Org").unwrap();
    quiet_period().await;

    let records = h.drafts.inner.records();
    let find = |survey: &str| {
        records
            .iter()
            .find(|r| r.survey_key.as_str() == survey)
            .cloned()
            .unwrap()
    };

    let r2022 = find("2022");
    assert_eq!(r2022.email, "gp@fund.org");
    assert_eq!(r2022.columns["organisation"], "Fund Org");
    assert_eq!(r2022.columns["name"], "Draft");
    assert!(!r2022.columns.contains_key("fund_name"));

    let r2024 = find("2024");
    assert_eq!(r2024.email, "ops@acme.vc");
    assert_eq!(r2024.columns["fund_name"], "Draft");
    assert!(!r2024.columns.contains_key("organisation"));
}
