//! Integration tests for profile updates
//!
//! Covers link reconciliation in both modes, idempotence, nickname conflicts,
//! audit history, optimistic versioning and notification behavior.

mod helpers;

use helpers::{history_count, linked_ids, orchestrator, seed, setup};
use jamr_common::config::ProfileConfig;
use jamr_common::db::Sex;
use jamr_common::events::ProfileEvent;
use jamr_common::Error;
use jamr_profile::notify::{NotificationSink, NotifyError};
use jamr_profile::{ProfileCore, ProfileUpdate, RelationKind, SearchEngine, UpdateOrchestrator};
use std::collections::BTreeSet;
use std::sync::Arc;

fn genres_update(ids: Option<Vec<i64>>) -> ProfileUpdate {
    ProfileUpdate {
        chattable: true,
        public: true,
        genre_ids: ids,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_partial_then_full_replace_example() {
    let db = setup().await;
    seed("P", "player").genres(&[1, 2, 3]).insert(&db.pool).await;
    let (updates, _bus) = orchestrator(&db.pool);

    let report = updates
        .partial_update("P", &genres_update(Some(vec![2, 3, 4])))
        .await
        .unwrap();

    let delta = report.genres.expect("genres reconciled");
    assert_eq!(delta.to_add, BTreeSet::from([4]));
    assert_eq!(delta.to_remove, BTreeSet::from([1]));
    assert_eq!(linked_ids(&db.pool, RelationKind::Genre, "P").await, vec![2, 3, 4]);

    updates.full_replace("P", &genres_update(None)).await.unwrap();
    assert!(linked_ids(&db.pool, RelationKind::Genre, "P").await.is_empty());
}

#[tokio::test]
async fn test_partial_update_is_idempotent() {
    let db = setup().await;
    seed("P", "player").genres(&[1]).instruments(&[2]).insert(&db.pool).await;
    let (updates, _bus) = orchestrator(&db.pool);
    let search = SearchEngine::new(db.pool.clone());

    let update = ProfileUpdate {
        nickname: Some("newname".to_string()),
        city: Some("Daegu".to_string()),
        chattable: true,
        public: false,
        genre_ids: Some(vec![4, 4, 2]),
        instrument_ids: Some(vec![2, 3]),
        ..Default::default()
    };

    let first = updates.partial_update("P", &update).await.unwrap();
    assert_eq!(first.link_writes(), 4);
    let after_first = search.search_by_id("P").await.unwrap();

    let second = updates.partial_update("P", &update).await.unwrap();
    assert_eq!(second.link_writes(), 0);
    assert!(!second.nickname_changed);
    let after_second = search.search_by_id("P").await.unwrap();

    assert_eq!(after_first.genres, after_second.genres);
    assert_eq!(after_first.instruments, after_second.instruments);
    assert_eq!(after_first.profile.nickname, after_second.profile.nickname);
    assert_eq!(after_first.profile.city, after_second.profile.city);
    assert_eq!(after_second.genre_ids(), vec![2, 4]);
    assert_eq!(after_second.instrument_ids(), vec![2, 3]);
    // Only the first call renamed
    assert_eq!(history_count(&db.pool, "P").await, 1);
}

#[tokio::test]
async fn test_partial_absent_leaves_links_full_replace_clears() {
    let db = setup().await;
    seed("P", "player").genres(&[1, 2]).instruments(&[3]).insert(&db.pool).await;
    let (updates, _bus) = orchestrator(&db.pool);

    let report = updates.partial_update("P", &genres_update(None)).await.unwrap();
    assert!(report.genres.is_none());
    assert!(report.instruments.is_none());
    assert_eq!(linked_ids(&db.pool, RelationKind::Genre, "P").await, vec![1, 2]);
    assert_eq!(linked_ids(&db.pool, RelationKind::Instrument, "P").await, vec![3]);

    // Empty list clears even in partial mode
    updates.partial_update("P", &genres_update(Some(vec![]))).await.unwrap();
    assert!(linked_ids(&db.pool, RelationKind::Genre, "P").await.is_empty());
    assert_eq!(linked_ids(&db.pool, RelationKind::Instrument, "P").await, vec![3]);

    // Absent instruments are cleared by a full replace
    updates.full_replace("P", &genres_update(Some(vec![5]))).await.unwrap();
    assert_eq!(linked_ids(&db.pool, RelationKind::Genre, "P").await, vec![5]);
    assert!(linked_ids(&db.pool, RelationKind::Instrument, "P").await.is_empty());
}

#[tokio::test]
async fn test_scalar_fields_merge() {
    let db = setup().await;
    seed("P", "player").city("Seoul").sex(Sex::Male).insert(&db.pool).await;
    let (updates, _bus) = orchestrator(&db.pool);
    let search = SearchEngine::new(db.pool.clone());

    let update = ProfileUpdate {
        introduction: Some("Weekend bassist".to_string()),
        chattable: false,
        public: false,
        ..Default::default()
    };
    let report = updates.partial_update("P", &update).await.unwrap();

    let profile = search.search_by_id("P").await.unwrap().profile;
    assert_eq!(profile.city.as_deref(), Some("Seoul"));
    assert_eq!(profile.sex, Some(Sex::Male));
    assert_eq!(profile.introduction.as_deref(), Some("Weekend bassist"));
    assert!(!profile.chattable);
    assert!(!profile.public);
    assert_eq!(profile.version, 1);
    assert_eq!(report.version, 1);
    assert!(profile.updated_at.is_some());
}

#[tokio::test]
async fn test_nickname_conflict_writes_nothing() {
    let db = setup().await;
    seed("A", "alpha").city("Seoul").genres(&[1]).insert(&db.pool).await;
    seed("B", "bravo").insert(&db.pool).await;
    let (updates, _bus) = orchestrator(&db.pool);
    let search = SearchEngine::new(db.pool.clone());

    let update = ProfileUpdate {
        nickname: Some("bravo".to_string()),
        city: Some("Busan".to_string()),
        genre_ids: Some(vec![2]),
        ..Default::default()
    };
    let err = updates.partial_update("A", &update).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let profile = search.search_by_id("A").await.unwrap();
    assert_eq!(profile.profile.nickname, "alpha");
    assert_eq!(profile.profile.city.as_deref(), Some("Seoul"));
    assert_eq!(profile.profile.version, 0);
    assert_eq!(profile.genre_ids(), vec![1]);
    assert_eq!(history_count(&db.pool, "A").await, 0);
}

#[tokio::test]
async fn test_nickname_change_records_history_and_notifies() {
    let db = setup().await;
    seed("A", "alpha").insert(&db.pool).await;
    let (updates, bus) = orchestrator(&db.pool);
    let mut rx = bus.subscribe();

    let update = ProfileUpdate {
        nickname: Some("omega".to_string()),
        ..Default::default()
    };
    let report = updates.partial_update("A", &update).await.unwrap();
    assert!(report.nickname_changed);

    let history = updates.history("A").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].field_name, "nickname");
    assert_eq!(history[0].old_value.as_deref(), Some("alpha"));
    assert_eq!(history[0].new_value.as_deref(), Some("omega"));

    match rx.try_recv().unwrap() {
        ProfileEvent::NicknameChanged {
            old_nickname,
            new_nickname,
            ..
        } => {
            assert_eq!(old_nickname, "alpha");
            assert_eq!(new_nickname, "omega");
        }
        other => panic!("expected NicknameChanged, got {:?}", other),
    }
    assert_eq!(rx.try_recv().unwrap().event_type(), "ProfileUpdated");
}

#[tokio::test]
async fn test_unchanged_nickname_is_not_recorded() {
    let db = setup().await;
    seed("A", "alpha").insert(&db.pool).await;
    let (updates, bus) = orchestrator(&db.pool);
    let mut rx = bus.subscribe();

    let update = ProfileUpdate {
        nickname: Some("alpha".to_string()),
        ..Default::default()
    };
    let report = updates.partial_update("A", &update).await.unwrap();

    assert!(!report.nickname_changed);
    assert_eq!(history_count(&db.pool, "A").await, 0);
    assert_eq!(rx.try_recv().unwrap().event_type(), "ProfileUpdated");
}

#[tokio::test]
async fn test_missing_profile_is_not_found() {
    let db = setup().await;
    let (updates, _bus) = orchestrator(&db.pool);

    let err = updates
        .full_replace("ghost", &genres_update(Some(vec![1])))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = updates.update_image("ghost", "https://x/y.png").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profile_genres")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(links, 0);
}

#[tokio::test]
async fn test_update_image_always_records_history() {
    let db = setup().await;
    seed("A", "alpha").insert(&db.pool).await;
    let (updates, _bus) = orchestrator(&db.pool);

    updates.update_image("A", "https://cdn/a.png").await.unwrap();
    let report = updates.update_image("A", "https://cdn/a.png").await.unwrap();
    assert_eq!(report.version, 2);

    let history = updates.history("A").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].old_value, None);
    assert_eq!(history[1].old_value.as_deref(), Some("https://cdn/a.png"));
    assert!(history.iter().all(|h| h.field_name == "image_url"));

    let detail = SearchEngine::new(db.pool.clone()).search_by_id("A").await.unwrap();
    assert_eq!(detail.profile.image_url.as_deref(), Some("https://cdn/a.png"));
}

#[tokio::test]
async fn test_concurrent_version_bump_is_conflict_and_rolls_back() {
    let db = setup().await;
    seed("A", "alpha").genres(&[1]).insert(&db.pool).await;
    let (updates, _bus) = orchestrator(&db.pool);

    // Stand-in for a writer that commits between our read and our write
    sqlx::query(
        r#"
        CREATE TRIGGER race_writer AFTER INSERT ON profile_history
        BEGIN
            UPDATE profiles SET version = version + 1 WHERE id = NEW.profile_id;
        END
        "#,
    )
    .execute(&db.pool)
    .await
    .unwrap();

    let update = ProfileUpdate {
        nickname: Some("renamed".to_string()),
        genre_ids: Some(vec![2]),
        ..Default::default()
    };
    let err = updates.partial_update("A", &update).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "got {:?}", err);

    let detail = SearchEngine::new(db.pool.clone()).search_by_id("A").await.unwrap();
    assert_eq!(detail.profile.nickname, "alpha");
    assert_eq!(detail.profile.version, 0);
    assert_eq!(detail.genre_ids(), vec![1]);
    assert_eq!(history_count(&db.pool, "A").await, 0);
}

struct FailingSink;

impl NotificationSink for FailingSink {
    fn nickname_changed(&self, _: &str, _: &str, _: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Unavailable("broker down".to_string()))
    }
}

#[tokio::test]
async fn test_notification_failure_keeps_update() {
    let db = setup().await;
    seed("A", "alpha").insert(&db.pool).await;
    let updates = UpdateOrchestrator::new(db.pool.clone(), Arc::new(FailingSink));

    let update = ProfileUpdate {
        nickname: Some("still_saved".to_string()),
        ..Default::default()
    };
    let report = updates.partial_update("A", &update).await.unwrap();
    assert!(report.nickname_changed);

    let detail = SearchEngine::new(db.pool.clone()).search_by_id("A").await.unwrap();
    assert_eq!(detail.profile.nickname, "still_saved");
}

#[tokio::test]
async fn test_core_validates_before_writing() {
    let db = setup().await;
    seed("A", "alpha").genres(&[1]).insert(&db.pool).await;
    let core = ProfileCore::new(db.pool.clone(), ProfileConfig::default())
        .await
        .unwrap();

    let unknown_genre = genres_update(Some(vec![1, 999]));
    let err = core.partial_update("A", &unknown_genre).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let too_many = genres_update(Some(vec![1, 2, 3, 4]));
    assert!(core.full_replace("A", &too_many).await.is_err());

    let bad_nickname = ProfileUpdate {
        nickname: Some("has space".to_string()),
        ..Default::default()
    };
    assert!(core.partial_update("A", &bad_nickname).await.is_err());
    assert!(core.update_image("A", "not-a-url").await.is_err());

    assert_eq!(linked_ids(&db.pool, RelationKind::Genre, "A").await, vec![1]);
    assert_eq!(core.search_by_id("A").await.unwrap().profile.version, 0);

    let ok = core
        .partial_update("A", &genres_update(Some(vec![2, 3])))
        .await
        .unwrap();
    assert_eq!(ok.version, 1);
    assert!(core.search_page(&Default::default(), 0, None).await.is_err());
    assert_eq!(core.search_page(&Default::default(), 1, None).await.unwrap().total_results, 1);
}
