//! Profile updates
//!
//! Every operation runs in one SQLite transaction: the profile is loaded,
//! the nickname checked for uniqueness, history rows appended, tag links
//! reconciled and the profile row written back guarded by its version
//! counter. Any error drops the transaction, which rolls everything back.
//! Notifications go out only after commit.

use crate::notify::NotificationSink;
use crate::reconcile::{LinkDelta, ReconcileMode, ReconciliationEngine, RelationKind};
use chrono::{DateTime, Utc};
use jamr_common::db::{HistoryEntry, Profile, Sex, PROFILE_COLUMNS};
use jamr_common::error::is_unique_violation;
use jamr_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use tracing::{info, warn};

/// SQLITE_BUSY_SNAPSHOT: another writer committed after this transaction read
const SQLITE_BUSY_SNAPSHOT: &str = "517";

/// Requested changes; `None` fields are "not specified"
///
/// `chattable` and `public` are always written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub nickname: Option<String>,
    pub city: Option<String>,
    pub sex: Option<Sex>,
    pub introduction: Option<String>,
    pub chattable: bool,
    pub public: bool,
    pub genre_ids: Option<Vec<i64>>,
    pub instrument_ids: Option<Vec<i64>>,
}

/// What a committed update changed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    pub profile_id: String,
    /// Version after commit
    pub version: i64,
    pub nickname_changed: bool,
    /// `None` when the relation was left untouched
    pub genres: Option<LinkDelta>,
    pub instruments: Option<LinkDelta>,
}

impl UpdateReport {
    /// Link rows inserted or deleted across both relations
    pub fn link_writes(&self) -> usize {
        [&self.genres, &self.instruments]
            .into_iter()
            .flatten()
            .map(LinkDelta::write_count)
            .sum()
    }
}

#[derive(Clone)]
pub struct UpdateOrchestrator {
    pool: SqlitePool,
    reconciler: ReconciliationEngine,
    notifier: Arc<dyn NotificationSink>,
}

impl UpdateOrchestrator {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            pool,
            reconciler: ReconciliationEngine::new(),
            notifier,
        }
    }

    /// Merge: unspecified scalars and tag sets are left as they are
    pub async fn partial_update(&self, profile_id: &str, update: &ProfileUpdate) -> Result<UpdateReport> {
        self.apply(profile_id, update, ReconcileMode::Partial).await
    }

    /// Replace: unspecified tag sets are cleared
    pub async fn full_replace(&self, profile_id: &str, update: &ProfileUpdate) -> Result<UpdateReport> {
        self.apply(profile_id, update, ReconcileMode::FullReplace).await
    }

    /// Set the image URL and record the change
    pub async fn update_image(&self, profile_id: &str, url: &str) -> Result<UpdateReport> {
        let mut tx = self.pool.begin().await?;
        let version = self.image_in_tx(&mut tx, profile_id, url, Utc::now()).await?;
        tx.commit().await.map_err(map_commit_error)?;

        info!(profile_id, version, "Updated profile image");
        self.notifier.profile_updated(profile_id, version);

        Ok(UpdateReport {
            profile_id: profile_id.to_string(),
            version,
            nickname_changed: false,
            genres: None,
            instruments: None,
        })
    }

    /// Audit trail of one profile, oldest first
    pub async fn history(&self, profile_id: &str) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, profile_id, field_name, old_value, new_value, changed_at
            FROM profile_history
            WHERE profile_id = ?
            ORDER BY id
            "#,
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(HistoryEntry::from_row).collect()
    }

    async fn apply(
        &self,
        profile_id: &str,
        update: &ProfileUpdate,
        mode: ReconcileMode,
    ) -> Result<UpdateReport> {
        let mut tx = self.pool.begin().await?;
        let applied = self
            .apply_in_tx(&mut tx, profile_id, update, mode, Utc::now())
            .await?;
        tx.commit().await.map_err(map_commit_error)?;

        let report = UpdateReport {
            profile_id: profile_id.to_string(),
            version: applied.version,
            nickname_changed: applied.renamed.is_some(),
            genres: applied.genres,
            instruments: applied.instruments,
        };
        info!(
            profile_id,
            version = report.version,
            ?mode,
            link_writes = report.link_writes(),
            "Updated profile"
        );

        if let Some((old, new)) = applied.renamed {
            if let Err(e) = self.notifier.nickname_changed(profile_id, &old, &new) {
                warn!(profile_id, "Nickname change notification failed: {}", e);
            }
        }
        self.notifier.profile_updated(profile_id, report.version);

        Ok(report)
    }

    /// Every statement of an update; the caller commits
    ///
    /// Any statement may be the one that discovers a newer committed writer,
    /// so the whole body goes through the conflict mapping.
    async fn apply_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        profile_id: &str,
        update: &ProfileUpdate,
        mode: ReconcileMode,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        let steps = async move {
            let current = load_profile(tx, profile_id).await?;
            let mut next = current.clone();

            let mut renamed = None;
            if let Some(nickname) = update.nickname.as_deref() {
                if nickname != current.nickname {
                    if nickname_taken(tx, nickname, profile_id).await? {
                        return Err(Error::Conflict(format!("nickname {} already in use", nickname)));
                    }
                    record_history(
                        tx,
                        profile_id,
                        "nickname",
                        Some(&current.nickname),
                        Some(nickname),
                        now,
                    )
                    .await?;
                    next.nickname = nickname.to_string();
                    renamed = Some((current.nickname.clone(), nickname.to_string()));
                }
            }

            if let Some(city) = &update.city {
                next.city = Some(city.clone());
            }
            if let Some(sex) = update.sex {
                next.sex = Some(sex);
            }
            if let Some(introduction) = &update.introduction {
                next.introduction = Some(introduction.clone());
            }
            next.chattable = update.chattable;
            next.public = update.public;

            let genres = self
                .reconciler
                .reconcile(tx, RelationKind::Genre, profile_id, update.genre_ids.as_deref(), mode)
                .await?;
            let instruments = self
                .reconciler
                .reconcile(
                    tx,
                    RelationKind::Instrument,
                    profile_id,
                    update.instrument_ids.as_deref(),
                    mode,
                )
                .await?;

            let version = persist_profile(tx, &next, current.version, now).await?;
            Ok::<_, Error>(Applied {
                version,
                renamed,
                genres,
                instruments,
            })
        };
        steps.await.map_err(snapshot_conflict)
    }

    async fn image_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        profile_id: &str,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let steps = async move {
            let current = load_profile(tx, profile_id).await?;
            record_history(
                tx,
                profile_id,
                "image_url",
                current.image_url.as_deref(),
                Some(url),
                now,
            )
            .await?;

            let mut next = current.clone();
            next.image_url = Some(url.to_string());
            persist_profile(tx, &next, current.version, now).await
        };
        steps.await.map_err(snapshot_conflict)
    }
}

/// Outcome of an update body before commit
#[derive(Debug)]
struct Applied {
    version: i64,
    renamed: Option<(String, String)>,
    genres: Option<LinkDelta>,
    instruments: Option<LinkDelta>,
}

async fn load_profile(tx: &mut Transaction<'_, Sqlite>, profile_id: &str) -> Result<Profile> {
    let sql = format!("SELECT {} FROM profiles p WHERE p.id = ?", PROFILE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(profile_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("profile {}", profile_id)))?;
    Profile::from_row(&row)
}

async fn nickname_taken(
    tx: &mut Transaction<'_, Sqlite>,
    nickname: &str,
    profile_id: &str,
) -> Result<bool> {
    let taken: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM profiles WHERE nickname = ? AND id <> ? LIMIT 1")
            .bind(nickname)
            .bind(profile_id)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(taken.is_some())
}

async fn record_history(
    tx: &mut Transaction<'_, Sqlite>,
    profile_id: &str,
    field_name: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    changed_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO profile_history (profile_id, field_name, old_value, new_value, changed_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(profile_id)
    .bind(field_name)
    .bind(old_value)
    .bind(new_value)
    .bind(changed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Write scalars back if nobody else bumped the version; returns the new version
async fn persist_profile(
    tx: &mut Transaction<'_, Sqlite>,
    profile: &Profile,
    expected_version: i64,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        UPDATE profiles
        SET nickname = ?, city = ?, sex = ?, introduction = ?, chattable = ?, public = ?,
            image_url = ?, updated_at = ?, version = version + 1
        WHERE id = ? AND version = ?
        "#,
    )
    .bind(&profile.nickname)
    .bind(&profile.city)
    .bind(profile.sex.map(|s| s.as_str()))
    .bind(&profile.introduction)
    .bind(profile.chattable)
    .bind(profile.public)
    .bind(&profile.image_url)
    .bind(now)
    .bind(&profile.id)
    .bind(expected_version)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            Error::Conflict(format!("nickname {} already in use", profile.nickname))
        } else {
            Error::Database(e)
        }
    })?;

    if result.rows_affected() == 0 {
        return Err(Error::Conflict(format!(
            "profile {} was modified concurrently (expected version {})",
            profile.id, expected_version
        )));
    }

    Ok(expected_version + 1)
}

fn is_busy_snapshot(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(SQLITE_BUSY_SNAPSHOT),
        _ => false,
    }
}

/// A statement that lost a race against another committed writer is a conflict
fn snapshot_conflict(err: Error) -> Error {
    match err {
        Error::Database(e) if is_busy_snapshot(&e) => {
            Error::Conflict("profile was modified concurrently".to_string())
        }
        other => other,
    }
}

fn map_commit_error(err: sqlx::Error) -> Error {
    snapshot_conflict(Error::Database(err))
}
