//! Test helpers for jamr-profile integration tests
//!
//! Provides an on-disk database in a temporary directory and a seeding
//! builder standing in for the registration service that normally creates
//! profiles.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use jamr_common::db::{init_database, Sex};
use jamr_common::events::EventBus;
use jamr_profile::{EventBusNotifier, RelationKind, UpdateOrchestrator};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

/// Initialized database that lives as long as this value
pub struct TestDb {
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub async fn setup() -> TestDb {
    let dir = TempDir::new().expect("temp dir");
    let pool = init_database(&dir.path().join("jamr.db"), 1000)
        .await
        .expect("init database");
    TestDb { pool, _dir: dir }
}

/// Fixed reference instant so ordering assertions are deterministic
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn minutes_after_base(minutes: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(minutes)
}

/// Profile row to insert
#[derive(Debug, Clone)]
pub struct ProfileSeed {
    pub id: String,
    pub nickname: String,
    pub city: Option<String>,
    pub sex: Option<Sex>,
    pub created_at: Option<DateTime<Utc>>,
    pub genres: Vec<i64>,
    pub instruments: Vec<i64>,
}

pub fn seed(id: &str, nickname: &str) -> ProfileSeed {
    ProfileSeed {
        id: id.to_string(),
        nickname: nickname.to_string(),
        city: None,
        sex: None,
        created_at: Some(base_time()),
        genres: Vec::new(),
        instruments: Vec::new(),
    }
}

impl ProfileSeed {
    pub fn city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }

    pub fn sex(mut self, sex: Sex) -> Self {
        self.sex = Some(sex);
        self
    }

    pub fn created_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.created_at = at;
        self
    }

    pub fn genres(mut self, ids: &[i64]) -> Self {
        self.genres = ids.to_vec();
        self
    }

    pub fn instruments(mut self, ids: &[i64]) -> Self {
        self.instruments = ids.to_vec();
        self
    }

    pub async fn insert(self, pool: &SqlitePool) {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, nickname, city, sex, chattable, public, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, 1, ?, ?)
            "#,
        )
        .bind(&self.id)
        .bind(&self.nickname)
        .bind(&self.city)
        .bind(self.sex.map(|s| s.as_str()))
        .bind(self.created_at)
        .bind(self.created_at)
        .execute(pool)
        .await
        .expect("insert profile");

        for id in &self.genres {
            sqlx::query("INSERT INTO profile_genres (profile_id, genre_id) VALUES (?, ?)")
                .bind(&self.id)
                .bind(id)
                .execute(pool)
                .await
                .expect("insert genre link");
        }
        for id in &self.instruments {
            sqlx::query("INSERT INTO profile_instruments (profile_id, instrument_id) VALUES (?, ?)")
                .bind(&self.id)
                .bind(id)
                .execute(pool)
                .await
                .expect("insert instrument link");
        }
    }
}

/// Linked ids for a profile, ascending
pub async fn linked_ids(pool: &SqlitePool, kind: RelationKind, profile_id: &str) -> Vec<i64> {
    let sql = format!(
        "SELECT {} FROM {} WHERE profile_id = ? ORDER BY 1",
        kind.id_column(),
        kind.link_table()
    );
    sqlx::query_scalar(&sql)
        .bind(profile_id)
        .fetch_all(pool)
        .await
        .expect("linked ids")
}

pub async fn history_count(pool: &SqlitePool, profile_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM profile_history WHERE profile_id = ?")
        .bind(profile_id)
        .fetch_one(pool)
        .await
        .expect("history count")
}

/// Orchestrator publishing to a fresh bus
pub fn orchestrator(pool: &SqlitePool) -> (UpdateOrchestrator, Arc<EventBus>) {
    let bus = Arc::new(EventBus::new(16));
    let notifier = Arc::new(EventBusNotifier::new(Arc::clone(&bus)));
    (UpdateOrchestrator::new(pool.clone(), notifier), bus)
}
