//! Database initialization
//!
//! Creates the SQLite file on first run, applies connection pragmas and
//! creates every table idempotently. Name tables are seeded with the default
//! genre and instrument catalogue.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Default genre catalogue (id, display name)
pub const DEFAULT_GENRES: &[(i64, &str)] = &[
    (1, "Rock"),
    (2, "Jazz"),
    (3, "Pop"),
    (4, "Hip-hop"),
    (5, "R&B"),
    (6, "Metal"),
    (7, "Classical"),
    (8, "Electronic"),
    (9, "Folk"),
    (10, "Blues"),
];

/// Default instrument catalogue (id, display name)
pub const DEFAULT_INSTRUMENTS: &[(i64, &str)] = &[
    (1, "Vocals"),
    (2, "Electric Guitar"),
    (3, "Acoustic Guitar"),
    (4, "Bass"),
    (5, "Drums"),
    (6, "Keyboard"),
    (7, "Piano"),
    (8, "Violin"),
    (9, "Saxophone"),
    (10, "Trumpet"),
];

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path, busy_timeout_ms: u64) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Per-connection settings: every pooled connection gets foreign keys,
    // WAL and the busy timeout, not just the first one
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    seed_names(&pool).await?;

    info!("Database busy timeout set to {} ms", busy_timeout_ms);

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_name_tables(pool).await?;
    create_profiles_table(pool).await?;
    create_link_tables(pool).await?;
    create_history_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_name_tables(pool: &SqlitePool) -> Result<()> {
    for table in ["genres", "instruments"] {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            )",
            table
        );
        sqlx::query(&sql).execute(pool).await?;
    }

    Ok(())
}

async fn create_profiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            nickname TEXT NOT NULL UNIQUE,
            city TEXT,
            sex TEXT CHECK (sex IS NULL OR sex IN ('MALE', 'FEMALE', 'OTHER')),
            introduction TEXT,
            chattable INTEGER NOT NULL DEFAULT 0,
            public INTEGER NOT NULL DEFAULT 1,
            image_url TEXT,
            created_at TIMESTAMP,
            updated_at TIMESTAMP,
            version INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_profiles_created_at ON profiles(created_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_profiles_city ON profiles(city)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_link_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profile_genres (
            profile_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            genre_id INTEGER NOT NULL REFERENCES genres(id),
            PRIMARY KEY (profile_id, genre_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profile_instruments (
            profile_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            instrument_id INTEGER NOT NULL REFERENCES instruments(id),
            PRIMARY KEY (profile_id, instrument_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Reverse lookups used by the EXISTS semi-joins
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_profile_genres_genre ON profile_genres(genre_id, profile_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_profile_instruments_instrument ON profile_instruments(instrument_id, profile_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profile_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            field_name TEXT NOT NULL,
            old_value TEXT,
            new_value TEXT,
            changed_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_profile_history_profile ON profile_history(profile_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Seed default name catalogues; existing rows are left alone
async fn seed_names(pool: &SqlitePool) -> Result<()> {
    for (id, name) in DEFAULT_GENRES {
        ensure_name(pool, "genres", *id, name).await?;
    }
    for (id, name) in DEFAULT_INSTRUMENTS {
        ensure_name(pool, "instruments", *id, name).await?;
    }
    Ok(())
}

async fn ensure_name(pool: &SqlitePool, table: &str, id: i64, name: &str) -> Result<()> {
    let sql = format!("INSERT OR IGNORE INTO {} (id, name) VALUES (?, ?)", table);
    sqlx::query(&sql).bind(id).bind(name).execute(pool).await?;
    Ok(())
}
