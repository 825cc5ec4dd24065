//! Genre/instrument id→name lookup
//!
//! Loaded once at startup from the name tables and read-only while requests
//! are served. [`NameLookup::reload`] swaps in fresh snapshots for
//! administrative refreshes; readers holding an old snapshot are unaffected.

use crate::reconcile::RelationKind;
use jamr_common::db::NamedTag;
use jamr_common::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Debug, Default)]
struct NameTables {
    genres: HashMap<i64, String>,
    instruments: HashMap<i64, String>,
}

impl NameTables {
    fn get(&self, kind: RelationKind) -> &HashMap<i64, String> {
        match kind {
            RelationKind::Genre => &self.genres,
            RelationKind::Instrument => &self.instruments,
        }
    }
}

pub struct NameLookup {
    tables: RwLock<Arc<NameTables>>,
}

impl NameLookup {
    /// Load both name tables
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let tables = read_tables(pool).await?;
        info!(
            genres = tables.genres.len(),
            instruments = tables.instruments.len(),
            "Loaded name lookup"
        );
        Ok(Self {
            tables: RwLock::new(Arc::new(tables)),
        })
    }

    /// Build from in-memory entries
    pub fn from_entries(
        genres: impl IntoIterator<Item = (i64, String)>,
        instruments: impl IntoIterator<Item = (i64, String)>,
    ) -> Self {
        let tables = NameTables {
            genres: genres.into_iter().collect(),
            instruments: instruments.into_iter().collect(),
        };
        Self {
            tables: RwLock::new(Arc::new(tables)),
        }
    }

    /// Re-read the name tables and replace the current snapshot
    pub async fn reload(&self, pool: &SqlitePool) -> Result<()> {
        let fresh = Arc::new(read_tables(pool).await?);
        info!(
            genres = fresh.genres.len(),
            instruments = fresh.instruments.len(),
            "Reloaded name lookup"
        );
        let mut guard = self.tables.write().unwrap_or_else(|e| e.into_inner());
        *guard = fresh;
        Ok(())
    }

    fn snapshot(&self) -> Arc<NameTables> {
        let guard = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn name(&self, kind: RelationKind, id: i64) -> Option<String> {
        self.snapshot().get(kind).get(&id).cloned()
    }

    pub fn contains(&self, kind: RelationKind, id: i64) -> bool {
        self.snapshot().get(kind).contains_key(&id)
    }

    pub fn len(&self, kind: RelationKind) -> usize {
        self.snapshot().get(kind).len()
    }

    pub fn is_empty(&self, kind: RelationKind) -> bool {
        self.len(kind) == 0
    }

    /// All entries of one table, ordered by id
    pub fn entries(&self, kind: RelationKind) -> Vec<NamedTag> {
        let snapshot = self.snapshot();
        let mut entries: Vec<NamedTag> = snapshot
            .get(kind)
            .iter()
            .map(|(id, name)| NamedTag {
                id: *id,
                name: name.clone(),
            })
            .collect();
        entries.sort_by_key(|t| t.id);
        entries
    }
}

async fn read_tables(pool: &SqlitePool) -> Result<NameTables> {
    let mut tables = NameTables::default();
    for kind in RelationKind::ALL {
        let sql = format!("SELECT id, name FROM {}", kind.name_table());
        let rows = sqlx::query(&sql).fetch_all(pool).await?;
        let mut map = HashMap::with_capacity(rows.len());
        for row in rows {
            map.insert(row.try_get::<i64, _>("id")?, row.try_get::<String, _>("name")?);
        }
        match kind {
            RelationKind::Genre => tables.genres = map,
            RelationKind::Instrument => tables.instruments = map,
        }
    }
    Ok(tables)
}
