//! Genre/instrument link reconciliation
//!
//! Given the links a profile has and the ids a caller wants, compute the
//! minimal insert/delete sets and apply exactly those inside the caller's
//! transaction. Ids that are both present and desired are never rewritten,
//! so repeating a call with the same desired set performs no writes.

use jamr_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, Transaction};
use std::collections::BTreeSet;
use tracing::debug;

/// Many-to-many relation between profiles and a name table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Genre,
    Instrument,
}

impl RelationKind {
    pub const ALL: [RelationKind; 2] = [RelationKind::Genre, RelationKind::Instrument];

    pub fn link_table(&self) -> &'static str {
        match self {
            RelationKind::Genre => "profile_genres",
            RelationKind::Instrument => "profile_instruments",
        }
    }

    pub fn id_column(&self) -> &'static str {
        match self {
            RelationKind::Genre => "genre_id",
            RelationKind::Instrument => "instrument_id",
        }
    }

    pub fn name_table(&self) -> &'static str {
        match self {
            RelationKind::Genre => "genres",
            RelationKind::Instrument => "instruments",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RelationKind::Genre => "genre",
            RelationKind::Instrument => "instrument",
        }
    }
}

/// How an absent desired set is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileMode {
    /// Absent means "not specified": leave links untouched
    Partial,
    /// Absent means "none": clear the relation
    FullReplace,
}

/// Links to insert and delete for one relation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkDelta {
    pub to_add: BTreeSet<i64>,
    pub to_remove: BTreeSet<i64>,
}

impl LinkDelta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Number of link rows written (inserted plus deleted)
    pub fn write_count(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// Compute the minimal delta from `current` to `desired`
///
/// Returns `None` when the relation must be left untouched (partial mode
/// with no desired set). Duplicates in `desired` collapse.
pub fn compute_delta(
    current: &BTreeSet<i64>,
    desired: Option<&[i64]>,
    mode: ReconcileMode,
) -> Option<LinkDelta> {
    let desired: BTreeSet<i64> = match (desired, mode) {
        (None, ReconcileMode::Partial) => return None,
        (None, ReconcileMode::FullReplace) => BTreeSet::new(),
        (Some(ids), _) => ids.iter().copied().collect(),
    };

    Some(LinkDelta {
        to_add: desired.difference(current).copied().collect(),
        to_remove: current.difference(&desired).copied().collect(),
    })
}

/// Applies link deltas against the link tables
///
/// Performs no existence checks on ids; callers validate beforehand.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Query the ids currently linked to a profile
    pub async fn current_ids(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        kind: RelationKind,
        profile_id: &str,
    ) -> Result<BTreeSet<i64>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE profile_id = ?",
            kind.id_column(),
            kind.link_table()
        );
        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(profile_id)
            .fetch_all(&mut **tx)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// Bring one relation of a profile to the desired set
    ///
    /// Returns the applied delta, or `None` if the relation was untouched.
    pub async fn reconcile(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        kind: RelationKind,
        profile_id: &str,
        desired: Option<&[i64]>,
        mode: ReconcileMode,
    ) -> Result<Option<LinkDelta>> {
        if desired.is_none() && mode == ReconcileMode::Partial {
            return Ok(None);
        }

        let current = self.current_ids(tx, kind, profile_id).await?;
        let delta = match compute_delta(&current, desired, mode) {
            Some(delta) => delta,
            None => return Ok(None),
        };

        self.apply(tx, kind, profile_id, &delta).await?;

        debug!(
            profile_id,
            relation = kind.label(),
            added = ?delta.to_add,
            removed = ?delta.to_remove,
            "Reconciled links"
        );

        Ok(Some(delta))
    }

    /// Persist a delta: one batched DELETE and one batched INSERT at most
    pub async fn apply(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        kind: RelationKind,
        profile_id: &str,
        delta: &LinkDelta,
    ) -> Result<()> {
        if !delta.to_remove.is_empty() {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM ");
            qb.push(kind.link_table())
                .push(" WHERE profile_id = ")
                .push_bind(profile_id.to_string())
                .push(" AND ")
                .push(kind.id_column())
                .push(" IN (");
            let mut ids_sql = qb.separated(", ");
            for id in &delta.to_remove {
                ids_sql.push_bind(*id);
            }
            ids_sql.push_unseparated(")");
            qb.build().execute(&mut **tx).await?;
        }

        if !delta.to_add.is_empty() {
            let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO ");
            qb.push(kind.link_table())
                .push(" (profile_id, ")
                .push(kind.id_column())
                .push(") ");
            qb.push_values(&delta.to_add, |mut row, id| {
                row.push_bind(profile_id.to_string()).push_bind(*id);
            });
            qb.build().execute(&mut **tx).await?;
        }

        Ok(())
    }
}
