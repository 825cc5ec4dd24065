//! Search criteria and predicate construction
//!
//! [`CriteriaBuilder`] turns a [`SearchCriteria`] into a [`Predicate`] value.
//! Predicates are plain data; [`Predicate::push_sql`] renders them into a
//! `QueryBuilder` against the `profiles p` alias with bound parameters.

use crate::reconcile::RelationKind;
use jamr_common::db::Sex;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

/// Structured search input; every field is independently optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Exact city match
    pub city: Option<String>,
    /// Case-insensitive nickname substring
    pub nickname: Option<String>,
    pub sex: Option<Sex>,
    /// Profile matches if it has at least one of these genres
    pub genre_ids: Option<Vec<i64>>,
    /// Profile matches if it has at least one of these instruments
    pub instrument_ids: Option<Vec<i64>>,
}

impl SearchCriteria {
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_nickname(mut self, fragment: impl Into<String>) -> Self {
        self.nickname = Some(fragment.into());
        self
    }

    pub fn with_sex(mut self, sex: Sex) -> Self {
        self.sex = Some(sex);
        self
    }

    pub fn with_genres(mut self, ids: Vec<i64>) -> Self {
        self.genre_ids = Some(ids);
        self
    }

    pub fn with_instruments(mut self, ids: Vec<i64>) -> Self {
        self.instrument_ids = Some(ids);
        self
    }
}

/// Profile columns a predicate may constrain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    Nickname,
    City,
    Sex,
}

impl Column {
    fn sql(&self) -> &'static str {
        match self {
            Column::Id => "p.id",
            Column::Nickname => "p.nickname",
            Column::City => "p.city",
            Column::Sex => "p.sex",
        }
    }
}

/// Composable filter over profiles
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every profile
    Always,
    Equals { column: Column, value: String },
    /// Case-insensitive substring match
    Contains { column: Column, needle: String },
    /// Semi-join: at least one link of `relation` has an id in `ids`
    InSet { relation: RelationKind, ids: Vec<i64> },
    /// Strictly less than `value` (keyset bound)
    Before { column: Column, value: String },
    And(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction that flattens nested `And`s and drops `Always`
    pub fn and(self, other: Predicate) -> Predicate {
        let mut parts = Vec::new();
        for p in [self, other] {
            match p {
                Predicate::Always => {}
                Predicate::And(inner) => parts.extend(inner),
                single => parts.push(single),
            }
        }
        match parts.len() {
            0 => Predicate::Always,
            1 => parts.pop().unwrap_or(Predicate::Always),
            _ => Predicate::And(parts),
        }
    }

    /// Append this predicate as a boolean SQL expression
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Predicate::Always => {
                qb.push("1");
            }
            Predicate::Equals { column, value } => {
                qb.push(column.sql()).push(" = ").push_bind(value.clone());
            }
            Predicate::Contains { column, needle } => {
                qb.push("LOWER(")
                    .push(column.sql())
                    .push(") LIKE '%' || LOWER(")
                    .push_bind(escape_like(needle))
                    .push(") || '%' ESCAPE '\\'");
            }
            Predicate::InSet { relation, ids } => {
                if ids.is_empty() {
                    qb.push("0");
                    return;
                }
                // EXISTS keeps one outer row per profile however many links match
                qb.push("EXISTS (SELECT 1 FROM ")
                    .push(relation.link_table())
                    .push(" l WHERE l.profile_id = p.id AND l.")
                    .push(relation.id_column())
                    .push(" IN (");
                let mut ids_sql = qb.separated(", ");
                for id in ids {
                    ids_sql.push_bind(*id);
                }
                ids_sql.push_unseparated("))");
            }
            Predicate::Before { column, value } => {
                qb.push(column.sql()).push(" < ").push_bind(value.clone());
            }
            Predicate::And(parts) => {
                if parts.is_empty() {
                    qb.push("1");
                    return;
                }
                qb.push("(");
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        qb.push(" AND ");
                    }
                    part.push_sql(qb);
                }
                qb.push(")");
            }
        }
    }
}

/// Escape LIKE wildcards so the needle matches literally
fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Translates [`SearchCriteria`] into a [`Predicate`]
///
/// Absent fields add no constraint, so empty criteria yield
/// [`Predicate::Always`]. Blank strings and empty id lists count as absent.
/// Values are not validated here.
#[derive(Debug, Default, Clone, Copy)]
pub struct CriteriaBuilder;

impl CriteriaBuilder {
    pub fn build(criteria: &SearchCriteria) -> Predicate {
        let mut predicate = Predicate::Always;

        if let Some(city) = present(&criteria.city) {
            predicate = predicate.and(Predicate::Equals {
                column: Column::City,
                value: city.to_string(),
            });
        }
        if let Some(fragment) = present(&criteria.nickname) {
            predicate = predicate.and(Predicate::Contains {
                column: Column::Nickname,
                needle: fragment.to_string(),
            });
        }
        if let Some(sex) = criteria.sex {
            predicate = predicate.and(Predicate::Equals {
                column: Column::Sex,
                value: sex.as_str().to_string(),
            });
        }
        for (relation, ids) in [
            (RelationKind::Genre, &criteria.genre_ids),
            (RelationKind::Instrument, &criteria.instrument_ids),
        ] {
            if let Some(ids) = ids.as_ref().filter(|ids| !ids.is_empty()) {
                predicate = predicate.and(Predicate::InSet {
                    relation,
                    ids: ids.clone(),
                });
            }
        }

        predicate
    }
}
