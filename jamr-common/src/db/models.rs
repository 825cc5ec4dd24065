//! Database models

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use std::fmt;
use std::str::FromStr;

/// Column list matching [`Profile::from_row`], qualified with the `p` alias
pub const PROFILE_COLUMNS: &str = "p.id, p.nickname, p.city, p.sex, p.introduction, \
     p.chattable, p.public, p.image_url, p.created_at, p.updated_at, p.version";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sex {
    Male,
    Female,
    Other,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "MALE",
            Sex::Female => "FEMALE",
            Sex::Other => "OTHER",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MALE" | "M" => Ok(Sex::Male),
            "FEMALE" | "F" => Ok(Sex::Female),
            "OTHER" => Ok(Sex::Other),
            other => Err(Error::InvalidInput(format!("Unknown sex value: {}", other))),
        }
    }
}

/// Profile row
///
/// Holds scalar attributes only; genre and instrument links live in their own
/// tables and are changed exclusively by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub nickname: String,
    pub city: Option<String>,
    pub sex: Option<Sex>,
    pub introduction: Option<String>,
    pub chattable: bool,
    pub public: bool,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped on every committed update
    pub version: i64,
}

impl Profile {
    /// Map a row selected with [`PROFILE_COLUMNS`]
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let sex = row
            .try_get::<Option<String>, _>("sex")?
            .map(|s| {
                s.parse::<Sex>()
                    .map_err(|_| Error::Internal(format!("Corrupt sex column: {}", s)))
            })
            .transpose()?;

        Ok(Self {
            id: row.try_get("id")?,
            nickname: row.try_get("nickname")?,
            city: row.try_get("city")?,
            sex,
            introduction: row.try_get("introduction")?,
            chattable: row.try_get("chattable")?,
            public: row.try_get("public")?,
            image_url: row.try_get("image_url")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

/// Genre or instrument reference with its display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedTag {
    pub id: i64,
    pub name: String,
}

/// Profile with both tag collections hydrated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDetail {
    #[serde(flatten)]
    pub profile: Profile,
    pub genres: Vec<NamedTag>,
    pub instruments: Vec<NamedTag>,
}

impl ProfileDetail {
    pub fn genre_ids(&self) -> Vec<i64> {
        self.genres.iter().map(|t| t.id).collect()
    }

    pub fn instrument_ids(&self) -> Vec<i64> {
        self.instruments.iter().map(|t| t.id).collect()
    }
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub profile_id: String,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            profile_id: row.try_get("profile_id")?,
            field_name: row.try_get("field_name")?,
            old_value: row.try_get("old_value")?,
            new_value: row.try_get("new_value")?,
            changed_at: row.try_get("changed_at")?,
        })
    }
}
