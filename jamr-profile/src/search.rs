//! Profile search
//!
//! Two pagination strategies over the same predicate:
//!
//! - **Offset** ([`SearchEngine::search_page`]): newest first, arbitrary page
//!   jumps, plus an exact total from a second count-only query. Each page
//!   costs a full predicate scan for the count and deep offsets get slower.
//! - **Keyset** ([`SearchEngine::search_by_cursor`]): id descending, resumes
//!   after the last seen id. O(page size) per page, no total, no random
//!   access. Preferred for infinite scrolling. Rows inserted or deleted during
//!   a walk may be skipped or repeated; there is no cross-page snapshot.
//!
//! Tag collections are hydrated with one batched query per relation scoped
//! to the page's ids, never with a multi-join that would multiply rows.

use crate::criteria::{Column, CriteriaBuilder, Predicate, SearchCriteria};
use crate::pagination::{calculate_pagination, normalize_cursor, CursorPage, ProfilePage};
use crate::reconcile::RelationKind;
use jamr_common::db::{NamedTag, Profile, ProfileDetail, PROFILE_COLUMNS};
use jamr_common::{Error, Result};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Upper bound on bound ids per `IN (...)` list
const ID_CHUNK: usize = 500;

/// Read-only search over profiles; holds no mutable state
#[derive(Clone)]
pub struct SearchEngine {
    pool: SqlitePool,
}

impl SearchEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// One profile with genres and instruments
    pub async fn search_by_id(&self, id: &str) -> Result<ProfileDetail> {
        let sql = format!("SELECT {} FROM profiles p WHERE p.id = ?", PROFILE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("profile {}", id)))?;

        let profile = Profile::from_row(&row)?;
        self.hydrate(vec![profile])
            .await?
            .pop()
            .ok_or_else(|| Error::Internal(format!("hydration dropped profile {}", id)))
    }

    /// Offset page ordered by creation time, newest first
    ///
    /// `page_number` is 1-indexed. Profiles without a creation time sort last;
    /// ties fall back to id descending so pages are stable.
    pub async fn search_page(
        &self,
        criteria: &SearchCriteria,
        page_number: i64,
        page_size: i64,
    ) -> Result<ProfilePage> {
        let predicate = CriteriaBuilder::build(criteria);
        let page_size = page_size.max(1);
        let page_number = page_number.max(1);
        // Pages so deep the offset overflows are past the end anyway
        let offset = (page_number - 1).saturating_mul(page_size);

        let mut qb = select_profiles(&predicate);
        qb.push(" ORDER BY p.created_at IS NULL, p.created_at DESC, p.id DESC LIMIT ")
            .push_bind(page_size)
            .push(" OFFSET ")
            .push_bind(offset);
        debug!(sql = qb.sql(), "search_page");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let profiles = rows
            .iter()
            .map(Profile::from_row)
            .collect::<Result<Vec<_>>>()?;

        let total_results = self.count(&predicate).await?;
        let pagination = calculate_pagination(total_results, page_number, page_size);
        let items = self.hydrate(profiles).await?;

        Ok(ProfilePage {
            items,
            page: pagination.page,
            page_size: pagination.page_size,
            total_results,
            total_pages: pagination.total_pages,
        })
    }

    /// Keyset page ordered by id descending
    ///
    /// A blank or absent cursor starts at the highest id; otherwise only ids
    /// strictly below the cursor qualify.
    pub async fn search_by_cursor(
        &self,
        criteria: &SearchCriteria,
        cursor: Option<&str>,
        page_size: i64,
    ) -> Result<CursorPage> {
        let page_size = page_size.max(1);
        let mut predicate = CriteriaBuilder::build(criteria);
        if let Some(cursor) = normalize_cursor(cursor) {
            predicate = predicate.and(Predicate::Before {
                column: Column::Id,
                value: cursor.to_string(),
            });
        }

        // One extra row tells us whether another page exists
        let mut qb = select_profiles(&predicate);
        qb.push(" ORDER BY p.id DESC LIMIT ")
            .push_bind(page_size.saturating_add(1));
        debug!(sql = qb.sql(), "search_by_cursor");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut profiles = rows
            .iter()
            .map(Profile::from_row)
            .collect::<Result<Vec<_>>>()?;

        let has_next = profiles.len() as i64 > page_size;
        if has_next {
            profiles.truncate(page_size as usize);
        }
        let next_cursor = if has_next {
            profiles.last().map(|p| p.id.clone())
        } else {
            None
        };

        Ok(CursorPage {
            items: self.hydrate(profiles).await?,
            has_next,
            next_cursor,
        })
    }

    /// Unordered summaries for an explicit id list, without tags
    ///
    /// Unknown ids are skipped and repeated ids are returned once. An empty
    /// list issues no query.
    pub async fn search_by_ids(&self, ids: &[String]) -> Result<Vec<Profile>> {
        let distinct: Vec<&String> = ids.iter().collect::<BTreeSet<_>>().into_iter().collect();
        let mut profiles = Vec::new();
        for chunk in distinct.chunks(ID_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new(format!(
                "SELECT {} FROM profiles p WHERE p.id IN (",
                PROFILE_COLUMNS
            ));
            let mut ids_sql = qb.separated(", ");
            for id in chunk {
                ids_sql.push_bind((*id).clone());
            }
            ids_sql.push_unseparated(")");

            let rows = qb.build().fetch_all(&self.pool).await?;
            for row in &rows {
                profiles.push(Profile::from_row(row)?);
            }
        }
        Ok(profiles)
    }

    /// Number of profiles matching the predicate
    async fn count(&self, predicate: &Predicate) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM profiles p WHERE ");
        predicate.push_sql(&mut qb);
        let total: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(total)
    }

    /// Attach genres and instruments, preserving the input order
    async fn hydrate(&self, profiles: Vec<Profile>) -> Result<Vec<ProfileDetail>> {
        if profiles.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = profiles.iter().map(|p| p.id.clone()).collect();
        let mut genres = self.fetch_tags(RelationKind::Genre, &ids).await?;
        let mut instruments = self.fetch_tags(RelationKind::Instrument, &ids).await?;

        Ok(profiles
            .into_iter()
            .map(|profile| ProfileDetail {
                genres: genres.remove(&profile.id).unwrap_or_default(),
                instruments: instruments.remove(&profile.id).unwrap_or_default(),
                profile,
            })
            .collect())
    }

    /// Batched link fetch for a set of profiles, grouped by profile id
    async fn fetch_tags(
        &self,
        kind: RelationKind,
        profile_ids: &[String],
    ) -> Result<HashMap<String, Vec<NamedTag>>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT l.profile_id AS profile_id, n.id AS tag_id, n.name AS tag_name FROM ",
        );
        qb.push(kind.link_table())
            .push(" l JOIN ")
            .push(kind.name_table())
            .push(" n ON n.id = l.")
            .push(kind.id_column())
            .push(" WHERE l.profile_id IN (");
        let mut ids_sql = qb.separated(", ");
        for id in profile_ids {
            ids_sql.push_bind(id.clone());
        }
        ids_sql.push_unseparated(") ORDER BY l.profile_id, n.id");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut grouped: HashMap<String, Vec<NamedTag>> = HashMap::new();
        for row in rows {
            let profile_id: String = row.try_get("profile_id")?;
            grouped.entry(profile_id).or_default().push(NamedTag {
                id: row.try_get("tag_id")?,
                name: row.try_get("tag_name")?,
            });
        }
        Ok(grouped)
    }
}

fn select_profiles(predicate: &Predicate) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM profiles p WHERE ",
        PROFILE_COLUMNS
    ));
    predicate.push_sql(&mut qb);
    qb
}
