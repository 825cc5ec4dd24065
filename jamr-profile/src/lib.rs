//! jamr-profile library - profile search and update core
//!
//! [`ProfileCore`] wires the engines together the way a front end uses them:
//! inputs are validated first, then handed to the search engine or the
//! update orchestrator, which trust what they receive.

use jamr_common::config::ProfileConfig;
use jamr_common::db::{Profile, ProfileDetail};
use jamr_common::events::EventBus;
use jamr_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

pub mod criteria;
pub mod lookup;
pub mod notify;
pub mod pagination;
pub mod reconcile;
pub mod search;
pub mod update;
pub mod validation;

pub use criteria::{CriteriaBuilder, Predicate, SearchCriteria};
pub use lookup::NameLookup;
pub use notify::{EventBusNotifier, NotificationSink};
pub use pagination::{CursorPage, ProfilePage};
pub use reconcile::{LinkDelta, ReconcileMode, ReconciliationEngine, RelationKind};
pub use search::SearchEngine;
pub use update::{ProfileUpdate, UpdateOrchestrator, UpdateReport};
pub use validation::{ProfileValidator, ValidationLimits};

/// Shared services for callers of the profile core
#[derive(Clone)]
pub struct ProfileCore {
    pub db: SqlitePool,
    pub config: ProfileConfig,
    pub events: Arc<EventBus>,
    pub lookup: Arc<NameLookup>,
    pub validator: Arc<ProfileValidator>,
    pub search: SearchEngine,
    pub updates: UpdateOrchestrator,
}

impl ProfileCore {
    /// Load the name lookup and build all engines over one pool
    pub async fn new(db: SqlitePool, config: ProfileConfig) -> Result<Self> {
        let events = Arc::new(EventBus::new(config.event_capacity));
        let lookup = Arc::new(NameLookup::load(&db).await?);
        let validator = Arc::new(ProfileValidator::new(
            Arc::clone(&lookup),
            ValidationLimits::from(&config),
        ));
        let notifier: Arc<dyn NotificationSink> = Arc::new(EventBusNotifier::new(Arc::clone(&events)));

        Ok(Self {
            search: SearchEngine::new(db.clone()),
            updates: UpdateOrchestrator::new(db.clone(), notifier),
            db,
            config,
            events,
            lookup,
            validator,
        })
    }

    pub async fn search_by_id(&self, id: &str) -> Result<ProfileDetail> {
        self.search.search_by_id(id).await
    }

    /// Offset search; `page_size` defaults to the configured size
    pub async fn search_page(
        &self,
        criteria: &SearchCriteria,
        page_number: i64,
        page_size: Option<i64>,
    ) -> Result<ProfilePage> {
        let page_size = page_size.unwrap_or(self.config.default_page_size);
        self.validator.validate_page(page_number, page_size)?;
        self.search.search_page(criteria, page_number, page_size).await
    }

    /// Keyset search; `page_size` defaults to the configured size
    pub async fn search_by_cursor(
        &self,
        criteria: &SearchCriteria,
        cursor: Option<&str>,
        page_size: Option<i64>,
    ) -> Result<CursorPage> {
        let page_size = page_size.unwrap_or(self.config.default_page_size);
        self.validator.validate_page_size(page_size)?;
        self.search.search_by_cursor(criteria, cursor, page_size).await
    }

    pub async fn search_by_ids(&self, ids: &[String]) -> Result<Vec<Profile>> {
        self.search.search_by_ids(ids).await
    }

    pub async fn partial_update(&self, profile_id: &str, update: &ProfileUpdate) -> Result<UpdateReport> {
        self.validator.validate_update(update)?;
        self.updates.partial_update(profile_id, update).await
    }

    pub async fn full_replace(&self, profile_id: &str, update: &ProfileUpdate) -> Result<UpdateReport> {
        self.validator.validate_update(update)?;
        self.updates.full_replace(profile_id, update).await
    }

    pub async fn update_image(&self, profile_id: &str, url: &str) -> Result<UpdateReport> {
        self.validator.validate_image_url(url)?;
        self.updates.update_image(profile_id, url.trim()).await
    }

    /// Re-read genre/instrument names (administrative)
    pub async fn reload_lookup(&self) -> Result<()> {
        self.lookup.reload(&self.db).await
    }
}
