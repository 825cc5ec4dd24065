//! Input validation ahead of the core engines
//!
//! The search and update engines trust their inputs. Everything that can be
//! rejected for being malformed (nickname format, unknown genre/instrument
//! ids, oversized tag lists, page bounds) is rejected here with
//! [`Error::InvalidInput`].

use crate::lookup::NameLookup;
use crate::reconcile::RelationKind;
use crate::update::ProfileUpdate;
use jamr_common::config::ProfileConfig;
use jamr_common::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_page_size: i64,
    pub max_genres: usize,
    pub max_instruments: usize,
    pub nickname_min_len: usize,
    pub nickname_max_len: usize,
}

impl From<&ProfileConfig> for ValidationLimits {
    fn from(config: &ProfileConfig) -> Self {
        Self {
            max_page_size: config.max_page_size,
            max_genres: config.max_genres,
            max_instruments: config.max_instruments,
            nickname_min_len: config.nickname_min_len,
            nickname_max_len: config.nickname_max_len,
        }
    }
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self::from(&ProfileConfig::default())
    }
}

pub struct ProfileValidator {
    lookup: Arc<NameLookup>,
    limits: ValidationLimits,
}

impl ProfileValidator {
    pub fn new(lookup: Arc<NameLookup>, limits: ValidationLimits) -> Self {
        Self { lookup, limits }
    }

    /// Letters, digits and `_`, length within the configured bounds
    ///
    /// The nickname is checked as given; surrounding whitespace is an invalid
    /// character, not something to trim away.
    pub fn validate_nickname(&self, nickname: &str) -> Result<()> {
        let len = nickname.chars().count();
        if len < self.limits.nickname_min_len || len > self.limits.nickname_max_len {
            return Err(Error::InvalidInput(format!(
                "nickname must be {}-{} characters, got {}",
                self.limits.nickname_min_len, self.limits.nickname_max_len, len
            )));
        }
        if let Some(bad) = nickname.chars().find(|c| !(c.is_alphanumeric() || *c == '_')) {
            return Err(Error::InvalidInput(format!(
                "nickname contains invalid character {:?}",
                bad
            )));
        }
        Ok(())
    }

    /// Every id must exist; the distinct count must fit the per-kind limit
    pub fn validate_ids(&self, kind: RelationKind, ids: &[i64]) -> Result<()> {
        let distinct: BTreeSet<i64> = ids.iter().copied().collect();
        let max = match kind {
            RelationKind::Genre => self.limits.max_genres,
            RelationKind::Instrument => self.limits.max_instruments,
        };
        if distinct.len() > max {
            return Err(Error::InvalidInput(format!(
                "at most {} {}s allowed, got {}",
                max,
                kind.label(),
                distinct.len()
            )));
        }
        let unknown: Vec<i64> = distinct
            .iter()
            .copied()
            .filter(|id| !self.lookup.contains(kind, *id))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::InvalidInput(format!(
                "unknown {} ids: {:?}",
                kind.label(),
                unknown
            )));
        }
        Ok(())
    }

    pub fn validate_update(&self, update: &ProfileUpdate) -> Result<()> {
        if let Some(nickname) = &update.nickname {
            self.validate_nickname(nickname)?;
        }
        if let Some(ids) = &update.genre_ids {
            self.validate_ids(RelationKind::Genre, ids)?;
        }
        if let Some(ids) = &update.instrument_ids {
            self.validate_ids(RelationKind::Instrument, ids)?;
        }
        Ok(())
    }

    pub fn validate_image_url(&self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidInput("image url is blank".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::InvalidInput(format!(
                "image url must be http(s): {}",
                url
            )));
        }
        Ok(())
    }

    pub fn validate_page_size(&self, page_size: i64) -> Result<()> {
        if page_size < 1 || page_size > self.limits.max_page_size {
            return Err(Error::InvalidInput(format!(
                "page size must be 1-{}, got {}",
                self.limits.max_page_size, page_size
            )));
        }
        Ok(())
    }

    pub fn validate_page(&self, page_number: i64, page_size: i64) -> Result<()> {
        if page_number < 1 {
            return Err(Error::InvalidInput(format!(
                "page number must be at least 1, got {}",
                page_number
            )));
        }
        self.validate_page_size(page_size)
    }
}
