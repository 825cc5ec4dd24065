//! # JAMR Common Library
//!
//! Shared code for the JAMR profile services including:
//! - Database bootstrap, schema and row models
//! - Event types (ProfileEvent enum) and the in-process EventBus
//! - Configuration loading and root folder resolution
//! - The common error type

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, ProfileEvent};
