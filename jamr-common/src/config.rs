//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted for the root folder
pub const ROOT_ENV_VAR: &str = "JAMR_ROOT";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "jamr.db";

/// Per-service config file name inside the root folder
pub const PROFILE_CONFIG_FILE: &str = "profile.toml";

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Get the global configuration file path for the platform
fn locate_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/jamr/config.toml first, then /etc/jamr/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("jamr").join("config.toml"));
        let system_config = PathBuf::from("/etc/jamr/config.toml");

        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    }

    let config_path = dirs::config_dir()
        .map(|d| d.join("jamr").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if config_path.exists() {
        Ok(config_path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", config_path)))
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("jamr"))
        .unwrap_or_else(|| PathBuf::from("./jamr_data"))
}

/// Database path for a resolved root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

/// Tunables for the profile service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Page size used when a caller does not ask for one
    pub default_page_size: i64,
    /// Largest page size the validator accepts
    pub max_page_size: i64,
    /// Maximum distinct genres per profile
    pub max_genres: usize,
    /// Maximum distinct instruments per profile
    pub max_instruments: usize,
    /// Nickname length bounds (inclusive, in characters)
    pub nickname_min_len: usize,
    pub nickname_max_len: usize,
    /// EventBus channel capacity
    pub event_capacity: usize,
    /// SQLite busy timeout
    pub busy_timeout_ms: u64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            max_genres: 3,
            max_instruments: 3,
            nickname_min_len: 2,
            nickname_max_len: 15,
            event_capacity: 100,
            busy_timeout_ms: 5000,
        }
    }
}

impl ProfileConfig {
    /// Parse from TOML text; missing keys take defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ProfileConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid profile config: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    /// Load `<root>/profile.toml`
    ///
    /// A missing file is not an error: defaults are used and a warning logged.
    /// A present but malformed file is an error.
    pub fn load(root_folder: &Path) -> Result<Self> {
        let path = root_folder.join(PROFILE_CONFIG_FILE);
        if !path.exists() {
            warn!(
                "Profile config not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded profile config from {}", path.display());
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.default_page_size < 1 || self.max_page_size < 1 {
            return Err(Error::Config("page sizes must be at least 1".to_string()));
        }
        if self.default_page_size > self.max_page_size {
            return Err(Error::Config(format!(
                "default_page_size {} exceeds max_page_size {}",
                self.default_page_size, self.max_page_size
            )));
        }
        if self.nickname_min_len == 0 || self.nickname_min_len > self.nickname_max_len {
            return Err(Error::Config(format!(
                "invalid nickname length bounds {}..={}",
                self.nickname_min_len, self.nickname_max_len
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}
