//! Configuration infrastructure
//!
//! Contains configuration loading and management for a harvest run.
//!
//! Configuration is organized into sections:
//! 1. Run parameters (listing URL, counts, timing, output paths)
//! 2. Discovery selectors
//! 3. The ordered record schema
//! 4. HTTP session and logging settings

#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::domain::{FieldSpec, TaskFailurePolicy, item::is_absolute_http_url, validate_schema};
use crate::infrastructure::http_session::HttpSessionConfig;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run parameters
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Listing selectors used by discovery
    #[serde(default)]
    pub discovery: DiscoverySelectors,

    /// Ordered field specifications; defines the record schema
    #[serde(default = "defaults::schema")]
    pub schema: Vec<FieldSpec>,

    /// HTTP document session settings
    #[serde(default)]
    pub http: HttpSessionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            harvest: HarvestConfig::default(),
            discovery: DiscoverySelectors::default(),
            schema: defaults::schema(),
            http: HttpSessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Run parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Listing surface to discover item URLs from
    pub listing_url: String,

    /// Number of unique item URLs to discover
    pub target_count: usize,

    /// Number of concurrent extraction workers
    pub worker_count: usize,

    /// Wait after each pagination trigger, in milliseconds
    pub settle_interval_ms: u64,

    /// Upper bound for one document load or pagination trigger, in milliseconds
    pub load_timeout_ms: u64,

    /// Capacity of the bounded task queue
    pub queue_capacity: usize,

    /// What to emit for items whose document failed to load
    #[serde(default)]
    pub failure_policy: TaskFailurePolicy,

    /// Discovery output / extraction input
    pub url_list_path: PathBuf,

    /// JSON artifact destination
    pub output_path: PathBuf,
}

impl HarvestConfig {
    #[must_use]
    pub const fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    #[must_use]
    pub const fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            listing_url: defaults::LISTING_URL.to_string(),
            target_count: defaults::TARGET_COUNT,
            worker_count: defaults::worker_count(),
            settle_interval_ms: defaults::SETTLE_INTERVAL_MS,
            load_timeout_ms: defaults::LOAD_TIMEOUT_MS,
            queue_capacity: defaults::QUEUE_CAPACITY,
            failure_policy: TaskFailurePolicy::default(),
            url_list_path: PathBuf::from(defaults::URL_LIST_FILE),
            output_path: PathBuf::from(defaults::OUTPUT_FILE),
        }
    }
}

/// Selectors that drive the listing surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySelectors {
    /// Item link elements on the listing
    pub item_link_selector: String,

    /// Attribute holding the item URL
    pub link_attribute: String,

    /// Element whose activation loads more items (footer / load-more link)
    pub pagination_selector: String,

    /// Consecutive pagination triggers without new URLs before the listing counts as exhausted
    pub max_idle_cycles: u32,

    /// Hard cap on pagination triggers
    pub max_cycles: u32,
}

impl Default for DiscoverySelectors {
    fn default() -> Self {
        Self {
            item_link_selector: defaults::ITEM_LINK_SELECTOR.to_string(),
            link_attribute: "href".to_string(),
            pagination_selector: defaults::PAGINATION_SELECTOR.to_string(),
            max_idle_cycles: defaults::MAX_IDLE_CYCLES,
            max_cycles: defaults::MAX_CYCLES,
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; defaults to `logs/` next to the executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: true,
        }
    }
}

/// Configuration values that cannot drive a run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration error in '{field}': {message}")]
    Invalid { field: String, message: String },

    #[error(transparent)]
    Schema(#[from] crate::domain::DomainError),
}

impl ConfigError {
    fn invalid(field: &str, message: &str) -> Self {
        Self::Invalid {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl AppConfig {
    /// Check every value a run depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let harvest = &self.harvest;
        if !is_absolute_http_url(&harvest.listing_url) {
            return Err(ConfigError::invalid(
                "harvest.listing_url",
                "must be an absolute http(s) URL",
            ));
        }
        if harvest.target_count == 0 {
            return Err(ConfigError::invalid("harvest.target_count", "must be positive"));
        }
        if harvest.worker_count == 0 {
            return Err(ConfigError::invalid("harvest.worker_count", "must be positive"));
        }
        if harvest.load_timeout_ms == 0 {
            return Err(ConfigError::invalid("harvest.load_timeout_ms", "must be positive"));
        }
        if harvest.queue_capacity == 0 {
            return Err(ConfigError::invalid("harvest.queue_capacity", "must be positive"));
        }
        if self.discovery.item_link_selector.trim().is_empty() {
            return Err(ConfigError::invalid(
                "discovery.item_link_selector",
                "must not be empty",
            ));
        }
        if self.discovery.max_idle_cycles == 0 {
            return Err(ConfigError::invalid(
                "discovery.max_idle_cycles",
                "must be positive",
            ));
        }
        validate_schema(&self.schema)?;
        Ok(())
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("campaign-harvester");

        Ok(config_dir)
    }

    /// Configuration manager for the default location
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("config.json");
        Ok(Self { config_path })
    }

    /// Configuration manager for an explicit file
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read configuration file {:?}", self.config_path))?;

        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid configuration file {:?}", self.config_path))?;

        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Load and validate; a config that cannot drive a run is an error
    pub async fn load_validated(&self) -> Result<AppConfig> {
        let config = self.load_config().await?;
        if let Err(e) = config.validate() {
            warn!("Rejected configuration {:?}: {}", self.config_path, e);
            return Err(e).context("Configuration validation failed");
        }
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Reset configuration to defaults
    pub async fn reset_to_defaults(&self) -> Result<AppConfig> {
        info!("Resetting configuration to defaults");
        let default_config = AppConfig::default();
        self.save_config(&default_config).await?;
        Ok(default_config)
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Default harvest configuration values
pub mod defaults {
    use crate::domain::FieldSpec;

    /// Default listing surface (trending crowdfunding projects)
    pub const LISTING_URL: &str =
        "https://www.indiegogo.com/explore/home?project_timing=all&product_stage=all&sort=trending";

    /// Default number of item URLs to discover
    pub const TARGET_COUNT: usize = 300;

    /// Upper bound for the default worker count
    pub const MAX_DEFAULT_WORKERS: usize = 4;

    /// Default wait after each pagination trigger
    pub const SETTLE_INTERVAL_MS: u64 = 2000;

    /// Default bound for one load or pagination trigger
    pub const LOAD_TIMEOUT_MS: u64 = 30_000;

    /// Default task queue capacity
    pub const QUEUE_CAPACITY: usize = 64;

    pub const URL_LIST_FILE: &str = "project_urls.txt";
    pub const OUTPUT_FILE: &str = "output/data.json";

    pub const ITEM_LINK_SELECTOR: &str = "div.projectDiscoverableCard.discoverableCard > a";
    pub const PAGINATION_SELECTOR: &str = "div.brandRefreshFooterDesktop";

    /// Pagination triggers without new URLs before a listing counts as exhausted
    pub const MAX_IDLE_CYCLES: u32 = 2;

    /// Safety cap on pagination triggers per discovery run
    pub const MAX_CYCLES: u32 = 500;

    pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_MAX_FILES: u32 = 5;

    /// `min(4, available parallelism)`
    pub fn worker_count() -> usize {
        std::thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get)
            .min(MAX_DEFAULT_WORKERS)
    }

    /// Crowdfunding project page schema
    pub fn schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::text("Creators", ".basicsCampaignOwner-details-name", "Unknown"),
            FieldSpec::text("Title", ".basicsSection-title", "Unknown"),
            FieldSpec::text("Text", ".basicsSection-tagline", "Unknown"),
            FieldSpec::integer("DollarsPledged", ".basicsGoalProgress-amountSold"),
            FieldSpec::integer(
                "DollarsGoal",
                ".basicsGoalProgress-progressDetails-detailsGoal-goalPercentageOrInitiallyRaised",
            )
            .with_after("of "),
            FieldSpec::integer("NumBackers", ".basicsGoalProgress-claimedOrBackers"),
            FieldSpec::integer("DaysToGo", ".basicsGoalProgress-progressDetails-detailsTimeLeft"),
            FieldSpec::boolean(
                "FlexibleGoal",
                ".basicsGoalProgress-progressDetails-detailsGoal-goalWording",
                "flexible",
                false,
            ),
        ]
    }
}
