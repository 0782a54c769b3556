//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use apalis_cron::Schedule;
use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use uuid::Uuid;

use crate::cache::{CacheConfig, DEFAULT_BREAKPOINTS, WarmerConfig};
use crate::domain::settings::OptimizationSettings;
use crate::domain::variants::ImageFormat;
use crate::infra::paths::{Mount, PathMapper};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "varcache";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_UPLOADS_DIR: &str = "uploads";
const DEFAULT_UPLOADS_URL: &str = "/uploads";
const DEFAULT_VARIANTS_DIR: &str = "uploads/variants";
const DEFAULT_VARIANTS_URL: &str = "/uploads/variants";
const DEFAULT_RUNTIME_ENTRY_LIMIT: usize = 4096;
const DEFAULT_MAX_REPORTED_ISSUES: usize = 100;
const DEFAULT_WARM_BATCH_SIZE: u32 = 10;
const DEFAULT_WARM_DELAY_MS: u64 = 500;
pub(crate) const DEFAULT_OPTIMIZER_CLI_PATH: &str = "magick";
const DEFAULT_WARM_CRON: &str = "0 30 3 * * *";
const DEFAULT_CONSISTENCY_CRON: &str = "0 0 4 * * *";

/// Command-line arguments for the varcache binary.
#[derive(Debug, Parser)]
#[command(name = "varcache", version, about = "Image variant cache maintenance")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VARCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the daily warm and consistency workers until stopped.
    Schedule,
    /// Audit durable records against variant files.
    Check(CheckArgs),
    /// Clear the cache and rebuild it from the variant tree.
    Rebuild,
    /// Drop every cached record.
    Clear,
    /// Print cache counters and sizes.
    Stats,
    /// Look up one variant URL.
    Lookup(LookupArgs),
    /// Generate responsive variants ahead of requests.
    Warm(WarmArgs),
    /// Report an external change that may invalidate cached variants.
    Notify(NotifyArgs),
    /// Apply database migrations.
    Migrate,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CheckArgs {
    /// Delete orphaned records and register orphaned files.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub repair: bool,
}

#[derive(Debug, Args, Clone)]
pub struct LookupArgs {
    /// Public URL of the original image.
    #[arg(value_name = "URL", value_hint = ValueHint::Url)]
    pub url: String,

    /// Variant format (avif|webp).
    #[arg(long, value_name = "FORMAT")]
    pub format: ImageFormat,

    /// Responsive width; omit for the base variant.
    #[arg(long, value_name = "PIXELS")]
    pub width: Option<u32>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WarmArgs {
    /// Warm the most recent uploads instead of explicit ids.
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with = "ids")]
    pub recent: bool,

    /// Image ids to warm.
    #[arg(value_name = "ID")]
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Args, Clone)]
pub struct NotifyArgs {
    #[command(subcommand)]
    pub event: NotifyCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum NotifyCommand {
    /// The active theme changed.
    ThemeSwitched,
    /// A plugin was activated or deactivated.
    PluginToggled {
        #[arg(value_name = "NAME")]
        plugin: String,
        #[arg(long, action = clap::ArgAction::SetTrue)]
        deactivated: bool,
    },
    /// An image's metadata was regenerated.
    ImageEdited {
        #[arg(value_name = "ID")]
        id: Uuid,
    },
    /// An image is about to be deleted.
    ImageDeleted {
        #[arg(value_name = "ID")]
        id: Uuid,
    },
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the directory holding original uploads.
    #[arg(long = "uploads-dir", value_name = "PATH", global = true)]
    pub uploads_dir: Option<PathBuf>,

    /// Override the directory holding generated variants.
    #[arg(long = "variants-dir", value_name = "PATH", global = true)]
    pub variants_dir: Option<PathBuf>,

    /// Override the image converter executable.
    #[arg(long = "optimizer-cli-path", value_name = "PATH", global = true)]
    pub optimizer_cli_path: Option<PathBuf>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub paths: PathSettings,
    pub cache: CacheSettings,
    pub optimization: OptimizationSettings,
    pub warmer: WarmerSettings,
    pub optimizer: OptimizerSettings,
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Absent until configured; every command needs it.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

impl DatabaseSettings {
    pub fn require_url(&self) -> Result<&str, LoadError> {
        self.url.as_deref().ok_or_else(|| {
            LoadError::invalid(
                "database.url",
                "required: set database.url, VARCACHE__DATABASE__URL or --database-url",
            )
        })
    }
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    pub uploads_dir: PathBuf,
    pub uploads_url: String,
    pub variants_dir: PathBuf,
    pub variants_url: String,
}

impl PathSettings {
    pub fn mapper(&self) -> PathMapper {
        PathMapper::new(
            Mount::new(self.uploads_dir.clone(), self.uploads_url.clone()),
            Mount::new(self.variants_dir.clone(), self.variants_url.clone()),
        )
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub runtime_entry_limit: NonZeroUsize,
    pub max_reported_issues: usize,
}

#[derive(Debug, Clone)]
pub struct WarmerSettings {
    /// Ascending and de-duplicated.
    pub breakpoints: Vec<u32>,
    pub batch_size: NonZeroU32,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub cli_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub warm: Schedule,
    pub consistency: Schedule,
}

impl Settings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from(&self.cache)
    }

    pub fn warmer_config(&self) -> WarmerConfig {
        WarmerConfig {
            breakpoints: self.warmer.breakpoints.clone(),
            batch_size: self.warmer.batch_size.get(),
            delay: self.warmer.delay,
            enable_format_conversion: self.optimization.enable_format_conversion,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("VARCACHE")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("warmer.breakpoints")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    paths: RawPathSettings,
    cache: RawCacheSettings,
    optimization: RawOptimizationSettings,
    warmer: RawWarmerSettings,
    optimizer: RawOptimizerSettings,
    scheduler: RawSchedulerSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(dir) = overrides.uploads_dir.as_ref() {
            self.paths.uploads_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.variants_dir.as_ref() {
            self.paths.variants_dir = Some(dir.clone());
        }
        if let Some(path) = overrides.optimizer_cli_path.as_ref() {
            self.optimizer.cli_path = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            paths,
            cache,
            optimization,
            warmer,
            optimizer,
            scheduler,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            paths: build_path_settings(paths)?,
            cache: build_cache_settings(cache)?,
            optimization: build_optimization_settings(optimization)?,
            warmer: build_warmer_settings(warmer)?,
            optimizer: build_optimizer_settings(optimizer)?,
            scheduler: build_scheduler_settings(scheduler)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_path_settings(paths: RawPathSettings) -> Result<PathSettings, LoadError> {
    let uploads_dir = paths
        .uploads_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_DIR));
    if uploads_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "paths.uploads_dir",
            "path must not be empty",
        ));
    }

    let variants_dir = paths
        .variants_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_VARIANTS_DIR));
    if variants_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "paths.variants_dir",
            "path must not be empty",
        ));
    }

    let uploads_url = base_url(paths.uploads_url, DEFAULT_UPLOADS_URL, "paths.uploads_url")?;
    let variants_url = base_url(paths.variants_url, DEFAULT_VARIANTS_URL, "paths.variants_url")?;

    Ok(PathSettings {
        uploads_dir,
        uploads_url,
        variants_dir,
        variants_url,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let limit = cache
        .runtime_entry_limit
        .unwrap_or(DEFAULT_RUNTIME_ENTRY_LIMIT);
    let runtime_entry_limit = NonZeroUsize::new(limit).ok_or_else(|| {
        LoadError::invalid("cache.runtime_entry_limit", "must be greater than zero")
    })?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        runtime_entry_limit,
        max_reported_issues: cache
            .max_reported_issues
            .unwrap_or(DEFAULT_MAX_REPORTED_ISSUES),
    })
}

fn build_optimization_settings(
    optimization: RawOptimizationSettings,
) -> Result<OptimizationSettings, LoadError> {
    let defaults = OptimizationSettings::default();
    let avif_quality = quality(
        optimization.avif_quality,
        defaults.avif_quality,
        "optimization.avif_quality",
    )?;
    let webp_quality = quality(
        optimization.webp_quality,
        defaults.webp_quality,
        "optimization.webp_quality",
    )?;

    Ok(OptimizationSettings {
        avif_quality,
        webp_quality,
        enable_format_conversion: optimization
            .enable_format_conversion
            .unwrap_or(defaults.enable_format_conversion),
        enable_responsive_resize: optimization
            .enable_responsive_resize
            .unwrap_or(defaults.enable_responsive_resize),
        lazy_load: optimization.lazy_load.unwrap_or(defaults.lazy_load),
        defer_scripts: optimization.defer_scripts.unwrap_or(defaults.defer_scripts),
        defer_styles: optimization.defer_styles.unwrap_or(defaults.defer_styles),
    })
}

fn build_warmer_settings(warmer: RawWarmerSettings) -> Result<WarmerSettings, LoadError> {
    let mut breakpoints = warmer
        .breakpoints
        .unwrap_or_else(|| DEFAULT_BREAKPOINTS.to_vec());
    if breakpoints.is_empty() {
        return Err(LoadError::invalid(
            "warmer.breakpoints",
            "at least one breakpoint is required",
        ));
    }
    if breakpoints.contains(&0) {
        return Err(LoadError::invalid(
            "warmer.breakpoints",
            "breakpoints must be greater than zero",
        ));
    }
    breakpoints.sort_unstable();
    breakpoints.dedup();

    let batch_size = non_zero_u32(
        warmer
            .batch_size
            .unwrap_or(DEFAULT_WARM_BATCH_SIZE)
            .into(),
        "warmer.batch_size",
    )?;

    Ok(WarmerSettings {
        breakpoints,
        batch_size,
        delay: Duration::from_millis(warmer.delay_ms.unwrap_or(DEFAULT_WARM_DELAY_MS)),
    })
}

fn build_optimizer_settings(optimizer: RawOptimizerSettings) -> Result<OptimizerSettings, LoadError> {
    let cli_path = optimizer
        .cli_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OPTIMIZER_CLI_PATH));
    if cli_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "optimizer.cli_path",
            "path must not be empty",
        ));
    }
    Ok(OptimizerSettings { cli_path })
}

fn build_scheduler_settings(
    scheduler: RawSchedulerSettings,
) -> Result<SchedulerSettings, LoadError> {
    let warm = cron_schedule(
        scheduler.warm_cron.as_deref().unwrap_or(DEFAULT_WARM_CRON),
        "scheduler.warm_cron",
    )?;
    let consistency = cron_schedule(
        scheduler
            .consistency_cron
            .as_deref()
            .unwrap_or(DEFAULT_CONSISTENCY_CRON),
        "scheduler.consistency_cron",
    )?;
    Ok(SchedulerSettings { warm, consistency })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPathSettings {
    uploads_dir: Option<PathBuf>,
    uploads_url: Option<String>,
    variants_dir: Option<PathBuf>,
    variants_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    runtime_entry_limit: Option<usize>,
    max_reported_issues: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOptimizationSettings {
    avif_quality: Option<u32>,
    webp_quality: Option<u32>,
    enable_format_conversion: Option<bool>,
    enable_responsive_resize: Option<bool>,
    lazy_load: Option<bool>,
    defer_scripts: Option<bool>,
    defer_styles: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWarmerSettings {
    breakpoints: Option<Vec<u32>>,
    batch_size: Option<u32>,
    delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOptimizerSettings {
    cli_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchedulerSettings {
    warm_cron: Option<String>,
    consistency_cron: Option<String>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn quality(value: Option<u32>, default: u8, key: &'static str) -> Result<u8, LoadError> {
    let Some(value) = value else {
        return Ok(default);
    };
    if !(1..=100).contains(&value) {
        return Err(LoadError::invalid(key, "must be between 1 and 100"));
    }
    u8::try_from(value).map_err(|_| LoadError::invalid(key, "must be between 1 and 100"))
}

fn base_url(value: Option<String>, default: &str, key: &'static str) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(LoadError::invalid(key, "url must not be empty"));
    }
    if !trimmed.starts_with('/') {
        url::Url::parse(trimmed)
            .map_err(|err| LoadError::invalid(key, format!("invalid url: {err}")))?;
    }
    Ok(trimmed.to_string())
}

fn cron_schedule(expression: &str, key: &'static str) -> Result<Schedule, LoadError> {
    Schedule::from_str(expression)
        .map_err(|err| LoadError::invalid(key, format!("invalid cron expression: {err}")))
}
