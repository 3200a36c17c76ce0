//! Configuration management for seistamp
//!
//! Reference clock, stamping and reconciliation settings, stored as TOML.
//! `load_layered` additionally applies `SEISTAMP__SECTION__KEY` environment
//! overrides on top of the file.

use crate::errors::StampError;
use crate::ntp::{
    BackgroundSync, ClockSync, LocalOnly, ResyncSchedule, ScheduledSync, TimeReference,
    DEFAULT_NTP_PORT,
};
use crate::reconcile::{Reconciler, Stamper};
use crate::sei::Codec;
use crate::timing::MonotonicClock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeiStampConfig {
    pub clock: ClockConfig,
    pub stamping: StampingConfig,
    pub reconcile: ReconcileConfig,
}

/// Reference time source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Use the reference clock at all; off means linear timestamps only
    pub enabled: bool,
    pub server: String,
    pub port: u16,
    pub resync_interval_secs: u64,
    /// Wait after a failed exchange before trying again
    pub retry_backoff_secs: u64,
    pub timeout_ms: u64,
    /// Run exchanges on a worker thread instead of the keyframe path
    pub background: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StampingConfig {
    pub codec: Codec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Re-anchor the linear fallback on every recovered record
    pub recalibrate_on_record: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server: "time.windows.com".to_string(),
            port: DEFAULT_NTP_PORT,
            resync_interval_secs: 60,
            retry_backoff_secs: 10,
            timeout_ms: 5000,
            background: false,
        }
    }
}

impl Default for StampingConfig {
    fn default() -> Self {
        Self { codec: Codec::H264 }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            recalibrate_on_record: true,
        }
    }
}

impl SeiStampConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, StampError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| StampError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: SeiStampConfig = toml::from_str(&contents)
            .map_err(|e| StampError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), StampError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StampError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| StampError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| StampError::ConfigError(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// File, then `SEISTAMP__*` environment overrides, over the defaults
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, StampError> {
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| StampError::ConfigError(format!("Failed to build defaults: {}", e)))?;

        let config: SeiStampConfig = config::Config::builder()
            .add_source(defaults)
            .add_source(
                config::File::from(path.as_ref())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("SEISTAMP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| StampError::ConfigError(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("seistamp.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), StampError> {
        let clock = &self.clock;
        if clock.enabled && clock.server.trim().is_empty() {
            return Err(StampError::ConfigError(
                "Reference server address is empty".to_string(),
            ));
        }
        if clock.port == 0 {
            return Err(StampError::ConfigError("Reference port must be non-zero".to_string()));
        }
        if clock.resync_interval_secs == 0 {
            return Err(StampError::ConfigError(
                "Resync interval must be at least 1 second".to_string(),
            ));
        }
        if clock.timeout_ms == 0 || clock.timeout_ms > 60_000 {
            return Err(StampError::ConfigError(
                "Timeout must be between 1 and 60000 ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn schedule(&self) -> ResyncSchedule {
        ResyncSchedule::new(
            Duration::from_secs(self.clock.resync_interval_secs),
            Duration::from_secs(self.clock.retry_backoff_secs),
        )
    }

    pub fn clock_sync(&self) -> Result<ClockSync<MonotonicClock>, StampError> {
        Ok(ClockSync::configure(&self.clock.server, self.clock.port)?
            .with_timeout(Duration::from_millis(self.clock.timeout_ms)))
    }

    /// Time reference as configured: inline, on a worker thread, or local
    /// only when the clock is disabled
    pub fn time_reference(&self) -> Result<Box<dyn TimeReference + Send>, StampError> {
        self.validate()?;
        if !self.clock.enabled {
            return Ok(Box::new(LocalOnly::<MonotonicClock>::default()));
        }
        let engine = self.clock_sync()?;
        if self.clock.background {
            Ok(Box::new(BackgroundSync::spawn(engine, self.schedule())?))
        } else {
            Ok(Box::new(ScheduledSync::new(engine, self.schedule())))
        }
    }

    pub fn stamper<T: TimeReference>(&self, reference: T) -> Stamper<T> {
        Stamper::new(reference, self.stamping.codec).with_enabled(self.clock.enabled)
    }

    pub fn reconciler<T: TimeReference>(&self, reference: T) -> Reconciler<T> {
        Reconciler::new(reference)
            .with_reference_enabled(self.clock.enabled)
            .with_recalibrate_on_record(self.reconcile.recalibrate_on_record)
    }
}
