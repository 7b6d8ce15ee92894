use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::journal::Level;
use crate::validation::ValidationContext;
use crate::wrappers::RetryPolicy;

pub const ENV_MAX_ATTEMPTS: &str = "INTERLACE_MAX_ATTEMPTS";
pub const ENV_DELAY_SECONDS: &str = "INTERLACE_DELAY_SECONDS";

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_seconds: f64,
    pub backoff_factor: f64,
    pub max_delay_seconds: f64,
    #[serde(with = "duration_string", skip_serializing_if = "Option::is_none")]
    pub jitter: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub timing: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_seconds: 1.0,
            backoff_factor: 1.0, // constant delay
            max_delay_seconds: 30.0,
            jitter: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            timing: true,
        }
    }
}

impl RetryConfig {
    /// Build the retry policy these settings describe
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        let mut builder = RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .delay_seconds(self.delay_seconds)?;

        if self.backoff_factor > 1.0 {
            builder = builder.backoff(
                self.backoff_factor,
                seconds(self.max_delay_seconds, "max_delay_seconds")?,
            );
        }
        if let Some(bound) = self.jitter {
            builder = builder.jitter(bound);
        }

        builder.build()
    }
}

impl LoggingConfig {
    pub fn journal_level(&self) -> Result<Level> {
        self.level.parse()
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(content).context("Failed to parse pipeline configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file as-is, without environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override settings from `INTERLACE_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override settings from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(attempts) = lookup(ENV_MAX_ATTEMPTS) {
            self.retry.max_attempts = attempts
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_ATTEMPTS} must be an integer, got {attempts}"))?;
        }
        if let Some(delay) = lookup(ENV_DELAY_SECONDS) {
            self.retry.delay_seconds = delay
                .trim()
                .parse()
                .with_context(|| format!("{ENV_DELAY_SECONDS} must be a number, got {delay}"))?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        let ctx = ValidationContext::new("pipeline_config")
            .with_attribute("max_attempts", self.retry.max_attempts.to_string());

        ctx.validate(
            (1..=1000).contains(&self.retry.max_attempts),
            "retry.max_attempts must be between 1 and 1000",
        )?;
        ctx.validate(
            Duration::try_from_secs_f64(self.retry.delay_seconds).is_ok(),
            "retry.delay_seconds must be a non-negative number of seconds within range",
        )?;
        ctx.validate(
            Duration::try_from_secs_f64(self.retry.max_delay_seconds).is_ok(),
            "retry.max_delay_seconds must be a non-negative number of seconds within range",
        )?;
        ctx.validate(
            self.retry.backoff_factor.is_finite() && self.retry.backoff_factor >= 1.0,
            "retry.backoff_factor must be at least 1.0",
        )?;
        ctx.validate(
            self.logging.journal_level().is_ok(),
            "logging.level must be one of DEBUG, INFO, WARNING, ERROR, CRITICAL",
        )?;
        Ok(())
    }
}

fn seconds(value: f64, field: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("retry.{field} must be a non-negative number, got {value}"))
}

// Durations written as "250ms" or "2s"
mod duration_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&format!("{}ms", d.as_millis())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(s) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            let ms: u64 = ms.trim().parse().map_err(serde::de::Error::custom)?;
            Ok(Some(Duration::from_millis(ms)))
        } else if let Some(secs) = s.strip_suffix('s') {
            let secs: u64 = secs.trim().parse().map_err(serde::de::Error::custom)?;
            Ok(Some(Duration::from_secs(secs)))
        } else {
            Err(serde::de::Error::custom(
                "Expected duration string ending with 'ms' or 's'",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.cache.enabled);

        let policy = config.retry.to_policy().unwrap();
        assert_eq!(policy.delay(), Duration::from_secs(1));
        assert_eq!(policy.backoff_factor(), 1.0);
    }

    #[test]
    fn test_parse_sections() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [retry]
            max_attempts = 5
            delay_seconds = 0.25
            backoff_factor = 2.0
            max_delay_seconds = 4.0
            jitter = "100ms"

            [cache]
            enabled = false

            [logging]
            level = "warning"
            timing = false
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.jitter, Some(Duration::from_millis(100)));
        assert!(!config.cache.enabled);
        assert_eq!(config.logging.journal_level().unwrap(), Level::Warning);

        let policy = config.retry.to_policy().unwrap();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.delay(), Duration::from_millis(250));
        assert_eq!(policy.next_delay(Duration::from_secs(3)), Duration::from_secs(4));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(PipelineConfig::from_toml_str("[retry]\nmax_attempts = 0").is_err());
        assert!(PipelineConfig::from_toml_str("[retry]\nbackoff_factor = 0.5").is_err());
        assert!(PipelineConfig::from_toml_str("[retry]\njitter = \"soon\"").is_err());
        assert!(PipelineConfig::from_toml_str("[logging]\nlevel = \"loud\"").is_err());
        assert!(PipelineConfig::from_toml_str("[retry]\ndelay_seconds = 1e30").is_err());
        assert!(PipelineConfig::from_toml_str("[retry]\nmax_delay_seconds = -1.0").is_err());
    }

    #[test]
    fn test_accepted_delays_always_build_a_policy() {
        let config = PipelineConfig::from_toml_str("[retry]\ndelay_seconds = 60.0").unwrap();
        let policy = config.retry.to_policy().unwrap();
        assert_eq!(policy.delay(), Duration::from_secs(60));

        let mut config = PipelineConfig::default();
        config.retry.delay_seconds = 1e30;
        assert!(config.retry.to_policy().is_err());

        let vars: HashMap<&str, &str> = [(ENV_DELAY_SECONDS, "1e30")].into_iter().collect();
        let mut config = PipelineConfig::default();
        assert!(config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> =
            [(ENV_MAX_ATTEMPTS, "7"), (ENV_DELAY_SECONDS, "0.5")].into_iter().collect();
        let mut config = PipelineConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.delay_seconds, 0.5);

        let mut config = PipelineConfig::default();
        assert!(config
            .apply_overrides(|key| (key == ENV_MAX_ATTEMPTS).then(|| "many".to_string()))
            .is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interlace.toml");
        std::fs::write(&path, "[retry]\nmax_attempts = 4\n").unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.delay_seconds, 1.0);

        assert!(PipelineConfig::from_file(dir.path().join("missing.toml")).is_err());
        assert!(PipelineConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
