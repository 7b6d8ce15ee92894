// Validated Types
// Strongly-typed wrappers that enforce invariants at construction time.
// These types cannot be constructed with invalid data.

use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of an operation, used in log lines and cache keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationName {
    inner: String,
}

impl OperationName {
    const MAX_LENGTH: usize = 256;

    /// Create a new operation name
    ///
    /// # Invariants
    /// - Non-empty after trimming
    /// - Length <= 256 bytes
    /// - No control characters
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let trimmed = name.trim();

        ensure!(!trimmed.is_empty(), "Operation name cannot be empty");
        ensure!(
            trimmed.len() <= Self::MAX_LENGTH,
            "Operation name exceeds maximum length of {} bytes",
            Self::MAX_LENGTH
        );
        ensure!(
            !trimmed.chars().any(char::is_control),
            "Operation name cannot contain control characters"
        );

        Ok(Self {
            inner: trimmed.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

/// Upper bound on attempts made by a retry loop (at least one)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaxAttempts(u32);

impl MaxAttempts {
    const LIMIT: u32 = 1000;

    pub fn new(attempts: u32) -> Result<Self> {
        ensure!(attempts > 0, "max_attempts must be at least 1");
        ensure!(
            attempts <= Self::LIMIT,
            "max_attempts exceeds limit of {}",
            Self::LIMIT
        );
        Ok(Self(attempts))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for MaxAttempts {
    fn default() -> Self {
        Self(3)
    }
}

/// Serving size; scales the whole accumulated cost of what it wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Size {
    Small,
    #[default]
    Medium,
    Large,
}

impl Size {
    /// Multiplicative cost factor
    pub fn factor(&self) -> f64 {
        match self {
            Size::Small => 0.8,
            Size::Medium => 1.0,
            Size::Large => 1.3,
        }
    }

    /// Capitalised label used as a description prefix
    pub fn label(&self) -> &'static str {
        match self {
            Size::Small => "Small",
            Size::Medium => "Medium",
            Size::Large => "Large",
        }
    }
}

impl FromStr for Size {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "small" => Ok(Size::Small),
            "medium" => Ok(Size::Medium),
            "large" => Ok(Size::Large),
            other => bail!("Unknown size: {other} (expected small, medium or large)"),
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Number of extra units added by a shot adjustment (at least one)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShotCount(u32);

impl ShotCount {
    pub fn new(shots: u32) -> Result<Self> {
        ensure!(shots > 0, "Shot count must be at least 1");
        Ok(Self(shots))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for ShotCount {
    fn default() -> Self {
        Self(1)
    }
}
