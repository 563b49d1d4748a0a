//! Redirection target patterns and probed upstream endpoints.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ProbeSource, TargetConfig};

/// Ordered, de-duplicated, non-empty set of domain glob patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectionTarget {
    patterns: Vec<String>,
}

impl RedirectionTarget {
    /// Build a target, trimming and de-duplicating patterns in order.
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            if pattern.contains(char::is_whitespace) {
                return Err(ConfigError::invalid(
                    "target.patterns",
                    format!("`{pattern}` contains whitespace"),
                ));
            }
            if !unique.iter().any(|p| p.eq_ignore_ascii_case(pattern)) {
                unique.push(pattern.to_string());
            }
        }
        if unique.is_empty() {
            return Err(ConfigError::invalid(
                "target.patterns",
                "at least one domain pattern is required",
            ));
        }
        Ok(Self { patterns: unique })
    }

    /// Target from the `[target]` config section.
    pub fn from_config(config: &TargetConfig) -> Result<Self, ConfigError> {
        Self::new(&config.patterns)
    }

    /// Patterns in configured order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl fmt::Display for RedirectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.patterns.join(","))
    }
}

/// One candidate upstream address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamEndpoint {
    /// Resolved address.
    pub address: IpAddr,
    /// Source that produced it.
    pub source: ProbeSource,
}
