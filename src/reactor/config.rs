//! Build configuration: worker pool sizing and failure policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::errors::{ReactorError, Result};

/// What to do with the rest of the reactor when a module's build fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Stop dispatching after the first failure; in-flight modules finish,
    /// everything not yet running is skipped.
    FailFast,
    /// Skip only the failed module's transitive dependents; independent
    /// branches keep building.
    FailAtEnd,
    /// Record failures but never block dependents; best-effort
    /// "build everything and report" runs.
    FailNever,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::FailFast => "fail-fast",
            FailurePolicy::FailAtEnd => "fail-at-end",
            FailurePolicy::FailNever => "fail-never",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = ReactorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fail-fast" | "FAIL_FAST" => Ok(FailurePolicy::FailFast),
            "fail-at-end" | "FAIL_AT_END" => Ok(FailurePolicy::FailAtEnd),
            "fail-never" | "FAIL_NEVER" => Ok(FailurePolicy::FailNever),
            other => Err(ReactorError::configuration(
                format!("unknown failure policy: {other}"),
                Some("failure_policy"),
            )),
        }
    }
}

/// Worker pool sizing: a fixed count or a multiplier of available cores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Parallelism {
    Fixed(usize),
    PerCore(f32),
}

impl Parallelism {
    /// Resolve to a concrete worker count, never below 1.
    pub fn resolve(&self) -> usize {
        match self {
            Parallelism::Fixed(n) => *n,
            Parallelism::PerCore(multiplier) => {
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                ((cores as f32 * multiplier) as usize).max(1)
            }
        }
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Parallelism::Fixed(1)
    }
}

/// Configuration for one reactor build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub parallelism: Parallelism,
    pub failure_policy: FailurePolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            parallelism: Parallelism::default(),
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

impl BuildConfig {
    /// Validates configuration values. Violations are fatal at build start,
    /// before any module executes.
    pub fn validate(&self) -> Result<()> {
        match self.parallelism {
            Parallelism::Fixed(n) if n < 1 => {
                return Err(ReactorError::configuration(
                    "worker count must be at least 1",
                    Some("parallelism"),
                ));
            }
            Parallelism::PerCore(multiplier) if multiplier <= 0.0 => {
                return Err(ReactorError::configuration(
                    "per-core multiplier must be greater than 0",
                    Some("parallelism"),
                ));
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_tokens_round_trip() {
        for policy in [
            FailurePolicy::FailFast,
            FailurePolicy::FailAtEnd,
            FailurePolicy::FailNever,
        ] {
            assert_eq!(policy.as_str().parse::<FailurePolicy>().unwrap(), policy);
        }
        assert_eq!(
            "FAIL_AT_END".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::FailAtEnd
        );
        assert!("fail-sometimes".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = BuildConfig {
            parallelism: Parallelism::Fixed(0),
            ..BuildConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ReactorError::Configuration { .. })
        ));
    }

    #[test]
    fn per_core_multiplier_resolves_to_at_least_one() {
        let config = BuildConfig {
            parallelism: Parallelism::PerCore(0.0),
            ..BuildConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(Parallelism::PerCore(0.1).resolve() >= 1);
        assert_eq!(Parallelism::Fixed(4).resolve(), 4);
    }
}
