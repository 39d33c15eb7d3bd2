//! Sandbox configuration types
//!
//! Every field carries a serde-level default so a minimal (or absent) YAML
//! file yields a fully usable configuration. The defaults bound each
//! environment to one CPU core, 512 MB of memory and a capped process count,
//! with a 60 second wall-clock budget per command step.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::SandboxError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Wall-clock budget, in seconds, for a single command step. Compile and
    /// run steps of a compiled language each get their own budget.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    /// Prefix for container names; the canonical language name is appended.
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            step_timeout_secs: default_step_timeout_secs(),
            container_prefix: default_container_prefix(),
        }
    }
}

impl SandboxConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SandboxError::ConfigError(format!("failed to read config file: {}", e)))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| SandboxError::ConfigError(format!("failed to parse config file: {}", e)))
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn container_name(&self, language: &str) -> String {
        format!("{}-{}", self.container_prefix, language)
    }
}

/// Per-environment resource ceilings, applied at container creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU share in cores (1.0 = one full core).
    #[serde(default = "default_cpus")]
    pub cpus: f64,
    /// Memory ceiling in bytes.
    #[serde(default = "default_memory_bytes")]
    pub memory_bytes: i64,
    /// Soft process-count ulimit (nproc).
    #[serde(default = "default_nproc_soft")]
    pub nproc_soft: i64,
    /// Hard process-count ulimit (nproc).
    #[serde(default = "default_nproc_hard")]
    pub nproc_hard: i64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpus: default_cpus(),
            memory_bytes: default_memory_bytes(),
            nproc_soft: default_nproc_soft(),
            nproc_hard: default_nproc_hard(),
        }
    }
}

impl ResourceLimits {
    /// CPU quota against the standard 100ms scheduling period.
    pub fn cpu_quota(&self) -> i64 {
        (100_000.0 * self.cpus) as i64
    }

    pub fn cpu_period(&self) -> i64 {
        100_000
    }
}

fn default_step_timeout_secs() -> u64 {
    60
}

fn default_container_prefix() -> String {
    "crucible-env".to_string()
}

fn default_cpus() -> f64 {
    1.0
}

fn default_memory_bytes() -> i64 {
    512 * 1024 * 1024
}

fn default_nproc_soft() -> i64 {
    50
}

fn default_nproc_hard() -> i64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_bounded() {
        let config = SandboxConfig::default();
        assert_eq!(config.step_timeout_secs, 60);
        assert_eq!(config.limits.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(config.limits.cpu_quota(), 100_000);
        assert!(config.limits.nproc_soft <= config.limits.nproc_hard);
    }

    #[test]
    fn container_names_are_prefixed_per_language() {
        let config = SandboxConfig::default();
        assert_eq!(config.container_name("python"), "crucible-env-python");
        assert_eq!(config.container_name("go"), "crucible-env-go");
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "step_timeout_secs: 10").unwrap();
        writeln!(file, "limits:").unwrap();
        writeln!(file, "  cpus: 0.5").unwrap();

        let config = SandboxConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.step_timeout_secs, 10);
        assert_eq!(config.limits.cpu_quota(), 50_000);
        // Unspecified fields keep their defaults
        assert_eq!(config.limits.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(config.container_prefix, "crucible-env");
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let err = SandboxConfig::from_yaml_file("/nonexistent/crucible.yaml").unwrap_err();
        assert!(matches!(err, SandboxError::ConfigError(_)));
    }
}
