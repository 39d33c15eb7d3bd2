//! Top-level execution orchestrator
//!
//! `DockerSandbox` is the entry point callers use: it resolves the requested
//! language, obtains the (shared, per-language) environment from its
//! registry, writes the source file and triggers the execute pipeline. The
//! registry is owned by the sandbox, not module-level state, so independent
//! sandboxes are fully isolated from one another.

use async_trait::async_trait;
use bollard::Docker;
use regex::Regex;
use std::sync::OnceLock;

use crate::config::SandboxConfig;
use crate::core_types::ExecutionRecord;
use crate::errors::SandboxError;
use crate::languages::{self, LanguageSpec};
use crate::registry::EnvironmentRegistry;

/// Seam for code execution backends.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute_code(
        &self,
        language: &str,
        code: &str,
    ) -> Result<ExecutionRecord, SandboxError>;
}

pub struct DockerSandbox {
    registry: EnvironmentRegistry,
}

impl DockerSandbox {
    /// Connect to the local container daemon with the given configuration.
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::DockerError(format!("failed to connect to Docker: {}", e)))?;
        Ok(Self::with_docker(docker, config))
    }

    pub fn with_docker(docker: Docker, config: SandboxConfig) -> Self {
        Self {
            registry: EnvironmentRegistry::new(docker, config),
        }
    }

    pub fn registry(&self) -> &EnvironmentRegistry {
        &self.registry
    }

    /// Execute `code` in the environment for `language`.
    ///
    /// The language name is free-form and goes through alias resolution;
    /// unsupported names fail with a typed error before any environment is
    /// created. Infrastructure failures (environment cannot start, file
    /// cannot be written) are errors; a program that compiles or runs with a
    /// nonzero exit is a normal record with `success: false`.
    ///
    /// The source file stays in the environment's work dir after the call;
    /// callers that care clean up via the environment's `delete_file`.
    pub async fn run_code(
        &self,
        language: &str,
        code: &str,
    ) -> Result<ExecutionRecord, SandboxError> {
        let spec = languages::resolve(language)?;
        let filename = derive_filename(spec, code);
        log::info!("running {} code as {}", spec.name, filename);

        let environment = self.registry.get_or_create(spec).await;
        let mut environment = environment.lock().await;
        environment.ensure_running().await?;
        environment.write_file(&filename, code).await?;
        environment.execute_file(&filename).await
    }

    /// Destroy every environment this sandbox created.
    pub async fn teardown(&self) {
        self.registry.teardown_all().await;
    }
}

#[async_trait]
impl CodeExecutor for DockerSandbox {
    async fn execute_code(
        &self,
        language: &str,
        code: &str,
    ) -> Result<ExecutionRecord, SandboxError> {
        self.run_code(language, code).await
    }
}

/// Default source filename for a language, honoring toolchains that require
/// the filename to match a declared symbol. Java files must be named after
/// their public class; when no public class can be found the default name is
/// used and javac reports the precise mismatch itself.
fn derive_filename(spec: &LanguageSpec, code: &str) -> String {
    if spec.name == "java" {
        if let Some(class) = java_public_class(code) {
            return format!("{}.java", class);
        }
    }
    format!("program.{}", spec.extension)
}

fn java_public_class(code: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"public\s+(?:final\s+|abstract\s+)*class\s+([A-Za-z_$][A-Za-z0-9_$]*)")
            .expect("class pattern is valid")
    });
    pattern
        .captures(code)
        .map(|captures| captures[1].to_string())
}
