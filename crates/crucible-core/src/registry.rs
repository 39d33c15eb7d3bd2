//! Process-wide registry of language environments
//!
//! An explicit, injectable object rather than ambient global state, so each
//! caller (and each test) can own an isolated registry. Lookup and insertion
//! happen atomically under one lock; the per-environment mutex serializes
//! all work against a single language's container.

use bollard::Docker;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::SandboxConfig;
use crate::environment::Environment;
use crate::languages::LanguageSpec;

pub struct EnvironmentRegistry {
    docker: Docker,
    config: SandboxConfig,
    environments: Mutex<HashMap<&'static str, Arc<Mutex<Environment>>>>,
}

impl EnvironmentRegistry {
    pub fn new(docker: Docker, config: SandboxConfig) -> Self {
        Self {
            docker,
            config,
            environments: Mutex::new(HashMap::new()),
        }
    }

    /// The environment for `spec`'s language, created on first request.
    /// Environments are keyed by canonical language name, so a handle can
    /// never be bound to a different language than the one requested.
    pub async fn get_or_create(&self, spec: &'static LanguageSpec) -> Arc<Mutex<Environment>> {
        let mut environments = self.environments.lock().await;
        environments
            .entry(spec.name)
            .or_insert_with(|| {
                log::info!("creating environment for language: {}", spec.name);
                Arc::new(Mutex::new(Environment::new(
                    self.docker.clone(),
                    spec,
                    self.config.clone(),
                )))
            })
            .clone()
    }

    /// Languages with a registered environment.
    pub async fn languages(&self) -> Vec<&'static str> {
        let environments = self.environments.lock().await;
        let mut names: Vec<_> = environments.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Destroy every registered environment's container and clear the map.
    /// Individual failures are logged and do not stop the sweep.
    pub async fn teardown_all(&self) {
        let mut environments = self.environments.lock().await;
        log::info!("tearing down {} environments", environments.len());
        for (language, environment) in environments.drain() {
            let mut environment = environment.lock().await;
            if let Err(e) = environment.destroy().await {
                log::error!("failed to tear down environment for {}: {}", language, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages;

    fn registry() -> EnvironmentRegistry {
        let docker = Docker::connect_with_local_defaults().unwrap();
        EnvironmentRegistry::new(docker, SandboxConfig::default())
    }

    #[tokio::test]
    async fn same_language_yields_the_same_environment() {
        let registry = registry();
        let python = languages::resolve("python").unwrap();
        let first = registry.get_or_create(python).await;
        let second = registry.get_or_create(python).await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn different_languages_yield_distinct_environments() {
        let registry = registry();
        let python = languages::resolve("python").unwrap();
        let go = languages::resolve("go").unwrap();
        let a = registry.get_or_create(python).await;
        let b = registry.get_or_create(go).await;
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.languages().await, vec!["go", "python"]);
    }

    #[tokio::test]
    async fn aliases_share_one_environment() {
        let registry = registry();
        let a = registry
            .get_or_create(languages::resolve("python3").unwrap())
            .await;
        let b = registry
            .get_or_create(languages::resolve("py").unwrap())
            .await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn concurrent_lookups_insert_exactly_once() {
        let registry = Arc::new(registry());
        let spec = languages::resolve("ruby").unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(
                async move { registry.get_or_create(spec).await },
            ));
        }

        let mut environments = Vec::new();
        for handle in handles {
            environments.push(handle.await.unwrap());
        }
        for environment in &environments[1..] {
            assert!(Arc::ptr_eq(&environments[0], environment));
        }
        assert_eq!(registry.languages().await, vec!["ruby"]);
    }
}
