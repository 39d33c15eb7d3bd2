//! Persistent per-language execution environment
//!
//! Each environment owns one long-lived container (kept alive with
//! `tail -f /dev/null`) dedicated to a single language's toolchain, and
//! mediates every file and exec operation against it. Environments survive
//! across executions; `disconnect` drops the local handle while the
//! container keeps running, `destroy` stops and removes the container.

use bollard::models::{ContainerCreateBody, HostConfig, ResourcesUlimits};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, RemoveContainerOptions,
    RestartContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::time::SystemTime;
use uuid::Uuid;

use crate::config::SandboxConfig;
use crate::core_types::{ExecutionRecord, FileInfo};
use crate::errors::{ExecError, SandboxError};
use crate::exec;
use crate::languages::LanguageSpec;
use crate::transfer;

pub struct Environment {
    docker: Docker,
    spec: &'static LanguageSpec,
    config: SandboxConfig,
    container_name: String,
    container_id: Option<String>,
    active: bool,
    known_files: HashMap<String, FileInfo>,
}

impl Environment {
    pub fn new(docker: Docker, spec: &'static LanguageSpec, config: SandboxConfig) -> Self {
        let container_name = config.container_name(spec.name);
        Self {
            docker,
            spec,
            config,
            container_name,
            container_id: None,
            active: false,
            known_files: HashMap::new(),
        }
    }

    pub fn language(&self) -> &'static str {
        self.spec.name
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn work_dir(&self) -> &'static str {
        self.spec.work_dir
    }

    pub fn known_files(&self) -> &HashMap<String, FileInfo> {
        &self.known_files
    }

    /// Attach to this environment's backing container, starting it when it
    /// exists but is stopped. Idempotent: connecting while active is a no-op.
    /// A missing container is a typed `ContainerNotFound`, so callers can
    /// decide whether to provision one.
    pub async fn connect(&mut self) -> Result<(), SandboxError> {
        if self.active {
            log::debug!("container {} is already attached", self.container_name);
            return Ok(());
        }

        let info = match self
            .docker
            .inspect_container(&self.container_name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => info,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                return Err(SandboxError::ContainerNotFound(self.container_name.clone()));
            }
            Err(e) => {
                return Err(SandboxError::EnvironmentUnavailable {
                    language: self.spec.name.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let running = info
            .state
            .as_ref()
            .and_then(|state| state.running)
            .unwrap_or(false);
        if !running {
            log::info!("starting stopped container {}", self.container_name);
            self.docker
                .start_container(&self.container_name, None::<StartContainerOptions>)
                .await
                .map_err(|e| SandboxError::EnvironmentUnavailable {
                    language: self.spec.name.to_string(),
                    message: e.to_string(),
                })?;
        }

        self.container_id = Some(info.id.unwrap_or_else(|| self.container_name.clone()));
        self.active = true;
        log::info!("attached to container {}", self.container_name);
        Ok(())
    }

    /// Create and start the backing container for this language, with the
    /// configured resource ceilings. Pulls the toolchain image when it is not
    /// present locally.
    pub async fn provision(&mut self) -> Result<(), SandboxError> {
        if self.active {
            return Ok(());
        }

        log::info!(
            "provisioning container {} from image {}",
            self.container_name,
            self.spec.image
        );

        let created = match self.create_container().await {
            Ok(id) => id,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                self.pull_image().await?;
                self.create_container()
                    .await
                    .map_err(|e| self.unavailable(e))?
            }
            Err(e) => return Err(self.unavailable(e)),
        };

        self.docker
            .start_container(&created, None::<StartContainerOptions>)
            .await
            .map_err(|e| self.unavailable(e))?;
        self.container_id = Some(created);
        self.active = true;

        // The image's working dir may differ; make sure ours exists.
        let mkdir = format!("mkdir -p {}", self.spec.work_dir);
        self.run_checked(&mkdir, "/").await?;

        for command in self.spec.setup {
            log::info!("running setup for {}: {}", self.spec.name, command);
            match exec::run_shell(
                &self.docker,
                &self.container_name,
                command,
                self.spec.work_dir,
                self.config.step_timeout(),
            )
            .await
            {
                Ok(output) if output.exit_code != 0 => {
                    log::warn!("setup command '{}' failed: {}", command, output.stderr);
                }
                Ok(_) => {}
                Err(e) => log::warn!("setup command '{}' failed: {}", command, e),
            }
        }

        log::info!("container {} started", self.container_name);
        Ok(())
    }

    /// Connect to the backing container, provisioning it when absent.
    pub async fn ensure_running(&mut self) -> Result<(), SandboxError> {
        match self.connect().await {
            Ok(()) => Ok(()),
            Err(SandboxError::ContainerNotFound(_)) => self.provision().await,
            Err(e) => Err(e),
        }
    }

    /// Write `content` to `filename` under the work dir, then verify the file
    /// actually landed there. Transfer can partially fail without reporting
    /// an error, so presence is checked explicitly.
    pub async fn write_file(&mut self, filename: &str, content: &str) -> Result<(), SandboxError> {
        if !self.active {
            self.ensure_running().await?;
        }
        let container = self.require_active()?.to_string();

        transfer::put(
            &self.docker,
            &container,
            self.spec.work_dir,
            filename,
            content.as_bytes(),
            self.config.step_timeout(),
        )
        .await?;

        let full_path = format!("{}/{}", self.spec.work_dir, filename);
        let check = exec::run_shell(
            &self.docker,
            &container,
            &format!("test -f '{}'", full_path),
            self.spec.work_dir,
            self.config.step_timeout(),
        )
        .await
        .map_err(|e| SandboxError::WriteFailed {
            filename: filename.to_string(),
            message: e.to_string(),
        })?;
        if check.exit_code != 0 {
            return Err(SandboxError::WriteFailed {
                filename: filename.to_string(),
                message: format!("file not found at {} after transfer", full_path),
            });
        }

        self.known_files.insert(
            filename.to_string(),
            FileInfo {
                path: full_path,
                size: Some(content.len()),
                last_modified: SystemTime::now(),
            },
        );
        log::info!(
            "wrote {} ({} bytes) into {}",
            filename,
            content.len(),
            self.container_name
        );
        Ok(())
    }

    /// Read a file from the work dir as text.
    pub async fn read_file(&mut self, filename: &str) -> Result<String, SandboxError> {
        let container = self.require_active()?.to_string();

        let exists = self
            .run_in_workdir(&container, &format!("test -f '{}'", filename))
            .await?;
        if exists.exit_code != 0 {
            return Err(SandboxError::FileNotFound(filename.to_string()));
        }

        let output = self
            .run_in_workdir(&container, &format!("cat '{}'", filename))
            .await?;
        if output.exit_code != 0 {
            return Err(SandboxError::ExecFailed(format!(
                "failed to read {}: {}",
                filename, output.stderr
            )));
        }
        Ok(output.stdout)
    }

    /// Enumerate regular files under the work dir, excluding dotfiles.
    pub async fn list_files(&mut self) -> Result<Vec<String>, SandboxError> {
        let container = self.require_active()?.to_string();

        let command = format!("find '{}' -type f -not -path '*/.*'", self.spec.work_dir);
        let output = self.run_in_workdir(&container, &command).await?;
        if output.exit_code != 0 {
            return Err(SandboxError::ExecFailed(format!(
                "failed to list files: {}",
                output.stderr
            )));
        }

        let mut names = Vec::new();
        for path in output.stdout.lines().filter(|line| !line.is_empty()) {
            let name = path.rsplit('/').next().unwrap_or(path).to_string();
            self.known_files.entry(name.clone()).or_insert(FileInfo {
                path: path.to_string(),
                size: None,
                last_modified: SystemTime::now(),
            });
            names.push(name);
        }
        Ok(names)
    }

    pub async fn delete_file(&mut self, filename: &str) -> Result<(), SandboxError> {
        let container = self.require_active()?.to_string();

        let output = self
            .run_in_workdir(&container, &format!("rm -f '{}'", filename))
            .await?;
        if output.exit_code != 0 {
            return Err(SandboxError::ExecFailed(format!(
                "failed to delete {}: {}",
                filename, output.stderr
            )));
        }
        self.known_files.remove(filename);
        Ok(())
    }

    /// Run the language's pipeline against `filename` inside the work dir.
    ///
    /// For compiled languages the compile step runs first and gates the run
    /// step: a nonzero compile exit returns immediately with the compiler's
    /// stderr, and the program is never executed. A step that exceeds the
    /// wall-clock budget yields a failed record with a synthetic message (and
    /// a container restart to reap the runaway process), not an error.
    pub async fn execute_file(&mut self, filename: &str) -> Result<ExecutionRecord, SandboxError> {
        if !self.active {
            self.ensure_running().await?;
        }
        let container = self.require_active()?.to_string();
        let execution_id = Uuid::new_v4().to_string();
        let timeout = self.config.step_timeout();

        if let Some(compile_command) = self.spec.plan.compile_command(filename) {
            log::info!("compiling {} with: {}", filename, compile_command);
            let compiled = match exec::run_shell(
                &self.docker,
                &container,
                &compile_command,
                self.spec.work_dir,
                timeout,
            )
            .await
            {
                Ok(output) => output,
                Err(ExecError::Timeout(secs)) => {
                    return Ok(self.timeout_record(execution_id, filename, secs).await);
                }
                Err(e) => return Err(e.into()),
            };

            if compiled.exit_code != 0 {
                log::warn!(
                    "compile step for {} failed with code {}",
                    filename,
                    compiled.exit_code
                );
                return Ok(ExecutionRecord {
                    execution_id,
                    language: self.spec.name.to_string(),
                    filename: filename.to_string(),
                    stdout: compiled.stdout,
                    stderr: compiled.stderr,
                    exit_code: compiled.exit_code,
                    success: false,
                });
            }
        }

        let run_command = self.spec.plan.run_command(filename);
        log::info!("executing {} with: {}", filename, run_command);
        let output = match exec::run_shell_with_recapture(
            &self.docker,
            &container,
            &run_command,
            self.spec.work_dir,
            timeout,
        )
        .await
        {
            Ok(output) => output,
            Err(ExecError::Timeout(secs)) => {
                return Ok(self.timeout_record(execution_id, filename, secs).await);
            }
            Err(e) => return Err(e.into()),
        };

        let record = ExecutionRecord {
            execution_id,
            language: self.spec.name.to_string(),
            filename: filename.to_string(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            success: output.exit_code == 0,
        };
        log::info!(
            "execution {} finished with code {}",
            record.execution_id,
            record.exit_code
        );
        Ok(record)
    }

    /// Drop the local handle. The backing container keeps running and a later
    /// `connect` reattaches to it.
    pub fn disconnect(&mut self) {
        log::info!(
            "detached from container {} (left running)",
            self.container_name
        );
        self.active = false;
    }

    /// Stop and remove the backing container, releasing its resources.
    pub async fn destroy(&mut self) -> Result<(), SandboxError> {
        if let Err(e) = self
            .docker
            .stop_container(&self.container_name, None::<StopContainerOptions>)
            .await
        {
            log::debug!("stop of {} failed: {}", self.container_name, e);
        }

        match self
            .docker
            .remove_container(
                &self.container_name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(())
            | Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(self.unavailable(e)),
        }

        log::info!("container {} removed", self.container_name);
        self.active = false;
        self.container_id = None;
        self.known_files.clear();
        Ok(())
    }

    async fn create_container(&self) -> Result<String, bollard::errors::Error> {
        let options = Some(CreateContainerOptions {
            name: Some(self.container_name.clone()),
            ..Default::default()
        });

        let limits = &self.config.limits;
        let host_config = HostConfig {
            memory: Some(limits.memory_bytes),
            cpu_quota: Some(limits.cpu_quota()),
            cpu_period: Some(limits.cpu_period()),
            ulimits: Some(vec![ResourcesUlimits {
                name: Some("nproc".to_string()),
                soft: Some(limits.nproc_soft),
                hard: Some(limits.nproc_hard),
            }]),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(self.spec.image.to_string()),
            // Keep the container alive indefinitely; work arrives via exec.
            cmd: Some(vec![
                "tail".to_string(),
                "-f".to_string(),
                "/dev/null".to_string(),
            ]),
            working_dir: Some(self.spec.work_dir.to_string()),
            tty: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self.docker.create_container(options, body).await?;
        Ok(created.id)
    }

    async fn pull_image(&self) -> Result<(), SandboxError> {
        log::info!("pulling image {}", self.spec.image);
        let options = Some(CreateImageOptions {
            from_image: Some(self.spec.image.to_string()),
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| SandboxError::EnvironmentUnavailable {
                language: self.spec.name.to_string(),
                message: format!("failed to pull image {}: {}", self.spec.image, e),
            })?;
        }
        Ok(())
    }

    fn require_active(&self) -> Result<&str, SandboxError> {
        if !self.active {
            return Err(SandboxError::EnvironmentUnavailable {
                language: self.spec.name.to_string(),
                message: "container not active".to_string(),
            });
        }
        Ok(self
            .container_id
            .as_deref()
            .unwrap_or(&self.container_name))
    }

    async fn run_in_workdir(
        &self,
        container: &str,
        command: &str,
    ) -> Result<exec::ExecOutput, SandboxError> {
        exec::run_shell(
            &self.docker,
            container,
            command,
            self.spec.work_dir,
            self.config.step_timeout(),
        )
        .await
        .map_err(SandboxError::from)
    }

    async fn run_checked(&self, command: &str, work_dir: &str) -> Result<(), SandboxError> {
        let output = exec::run_shell(
            &self.docker,
            &self.container_name,
            command,
            work_dir,
            self.config.step_timeout(),
        )
        .await?;
        if output.exit_code != 0 {
            return Err(SandboxError::ExecFailed(format!(
                "'{}' exited with code {}: {}",
                command, output.exit_code, output.stderr
            )));
        }
        Ok(())
    }

    async fn timeout_record(
        &mut self,
        execution_id: String,
        filename: &str,
        secs: u64,
    ) -> ExecutionRecord {
        log::warn!(
            "execution timed out after {}s, restarting container {}",
            secs,
            self.container_name
        );
        if let Err(e) = self
            .docker
            .restart_container(&self.container_name, None::<RestartContainerOptions>)
            .await
        {
            log::warn!("failed to restart {}: {}", self.container_name, e);
            self.active = false;
        }

        ExecutionRecord {
            execution_id,
            language: self.spec.name.to_string(),
            filename: filename.to_string(),
            stdout: String::new(),
            stderr: format!("Execution timed out after {} seconds", secs),
            exit_code: 124,
            success: false,
        }
    }

    fn unavailable(&self, err: bollard::errors::Error) -> SandboxError {
        SandboxError::EnvironmentUnavailable {
            language: self.spec.name.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages;

    fn environment(language: &str) -> Environment {
        let docker = Docker::connect_with_local_defaults().unwrap();
        let spec = languages::resolve(language).unwrap();
        Environment::new(docker, spec, SandboxConfig::default())
    }

    #[test]
    fn new_environment_is_inactive_with_no_container() {
        let env = environment("python");
        assert!(!env.is_active());
        assert!(env.container_id().is_none());
        assert!(env.known_files().is_empty());
        assert_eq!(env.container_name(), "crucible-env-python");
        assert_eq!(env.work_dir(), "/app");
    }

    #[tokio::test]
    async fn operations_on_detached_environment_are_rejected() {
        let mut env = environment("python");
        let err = env.read_file("program.py").await.unwrap_err();
        assert!(matches!(err, SandboxError::EnvironmentUnavailable { .. }));
        let err = env.list_files().await.unwrap_err();
        assert!(matches!(err, SandboxError::EnvironmentUnavailable { .. }));
    }

    #[test]
    fn disconnect_detaches_without_dropping_container_identity() {
        let mut env = environment("go");
        env.active = true;
        env.container_id = Some("abc123".to_string());
        env.disconnect();
        assert!(!env.is_active());
        assert_eq!(env.container_id(), Some("abc123"));
    }
}
