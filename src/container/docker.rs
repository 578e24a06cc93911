//! Docker Engine API runtime backed by bollard

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{
    BuildImageOptions, CommitContainerOptions, CreateImageOptions, PushImageOptions,
    RemoveImageOptions, TagImageOptions,
};
use bollard::models::{ContainerSummary, HostConfig, Port, PortTypeEnum};
use bollard::{Docker, API_DEFAULT_VERSION};
use chrono::DateTime;
use futures::StreamExt;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::RuntimeError;
use crate::models::{AuthConfig, ContainerDescriptor, CreateRequest, ExecRequest, PublishedPort};
use crate::ports::Protocol;

use super::runtime::ContainerRuntime;

/// Tag the Docker CLI assumes when a reference carries none
const DEFAULT_TAG: &str = "latest";

/// Runtime talking to a Docker (or Podman) daemon over its remote API
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    /// Shared client, created once and reused for every call
    docker: Docker,

    /// Seconds the daemon waits before killing a container on stop
    stop_timeout: i64,
}

impl DockerRuntime {
    /// Connect using the configured host, or local defaults when none is set
    pub fn connect(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let docker = match config.docker_host.as_deref() {
            None => Docker::connect_with_local_defaults()?
                .with_timeout(Duration::from_secs(config.timeout_seconds)),
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_unix(host, config.timeout_seconds, API_DEFAULT_VERSION)?
            }
            Some(host) => {
                Docker::connect_with_http(host, config.timeout_seconds, API_DEFAULT_VERSION)?
            }
        };

        info!(
            docker_host = config.docker_host.as_deref().unwrap_or("local defaults"),
            "Container runtime client created"
        );

        Ok(Self {
            docker,
            stop_timeout: config.stop_timeout_seconds,
        })
    }

    /// Raw bollard client for anything the engine does not cover
    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn build_image(&self, context_dir: &Path) -> Result<String, RuntimeError> {
        let dir = context_dir.to_path_buf();
        let context = tokio::task::spawn_blocking(move || archive_context(&dir))
            .await
            .map_err(std::io::Error::other)??;

        let options = BuildImageOptions::<String> {
            dockerfile: "Dockerfile".to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(context.into()));
        let mut image_id = None;

        while let Some(item) = stream.next().await {
            let info = item?;

            if let Some(line) = info.stream.as_deref().map(str::trim_end) {
                if !line.is_empty() {
                    debug!("Build: {}", line);
                }
            }
            if let Some(error) = info.error {
                return Err(RuntimeError::Stream(error));
            }
            if let Some(id) = info.aux.and_then(|aux| aux.id) {
                image_id = Some(id);
            }
        }

        image_id.ok_or(RuntimeError::MissingField("image id"))
    }

    async fn tag_image(&self, image_id: &str, repository: &str, tag: &str) -> Result<(), RuntimeError> {
        let options = TagImageOptions {
            repo: repository,
            tag,
        };
        self.docker.tag_image(image_id, Some(options)).await?;
        Ok(())
    }

    async fn pull_image(
        &self,
        repository: &str,
        tag: Option<String>,
        credentials: Option<AuthConfig>,
    ) -> Result<(), RuntimeError> {
        let options = CreateImageOptions {
            from_image: repository.to_string(),
            tag: tag_or_default(tag),
            ..Default::default()
        };

        let mut stream = self
            .docker
            .create_image(Some(options), None, credentials.map(to_credentials));

        while let Some(item) = stream.next().await {
            let info = item?;
            if let Some(error) = info.error {
                return Err(RuntimeError::Stream(error));
            }
            if let Some(status) = info.status {
                debug!(image = %repository, "Pull: {}", status);
            }
        }

        Ok(())
    }

    async fn push_image(
        &self,
        repository: &str,
        tag: Option<String>,
        credentials: Option<AuthConfig>,
    ) -> Result<(), RuntimeError> {
        let options = PushImageOptions {
            tag: tag_or_default(tag),
        };

        let mut stream = self
            .docker
            .push_image(repository, Some(options), credentials.map(to_credentials));

        while let Some(item) = stream.next().await {
            let info = item?;
            if let Some(error) = info.error {
                return Err(RuntimeError::Stream(error));
            }
            if let Some(status) = info.status {
                debug!(image = %repository, "Push: {}", status);
            }
        }

        Ok(())
    }

    async fn remove_image(&self, image: &str, force: bool) -> Result<(), RuntimeError> {
        let options = RemoveImageOptions {
            force,
            ..Default::default()
        };
        self.docker.remove_image(image, Some(options), None).await?;
        Ok(())
    }

    async fn create_container(&self, request: CreateRequest) -> Result<String, RuntimeError> {
        let CreateRequest {
            image,
            name,
            cmd,
            env,
            port_bindings,
            binds,
            network_mode,
            memory_bytes,
            nano_cpus,
            labels,
            working_dir,
            user,
            tty,
        } = request;

        let host_config = HostConfig {
            port_bindings: (!port_bindings.is_empty()).then(|| port_bindings.to_port_bindings()),
            binds: (!binds.is_empty()).then_some(binds),
            network_mode,
            memory: memory_bytes,
            nano_cpus,
            ..Default::default()
        };

        let config = Config {
            image: Some(image),
            cmd,
            env: (!env.is_empty()).then_some(env),
            exposed_ports: (!port_bindings.is_empty()).then(|| port_bindings.to_exposed_ports()),
            labels: (!labels.is_empty()).then_some(labels),
            working_dir,
            user,
            tty: Some(tty),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name,
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            debug!(container_id = %response.id, "Create warning: {}", warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = StopContainerOptions {
            t: self.stop_timeout,
        };
        self.docker.stop_container(id, Some(options)).await?;
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(id, Some(options));

        while let Some(item) = stream.next().await {
            match item {
                Ok(_) => {}
                // A non-zero exit code still means the container stopped
                Err(bollard::errors::Error::DockerContainerWaitError { .. }) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(id, None::<RemoveContainerOptions>)
            .await?;
        Ok(())
    }

    async fn commit_container(&self, id: &str, repository: &str, tag: &str) -> Result<String, RuntimeError> {
        let options = CommitContainerOptions {
            container: id.to_string(),
            repo: repository.to_string(),
            tag: tag.to_string(),
            pause: true,
            ..Default::default()
        };

        let commit = self
            .docker
            .commit_container(options, Config::<String>::default())
            .await?;

        commit.id.ok_or(RuntimeError::MissingField("image id"))
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerDescriptor>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };

        let summaries = self.docker.list_containers(Some(options)).await?;
        summaries.into_iter().map(to_descriptor).collect()
    }

    async fn create_exec(&self, id: &str, request: ExecRequest) -> Result<String, RuntimeError> {
        let options = CreateExecOptions {
            cmd: Some(request.cmd),
            attach_stdout: Some(request.attach_stdout),
            attach_stderr: Some(request.attach_stderr),
            tty: Some(request.tty),
            ..Default::default()
        };

        let created = self.docker.create_exec(id, options).await?;
        Ok(created.id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<Vec<u8>, RuntimeError> {
        match self.docker.start_exec(exec_id, None).await? {
            StartExecResults::Attached { mut output, .. } => {
                let mut captured = Vec::new();
                while let Some(frame) = output.next().await {
                    match frame? {
                        LogOutput::StdOut { message }
                        | LogOutput::StdErr { message }
                        | LogOutput::StdIn { message }
                        | LogOutput::Console { message } => captured.extend_from_slice(&message),
                    }
                }
                Ok(captured)
            }
            StartExecResults::Detached => Ok(Vec::new()),
        }
    }
}

/// Tar a build context directory in memory
fn archive_context(dir: &Path) -> Result<Vec<u8>, RuntimeError> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.append_dir_all(".", dir)?;
    Ok(archive.into_inner()?)
}

fn tag_or_default(tag: Option<String>) -> String {
    tag.unwrap_or_else(|| DEFAULT_TAG.to_string())
}

fn to_credentials(auth: AuthConfig) -> DockerCredentials {
    DockerCredentials {
        username: auth.username,
        password: auth.password,
        email: auth.email,
        serveraddress: auth.server_address,
        identitytoken: auth.identity_token,
        ..Default::default()
    }
}

fn to_descriptor(summary: ContainerSummary) -> Result<ContainerDescriptor, RuntimeError> {
    let id = summary.id.ok_or(RuntimeError::MissingField("container id"))?;

    Ok(ContainerDescriptor {
        id,
        names: summary.names.unwrap_or_default(),
        image: summary.image.unwrap_or_default(),
        state: summary.state,
        status: summary.status,
        created_at: summary
            .created
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        ports: summary
            .ports
            .unwrap_or_default()
            .into_iter()
            .map(to_published_port)
            .collect(),
    })
}

fn to_published_port(port: Port) -> PublishedPort {
    let protocol = match port.typ {
        Some(PortTypeEnum::UDP) => Protocol::Udp,
        Some(PortTypeEnum::SCTP) => Protocol::Sctp,
        _ => Protocol::Tcp,
    };

    PublishedPort {
        private_port: port.private_port,
        public_port: port.public_port,
        protocol,
        ip: port.ip,
    }
}
