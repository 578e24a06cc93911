//! Container lifecycle engine

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result, RuntimeError};
use crate::identifier::ImageIdentifier;
use crate::metrics;
use crate::models::{AuthConfig, ContainerDescriptor, CreateRequest, ExecRequest};
use crate::ports;
use crate::sanitize::sanitize;

use super::docker::DockerRuntime;
use super::runtime::ContainerRuntime;

/// High-level facade over a container runtime.
///
/// Holds one runtime client for its whole life and no other state, so a shared
/// `Engine` can serve concurrent callers. Each call completes (or fails) before
/// it returns; nothing is queued or retried.
///
/// Build, pull, push, start, exec, commit and list propagate runtime failures.
/// Stop, remove and remove-image are best effort and never fail: callers cannot
/// tell "stopped" from "already gone" from "rejected".
pub struct Engine<R = DockerRuntime> {
    /// Runtime client
    runtime: R,

    /// Credentials for pull/push when the caller passes none
    default_auth: Option<AuthConfig>,
}

impl Engine<DockerRuntime> {
    /// Connect to the runtime described by `config`
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let runtime = DockerRuntime::connect(config).map_err(EngineError::Connect)?;
        let mut engine = Self::with_runtime(runtime);
        engine.default_auth = config.registry_auth.clone();
        Ok(engine)
    }

    /// Connect with local defaults (`DOCKER_HOST` or the local socket)
    pub fn connect_local() -> Result<Self> {
        Self::from_config(&EngineConfig::default())
    }
}

impl<R: ContainerRuntime> Engine<R> {
    pub fn with_runtime(runtime: R) -> Self {
        Self {
            runtime,
            default_auth: None,
        }
    }

    /// Use `auth` for pull/push calls that pass no credentials
    pub fn with_default_auth(mut self, auth: AuthConfig) -> Self {
        self.default_auth = Some(auth);
        self
    }

    /// The underlying runtime client, for anything not covered here
    pub fn client(&self) -> &R {
        &self.runtime
    }

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    /// Build the `Dockerfile` in `source_dir` and tag the result `repository:tag`.
    ///
    /// Returns the tag reference, not the image id: the id is only logged. The
    /// reference's `to_string()` is accepted anywhere an image id is, including
    /// [`Engine::remove_image`].
    pub async fn build(&self, source_dir: &Path, repository: &str, tag: &str) -> Result<ImageIdentifier> {
        let target = ImageIdentifier::new(repository, tag)?;
        tracked("build", async {
            info!(source_dir = %source_dir.display(), image = %target, "Building image");

            let image_id = self
                .runtime
                .build_image(source_dir)
                .await
                .map_err(EngineError::BuildFailed)?;
            self.runtime
                .tag_image(&image_id, target.repository(), tag)
                .await
                .map_err(EngineError::BuildFailed)?;

            info!(image_id = %image_id, image = %target, "Image built");
            Ok(target)
        })
        .await
    }

    /// Pull a compound reference such as `registry.my.com/somerepo:1.0`
    pub async fn pull(&self, compound_ref: &str, auth: Option<AuthConfig>) -> Result<()> {
        let identifier = ImageIdentifier::parse(compound_ref)?;
        let credentials = auth.or_else(|| self.default_auth.clone());

        tracked("pull", async {
            debug!(image = %identifier, "Pulling image");
            self.runtime
                .pull_image(
                    identifier.repository(),
                    identifier.tag().map(str::to_string),
                    credentials,
                )
                .await
                .map_err(EngineError::PullFailed)?;
            info!(image = %identifier, "Image pulled");
            Ok(())
        })
        .await
    }

    pub async fn push(&self, repository: &str, tag: &str, auth: Option<AuthConfig>) -> Result<()> {
        let identifier = ImageIdentifier::new(repository, tag)?;
        let credentials = auth.or_else(|| self.default_auth.clone());

        tracked("push", async {
            debug!(image = %identifier, "Pushing image");
            self.runtime
                .push_image(
                    identifier.repository(),
                    identifier.tag().map(str::to_string),
                    credentials,
                )
                .await
                .map_err(EngineError::PushFailed)?;
            info!(image = %identifier, "Image pushed");
            Ok(())
        })
        .await
    }

    /// Force-remove an image. Best effort: errors are discarded.
    pub async fn remove_image(&self, image_id: &str) {
        info!(image = %image_id, "Removing image");
        run_ignored("remove_image", image_id, self.runtime.remove_image(image_id, true)).await;
    }

    // ------------------------------------------------------------------
    // Containers
    // ------------------------------------------------------------------

    /// Create and start a container.
    ///
    /// `command` is split on whitespace; an empty command keeps the image
    /// default. `port_pairs` is `[host, container, host, container, ...]`.
    pub async fn start(
        &self,
        image: &str,
        name: &str,
        command: &str,
        env: &[&str],
        port_pairs: &[u32],
    ) -> Result<String> {
        let bindings = ports::to_bindings(port_pairs)?;
        let argv: Vec<&str> = command.split_whitespace().collect();

        self.start_with(image, name, |request| {
            if !argv.is_empty() {
                request.with_cmd(argv);
            }
            request.with_env(env.iter().copied()).with_port_bindings(bindings);
        })
        .await
    }

    /// Create and start a container, letting `configure` adjust the creation
    /// request (volumes, networks, limits, ...) before it is submitted.
    ///
    /// If creation succeeds but the launch is rejected, the created container is
    /// left in place for the caller to remove.
    pub async fn start_with<F>(&self, image: &str, name: &str, configure: F) -> Result<String>
    where
        F: FnOnce(&mut CreateRequest),
    {
        let mut request = CreateRequest::new(image, name);
        configure(&mut request);

        tracked("start", async {
            let id = self
                .runtime
                .create_container(request)
                .await
                .map_err(EngineError::StartFailed)?;
            debug!(container_id = %id, name = %name, "Container created");

            self.runtime
                .start_container(&id)
                .await
                .map_err(EngineError::StartFailed)?;
            info!(container_id = %id, name = %name, image = %image, "Container started");

            Ok(id)
        })
        .await
    }

    /// Run `command` inside a running container and return its combined,
    /// sanitized output once the process has exited
    pub async fn exec(&self, container_id: &str, command: &[&str]) -> Result<String> {
        tracked("exec", async {
            if command.is_empty() {
                return Err(EngineError::ExecFailed(RuntimeError::InvalidRequest(
                    "empty command".to_string(),
                )));
            }

            let request = ExecRequest::captured(command.iter().map(|s| s.to_string()).collect());
            let exec_id = self
                .runtime
                .create_exec(container_id, request)
                .await
                .map_err(EngineError::ExecFailed)?;
            let raw = self
                .runtime
                .start_exec(&exec_id)
                .await
                .map_err(EngineError::ExecFailed)?;

            debug!(
                container_id = %container_id,
                command = ?command,
                output_bytes = raw.len(),
                "Exec completed"
            );
            Ok(sanitize(&raw))
        })
        .await
    }

    /// Stop a container and wait until it is no longer running. Best effort.
    pub async fn stop(&self, container_id: &str) {
        info!(container_id = %container_id, "Stopping container");
        run_ignored("stop", container_id, async {
            self.runtime.stop_container(container_id).await?;
            self.runtime.wait_container(container_id).await
        })
        .await;
    }

    /// Delete a container. Best effort.
    pub async fn remove(&self, container_id: &str) {
        info!(container_id = %container_id, "Removing container");
        run_ignored("remove", container_id, self.runtime.remove_container(container_id)).await;
    }

    /// Snapshot a container's filesystem as `repository:tag`, returning the new image id
    pub async fn commit(&self, container_id: &str, repository: &str, tag: &str) -> Result<String> {
        tracked("commit", async {
            let image_id = self
                .runtime
                .commit_container(container_id, repository, tag)
                .await
                .map_err(EngineError::CommitFailed)?;
            info!(
                container_id = %container_id,
                image_id = %image_id,
                image = %format!("{}:{}", repository, tag),
                "Container committed"
            );
            Ok(image_id)
        })
        .await
    }

    /// Running containers keyed by container id
    pub async fn list_active(&self) -> Result<HashMap<String, ContainerDescriptor>> {
        tracked("list", async {
            let containers = self
                .runtime
                .list_containers(false)
                .await
                .map_err(EngineError::ListFailed)?;
            Ok(containers.into_iter().map(|c| (c.id.clone(), c)).collect())
        })
        .await
    }
}

/// Await a propagating operation and record its outcome
async fn tracked<T, F>(operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let result = fut.await;
    if let Err(e) = &result {
        error!(operation, error = %e, "Engine operation failed");
    }
    metrics::record_operation(operation, result.is_ok());
    result
}

/// Await a best-effort operation and discard whatever error it produces
async fn run_ignored<F>(operation: &'static str, resource: &str, fut: F)
where
    F: Future<Output = std::result::Result<(), RuntimeError>>,
{
    if let Err(e) = fut.await {
        debug!(operation, resource = %resource, error = %e, "Ignoring runtime error");
        metrics::record_suppressed(operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::runtime::MockContainerRuntime;
    use crate::models::PublishedPort;
    use crate::ports::{ContainerPort, Protocol};
    use mockall::Sequence;
    use tokio_test::{assert_err, assert_ok};

    fn not_found() -> RuntimeError {
        RuntimeError::Stream("No such container: c1".to_string())
    }

    #[tokio::test]
    async fn test_build_tags_the_built_image() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_build_image()
            .times(1)
            .returning(|_| Ok("sha256:abc".to_string()));
        runtime
            .expect_tag_image()
            .times(1)
            .returning(|id, repo, tag| {
                assert_eq!((id, repo, tag), ("sha256:abc", "xxx", "latest"));
                Ok(())
            });

        let engine = Engine::with_runtime(runtime);
        let image = engine.build(Path::new("/ctx"), "xxx", "latest").await.unwrap();
        assert_eq!(image.to_string(), "xxx:latest");
    }

    #[tokio::test]
    async fn test_built_reference_removes_the_image() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_build_image()
            .returning(|_| Ok("sha256:abc".to_string()));
        runtime.expect_tag_image().returning(|_, _, _| Ok(()));
        runtime
            .expect_remove_image()
            .times(1)
            .returning(|image, force| {
                assert_eq!((image, force), ("xxx:latest", true));
                Ok(())
            });

        let engine = Engine::with_runtime(runtime);
        let image = engine.build(Path::new("/ctx"), "xxx", "latest").await.unwrap();
        engine.remove_image(&image.to_string()).await;
    }

    #[tokio::test]
    async fn test_build_stream_error_is_build_failed() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_build_image()
            .returning(|_| Err(RuntimeError::Stream("unknown instruction: FORM".into())));
        runtime.expect_tag_image().never();

        let engine = Engine::with_runtime(runtime);
        let err = engine.build(Path::new("/ctx"), "xxx", "latest").await.unwrap_err();
        assert!(matches!(err, EngineError::BuildFailed(_)));
        assert!(err.to_string().contains("unknown instruction: FORM"));
    }

    #[tokio::test]
    async fn test_pull_splits_reference() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_pull_image()
            .withf(|_, tag, auth| tag.as_deref() == Some("1.0.0.2x") && auth.is_none())
            .times(1)
            .returning(|repo, _, _| {
                assert_eq!(repo, "registry.my.com/somerepo");
                Ok(())
            });

        let engine = Engine::with_runtime(runtime);
        assert_ok!(engine.pull("registry.my.com/somerepo:1.0.0.2x", None).await);
    }

    #[tokio::test]
    async fn test_pull_uses_default_auth() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_pull_image()
            .withf(|_, tag, auth| {
                tag.is_none() && auth.as_ref().and_then(|a| a.username.as_deref()) == Some("me")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let engine = Engine::with_runtime(runtime).with_default_auth(AuthConfig {
            username: Some("me".into()),
            ..Default::default()
        });
        assert_ok!(engine.pull("alpine", None).await);
    }

    #[tokio::test]
    async fn test_pull_rejects_malformed_reference() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_pull_image().never();

        let engine = Engine::with_runtime(runtime);
        let err = engine.pull("", None).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedIdentifier(_)));
    }

    #[tokio::test]
    async fn test_push_failure_propagates() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_push_image()
            .withf(|_, tag, _| tag.as_deref() == Some("2.0"))
            .returning(|_, _, _| Err(RuntimeError::Stream("denied: requested access to the resource is denied".into())));

        let engine = Engine::with_runtime(runtime);
        let err = engine.push("registry.my.com:5000/app", "2.0", None).await.unwrap_err();
        assert!(matches!(err, EngineError::PushFailed(_)));
    }

    #[tokio::test]
    async fn test_start_builds_request_then_starts() {
        let mut seq = Sequence::new();
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_create_container()
            .withf(|req| {
                req.image == "xxx:latest"
                    && req.name == "web"
                    && req.cmd == Some(vec!["sleep".to_string(), "10s".to_string()])
                    && req.env == vec!["CC_NAME=Me".to_string()]
                    && req.port_bindings.get(&ContainerPort::tcp(7474)) == Some(17474)
                    && req.port_bindings.get(&ContainerPort::tcp(7575)) == Some(17575)
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("c1".to_string()));
        runtime
            .expect_start_container()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| {
                assert_eq!(id, "c1");
                Ok(())
            });

        let engine = Engine::with_runtime(runtime);
        let id = engine
            .start("xxx:latest", "web", "sleep   10s", &["CC_NAME=Me"], &[17474, 7474, 17575, 7575])
            .await
            .unwrap();
        assert_eq!(id, "c1");
    }

    #[tokio::test]
    async fn test_start_rejects_bad_ports_before_runtime_call() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_create_container().never();

        let engine = Engine::with_runtime(runtime);
        let err = engine.start("alpine", "x", "true", &[], &[1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidPortSpec(_)));
    }

    #[tokio::test]
    async fn test_start_with_empty_command_keeps_image_default() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_create_container()
            .withf(|req| req.cmd.is_none() && req.env.is_empty() && req.port_bindings.is_empty())
            .returning(|_| Ok("c1".to_string()));
        runtime.expect_start_container().returning(|_| Ok(()));

        let engine = Engine::with_runtime(runtime);
        assert_ok!(engine.start("alpine", "x", "   ", &[], &[]).await);
    }

    #[tokio::test]
    async fn test_start_with_configurator() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_create_container()
            .withf(|req| {
                req.image == "fedora:21x"
                    && req.cmd == Some(vec!["sleep".to_string(), "15s".to_string()])
                    && req.binds == vec!["/srv:/srv".to_string()]
                    && req.network_mode.as_deref() == Some("none")
            })
            .returning(|_| Ok("c2".to_string()));
        runtime.expect_start_container().returning(|_| Ok(()));

        let engine = Engine::with_runtime(runtime);
        let id = engine
            .start_with("fedora:21x", "snap", |req| {
                req.with_cmd(["sleep", "15s"])
                    .with_bind("/srv:/srv")
                    .with_network_mode("none");
            })
            .await
            .unwrap();
        assert_eq!(id, "c2");
    }

    #[tokio::test]
    async fn test_start_launch_rejected() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_create_container().returning(|_| Ok("c1".to_string()));
        runtime
            .expect_start_container()
            .returning(|_| Err(RuntimeError::Stream("port is already allocated".into())));
        runtime.expect_remove_container().never();

        let engine = Engine::with_runtime(runtime);
        let err = engine.start("alpine", "x", "", &[], &[80, 80]).await.unwrap_err();
        assert!(matches!(err, EngineError::StartFailed(_)));
    }

    #[tokio::test]
    async fn test_exec_sanitizes_output() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_create_exec()
            .withf(|_, req| *req == ExecRequest::captured(vec!["env".to_string()]))
            .returning(|id, _| {
                assert_eq!(id, "c1");
                Ok("e1".to_string())
            });
        runtime
            .expect_start_exec()
            .returning(|_| Ok(b"\x1b[0mPATH=/bin\r\nCC_NAME=Me\r\n\xff".to_vec()));

        let engine = Engine::with_runtime(runtime);
        let out = engine.exec("c1", &["env"]).await.unwrap();
        assert!(out.contains("CC_NAME=Me"));
        assert_eq!(out, "[0mPATH=/bin\r\nCC_NAME=Me\r\n");
    }

    #[tokio::test]
    async fn test_exec_on_stopped_container_fails() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_create_exec()
            .returning(|_, _| Err(RuntimeError::Stream("Container c1 is not running".into())));
        runtime.expect_start_exec().never();

        let engine = Engine::with_runtime(runtime);
        let err = engine.exec("c1", &["env"]).await.unwrap_err();
        assert!(matches!(err, EngineError::ExecFailed(_)));
    }

    #[tokio::test]
    async fn test_exec_empty_command() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_create_exec().never();

        let engine = Engine::with_runtime(runtime);
        assert_err!(engine.exec("c1", &[]).await);
    }

    #[tokio::test]
    async fn test_stop_and_remove_are_idempotent() {
        let mut runtime = MockContainerRuntime::new();
        let mut stops = 0;
        runtime.expect_stop_container().times(2).returning(move |_| {
            stops += 1;
            if stops == 1 {
                Ok(())
            } else {
                Err(RuntimeError::Stream("container already stopped".into()))
            }
        });
        runtime.expect_wait_container().times(1).returning(|_| Ok(()));
        let mut removes = 0;
        runtime.expect_remove_container().times(2).returning(move |_| {
            removes += 1;
            if removes == 1 {
                Ok(())
            } else {
                Err(not_found())
            }
        });

        let engine = Engine::with_runtime(runtime);
        engine.stop("c1").await;
        engine.stop("c1").await;
        engine.remove("c1").await;
        engine.remove("c1").await;
    }

    #[tokio::test]
    async fn test_remove_image_is_forced_and_best_effort() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_remove_image()
            .withf(|_, force| *force)
            .times(1)
            .returning(|_, _| Err(RuntimeError::Stream("image is being used".into())));

        let engine = Engine::with_runtime(runtime);
        engine.remove_image("sha256:abc").await;
    }

    #[tokio::test]
    async fn test_commit_returns_image_id() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_commit_container()
            .returning(|id, repo, tag| {
                assert_eq!((id, repo, tag), ("c1", "fedora", "21x"));
                Ok("sha256:new".to_string())
            });

        let engine = Engine::with_runtime(runtime);
        assert_eq!(engine.commit("c1", "fedora", "21x").await.unwrap(), "sha256:new");
    }

    #[tokio::test]
    async fn test_commit_failure() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_commit_container()
            .returning(|_, _, _| Err(not_found()));

        let engine = Engine::with_runtime(runtime);
        let err = engine.commit("c1", "fedora", "21x").await.unwrap_err();
        assert!(matches!(err, EngineError::CommitFailed(_)));
    }

    #[tokio::test]
    async fn test_list_active_keys_by_id() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_list_containers()
            .withf(|all| !*all)
            .returning(|_| {
                Ok(vec![ContainerDescriptor {
                    id: "c1".into(),
                    names: vec!["/web".into()],
                    image: "xxx:latest".into(),
                    state: Some("running".into()),
                    status: None,
                    created_at: None,
                    ports: vec![PublishedPort {
                        private_port: 7474,
                        public_port: Some(17474),
                        protocol: Protocol::Tcp,
                        ip: None,
                    }],
                }])
            });

        let engine = Engine::with_runtime(runtime);
        let active = engine.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active["c1"].image, "xxx:latest");
    }

    #[tokio::test]
    async fn test_list_active_failure_is_not_empty_map() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_list_containers()
            .returning(|_| Err(RuntimeError::Stream("daemon unavailable".into())));

        let engine = Engine::with_runtime(runtime);
        let err = engine.list_active().await.unwrap_err();
        assert!(matches!(err, EngineError::ListFailed(_)));
    }
}
