//! The container runtime seam
//!
//! Everything the engine sends to the runtime goes through [`ContainerRuntime`].
//! [`super::DockerRuntime`] is the production implementation; tests drive the
//! engine through the generated `MockContainerRuntime`.

use std::path::Path;

use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::models::{AuthConfig, ContainerDescriptor, CreateRequest, ExecRequest};

/// Calls the engine makes against a container runtime.
///
/// Every method resolves only once the runtime reports the operation complete.
/// Streaming operations (build, pull, push, exec output) are drained to the end
/// before returning.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    // Images
    /// Build an image from a directory containing a `Dockerfile`, returning its id
    async fn build_image(&self, context_dir: &Path) -> Result<String, RuntimeError>;
    async fn tag_image(&self, image_id: &str, repository: &str, tag: &str) -> Result<(), RuntimeError>;
    /// Pull `repository`; without a tag the runtime default applies
    async fn pull_image(
        &self,
        repository: &str,
        tag: Option<String>,
        credentials: Option<AuthConfig>,
    ) -> Result<(), RuntimeError>;
    async fn push_image(
        &self,
        repository: &str,
        tag: Option<String>,
        credentials: Option<AuthConfig>,
    ) -> Result<(), RuntimeError>;
    async fn remove_image(&self, image: &str, force: bool) -> Result<(), RuntimeError>;

    // Containers
    /// Create a container, returning its id
    async fn create_container(&self, request: CreateRequest) -> Result<String, RuntimeError>;
    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;
    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;
    /// Wait until the container is no longer running
    async fn wait_container(&self, id: &str) -> Result<(), RuntimeError>;
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;
    /// Snapshot a container as `repository:tag`, returning the new image id
    async fn commit_container(&self, id: &str, repository: &str, tag: &str) -> Result<String, RuntimeError>;
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerDescriptor>, RuntimeError>;

    // Exec
    /// Register an exec session in a running container, returning the session id
    async fn create_exec(&self, id: &str, request: ExecRequest) -> Result<String, RuntimeError>;
    /// Run an exec session attached and collect every output frame in arrival order
    async fn start_exec(&self, exec_id: &str) -> Result<Vec<u8>, RuntimeError>;
}
