//! Container management module
//!
//! Handles all interactions with the container runtime:
//! - Building, pulling, pushing and removing images
//! - Creating, starting, stopping and removing containers
//! - Executing commands inside running containers
//! - Committing containers to new images

mod docker;
mod engine;
pub mod runtime;

pub use docker::DockerRuntime;
pub use engine::Engine;
pub use runtime::ContainerRuntime;
