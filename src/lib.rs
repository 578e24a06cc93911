//! Dockhand library
//!
//! A small facade over the Docker Engine API for driving single containers:
//! build an image, start a container with ports and environment, run commands
//! in it, commit it, and tear everything down again.
//!
//! ```no_run
//! # async fn example() -> dockhand::error::Result<()> {
//! use dockhand::Engine;
//!
//! let engine = Engine::connect_local()?;
//! let id = engine
//!     .start("alpine:3.18", "demo", "sleep 30", &["CC_NAME=Me"], &[18080, 80])
//!     .await?;
//! let env = engine.exec(&id, &["env"]).await?;
//! assert!(env.contains("CC_NAME=Me"));
//!
//! engine.stop(&id).await;
//! engine.remove(&id).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod identifier;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod sanitize;

pub use crate::config::EngineConfig;
pub use crate::container::{ContainerRuntime, DockerRuntime, Engine};
pub use crate::error::{EngineError, RuntimeError};
pub use crate::identifier::ImageIdentifier;
pub use crate::models::{AuthConfig, ContainerDescriptor, CreateRequest};
pub use crate::ports::{to_bindings, PortBindingSet};
pub use crate::sanitize::sanitize;
