//! Data models for the engine
//!
//! Request and descriptor types exchanged between the engine and the container
//! runtime. They are plain values, built and dropped within a single call.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::{PortBindingSet, Protocol};

// ============================================================================
// Container Creation
// ============================================================================

/// Request to create a container.
///
/// `Engine::start_with` hands a mutable reference to a caller closure before
/// submitting it, so anything beyond command/env/ports goes through here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateRequest {
    /// Image reference to create the container from
    pub image: String,

    /// Container name
    pub name: String,

    /// Command argv; `None` keeps the image default
    pub cmd: Option<Vec<String>>,

    /// `NAME=VALUE` entries, passed through as given
    pub env: Vec<String>,

    /// Published ports
    pub port_bindings: PortBindingSet,

    /// Volume binds (`host:container[:opts]`)
    pub binds: Vec<String>,

    /// Network mode or network name
    pub network_mode: Option<String>,

    /// Memory limit in bytes
    pub memory_bytes: Option<i64>,

    /// CPU limit in units of 1e-9 CPUs
    pub nano_cpus: Option<i64>,

    /// Container labels
    pub labels: HashMap<String, String>,

    /// Working directory inside the container
    pub working_dir: Option<String>,

    /// User to run as
    pub user: Option<String>,

    /// Allocate a TTY
    pub tty: bool,
}

impl CreateRequest {
    pub fn new(image: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_cmd<I, S>(&mut self, cmd: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_env<I, S>(&mut self, env: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env.extend(env.into_iter().map(Into::into));
        self
    }

    pub fn with_port_bindings(&mut self, bindings: PortBindingSet) -> &mut Self {
        self.port_bindings = bindings;
        self
    }

    pub fn with_bind(&mut self, bind: impl Into<String>) -> &mut Self {
        self.binds.push(bind.into());
        self
    }

    pub fn with_network_mode(&mut self, mode: impl Into<String>) -> &mut Self {
        self.network_mode = Some(mode.into());
        self
    }

    pub fn with_memory_mb(&mut self, mb: u64) -> &mut Self {
        let bytes = mb.saturating_mul(1024 * 1024);
        self.memory_bytes = Some(i64::try_from(bytes).unwrap_or(i64::MAX));
        self
    }

    pub fn with_cpus(&mut self, cpus: f64) -> &mut Self {
        self.nano_cpus = Some((cpus * 1e9) as i64);
        self
    }

    pub fn with_label(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(&mut self, dir: impl Into<String>) -> &mut Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_user(&mut self, user: impl Into<String>) -> &mut Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_tty(&mut self, tty: bool) -> &mut Self {
        self.tty = tty;
        self
    }
}

// ============================================================================
// Exec Models
// ============================================================================

/// Parameters for an exec session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub cmd: Vec<String>,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
}

impl ExecRequest {
    /// Attached to both output streams with a TTY, the way `exec` captures output
    pub fn captured(cmd: Vec<String>) -> Self {
        Self {
            cmd,
            attach_stdout: true,
            attach_stderr: true,
            tty: true,
        }
    }
}

// ============================================================================
// Container Listing
// ============================================================================

/// A running container as reported by the runtime
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerDescriptor {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub state: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub ports: Vec<PublishedPort>,
}

impl ContainerDescriptor {
    /// The published port for a container-side port, if any
    pub fn port(&self, private_port: u16) -> Option<&PublishedPort> {
        self.ports.iter().find(|p| p.private_port == private_port)
    }

    /// Whether any of the names matches, ignoring the runtime's leading `/`
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.trim_start_matches('/') == name)
    }
}

/// One port entry of a listed container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedPort {
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub protocol: Protocol,
    pub ip: Option<String>,
}

// ============================================================================
// Registry Models
// ============================================================================

/// Registry credentials for pull and push
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Registry address, e.g. `registry.my.com:5000`
    #[serde(default)]
    pub server_address: Option<String>,

    #[serde(default)]
    pub identity_token: Option<String>,
}
