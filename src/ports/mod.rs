//! Host/container port binding translation
//!
//! Callers describe bindings as a flat `[host, container, host, container, ...]`
//! list. This module turns that into the keyed structure the runtime expects.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bollard::models::PortBinding;
use serde::Serialize;

use crate::error::{EngineError, Result};

/// Transport protocol of a container port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Sctp => "sctp",
        }
    }
}

/// A container-side port, e.g. `7474/tcp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ContainerPort {
    pub port: u16,
    pub protocol: Protocol,
}

impl ContainerPort {
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }
}

impl fmt::Display for ContainerPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol.as_str())
    }
}

/// Container port to host port mapping for one container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortBindingSet {
    bindings: BTreeMap<ContainerPort, u16>,
}

impl PortBindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a container port to a host port, replacing any earlier binding
    pub fn bind(&mut self, container: ContainerPort, host_port: u16) {
        self.bindings.insert(container, host_port);
    }

    pub fn get(&self, container: &ContainerPort) -> Option<u16> {
        self.bindings.get(container).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ContainerPort, &u16)> {
        self.bindings.iter()
    }

    /// Host config form: `"7474/tcp" -> [{ HostPort: "17474" }]`
    pub fn to_port_bindings(&self) -> HashMap<String, Option<Vec<PortBinding>>> {
        self.bindings
            .iter()
            .map(|(container, host)| {
                let binding = PortBinding {
                    host_ip: None,
                    host_port: Some(host.to_string()),
                };
                (container.to_string(), Some(vec![binding]))
            })
            .collect()
    }

    /// Exposed-ports form the create request needs alongside the bindings
    pub fn to_exposed_ports(&self) -> HashMap<String, HashMap<(), ()>> {
        self.bindings
            .keys()
            .map(|container| (container.to_string(), HashMap::new()))
            .collect()
    }
}

/// Translate flat `(host, container)` pairs into a binding set.
///
/// A container port that appears twice keeps the host port of its last pair.
pub fn to_bindings(pairs: &[u32]) -> Result<PortBindingSet> {
    if pairs.len() % 2 != 0 {
        return Err(EngineError::InvalidPortSpec(format!(
            "expected (host, container) pairs, got {} values",
            pairs.len()
        )));
    }

    let mut set = PortBindingSet::new();
    for pair in pairs.chunks_exact(2) {
        let host = checked_port(pair[0])?;
        let container = checked_port(pair[1])?;
        set.bind(ContainerPort::tcp(container), host);
    }

    Ok(set)
}

fn checked_port(value: u32) -> Result<u16> {
    match u16::try_from(value) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(EngineError::InvalidPortSpec(format!(
            "port {} is outside 1-65535",
            value
        ))),
    }
}
