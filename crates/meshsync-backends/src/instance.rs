//! Scheduler instance model and the rules that turn an instance into
//! backends.

use serde::{Deserialize, Serialize};

use meshsync_state::{Backend, SchedulerProcessId};

/// Container port the scheduler reserves for SSH access to instances.
pub const DEFAULT_SSH_PORT: u16 = 2222;

// ── Instance ───────────────────────────────────────────────────────

/// Lifecycle state reported by the scheduler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Unclaimed,
    Claimed,
    Running,
    Crashed,
}

/// One (container port, host port) pair exposed by an instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

impl PortMapping {
    pub fn new(container_port: u16, host_port: u16) -> Self {
        Self {
            container_port,
            host_port,
        }
    }
}

/// A workload instance as reported by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instance {
    /// Scheduler process this instance belongs to.
    pub process_id: SchedulerProcessId,
    #[serde(default)]
    pub index: u32,
    pub state: InstanceState,
    /// Set on the copy of an instance that is being moved off a draining
    /// host while its replacement starts.
    #[serde(default)]
    pub evacuating: bool,
    /// Host address, reachable from outside the mesh.
    pub address: String,
    /// Address of the instance itself, reachable by sidecars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_address: Option<String>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
}

impl Instance {
    pub fn running(process_id: impl Into<SchedulerProcessId>, address: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            index: 0,
            state: InstanceState::Running,
            evacuating: false,
            address: address.into(),
            instance_address: None,
            ports: Vec::new(),
        }
    }

    pub fn with_port(mut self, container_port: u16, host_port: u16) -> Self {
        self.ports.push(PortMapping::new(container_port, host_port));
        self
    }

    pub fn with_instance_address(mut self, address: impl Into<String>) -> Self {
        self.instance_address = Some(address.into());
        self
    }

    pub fn with_state(mut self, state: InstanceState) -> Self {
        self.state = state;
        self
    }

    pub fn evacuating(mut self) -> Self {
        self.evacuating = true;
        self
    }

    /// Whether this instance may serve traffic at all.
    pub fn is_routable(&self) -> bool {
        self.state == InstanceState::Running && !self.evacuating
    }

    /// The first port mapping whose container side is not the SSH port.
    pub fn app_port(&self, ssh_port: u16) -> Option<PortMapping> {
        self.ports
            .iter()
            .copied()
            .find(|p| p.container_port != ssh_port)
    }

    /// Externally reachable backend: host address and host port.
    ///
    /// `None` when the instance is not routable or exposes no app port.
    pub fn external_backend(&self, ssh_port: u16) -> Option<Backend> {
        self.is_routable()
            .then(|| self.external_endpoint(ssh_port))
            .flatten()
    }

    /// Sidecar-direct backend: instance address and container port.
    pub fn internal_backend(&self, ssh_port: u16) -> Option<Backend> {
        self.is_routable()
            .then(|| self.internal_endpoint(ssh_port))
            .flatten()
    }

    /// The external tuple this instance occupies, whatever its state.
    pub fn external_endpoint(&self, ssh_port: u16) -> Option<Backend> {
        let port = self.app_port(ssh_port)?;
        if port.host_port == 0 {
            return None;
        }
        Some(Backend::new(
            self.address.clone(),
            port.host_port,
            port.container_port,
        ))
    }

    /// The internal tuple this instance occupies, whatever its state.
    pub fn internal_endpoint(&self, ssh_port: u16) -> Option<Backend> {
        let address = self.instance_address.as_ref()?;
        let port = self.app_port(ssh_port)?;
        if port.container_port == 0 {
            return None;
        }
        Some(Backend::new(
            address.clone(),
            port.container_port,
            port.container_port,
        ))
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// A change notice from the scheduler's live event feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstanceEvent {
    Created { instance: Instance },
    Changed { before: Instance, after: Instance },
    Removed { instance: Instance },
}

impl InstanceEvent {
    /// Scheduler process the event concerns.
    pub fn process_id(&self) -> &str {
        match self {
            InstanceEvent::Created { instance } | InstanceEvent::Removed { instance } => {
                &instance.process_id
            }
            InstanceEvent::Changed { after, .. } => &after.process_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_port_skips_ssh() {
        let inst = Instance::running("s1", "10.0.0.1")
            .with_port(2222, 61002)
            .with_port(8080, 61001);
        assert_eq!(inst.app_port(DEFAULT_SSH_PORT), Some(PortMapping::new(8080, 61001)));

        let ssh_only = Instance::running("s1", "10.0.0.1").with_port(2222, 61002);
        assert_eq!(ssh_only.app_port(DEFAULT_SSH_PORT), None);
        assert_eq!(ssh_only.external_backend(DEFAULT_SSH_PORT), None);
    }

    #[test]
    fn app_port_takes_first_non_ssh() {
        let inst = Instance::running("s1", "10.0.0.1")
            .with_port(8080, 61001)
            .with_port(9090, 61003);
        assert_eq!(inst.app_port(DEFAULT_SSH_PORT).unwrap().container_port, 8080);
    }

    #[test]
    fn non_running_and_evacuating_are_not_routable() {
        let base = Instance::running("s1", "10.0.0.1").with_port(8080, 61001);
        assert!(base.external_backend(DEFAULT_SSH_PORT).is_some());

        let claimed = base.clone().with_state(InstanceState::Claimed);
        assert!(claimed.external_backend(DEFAULT_SSH_PORT).is_none());

        let evacuating = base.evacuating();
        assert!(evacuating.external_backend(DEFAULT_SSH_PORT).is_none());
    }

    #[test]
    fn internal_backend_uses_instance_address_and_container_port() {
        let inst = Instance::running("s1", "10.0.0.1")
            .with_instance_address("10.255.0.7")
            .with_port(8080, 61001);
        assert_eq!(
            inst.internal_backend(DEFAULT_SSH_PORT),
            Some(Backend::new("10.255.0.7", 8080, 8080))
        );

        let no_instance_addr = Instance::running("s1", "10.0.0.1").with_port(8080, 61001);
        assert_eq!(no_instance_addr.internal_backend(DEFAULT_SSH_PORT), None);
    }

    #[test]
    fn event_wire_format() {
        let json = r#"{
            "type": "created",
            "instance": {
                "process_id": "s1",
                "state": "running",
                "address": "10.0.0.1",
                "ports": [{"container_port": 8080, "host_port": 61001}]
            }
        }"#;
        let event: InstanceEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.process_id(), "s1");
        match event {
            InstanceEvent::Created { instance } => {
                assert!(!instance.evacuating);
                assert_eq!(instance.ports, vec![PortMapping::new(8080, 61001)]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
