//! Which namespaces of which process to join

use nsjoin_core::{Error, NamespaceKind, Result, TargetPid};
use serde::{Deserialize, Serialize};

use crate::plan::Advisory;

/// Namespaces to join and the process they belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRequest {
    /// Process whose namespaces are joined
    pub target: TargetPid,

    /// Join the mount namespace
    pub mount: bool,

    /// Join the UTS namespace (hostname)
    pub uts: bool,

    /// Join the network namespace
    pub network: bool,

    /// Join the IPC namespace
    pub ipc: bool,

    /// Join the PID namespace
    pub pid: bool,
}

impl NamespaceRequest {
    /// Kinds joined before the mount namespace, in join order
    pub const SIMPLE_KINDS: [NamespaceKind; 3] =
        [NamespaceKind::Uts, NamespaceKind::Network, NamespaceKind::Ipc];

    /// Create an empty request for `target`
    #[must_use]
    pub const fn new(target: TargetPid) -> Self {
        Self {
            target,
            mount: false,
            uts: false,
            network: false,
            ipc: false,
            pid: false,
        }
    }

    /// Join the mount namespace
    #[must_use]
    pub const fn with_mount(mut self, enable: bool) -> Self {
        self.mount = enable;
        self
    }

    /// Join the UTS namespace
    #[must_use]
    pub const fn with_uts(mut self, enable: bool) -> Self {
        self.uts = enable;
        self
    }

    /// Join the network namespace
    #[must_use]
    pub const fn with_network(mut self, enable: bool) -> Self {
        self.network = enable;
        self
    }

    /// Join the IPC namespace
    #[must_use]
    pub const fn with_ipc(mut self, enable: bool) -> Self {
        self.ipc = enable;
        self
    }

    /// Join the PID namespace
    #[must_use]
    pub const fn with_pid(mut self, enable: bool) -> Self {
        self.pid = enable;
        self
    }

    /// Add `kind` to the request
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedNamespaceKind`] for the user namespace,
    /// which has no place in the join order.
    pub fn insert(&mut self, kind: NamespaceKind) -> Result<()> {
        match kind {
            NamespaceKind::Mount => self.mount = true,
            NamespaceKind::Uts => self.uts = true,
            NamespaceKind::Network => self.network = true,
            NamespaceKind::Ipc => self.ipc = true,
            NamespaceKind::Pid => self.pid = true,
            NamespaceKind::User => {
                return Err(Error::UnsupportedNamespaceKind {
                    name: kind.proc_name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Add a kind given by name, e.g. `net` or `network`
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedNamespaceKind`] for unknown names
    pub fn insert_named(&mut self, name: &str) -> Result<()> {
        self.insert(name.parse()?)
    }

    /// Check if `kind` is requested
    #[must_use]
    pub const fn contains(&self, kind: NamespaceKind) -> bool {
        match kind {
            NamespaceKind::Mount => self.mount,
            NamespaceKind::Uts => self.uts,
            NamespaceKind::Network => self.network,
            NamespaceKind::Ipc => self.ipc,
            NamespaceKind::Pid => self.pid,
            NamespaceKind::User => false,
        }
    }

    /// Check if any namespace is requested
    #[must_use]
    pub const fn has_any(&self) -> bool {
        self.mount || self.uts || self.network || self.ipc || self.pid
    }

    /// Requested kinds in the order they are bound
    #[must_use]
    pub fn join_order(&self) -> Vec<NamespaceKind> {
        Self::SIMPLE_KINDS
            .into_iter()
            .chain([NamespaceKind::Mount, NamespaceKind::Pid])
            .filter(|kind| self.contains(*kind))
            .collect()
    }

    /// Warnings about this combination of namespaces
    #[must_use]
    pub fn advisories(&self) -> Vec<Advisory> {
        let mut advisories = Vec::new();
        if self.pid && !self.mount {
            advisories.push(Advisory::PidWithoutMount);
        }
        advisories
    }

    /// Check the request is worth running
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if no namespace is requested
    pub fn validate(&self) -> Result<()> {
        if !self.has_any() {
            return Err(Error::InvalidConfig {
                message: "No namespace selected, pass at least one of --mount, --uts, --net, --ipc, --pid"
                    .to_string(),
            });
        }
        Ok(())
    }
}
