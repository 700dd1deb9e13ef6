//! Core type definitions with strong typing and validation

use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Process whose namespaces are joined
///
/// Resolved once per invocation; every namespace kind is looked up under the
/// same ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "i32", into = "i32")]
pub struct TargetPid(i32);

impl TargetPid {
    /// Create a `TargetPid` with validation
    ///
    /// # Errors
    /// Returns error if the PID is zero or negative
    pub fn new(pid: i32) -> Result<Self> {
        if pid <= 0 {
            return Err(Error::InvalidConfig {
                message: format!("Target PID must be positive, got {pid}"),
            });
        }
        Ok(Self(pid))
    }

    /// Convert to `nix::unistd::Pid`
    #[must_use]
    pub const fn as_nix_pid(self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.0)
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for TargetPid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TargetPid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim().parse::<i32>().map_err(|e| Error::InvalidConfig {
            message: format!("Invalid target PID {s:?}: {e}"),
        })?;
        Self::new(raw)
    }
}

impl TryFrom<i32> for TargetPid {
    type Error = Error;

    fn try_from(pid: i32) -> Result<Self> {
        Self::new(pid)
    }
}

impl From<TargetPid> for i32 {
    fn from(pid: TargetPid) -> Self {
        pid.0
    }
}

/// Kernel namespace kinds nsjoin knows how to bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NamespaceKind {
    /// Mount namespace
    #[serde(rename = "mnt")]
    Mount,
    /// UTS namespace (hostname)
    #[serde(rename = "uts")]
    Uts,
    /// Network namespace
    #[serde(rename = "net")]
    Network,
    /// IPC namespace
    #[serde(rename = "ipc")]
    Ipc,
    /// PID namespace
    #[serde(rename = "pid")]
    Pid,
    /// User namespace
    #[serde(rename = "user")]
    User,
}

impl NamespaceKind {
    /// Every supported kind
    pub const ALL: [Self; 6] = [
        Self::Mount,
        Self::Uts,
        Self::Network,
        Self::Ipc,
        Self::Pid,
        Self::User,
    ];

    /// File name under `/proc/<pid>/ns`
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Mount => "mnt",
            Self::Uts => "uts",
            Self::Network => "net",
            Self::Ipc => "ipc",
            Self::Pid => "pid",
            Self::User => "user",
        }
    }

    /// Flag passed to setns(2) so the kernel checks the descriptor type
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Mount => CloneFlags::CLONE_NEWNS,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Network => CloneFlags::CLONE_NEWNET,
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::User => CloneFlags::CLONE_NEWUSER,
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proc_name())
    }
}

impl FromStr for NamespaceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mnt" | "mount" => Ok(Self::Mount),
            "uts" => Ok(Self::Uts),
            "net" | "network" => Ok(Self::Network),
            "ipc" => Ok(Self::Ipc),
            "pid" => Ok(Self::Pid),
            "user" => Ok(Self::User),
            _ => Err(Error::UnsupportedNamespaceKind {
                name: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_pid_validation() {
        assert!(TargetPid::new(4242).is_ok());
        assert!(TargetPid::new(0).is_err());
        assert!(TargetPid::new(-1).is_err());
        assert!("abc".parse::<TargetPid>().is_err());
        assert_eq!("  17 ".parse::<TargetPid>().unwrap().as_raw(), 17);
    }

    #[test]
    fn test_target_pid_serde() {
        let pid = TargetPid::new(4242).unwrap();
        let json = serde_json::to_string(&pid).unwrap();
        assert_eq!(json, "4242");

        let back: TargetPid = serde_json::from_str(&json).unwrap();
        assert_eq!(pid, back);
        assert!(serde_json::from_str::<TargetPid>("-3").is_err());
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in NamespaceKind::ALL {
            assert_eq!(kind.proc_name().parse::<NamespaceKind>().unwrap(), kind);
        }
        assert_eq!("mount".parse::<NamespaceKind>().unwrap(), NamespaceKind::Mount);
        assert_eq!("NETWORK".parse::<NamespaceKind>().unwrap(), NamespaceKind::Network);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = "cgroup".parse::<NamespaceKind>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedNamespaceKind { ref name } if name == "cgroup"));
    }

    #[test]
    fn test_clone_flags() {
        assert_eq!(NamespaceKind::Mount.clone_flag(), CloneFlags::CLONE_NEWNS);
        assert_eq!(NamespaceKind::Pid.clone_flag(), CloneFlags::CLONE_NEWPID);
        assert_eq!(
            serde_json::to_string(&NamespaceKind::Network).unwrap(),
            "\"net\""
        );
    }
}
