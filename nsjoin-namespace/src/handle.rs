//! Open references to a process's namespace files

use nsjoin_core::{Error, NamespaceKind, Result, TargetPid};
use std::fs::{self, File};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};

/// Location of the proc filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ROOT)
    }
}

impl ProcFs {
    /// Where procfs is normally mounted
    pub const DEFAULT_ROOT: &'static str = "/proc";

    /// Use a proc filesystem mounted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Mount point of this proc filesystem
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `kind`'s namespace file for `pid`, e.g. `/proc/4242/ns/net`
    #[must_use]
    pub fn namespace_path(&self, pid: TargetPid, kind: NamespaceKind) -> PathBuf {
        self.root
            .join(pid.as_raw().to_string())
            .join("ns")
            .join(kind.proc_name())
    }
}

/// An open namespace file of the target process
///
/// The descriptor is closed when the handle is dropped. It is opened with
/// `O_CLOEXEC`, so a launched command never inherits it.
#[derive(Debug)]
pub struct NamespaceHandle {
    kind: NamespaceKind,
    path: PathBuf,
    identity: Option<String>,
    file: File,
}

impl NamespaceHandle {
    /// Open `kind`'s namespace file for `pid`
    ///
    /// # Errors
    /// Returns [`Error::NamespaceOpen`] if the file cannot be opened, which
    /// usually means the process is gone or we may not inspect it.
    pub fn open(procfs: &ProcFs, pid: TargetPid, kind: NamespaceKind) -> Result<Self> {
        let path = procfs.namespace_path(pid, kind);

        let file = File::open(&path).map_err(|source| {
            tracing::debug!(
                pid = %pid,
                kind = %kind,
                path = %path.display(),
                error = %source,
                "Failed to open namespace file"
            );
            Error::NamespaceOpen {
                kind,
                path: path.clone(),
                source,
            }
        })?;

        // Namespace files are magic symlinks reading as "net:[4026531905]"
        let identity = fs::read_link(&path)
            .ok()
            .map(|p| p.to_string_lossy().into_owned());

        tracing::debug!(
            pid = %pid,
            kind = %kind,
            identity = identity.as_deref().unwrap_or("unknown"),
            "Opened namespace file"
        );

        Ok(Self {
            kind,
            path,
            identity,
            file,
        })
    }

    /// Namespace kind this handle refers to
    #[must_use]
    pub const fn kind(&self) -> NamespaceKind {
        self.kind
    }

    /// Path the handle was opened from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Namespace identity as reported by the kernel, when readable
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }
}

impl AsFd for NamespaceHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}
