//! Namespace backend trait for pluggable implementations

use nix::errno::Errno;
use nix::sched::{setns, unshare, CloneFlags};
use nsjoin_core::{Error, NamespaceKind, Result, TargetPid};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::handle::{NamespaceHandle, ProcFs};

/// The three kernel operations a namespace join is made of
///
/// This allows for different implementations:
/// - [`KernelBackend`] - open(2), unshare(2) and setns(2) against procfs
/// - [`RecordingBackend`] - Testing without privileges
///
/// Handles are released by dropping them.
pub trait NamespaceBackend {
    /// Open reference to one namespace
    type Handle: std::fmt::Debug;

    /// Open the namespace file for `kind` of `pid`
    ///
    /// # Errors
    /// Returns [`Error::NamespaceOpen`] if the namespace cannot be opened
    fn open(&self, pid: TargetPid, kind: NamespaceKind) -> Result<Self::Handle>;

    /// Move the calling thread into a private copy of its mount namespace
    ///
    /// # Errors
    /// Returns the errno of unshare(2)
    fn detach_mount(&self) -> nix::Result<()>;

    /// Make the calling thread a member of the namespace behind `handle`
    ///
    /// # Errors
    /// Returns the errno of setns(2)
    fn bind(&self, kind: NamespaceKind, handle: &Self::Handle) -> nix::Result<()>;
}

/// Backend issuing the real system calls
#[derive(Debug, Clone, Default)]
pub struct KernelBackend {
    procfs: ProcFs,
}

impl KernelBackend {
    /// Create a backend reading namespace files from `procfs`
    #[must_use]
    pub const fn new(procfs: ProcFs) -> Self {
        Self { procfs }
    }

    /// Proc filesystem in use
    #[must_use]
    pub const fn procfs(&self) -> &ProcFs {
        &self.procfs
    }
}

impl NamespaceBackend for KernelBackend {
    type Handle = NamespaceHandle;

    fn open(&self, pid: TargetPid, kind: NamespaceKind) -> Result<NamespaceHandle> {
        NamespaceHandle::open(&self.procfs, pid, kind)
    }

    fn detach_mount(&self) -> nix::Result<()> {
        unshare(CloneFlags::CLONE_NEWNS)
    }

    fn bind(&self, kind: NamespaceKind, handle: &NamespaceHandle) -> nix::Result<()> {
        setns(handle, kind.clone_flag())
    }
}

/// One operation observed by a [`RecordingBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendCall {
    /// A namespace file was opened
    Open(NamespaceKind),
    /// Our own mount namespace was detached
    DetachMount,
    /// The calling thread was bound to a namespace
    Bind(NamespaceKind),
    /// A handle was dropped
    Release(NamespaceKind),
}

/// Backend that records calls instead of touching the kernel
///
/// # Example
/// ```
/// use nsjoin_core::{NamespaceKind, TargetPid};
/// use nsjoin_namespace::{BackendCall, NamespaceBackend, RecordingBackend};
///
/// let backend = RecordingBackend::new();
/// let pid = TargetPid::new(4242).unwrap();
///
/// let handle = backend.open(pid, NamespaceKind::Uts).unwrap();
/// backend.bind(NamespaceKind::Uts, &handle).unwrap();
/// drop(handle);
///
/// assert_eq!(
///     backend.calls(),
///     vec![
///         BackendCall::Open(NamespaceKind::Uts),
///         BackendCall::Bind(NamespaceKind::Uts),
///         BackendCall::Release(NamespaceKind::Uts),
///     ]
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    state: Rc<RefCell<RecordingState>>,
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<BackendCall>,
    failing_open: HashSet<NamespaceKind>,
    failing_bind: HashSet<NamespaceKind>,
    failing_detach: bool,
}

/// Handle produced by a [`RecordingBackend`]
#[derive(Debug)]
pub struct RecordedHandle {
    kind: NamespaceKind,
    pid: TargetPid,
    state: Rc<RefCell<RecordingState>>,
}

impl RecordedHandle {
    /// Namespace kind this handle refers to
    #[must_use]
    pub const fn kind(&self) -> NamespaceKind {
        self.kind
    }

    /// Process the handle was opened for
    #[must_use]
    pub const fn pid(&self) -> TargetPid {
        self.pid
    }
}

impl Drop for RecordedHandle {
    fn drop(&mut self) {
        self.state
            .borrow_mut()
            .calls
            .push(BackendCall::Release(self.kind));
    }
}

impl RecordingBackend {
    /// Create a backend where every call succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make opening `kind` fail as if the process did not exist
    #[must_use]
    pub fn failing_open(self, kind: NamespaceKind) -> Self {
        self.state.borrow_mut().failing_open.insert(kind);
        self
    }

    /// Make binding `kind` fail with `EPERM`
    #[must_use]
    pub fn failing_bind(self, kind: NamespaceKind) -> Self {
        self.state.borrow_mut().failing_bind.insert(kind);
        self
    }

    /// Make the mount detach fail with `EPERM`
    #[must_use]
    pub fn failing_detach(self) -> Self {
        self.state.borrow_mut().failing_detach = true;
        self
    }

    /// Calls observed so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.borrow().calls.clone()
    }

    /// Position of the first occurrence of `call`
    #[must_use]
    pub fn position(&self, call: BackendCall) -> Option<usize> {
        self.state.borrow().calls.iter().position(|c| *c == call)
    }

    /// Kinds bound so far, in order
    #[must_use]
    pub fn bound(&self) -> Vec<NamespaceKind> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Bind(kind) => Some(*kind),
                _ => None,
            })
            .collect()
    }
}

impl NamespaceBackend for RecordingBackend {
    type Handle = RecordedHandle;

    fn open(&self, pid: TargetPid, kind: NamespaceKind) -> Result<RecordedHandle> {
        let mut state = self.state.borrow_mut();
        state.calls.push(BackendCall::Open(kind));

        if state.failing_open.contains(&kind) {
            return Err(Error::NamespaceOpen {
                kind,
                path: ProcFs::default().namespace_path(pid, kind),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        Ok(RecordedHandle {
            kind,
            pid,
            state: Rc::clone(&self.state),
        })
    }

    fn detach_mount(&self) -> nix::Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(BackendCall::DetachMount);

        if state.failing_detach {
            return Err(Errno::EPERM);
        }
        Ok(())
    }

    fn bind(&self, kind: NamespaceKind, _handle: &RecordedHandle) -> nix::Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(BackendCall::Bind(kind));

        if state.failing_bind.contains(&kind) {
            return Err(Errno::EPERM);
        }
        Ok(())
    }
}
