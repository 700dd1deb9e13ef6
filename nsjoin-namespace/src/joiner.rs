//! Joining one namespace of one process

use nsjoin_core::{Error, NamespaceKind, Result, TargetPid};

use crate::backend::NamespaceBackend;

/// Joins the calling thread to single namespaces of a target process
#[derive(Debug)]
pub struct NamespaceJoiner<B> {
    backend: B,
}

impl<B: NamespaceBackend> NamespaceJoiner<B> {
    /// Create a joiner on top of `backend`
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Get the backend
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Join `kind` of `pid`
    ///
    /// Opens the namespace file, detaches our own mount namespace when
    /// joining a mount namespace, then binds. The handle is released before
    /// returning, whatever the outcome.
    ///
    /// Joining [`NamespaceKind::Pid`] here only affects processes created
    /// afterwards; see [`crate::JoinSequencer`] for the ordering that makes it
    /// useful.
    pub fn join(&self, pid: TargetPid, kind: NamespaceKind) -> Result<()> {
        let handle = self.open(pid, kind)?;

        if kind == NamespaceKind::Mount {
            self.detach_mount(kind)?;
        }

        self.bind(kind, &handle)?;

        tracing::info!(pid = %pid, kind = %kind, "Joined namespace");
        Ok(())
    }

    /// Open `kind` of `pid` without binding it
    pub fn open(&self, pid: TargetPid, kind: NamespaceKind) -> Result<B::Handle> {
        tracing::debug!(pid = %pid, kind = %kind, "Opening namespace");
        self.backend.open(pid, kind)
    }

    /// Bind the calling thread to an already opened namespace
    pub fn bind(&self, kind: NamespaceKind, handle: &B::Handle) -> Result<()> {
        self.backend.bind(kind, handle).map_err(|source| {
            tracing::debug!(kind = %kind, error = %source, "setns failed");
            Error::Bind { kind, source }
        })
    }

    // Without this the target's mount table would still be reachable through
    // state we share with our parent.
    fn detach_mount(&self, kind: NamespaceKind) -> Result<()> {
        tracing::debug!("Detaching own mount namespace");
        self.backend.detach_mount().map_err(|source| {
            tracing::debug!(error = %source, "Failed to detach mount namespace");
            Error::Detach { kind, source }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};

    fn pid() -> TargetPid {
        TargetPid::new(4242).unwrap()
    }

    #[test]
    fn test_simple_join() {
        let backend = RecordingBackend::new();
        let joiner = NamespaceJoiner::new(backend.clone());

        joiner.join(pid(), NamespaceKind::Network).unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::Open(NamespaceKind::Network),
                BackendCall::Bind(NamespaceKind::Network),
                BackendCall::Release(NamespaceKind::Network),
            ]
        );
    }

    #[test]
    fn test_mount_join_detaches_before_bind() {
        let backend = RecordingBackend::new();
        let joiner = NamespaceJoiner::new(backend.clone());

        joiner.join(pid(), NamespaceKind::Mount).unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::Open(NamespaceKind::Mount),
                BackendCall::DetachMount,
                BackendCall::Bind(NamespaceKind::Mount),
                BackendCall::Release(NamespaceKind::Mount),
            ]
        );
    }

    #[test]
    fn test_non_mount_join_never_detaches() {
        let backend = RecordingBackend::new();
        let joiner = NamespaceJoiner::new(backend.clone());

        for kind in [NamespaceKind::Uts, NamespaceKind::Ipc, NamespaceKind::User] {
            joiner.join(pid(), kind).unwrap();
        }

        assert_eq!(backend.position(BackendCall::DetachMount), None);
    }

    #[test]
    fn test_detach_failure_aborts_before_bind() {
        let backend = RecordingBackend::new().failing_detach();
        let joiner = NamespaceJoiner::new(backend.clone());

        let err = joiner.join(pid(), NamespaceKind::Mount).unwrap_err();

        assert!(matches!(err, Error::Detach { kind: NamespaceKind::Mount, .. }));
        assert!(backend.bound().is_empty());
        // Handle is still released
        assert_eq!(
            backend.calls().last(),
            Some(&BackendCall::Release(NamespaceKind::Mount))
        );
    }

    #[test]
    fn test_bind_failure_is_tagged() {
        let backend = RecordingBackend::new().failing_bind(NamespaceKind::Uts);
        let joiner = NamespaceJoiner::new(backend.clone());

        let err = joiner.join(pid(), NamespaceKind::Uts).unwrap_err();

        assert_eq!(err.kind(), Some(NamespaceKind::Uts));
        assert!(matches!(err, Error::Bind { .. }));
        assert_eq!(
            backend.calls().last(),
            Some(&BackendCall::Release(NamespaceKind::Uts))
        );
    }
}
