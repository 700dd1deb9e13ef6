//! Ordering the joins and deciding how to launch

use nsjoin_core::{NamespaceKind, Result};

use crate::backend::NamespaceBackend;
use crate::joiner::NamespaceJoiner;
use crate::pin::ThreadPin;
use crate::plan::{Advisory, CommandLine, ExecutionPlan, JoinPlan, LaunchMode};
use crate::request::NamespaceRequest;

/// Progress of one invocation; states are never revisited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    /// Nothing done yet
    Start,
    /// Joining UTS, network and IPC
    JoiningSimpleNamespaces,
    /// Opening the PID namespace file while the original mounts are visible
    OpeningPidHandle,
    /// Detaching and joining the mount namespace
    JoiningMount,
    /// Handing over to the launcher
    Launching(LaunchMode),
    /// A step failed; nothing further is attempted
    Failed,
}

/// PID namespace handle whose bind is deferred to a forked child
///
/// Only the child completes the bind. The parent releases its copy right
/// after the fork.
#[derive(Debug)]
pub struct PidHandoff<H> {
    handle: H,
}

impl<H> PidHandoff<H> {
    /// Bind the calling thread to the PID namespace and release the handle
    ///
    /// Must be called in the child, before the command is created.
    pub fn complete<B>(self, joiner: &NamespaceJoiner<B>) -> Result<()>
    where
        B: NamespaceBackend<Handle = H>,
    {
        joiner.bind(NamespaceKind::Pid, &self.handle)
    }

    /// Drop the parent's copy of the handle
    pub fn release_in_parent(self) {
        tracing::debug!("Released PID namespace handle in parent");
    }
}

/// The launch decision, taken once
#[derive(Debug)]
pub enum Launch<H> {
    /// No PID namespace: exec the command in place
    Replace(ExecutionPlan),
    /// PID namespace: fork, bind in the child, then start the command
    Fork {
        /// Command to run in the child
        plan: ExecutionPlan,
        /// PID namespace handle for the child
        handoff: PidHandoff<H>,
    },
}

impl<H> Launch<H> {
    /// Execution plan for either mode
    #[must_use]
    pub const fn plan(&self) -> &ExecutionPlan {
        match self {
            Self::Replace(plan) | Self::Fork { plan, .. } => plan,
        }
    }

    /// Launch mode of this decision
    #[must_use]
    pub const fn mode(&self) -> LaunchMode {
        match self {
            Self::Replace(_) => LaunchMode::Replace,
            Self::Fork { .. } => LaunchMode::Fork,
        }
    }
}

/// Result of a completed join sequence
#[derive(Debug)]
pub struct Sequenced<H> {
    /// How to start the command
    pub launch: Launch<H>,
    /// Warnings to show the user
    pub advisories: Vec<Advisory>,
}

/// Joins the requested namespaces in the one order that works
///
/// 1. UTS, network, IPC
/// 2. Open (not bind) the PID namespace, while `/proc` still resolves
///    against our original mount namespace
/// 3. Mount namespace
/// 4. PID namespace, bound by the launcher in a fresh child
#[derive(Debug)]
pub struct JoinSequencer<B> {
    joiner: NamespaceJoiner<B>,
    history: Vec<JoinState>,
}

impl<B: NamespaceBackend> JoinSequencer<B> {
    /// Create a sequencer on top of `backend`
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            joiner: NamespaceJoiner::new(backend),
            history: vec![JoinState::Start],
        }
    }

    /// Joiner used for every bind, including the deferred PID bind
    #[must_use]
    pub const fn joiner(&self) -> &NamespaceJoiner<B> {
        &self.joiner
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> JoinState {
        self.history.last().copied().unwrap_or(JoinState::Start)
    }

    /// States visited so far, in order
    #[must_use]
    pub fn history(&self) -> &[JoinState] {
        &self.history
    }

    /// Join every namespace of `request` except PID and decide the launch
    ///
    /// Stops at the first failure. Namespaces already joined stay joined,
    /// so the caller must not carry on after an error.
    pub fn run(
        &mut self,
        request: &NamespaceRequest,
        command: CommandLine,
        pin: &ThreadPin,
    ) -> Result<Sequenced<B::Handle>> {
        let result = self.run_steps(request, command, pin);

        if let Err(ref e) = result {
            tracing::debug!(state = ?self.state(), error = %e, "Namespace join aborted");
            self.advance(JoinState::Failed);
        }

        result
    }

    fn run_steps(
        &mut self,
        request: &NamespaceRequest,
        command: CommandLine,
        pin: &ThreadPin,
    ) -> Result<Sequenced<B::Handle>> {
        let JoinPlan {
            target,
            execution,
            advisories,
            join_order,
            ..
        } = JoinPlan::new(request, command)?;

        tracing::info!(pid = %target, namespaces = ?join_order, "Joining namespaces");

        for advisory in &advisories {
            tracing::debug!(%advisory, "Known limitation");
        }

        self.advance(JoinState::JoiningSimpleNamespaces);
        for kind in NamespaceRequest::SIMPLE_KINDS {
            if request.contains(kind) {
                pin.verify()?;
                self.joiner.join(target, kind)?;
            }
        }

        self.advance(JoinState::OpeningPidHandle);
        let pid_handle = if request.pid {
            Some(self.joiner.open(target, NamespaceKind::Pid)?)
        } else {
            None
        };

        self.advance(JoinState::JoiningMount);
        if request.mount {
            pin.verify()?;
            self.joiner.join(target, NamespaceKind::Mount)?;
        }

        let launch = match pid_handle {
            Some(handle) => Launch::Fork {
                plan: execution,
                handoff: PidHandoff { handle },
            },
            None => Launch::Replace(execution),
        };
        self.advance(JoinState::Launching(launch.mode()));

        Ok(Sequenced { launch, advisories })
    }

    fn advance(&mut self, next: JoinState) {
        tracing::debug!(from = ?self.state(), to = ?next, "Join state");
        self.history.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};
    use nsjoin_core::{Error, TargetPid};

    fn request() -> NamespaceRequest {
        NamespaceRequest::new(TargetPid::new(4242).unwrap())
    }

    fn command() -> CommandLine {
        CommandLine::new("/bin/ls", Vec::new()).unwrap()
    }

    #[test]
    fn test_full_request_order() {
        let backend = RecordingBackend::new();
        let mut sequencer = JoinSequencer::new(backend.clone());
        let request = request()
            .with_mount(true)
            .with_uts(true)
            .with_network(true)
            .with_ipc(true)
            .with_pid(true);

        let sequenced = sequencer.run(&request, command(), &ThreadPin::current()).unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::Open(NamespaceKind::Uts),
                BackendCall::Bind(NamespaceKind::Uts),
                BackendCall::Release(NamespaceKind::Uts),
                BackendCall::Open(NamespaceKind::Network),
                BackendCall::Bind(NamespaceKind::Network),
                BackendCall::Release(NamespaceKind::Network),
                BackendCall::Open(NamespaceKind::Ipc),
                BackendCall::Bind(NamespaceKind::Ipc),
                BackendCall::Release(NamespaceKind::Ipc),
                BackendCall::Open(NamespaceKind::Pid),
                BackendCall::Open(NamespaceKind::Mount),
                BackendCall::DetachMount,
                BackendCall::Bind(NamespaceKind::Mount),
                BackendCall::Release(NamespaceKind::Mount),
            ]
        );
        assert_eq!(sequenced.launch.mode(), LaunchMode::Fork);
        assert!(sequenced.advisories.is_empty());
    }

    #[test]
    fn test_state_history() {
        let mut sequencer = JoinSequencer::new(RecordingBackend::new());

        sequencer
            .run(&request().with_uts(true), command(), &ThreadPin::current())
            .unwrap();

        assert_eq!(
            sequencer.history(),
            [
                JoinState::Start,
                JoinState::JoiningSimpleNamespaces,
                JoinState::OpeningPidHandle,
                JoinState::JoiningMount,
                JoinState::Launching(LaunchMode::Replace),
            ]
        );
    }

    #[test]
    fn test_pid_handle_survives_sequence() {
        let backend = RecordingBackend::new();
        let mut sequencer = JoinSequencer::new(backend.clone());

        let sequenced = sequencer
            .run(&request().with_pid(true), command(), &ThreadPin::current())
            .unwrap();

        // Opened, never bound nor released by the parent sequence
        assert_eq!(backend.calls(), vec![BackendCall::Open(NamespaceKind::Pid)]);
        assert_eq!(sequenced.advisories, vec![Advisory::PidWithoutMount]);

        let Launch::Fork { handoff, .. } = sequenced.launch else {
            panic!("PID namespace must fork");
        };
        handoff.complete(sequencer.joiner()).unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::Open(NamespaceKind::Pid),
                BackendCall::Bind(NamespaceKind::Pid),
                BackendCall::Release(NamespaceKind::Pid),
            ]
        );
    }

    #[test]
    fn test_parent_release_does_not_bind() {
        let backend = RecordingBackend::new();
        let mut sequencer = JoinSequencer::new(backend.clone());

        let sequenced = sequencer
            .run(&request().with_pid(true).with_mount(true), command(), &ThreadPin::current())
            .unwrap();

        if let Launch::Fork { handoff, .. } = sequenced.launch {
            handoff.release_in_parent();
        }
        assert!(!backend.bound().contains(&NamespaceKind::Pid));
        assert_eq!(
            backend.calls().last(),
            Some(&BackendCall::Release(NamespaceKind::Pid))
        );
    }

    #[test]
    fn test_empty_request_fails_before_any_call() {
        let backend = RecordingBackend::new();
        let mut sequencer = JoinSequencer::new(backend.clone());

        let err = sequencer
            .run(&request(), command(), &ThreadPin::current())
            .unwrap_err();

        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(backend.calls().is_empty());
        assert_eq!(sequencer.state(), JoinState::Failed);
    }

    #[test]
    fn test_simple_failure_stops_sequence() {
        let backend = RecordingBackend::new().failing_bind(NamespaceKind::Network);
        let mut sequencer = JoinSequencer::new(backend.clone());
        let request = request()
            .with_uts(true)
            .with_network(true)
            .with_ipc(true)
            .with_mount(true)
            .with_pid(true);

        let err = sequencer
            .run(&request, command(), &ThreadPin::current())
            .unwrap_err();

        assert_eq!(err.kind(), Some(NamespaceKind::Network));
        assert_eq!(backend.position(BackendCall::Open(NamespaceKind::Ipc)), None);
        assert_eq!(backend.position(BackendCall::Open(NamespaceKind::Pid)), None);
        assert_eq!(backend.position(BackendCall::Open(NamespaceKind::Mount)), None);
        assert_eq!(
            sequencer.history().last(),
            Some(&JoinState::Failed)
        );
    }

    #[test]
    fn test_pid_open_failure_skips_mount() {
        let backend = RecordingBackend::new().failing_open(NamespaceKind::Pid);
        let mut sequencer = JoinSequencer::new(backend.clone());

        let err = sequencer
            .run(&request().with_pid(true).with_mount(true), command(), &ThreadPin::current())
            .unwrap_err();

        assert_eq!(err.kind(), Some(NamespaceKind::Pid));
        assert_eq!(backend.calls(), vec![BackendCall::Open(NamespaceKind::Pid)]);
    }

    #[test]
    fn test_mount_failure_releases_pid_handle() {
        let backend = RecordingBackend::new().failing_detach();
        let mut sequencer = JoinSequencer::new(backend.clone());

        let err = sequencer
            .run(&request().with_pid(true).with_mount(true), command(), &ThreadPin::current())
            .unwrap_err();

        assert!(matches!(err, Error::Detach { .. }));
        assert!(backend.bound().is_empty());
        assert!(backend.calls().contains(&BackendCall::Release(NamespaceKind::Pid)));
    }
}
