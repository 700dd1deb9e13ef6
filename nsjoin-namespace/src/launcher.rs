//! Starting the command inside the joined namespaces
//!
//! This module uses `unsafe` for fork() and signal dispositions, which is
//! inherently unsafe but necessary to enter a PID namespace.
//!
//! In fork mode both the parent and the forked child forward Ctrl+C,
//! SIGTERM and SIGHUP to the process below them as SIGTERM. The handler is
//! installed after the fork, once the process no longer has to stay
//! single-threaded. It is installed at most once per process; later
//! launches only retarget it.

#![allow(unsafe_code)]

use nix::errno::Errno;
use nix::sys::signal::{kill, signal, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execvp, fork, ForkResult, Pid};
use nsjoin_core::{Error, Result};
use std::ffi::CString;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tracing::{debug, info, warn};

use crate::backend::NamespaceBackend;
use crate::joiner::NamespaceJoiner;
use crate::pin::ThreadPin;
use crate::plan::CommandLine;
use crate::sequencer::{Launch, PidHandoff};

/// Exit code of the forked child when the PID namespace bind fails
pub const EXIT_BIND_FAILED: i32 = 126;

/// Exit code of the forked child when the command cannot be started
pub const EXIT_EXEC_FAILED: i32 = 127;

/// Runs the command once the sequencer has joined the namespaces
#[derive(Debug)]
pub struct ProcessLauncher<'a, B> {
    joiner: &'a NamespaceJoiner<B>,
}

impl<'a, B: NamespaceBackend> ProcessLauncher<'a, B> {
    /// Create a launcher binding the deferred PID namespace through `joiner`
    #[must_use]
    pub const fn new(joiner: &'a NamespaceJoiner<B>) -> Self {
        Self { joiner }
    }

    /// Start the command
    ///
    /// In replace mode this only returns on failure. In fork mode it returns
    /// the exit code of the child, 128 + signal number if it was killed.
    pub fn launch(&self, launch: Launch<B::Handle>, pin: &ThreadPin) -> Result<i32> {
        pin.verify()?;

        match launch {
            Launch::Replace(plan) => Err(replace_process(plan.command())),
            Launch::Fork { plan, handoff } => self.fork_and_wait(plan.command(), handoff),
        }
    }

    fn fork_and_wait(&self, command: &CommandLine, handoff: PidHandoff<B::Handle>) -> Result<i32> {
        info!(command = %command, "Forking to enter PID namespace");

        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                handoff.release_in_parent();
                debug!(child = child.as_raw(), "Parent waiting for child");
                wait_for_child(child)
            }
            Ok(ForkResult::Child) => child_process(self.joiner, command, handoff),
            Err(e) => Err(Error::Launch {
                command: command.program().to_string(),
                message: format!("Fork failed: {e}"),
            }),
        }
    }
}

/// Child: bind the PID namespace, then start the command as the first
/// process created inside it
fn child_process<B: NamespaceBackend>(
    joiner: &NamespaceJoiner<B>,
    command: &CommandLine,
    handoff: PidHandoff<B::Handle>,
) -> ! {
    if let Err(e) = handoff.complete(joiner) {
        eprintln!("❌ {e}");
        std::process::exit(EXIT_BIND_FAILED);
    }

    // Before the spawn so a signal arriving meanwhile is not lost
    let forwarding = SignalForwarding::install();

    // setns(CLONE_NEWPID) never moves the caller itself, so spawn rather than exec
    let mut child = match Command::new(command.program()).args(command.args()).spawn() {
        Ok(child) => child,
        Err(e) => {
            eprintln!("❌ Failed to execute {}: {e}", command.program());
            std::process::exit(EXIT_EXEC_FAILED);
        }
    };

    forwarding.forward_to(Pid::from_raw(child.id().cast_signed()));
    let _quit = TerminalSignals::ignore();

    let code = match child.wait() {
        Ok(status) => status_code(status),
        Err(e) => {
            eprintln!("❌ Failed to wait for {}: {e}", command.program());
            1
        }
    };
    std::process::exit(code);
}

/// Parent: wait for the child and report how it ended
fn wait_for_child(child: Pid) -> Result<i32> {
    let forwarding = SignalForwarding::install();
    forwarding.forward_to(child);
    let _quit = TerminalSignals::ignore();

    loop {
        match waitpid(child, None) {
            Ok(status) => {
                if let Some(code) = exit_code(status) {
                    info!(child = child.as_raw(), code, "Child exited");
                    return Ok(code);
                }
                debug!("Child status: {:?}", status);
            }
            Err(Errno::EINTR) => {
                debug!("Wait interrupted by signal, continuing...");
            }
            Err(source) => {
                return Err(Error::Wait {
                    pid: child.as_raw(),
                    source,
                });
            }
        }
    }
}

/// Exit code for a terminal wait status, `None` while the child still runs
#[must_use]
pub fn exit_code(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        // Exit codes for signals: 128 + signal number
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

fn status_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

/// Replace this process with `command`; returns only on failure
fn replace_process(command: &CommandLine) -> Error {
    let launch_error = |message: String| Error::Launch {
        command: command.program().to_string(),
        message,
    };

    let argv: Vec<CString> = match std::iter::once(command.program())
        .chain(command.args().iter().map(String::as_str))
        .map(CString::new)
        .collect::<std::result::Result<_, _>>()
    {
        Ok(argv) => argv,
        Err(e) => return launch_error(format!("Invalid argument: {e}")),
    };

    info!(command = %command, "Replacing process image");

    match execvp(argv[0].as_c_str(), &argv) {
        Ok(never) => match never {},
        Err(errno) => launch_error(errno.to_string()),
    }
}

/// Process the termination handler forwards to, 0 while there is none
static FORWARD_TARGET: AtomicI32 = AtomicI32::new(0);

/// Set when a termination signal arrived before there was a target
static FORWARD_PENDING: AtomicBool = AtomicBool::new(false);

/// Forwards termination signals to one process until dropped
struct SignalForwarding;

impl SignalForwarding {
    fn install() -> Self {
        let installed = ctrlc::try_set_handler(|| {
            let target = FORWARD_TARGET.load(Ordering::SeqCst);
            if target > 0 {
                warn!(child = target, "Received termination signal, forwarding to child...");
                let _ = kill(Pid::from_raw(target), Signal::SIGTERM);
            } else {
                FORWARD_PENDING.store(true, Ordering::SeqCst);
            }
        });

        match installed {
            Ok(()) | Err(ctrlc::Error::MultipleHandlers) => {}
            Err(e) => warn!(error = %e, "Could not set signal handler"),
        }
        Self
    }

    fn forward_to(&self, child: Pid) {
        FORWARD_TARGET.store(child.as_raw(), Ordering::SeqCst);
        if FORWARD_PENDING.swap(false, Ordering::SeqCst) {
            warn!(child = child.as_raw(), "Forwarding earlier termination signal to child");
            let _ = kill(child, Signal::SIGTERM);
        }
    }
}

impl Drop for SignalForwarding {
    fn drop(&mut self) {
        FORWARD_TARGET.store(0, Ordering::SeqCst);
    }
}

/// SIGQUIT ignored for as long as the value lives
struct TerminalSignals {
    previous: Vec<(Signal, SigHandler)>,
}

impl TerminalSignals {
    const SIGNALS: [Signal; 1] = [Signal::SIGQUIT];

    fn ignore() -> Self {
        let previous = Self::SIGNALS
            .into_iter()
            .filter_map(|sig| match unsafe { signal(sig, SigHandler::SigIgn) } {
                Ok(handler) => Some((sig, handler)),
                Err(e) => {
                    warn!(signal = ?sig, error = %e, "Could not ignore signal");
                    None
                }
            })
            .collect();
        Self { previous }
    }
}

impl Drop for TerminalSignals {
    fn drop(&mut self) {
        for (sig, handler) in self.previous.drain(..) {
            let _ = unsafe { signal(sig, handler) };
        }
    }
}
