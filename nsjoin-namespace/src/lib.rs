//! Joining the namespaces of a running process
//!
//! This crate attaches the calling thread to the namespaces of a target
//! process and then runs a command there:
//! - UTS, network and IPC namespaces are joined first
//! - The PID namespace file is opened while the original mount view is visible
//! - The mount namespace is joined after detaching our own
//! - The PID namespace is bound last, in a forked child, before the command starts

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod backend;
pub mod handle;
pub mod joiner;
pub mod launcher;
pub mod pin;
pub mod plan;
pub mod request;
pub mod sequencer;

pub use backend::{BackendCall, KernelBackend, NamespaceBackend, RecordingBackend};
pub use handle::{NamespaceHandle, ProcFs};
pub use joiner::NamespaceJoiner;
pub use launcher::ProcessLauncher;
pub use pin::ThreadPin;
pub use plan::{Advisory, CommandLine, ExecutionPlan, JoinPlan, LaunchMode};
pub use request::NamespaceRequest;
pub use sequencer::{JoinSequencer, JoinState, Launch, PidHandoff, Sequenced};
