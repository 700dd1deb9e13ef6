//! Error types for nsjoin

use std::path::PathBuf;
use thiserror::Error;

use crate::types::NamespaceKind;

/// nsjoin error types
///
/// Every variant is terminal for an invocation: a thread that has bound some
/// namespaces and failed on the next one cannot be rolled back.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The requested namespace kind is not one nsjoin can join
    #[error("Unsupported namespace kind: {name}")]
    UnsupportedNamespaceKind {
        /// Name as it was requested
        name: String,
    },

    /// The per-process namespace file could not be opened
    #[error("Failed to open {kind} namespace at {}: {source}", .path.display())]
    NamespaceOpen {
        /// Namespace being opened
        kind: NamespaceKind,
        /// Path of the namespace file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Detaching our own mount namespace failed
    #[error("Failed to detach own mount namespace before joining {kind}: {source}")]
    Detach {
        /// Namespace whose join required the detach
        kind: NamespaceKind,
        /// Errno returned by unshare(2)
        source: nix::Error,
    },

    /// setns(2) failed on an opened namespace handle
    #[error("setns for {kind} namespace failed: {source}")]
    Bind {
        /// Namespace being joined
        kind: NamespaceKind,
        /// Errno returned by setns(2)
        source: nix::Error,
    },

    /// The target command could not be started
    #[error("Failed to launch {command}: {message}")]
    Launch {
        /// Program that failed
        command: String,
        /// Error message
        message: String,
    },

    /// Waiting for the forked child failed
    #[error("Wait for child {pid} failed: {source}")]
    Wait {
        /// Child process ID
        pid: i32,
        /// Errno returned by waitpid(2)
        source: nix::Error,
    },

    /// More than one thread is running in this process
    #[error("Process has {threads} threads, joining namespaces requires a single thread")]
    MultiThreaded {
        /// Number of threads observed
        threads: usize,
    },

    /// The join sequence observed a different OS thread than the one it pinned
    #[error("Thread migrated during namespace join (pinned {pinned}, now {current})")]
    ThreadMigrated {
        /// Thread ID recorded at pin time
        pinned: i32,
        /// Thread ID observed now
        current: i32,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),
}

impl Error {
    /// Namespace kind the failure is tagged with, if any
    #[must_use]
    pub const fn kind(&self) -> Option<NamespaceKind> {
        match self {
            Self::NamespaceOpen { kind, .. } | Self::Detach { kind, .. } | Self::Bind { kind, .. } => {
                Some(*kind)
            }
            _ => None,
        }
    }
}

/// Result type alias for nsjoin operations
pub type Result<T> = std::result::Result<T, Error>;
