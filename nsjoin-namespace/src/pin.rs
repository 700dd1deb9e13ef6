//! Keeping the whole join on one OS thread
//!
//! setns(2) and unshare(2) change the namespaces of the calling thread, not
//! of the process. The join sequence and the launch that follows must
//! therefore run on the thread that started them, and mount namespace
//! changes are refused by the kernel while other threads exist.

use nix::unistd::{gettid, Pid};
use nsjoin_core::{Error, Result};
use std::marker::PhantomData;

/// Proof that the current OS thread is the one holding the joined namespaces
///
/// Not `Send`: the pin cannot leave the thread that created it. Dropping it
/// ends the pinned scope.
#[derive(Debug)]
pub struct ThreadPin {
    tid: Pid,
    _not_send: PhantomData<*const ()>,
}

impl ThreadPin {
    /// Pin the current thread after checking the process is single-threaded
    ///
    /// # Errors
    /// Returns [`Error::MultiThreaded`] if other threads are running
    pub fn acquire() -> Result<Self> {
        let threads = thread_count()?;
        if threads != 1 {
            tracing::debug!(threads, "Refusing to join namespaces from a multi-threaded process");
            return Err(Error::MultiThreaded { threads });
        }
        Ok(Self::current())
    }

    /// Pin the current thread without the single-thread check
    #[must_use]
    pub fn current() -> Self {
        let tid = gettid();
        tracing::trace!(tid = tid.as_raw(), "Pinned thread");
        Self {
            tid,
            _not_send: PhantomData,
        }
    }

    /// Thread ID this pin was taken on
    #[must_use]
    pub const fn tid(&self) -> Pid {
        self.tid
    }

    /// Check we are still on the pinned thread
    ///
    /// # Errors
    /// Returns [`Error::ThreadMigrated`] if the caller runs on another thread
    pub fn verify(&self) -> Result<()> {
        let current = gettid();
        if current != self.tid {
            return Err(Error::ThreadMigrated {
                pinned: self.tid.as_raw(),
                current: current.as_raw(),
            });
        }
        Ok(())
    }
}

impl Drop for ThreadPin {
    fn drop(&mut self) {
        tracing::trace!(tid = self.tid.as_raw(), "Unpinned thread");
    }
}

/// Number of threads in this process, from `/proc/self/status`
///
/// # Errors
/// Returns error if the status file cannot be read or has no `Threads:` line
pub fn thread_count() -> Result<usize> {
    let status = std::fs::read_to_string("/proc/self/status")?;
    parse_thread_count(&status).ok_or_else(|| Error::InvalidConfig {
        message: "No Threads: line in /proc/self/status".to_string(),
    })
}

fn parse_thread_count(status: &str) -> Option<usize> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|count| count.trim().parse().ok())
}
