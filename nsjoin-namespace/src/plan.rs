//! What runs once the namespaces are joined, and how

use nsjoin_core::{Error, NamespaceKind, Result, TargetPid};
use serde::Serialize;
use std::fmt;

use crate::request::NamespaceRequest;

/// Command started when none is given and `SHELL` is unset
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Program and arguments to run inside the joined namespaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Create a command line
    ///
    /// # Errors
    /// Returns error if the program is empty
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self> {
        let program = program.into();
        if program.is_empty() {
            return Err(Error::InvalidConfig {
                message: "Command cannot be empty".to_string(),
            });
        }
        Ok(Self { program, args })
    }

    /// Build from positional arguments, falling back to `shell` or
    /// [`DEFAULT_SHELL`] when there are none
    ///
    /// # Errors
    /// Returns error if the first argument is empty
    pub fn resolve(argv: Vec<String>, shell: Option<String>) -> Result<Self> {
        let mut argv = argv.into_iter();
        match argv.next() {
            Some(program) => Self::new(program, argv.collect()),
            None => {
                let shell = shell
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| DEFAULT_SHELL.to_string());
                Self::new(shell, Vec::new())
            }
        }
    }

    /// Program to run
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments after the program
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How the command is started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// exec(2) in place of this process
    Replace,
    /// fork(2) a child that joins the PID namespace first
    Fork,
}

/// Command plus the launch decision, fixed once computed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    command: CommandLine,
    needs_fork: bool,
}

impl ExecutionPlan {
    /// Decide how `command` runs for `request`
    #[must_use]
    pub fn new(command: CommandLine, request: &NamespaceRequest) -> Self {
        Self {
            command,
            needs_fork: request.pid,
        }
    }

    /// Command to run
    #[must_use]
    pub const fn command(&self) -> &CommandLine {
        &self.command
    }

    /// Whether a child must be forked (PID namespace requested)
    #[must_use]
    pub const fn needs_fork(&self) -> bool {
        self.needs_fork
    }

    /// Launch mode implied by [`Self::needs_fork`]
    #[must_use]
    pub const fn mode(&self) -> LaunchMode {
        if self.needs_fork {
            LaunchMode::Fork
        } else {
            LaunchMode::Replace
        }
    }
}

/// Non-fatal warning about a requested namespace combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Advisory {
    /// PID namespace joined while keeping our own mount namespace
    PidWithoutMount,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PidWithoutMount => f.write_str(
                "Joining the PID namespace without the mount namespace: \
                 /proc still shows the original PID namespace, so ps and similar tools will not work properly",
            ),
        }
    }
}

/// Everything decided before any namespace is touched
#[derive(Debug, Clone, Serialize)]
pub struct JoinPlan {
    /// Process whose namespaces are joined
    pub target: TargetPid,
    /// Kinds in bind order
    pub join_order: Vec<NamespaceKind>,
    /// Command and launch decision
    pub execution: ExecutionPlan,
    /// How the command will be started
    pub mode: LaunchMode,
    /// Warnings to show the user
    pub advisories: Vec<Advisory>,
}

impl JoinPlan {
    /// Plan joining `request` and running `command`
    ///
    /// # Errors
    /// Returns error if the request selects no namespace
    pub fn new(request: &NamespaceRequest, command: CommandLine) -> Result<Self> {
        request.validate()?;

        let execution = ExecutionPlan::new(command, request);
        Ok(Self {
            target: request.target,
            join_order: request.join_order(),
            mode: execution.mode(),
            execution,
            advisories: request.advisories(),
        })
    }
}
