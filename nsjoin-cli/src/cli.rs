//! CLI argument definitions

use clap::Parser;
use nsjoin_core::TargetPid;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nsjoin")]
#[command(about = "Run a command inside the namespaces of a running process", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Process whose namespaces are joined
    #[arg(short, long, value_name = "PID")]
    pub target: TargetPid,

    /// Enter the mount namespace
    #[arg(short, long)]
    pub mount: bool,

    /// Enter the UTS namespace
    #[arg(short, long)]
    pub uts: bool,

    /// Enter the network namespace
    #[arg(short, long)]
    pub net: bool,

    /// Enter the IPC namespace
    #[arg(short, long)]
    pub ipc: bool,

    /// Enter the PID namespace (runs the command in a child process)
    #[arg(short, long)]
    pub pid: bool,

    /// Enter a namespace by name (mnt, uts, net, ipc, pid)
    #[arg(long = "ns", value_name = "NAME")]
    pub namespaces: Vec<String>,

    /// Print the join plan as JSON instead of joining
    #[arg(long)]
    pub dry_run: bool,

    /// Where procfs is mounted
    #[arg(long, env = "NSJOIN_PROC_ROOT", default_value = "/proc", value_name = "DIR")]
    pub proc_root: PathBuf,

    /// Command to run (default: $SHELL, or /bin/sh)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}
