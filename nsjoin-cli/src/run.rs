//! Joining the target's namespaces and starting the command

use anyhow::Result;
use nsjoin_namespace::{
    CommandLine, JoinPlan, JoinSequencer, KernelBackend, NamespaceRequest, ProcFs,
    ProcessLauncher, ThreadPin,
};
use tracing::{debug, info};

use crate::cli::Cli;

/// Run the invocation described by `cli`, returning the exit code to use
pub fn execute(cli: Cli) -> Result<i32> {
    let request = build_request(&cli)?;
    let command = CommandLine::resolve(cli.command, std::env::var("SHELL").ok())?;

    if cli.dry_run {
        let plan = JoinPlan::new(&request, command)?;
        for advisory in &plan.advisories {
            eprintln!("⚠️  {advisory}");
        }
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(0);
    }

    // Held until the launch has been issued
    let pin = ThreadPin::acquire()?;
    debug!(tid = pin.tid().as_raw(), "Thread pinned");

    info!(pid = %request.target, command = %command, "🔗 Entering namespaces");

    let mut sequencer = JoinSequencer::new(KernelBackend::new(ProcFs::new(cli.proc_root)));
    let sequenced = sequencer.run(&request, command, &pin)?;

    for advisory in &sequenced.advisories {
        eprintln!("⚠️  {advisory}");
    }

    let code = ProcessLauncher::new(sequencer.joiner()).launch(sequenced.launch, &pin)?;
    drop(pin);

    Ok(code)
}

fn build_request(cli: &Cli) -> Result<NamespaceRequest> {
    let mut request = NamespaceRequest::new(cli.target)
        .with_mount(cli.mount)
        .with_uts(cli.uts)
        .with_network(cli.net)
        .with_ipc(cli.ipc)
        .with_pid(cli.pid);

    for name in &cli.namespaces {
        request.insert_named(name)?;
    }

    request.validate()?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use nsjoin_core::{Error, NamespaceKind};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nsjoin").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_and_names_merge() {
        let request = build_request(&parse(&["-t", "4242", "-u", "--ns", "network", "--ns", "pid"]))
            .unwrap();

        assert_eq!(
            request.join_order(),
            vec![NamespaceKind::Uts, NamespaceKind::Network, NamespaceKind::Pid]
        );
    }

    #[test]
    fn test_unsupported_name_rejected() {
        let err = build_request(&parse(&["-t", "4242", "--ns", "cgroup"])).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnsupportedNamespaceKind { .. })
        ));
    }

    #[test]
    fn test_nothing_selected_rejected() {
        let err = build_request(&parse(&["-t", "4242", "/bin/ls"])).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidConfig { .. })
        ));
    }
}
