//! SIGTERM delivered to the launcher in fork mode must end the command.
//!
//! Single test on purpose: the signal is sent to this whole test process.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use nsjoin_core::TargetPid;
use nsjoin_namespace::*;
use std::fs;
use std::thread;
use std::time::Duration;

#[test]
fn test_sigterm_terminates_command_in_fork_mode() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("command.pid");
    let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());

    let mut sequencer = JoinSequencer::new(RecordingBackend::new());
    let pin = ThreadPin::current();
    let request = NamespaceRequest::new(TargetPid::new(4242).unwrap()).with_pid(true);
    let command = CommandLine::new("/bin/sh", vec!["-c".to_string(), script]).unwrap();
    let sequenced = sequencer.run(&request, command, &pin).unwrap();

    let watched = pid_file.clone();
    let terminator = thread::spawn(move || {
        while !watched.exists() {
            thread::sleep(Duration::from_millis(10));
        }
        // Both handlers are in place well before this
        thread::sleep(Duration::from_millis(300));
        kill(Pid::this(), Signal::SIGTERM).unwrap();
    });

    let code = ProcessLauncher::new(sequencer.joiner())
        .launch(sequenced.launch, &pin)
        .unwrap();
    terminator.join().unwrap();

    assert_eq!(code, 128 + Signal::SIGTERM as i32);

    // Reaped by the forked child, not left running as an orphan
    let command_pid: i32 = fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(kill(Pid::from_raw(command_pid), None), Err(Errno::ESRCH));
}
