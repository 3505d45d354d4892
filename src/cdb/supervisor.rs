//! The supervisor executes one command and reports its life cycle.
//!
//! The preload shim reroutes every exec call to this program, which sends a
//! started event to the collector, runs the real program with its original
//! argument list, waits for it, reports how it ended, and exits with the
//! child's exit code. The supervision must never alter the visible behavior
//! of the build: a collector that cannot be reached is logged and ignored.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::TcpStream;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::Command;

use tracing::{debug, warn};

use crate::cdb::options::SupervisorOptions;
use crate::cdb::wire::{write_envelope, Envelope, SuperviseEvent};

// Exit codes the shell uses for a command that could not be executed.
const EXIT_CANNOT_EXECUTE : i32 = 126;
const EXIT_NOT_FOUND : i32 = 127;
const EXIT_SIGNAL_BASE : i32 = 128;

struct Reporter {
    stream : Option<BufWriter<TcpStream>>,
}

impl Reporter {
    fn connect(destination : &str) -> Reporter {
        match TcpStream::connect(destination) {
            Ok(stream) => {
                Reporter { stream : Some(BufWriter::new(stream)) }
            }
            Err(error) => {
                warn!("could not reach the collector at {}: {}", destination, error);
                Reporter { stream : None }
            }
        }
    }

    fn report(&mut self, event : SuperviseEvent) {
        if let Some(stream) = &mut self.stream {
            let envelope = Envelope { timestamp : crate::cdb::wire::timestamp(), event };
            if let Err(error) = write_envelope(stream, &envelope) {
                warn!("could not report event: {}", error);
                self.stream = None;
            }
        }
    }
}

fn environment() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

/// Run the supervised command, return the exit code to exit with.
pub fn supervisor_entrypoint(options : &SupervisorOptions) -> anyhow::Result<i32> {
    let mut reporter = Reporter::connect(&options.destination);

    let mut command = Command::new(&options.exec_path);
    if let Some((argv0, arguments)) = options.command.split_first() {
        command.arg0(argv0);
        command.args(arguments);
    }

    let mut child = match command.spawn() {
        Err(error) => {
            // The shim resolved the path before it handed the execution
            // over, so this is rare; still, behave like the shell would.
            warn!("failed to execute {:?}: {}", options.exec_path, error);
            let code = match error.kind() {
                std::io::ErrorKind::NotFound => { EXIT_NOT_FOUND }
                _ => { EXIT_CANNOT_EXECUTE }
            };
            return Ok(code);
        }
        Ok(child) => { child }
    };
    debug!("executed {:?} [pid: {}]", options.exec_path, child.id());

    let working_dir = std::env::current_dir()?;
    reporter.report(SuperviseEvent::Started {
        pid : i64::from(child.id()),
        ppid : i64::from(unsafe { libc::getppid() }),
        executable : options.exec_path.clone(),
        arguments : options.command.clone(),
        working_dir,
        environment : environment(),
    });

    let status = child.wait()?;
    match status.code() {
        Some(code) => {
            debug!("child exited [status: {}]", code);
            reporter.report(SuperviseEvent::Stopped { status : i64::from(code) });
            Ok(code)
        }
        None => {
            let signal = status.signal().unwrap_or_default();
            debug!("child signalled [signal: {}]", signal);
            reporter.report(SuperviseEvent::Signalled { signal : i64::from(signal) });
            Ok(EXIT_SIGNAL_BASE + signal)
        }
    }
}
