//! The top level intercept process.
//!
//! Binds the event collector, exports the session environment, runs the
//! build command under supervision and writes the execution report when the
//! build is done. Signals arriving at this process are forwarded to the
//! build; the collector only shuts down after the build exited.

use std::collections::BTreeMap;
use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Context as _;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tracing::{debug, info, warn};

use crate::cdb::options::InterceptOptions;
use crate::cdb::path;
use crate::cdb::report::{self, Command as ReportCommand, Context, Event, EventKind, Execution, Report, Run};
use crate::cdb::session;
use crate::cdb::wire::{read_envelopes, Envelope, SuperviseEvent};

const EXIT_SIGNAL_BASE : i32 = 128;

const SESSION_TYPE : &str = "library preload";

// Folds the event stream of one connection into a single execution.
struct ExecutionBuilder {
    execution : Option<Execution>,
}

impl ExecutionBuilder {
    fn new() -> ExecutionBuilder {
        ExecutionBuilder { execution : None }
    }

    fn add(&mut self, envelope : Envelope) {
        match (&mut self.execution, envelope.event) {
            (None, SuperviseEvent::Started { pid, ppid, executable, arguments, working_dir, environment }) => {
                self.execution = Some(Execution {
                    command : ReportCommand {
                        program : executable,
                        arguments,
                        working_dir,
                        environment,
                    },
                    run : Run {
                        pid : Some(pid),
                        ppid : Some(ppid),
                        events : vec![Event {
                            kind : EventKind::Start,
                            at : envelope.timestamp,
                            status : None,
                            signal : None,
                        }],
                    },
                });
            }
            (Some(execution), SuperviseEvent::Stopped { status }) => {
                execution.run.events.push(Event {
                    kind : EventKind::Stop,
                    at : envelope.timestamp,
                    status : Some(status),
                    signal : None,
                });
            }
            (Some(execution), SuperviseEvent::Signalled { signal }) => {
                execution.run.events.push(Event {
                    kind : EventKind::Signal,
                    at : envelope.timestamp,
                    status : None,
                    signal : Some(signal),
                });
            }
            _ => {
                info!("received event could not be merged into the execution report, ignored");
            }
        }
    }

    fn build(self) -> Option<Execution> {
        let execution = self.execution?;
        // A supervisor that reported nonsense must not poison the report.
        if execution.command.program.as_os_str().is_empty()
            || execution.command.arguments.is_empty()
            || !execution.command.working_dir.is_absolute()
        {
            info!("received execution was malformed, ignored");
            return None;
        }
        Some(execution)
    }
}

fn fold_stream(stream : TcpStream) -> Option<Execution> {
    let mut builder = ExecutionBuilder::new();
    for envelope in read_envelopes(BufReader::new(stream)) {
        match envelope {
            Err(error) => {
                debug!("event stream ended: {}", error);
                break;
            }
            Ok(envelope) => {
                builder.add(envelope);
            }
        }
    }
    builder.build()
}

/// The event collector. Accepts supervisor connections until stopped and
/// accumulates the received executions.
pub struct Collector {
    address : String,
    accept_thread : thread::JoinHandle<()>,
    executions : Arc<Mutex<Vec<Execution>>>,
    shutdown : Arc<AtomicBool>,
}

impl Collector {
    pub fn start() -> anyhow::Result<Collector> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let address = format!("{}", listener.local_addr()?);

        let executions = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_executions = Arc::clone(&executions);
        let accept_shutdown = Arc::clone(&shutdown);
        let accept_thread = thread::spawn(move || {
            let mut handlers = Vec::new();
            for stream in listener.incoming() {
                if accept_shutdown.load(Ordering::SeqCst) {
                    break;
                }
                match stream {
                    Err(error) => {
                        warn!("failed to accept connection: {}", error);
                    }
                    Ok(stream) => {
                        let executions = Arc::clone(&accept_executions);
                        handlers.push(thread::spawn(move || {
                            if let Some(execution) = fold_stream(stream) {
                                executions.lock().unwrap().push(execution);
                            }
                        }));
                    }
                }
            }
            for handler in handlers {
                let _ = handler.join();
            }
        });

        Ok(Collector { address, accept_thread, executions, shutdown })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Stop accepting connections and hand out what was collected.
    pub fn stop(self) -> Vec<Execution> {
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the accept loop with a throwaway connection.
        let _ = TcpStream::connect(&self.address);
        let _ = self.accept_thread.join();

        let mut executions = self.executions.lock().unwrap();
        std::mem::take(&mut *executions)
    }
}

fn host_info() -> BTreeMap<String, String> {
    match nix::sys::utsname::uname() {
        Err(error) => {
            info!("failed to get host info: {}", error);
            BTreeMap::new()
        }
        Ok(uts) => {
            vec![
                ("sysname", uts.sysname()),
                ("nodename", uts.nodename()),
                ("release", uts.release()),
                ("version", uts.version()),
                ("machine", uts.machine()),
            ]
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string_lossy().into_owned()))
            .collect()
        }
    }
}

// Prepend the value to the path list unless it is already a member.
fn merge_into_paths(current : &str, value : &str) -> String {
    let mut paths = path::split(current);
    if !paths.iter().any(|it| it == value) {
        paths.insert(0, value.to_string());
    }
    path::join(&paths)
}

fn session_environment(options : &InterceptOptions, address : &str) -> BTreeMap<String, String> {
    let mut environment : BTreeMap<String, String> = std::env::vars().collect();
    environment.insert(session::KEY_DESTINATION.to_string(), address.to_string());
    environment.insert(
        session::KEY_REPORTER.to_string(),
        options.executor.to_string_lossy().into_owned(),
    );
    environment.insert(
        session::KEY_LIBRARY.to_string(),
        options.library.to_string_lossy().into_owned(),
    );
    if options.verbose {
        environment.insert(session::KEY_VERBOSE.to_string(), "true".to_string());
    }
    let library = options.library.to_string_lossy().into_owned();
    let preload = environment.get(session::PRELOAD_KEY).cloned().unwrap_or_default();
    environment.insert(session::PRELOAD_KEY.to_string(), merge_into_paths(&preload, &library));
    environment
}

static CHILD_PID : AtomicI32 = AtomicI32::new(0);

extern "C" fn forward_signal(signum : libc::c_int) {
    // Runs in signal context; kill is async-signal-safe.
    let pid = CHILD_PID.load(Ordering::Relaxed);
    if pid > 0 {
        unsafe {
            libc::kill(pid, signum);
        }
    }
}

static SIGNALS_TO_FORWARD : &[Signal] = &[
    Signal::SIGABRT,
    Signal::SIGALRM,
    Signal::SIGCONT,
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGPIPE,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
];

fn install_signal_forwarding() {
    let action = SigAction::new(
        SigHandler::Handler(forward_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in SIGNALS_TO_FORWARD {
        if let Err(error) = unsafe { sigaction(*signal, &action) } {
            warn!("failed to install handler for {:?}: {}", signal, error);
        }
    }
}

/// Run the build command under interception, return its exit code.
pub fn intercept_entrypoint(options : &InterceptOptions) -> anyhow::Result<i32> {
    let program = options.command.first()
        .ok_or_else(|| anyhow::anyhow!("the build command is empty"))?;

    let collector = Collector::start()?;
    debug!("collector listens on {}", collector.address());

    let environment = session_environment(options, collector.address());
    let resolved = path::lookup(
        Path::new(program),
        environment.get("PATH").map(String::as_str),
    )
    .ok_or_else(|| anyhow::anyhow!("could not find the build command: {}", program))?;

    install_signal_forwarding();

    let mut command = Command::new(&options.executor);
    command
        .arg(session::FLAG_DESTINATION)
        .arg(collector.address());
    if options.verbose {
        command.arg(session::FLAG_VERBOSE);
    }
    command
        .arg(session::FLAG_LIBRARY)
        .arg(&options.library)
        .arg(session::FLAG_EXECUTE)
        .arg(&resolved)
        .arg(session::FLAG_COMMAND)
        .args(&options.command)
        .env_clear()
        .envs(&environment);

    let mut child = command.spawn()
        .with_context(|| format!("failed to execute the supervisor: {:?}", options.executor))?;
    CHILD_PID.store(child.id() as i32, Ordering::Relaxed);
    debug!("executed build command [pid: {}]", child.id());

    let status = child.wait()?;
    CHILD_PID.store(0, Ordering::Relaxed);
    let exit_code = status.code()
        .unwrap_or_else(|| EXIT_SIGNAL_BASE + status.signal().unwrap_or_default());
    debug!("build command exited [status: {}]", exit_code);

    let executions = collector.stop();
    debug!("collected executions [size: {}]", executions.len());

    let report = Report {
        context : Context {
            session_type : SESSION_TYPE.to_string(),
            host_info : host_info(),
        },
        executions,
    };
    report::to_file(&options.output, &report)?;

    Ok(exit_code)
}
