use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(about = "Create a compilation database from an execution report")]
pub struct CitnamesOptions {
    #[structopt(short = "i", long = "input", help = "A file containing the execution report of a build")]
    pub input : PathBuf,
    #[structopt(short = "o", long = "output", help = "The compilation database file to create")]
    pub output : PathBuf,
    #[structopt(short = "c", long = "config", help = "A configuration file to use instead of the defaults")]
    pub config : Option<PathBuf>,
    #[structopt(short = "a", long = "append", help = "Extend an existing compilation database instead of replacing it")]
    pub append : bool,
    #[structopt(long = "run-checks", help = "Keep only entries whose source file exists and passes the path filters")]
    pub run_checks : bool,
    #[structopt(long = "verbose", help = "Enable verbose logging")]
    pub verbose : bool,
}

#[derive(Debug, StructOpt)]
#[structopt(about = "Run a build command and record every process execution of it")]
pub struct InterceptOptions {
    #[structopt(short = "o", long = "output", help = "The file to save the execution report to")]
    pub output : PathBuf,
    #[structopt(short = "l", long = "library", help = "Path to the preload shim library")]
    pub library : PathBuf,
    #[structopt(short = "e", long = "executor", help = "Path to the supervisor executable")]
    pub executor : PathBuf,
    #[structopt(long = "verbose", help = "Enable verbose logging, also inside the intercepted processes")]
    pub verbose : bool,
    #[structopt(last = true, help = "The build command to run")]
    pub command : Vec<String>,
}

#[derive(Debug, StructOpt)]
#[structopt(about = "Execute a single command and report its life cycle events")]
pub struct SupervisorOptions {
    #[structopt(long = "session-destination", help = "Address of the event collector")]
    pub destination : String,
    #[structopt(long = "session-library", help = "Path to the preload shim library of the session")]
    pub library : Option<PathBuf>,
    #[structopt(long = "session-verbose", help = "Enable verbose logging")]
    pub verbose : bool,
    #[structopt(long = "exec-path", help = "The resolved path of the program to execute")]
    pub exec_path : PathBuf,
    #[structopt(last = true, help = "The original argument list of the program")]
    pub command : Vec<String>,
}
