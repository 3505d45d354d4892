//! From recognized executions to compilation database entries.
//!
//! One execution can produce several entries (one per source file), or none
//! at all: link steps, dependency generation, preprocessor runs and help or
//! version queries compile nothing. A single execution that fails to parse
//! is logged and skipped; it never fails the whole run.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cdb::config::{Configuration, Content};
use crate::cdb::database::Entry;
use crate::cdb::flags;
use crate::cdb::path;
use crate::cdb::report::{Command, Report};
use crate::cdb::tools::{Recognition, Recognizer};

pub struct Transform {
    recognizer : Recognizer,
    content : Content,
}

// Launcher wrappers put the real compiler into the first argument. Peel
// them off until a compiler (or something unrecognizable) surfaces.
fn peel_wrappers(recognizer : &Recognizer, command : &Command) -> Option<(PathBuf, Vec<String>)> {
    let mut program = command.program.clone();
    let mut arguments = command.arguments.clone();

    loop {
        match recognizer.recognize(&program) {
            Recognition::Compiler => {
                return Some((program, arguments));
            }
            Recognition::Wrapper if arguments.len() > 1 => {
                debug!("peeling wrapper: {:?}", program);
                arguments.remove(0);
                program = PathBuf::from(&arguments[0]);
            }
            _ => {
                return None;
            }
        }
    }
}

fn absolutize(directory : &Path, candidate : PathBuf) -> PathBuf {
    if candidate.is_absolute() {
        candidate
    } else {
        path::concat(directory, &candidate)
    }
}

impl Transform {
    pub fn new(configuration : &Configuration) -> Transform {
        Transform {
            recognizer : Recognizer::new(&configuration.compilers),
            content : configuration.content.clone(),
        }
    }

    pub fn transform(&self, report : &Report) -> Vec<Entry> {
        report.executions.iter()
            .flat_map(|execution| self.entries_of(&execution.command))
            .collect()
    }

    /// The entries of a single execution. Empty when the execution was not
    /// a compilation.
    pub fn entries_of(&self, command : &Command) -> Vec<Entry> {
        if command.arguments.is_empty() {
            return vec![];
        }
        let (program, arguments) = match peel_wrappers(&self.recognizer, command) {
            None => {
                return vec![];
            }
            Some(compiler) => { compiler }
        };
        debug!("recognized as a compiler execution: {:?}", program);

        let flags = match flags::parse_with_environment(&arguments[1..], &command.environment) {
            Err(error) => {
                debug!("execution skipped: {}", error);
                return vec![];
            }
            Ok(flags) => { flags }
        };
        if !flags::runs_compilation_pass(&flags) {
            debug!("execution does not run a compilation pass");
            return vec![];
        }
        if flags::asks_preprocessing_only(&flags) {
            debug!("execution stops after preprocessing");
            return vec![];
        }
        let sources = flags::source_files(&flags);
        if sources.is_empty() {
            debug!("no source files in the execution");
            return vec![];
        }
        if !command.working_dir.is_absolute() {
            debug!("execution has a relative working directory, dropped");
            return vec![];
        }
        let output = flags::output_file(&flags);

        sources.iter()
            .map(|source| {
                let mut arguments = flags::filter_arguments(&flags, source);
                arguments.insert(0, program.to_string_lossy().into_owned());

                let entry = Entry {
                    file : absolutize(&command.working_dir, source.clone()),
                    directory : command.working_dir.clone(),
                    output : output.clone().map(|it| absolutize(&command.working_dir, it)),
                    arguments,
                };
                self.relativize(entry)
            })
            .collect()
    }

    // Rewrite the file and output paths relative to the configured root.
    // The directory stays absolute; the entries would be unusable otherwise.
    fn relativize(&self, entry : Entry) -> Entry {
        match &self.content.relative_to {
            None => { entry }
            Some(root) => {
                Entry {
                    file : path::relative(&entry.file, root),
                    output : entry.output.as_ref().map(|it| path::relative(it, root)),
                    directory : entry.directory,
                    arguments : entry.arguments,
                }
            }
        }
    }
}
