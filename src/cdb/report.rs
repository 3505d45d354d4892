//! The execution report is the file format between the two stages.
//!
//! The intercept tool writes it, the citnames tool reads it. It captures
//! every process execution the supervisors observed during the build, with
//! enough detail to re-create the command: program, arguments, working
//! directory and environment, plus the life cycle events of the run.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub context : Context,
    pub executions : Vec<Execution>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    #[serde(rename = "intercept")]
    pub session_type : String,
    pub host_info : BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub command : Command,
    pub run : Run,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub program : PathBuf,
    pub arguments : Vec<String>,
    pub working_dir : PathBuf,
    pub environment : BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid : Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ppid : Option<i64>,
    pub events : Vec<Event>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Signal,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind : EventKind,
    /// Timestamp as received; an opaque RFC3339 string, preserved verbatim.
    pub at : String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status : Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal : Option<i64>,
}

#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error("Failed to access execution report: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed execution report: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("Invalid execution at index {0}: {1}")]
    Semantic(usize, String),
}

impl Execution {
    fn validate(&self) -> Result<(), String> {
        if self.command.program.as_os_str().is_empty() {
            return Err("field 'program' is empty".to_string());
        }
        if self.command.arguments.is_empty() {
            return Err("field 'arguments' is empty".to_string());
        }
        if !self.command.working_dir.is_absolute() {
            return Err("field 'working_dir' is not an absolute path".to_string());
        }
        if let Some(first) = self.run.events.first() {
            if first.kind != EventKind::Start {
                return Err("first event is not a start event".to_string());
            }
        }
        for event in &self.run.events {
            if (event.status.is_some()) != (event.kind == EventKind::Stop) {
                return Err("field 'status' is only valid on stop events".to_string());
            }
            if (event.signal.is_some()) != (event.kind == EventKind::Signal) {
                return Err("field 'signal' is only valid on signal events".to_string());
            }
        }
        Ok(())
    }
}

fn validate(report : &Report) -> Result<(), ReportError> {
    for (index, execution) in report.executions.iter().enumerate() {
        execution.validate()
            .map_err(|cause| ReportError::Semantic(index, cause))?;
    }
    Ok(())
}

pub fn from_reader(reader : impl Read) -> Result<Report, ReportError> {
    let report : Report = serde_json::from_reader(reader)?;
    validate(&report)?;
    Ok(report)
}

pub fn from_file(file : &Path) -> Result<Report, ReportError> {
    let source = File::open(file)?;
    from_reader(BufReader::new(source))
}

pub fn to_writer(writer : impl Write, report : &Report) -> Result<(), ReportError> {
    validate(report)?;
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}

pub fn to_file(file : &Path, report : &Report) -> Result<(), ReportError> {
    let target = File::create(file)?;
    let mut writer = BufWriter::new(target);
    to_writer(&mut writer, report)?;
    writer.flush()?;
    Ok(())
}
