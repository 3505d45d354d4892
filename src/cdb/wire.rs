//! The event protocol between the supervisors and the collector.
//!
//! Each supervisor opens one connection and sends newline delimited JSON
//! envelopes over it. The connection scopes the stream: everything received
//! on one connection belongs to one supervised process. The transport is a
//! loopback TCP socket; only the message schema and the in-stream ordering
//! carry meaning.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub timestamp : String,
    pub event : SuperviseEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SuperviseEvent {
    Started {
        pid : i64,
        ppid : i64,
        executable : PathBuf,
        arguments : Vec<String>,
        working_dir : PathBuf,
        environment : BTreeMap<String, String>,
    },
    Stopped {
        status : i64,
    },
    Signalled {
        signal : i64,
    },
}

/// Current time in the format the execution report uses.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn write_envelope(writer : &mut impl Write, envelope : &Envelope) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *writer, envelope)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read the envelopes of one connection until the peer closes it.
///
/// A line that does not decode stops the stream; the supervisor on the
/// other end is not going to produce anything sensible after that.
pub fn read_envelopes(reader : impl BufRead) -> impl Iterator<Item = anyhow::Result<Envelope>> {
    reader.lines().map(|line| {
        let line = line?;
        let envelope = serde_json::from_str(&line)?;
        Ok(envelope)
    })
}
