//! The command line entry point of the compilation database creation.
//!
//! Reads the execution report, recognizes the compiler invocations in it,
//! and writes (or extends) the compilation database. A single execution
//! that cannot be interpreted is skipped; only I/O and format problems of
//! the report or the database abort the run.

use tracing::debug;

use crate::cdb::config::Configuration;
use crate::cdb::database;
use crate::cdb::filter::EntryFilter;
use crate::cdb::options::CitnamesOptions;
use crate::cdb::report;
use crate::cdb::semantic::Transform;

pub fn citnames_entrypoint(options : &CitnamesOptions) -> anyhow::Result<()> {
    let configuration = match &options.config {
        Some(file) => { Configuration::from_file(file)? }
        None => { Configuration::from_environment(&std::env::vars().collect()) }
    };

    let report = report::from_file(&options.input)?;
    debug!("executions have been read [size: {}]", report.executions.len());

    let transform = Transform::new(&configuration);
    let entries = transform.transform(&report);
    debug!("compilation entries created [size: {}]", entries.len());

    let entries = if options.append && options.output.exists() {
        let previous = database::from_file(&options.output)?;
        debug!("previous entries have been read [size: {}]", previous.len());
        database::merge(previous, entries, &configuration.content.duplicate_filter_fields)
    } else {
        entries
    };

    let filter = EntryFilter::new(&configuration.content, options.run_checks);
    let entries : Vec<_> = entries.into_iter()
        .filter(|entry| filter.accepts(entry))
        .collect();
    debug!("compilation entries to be written [size: {}]", entries.len());

    database::to_file(&options.output, &entries, &configuration.format)?;
    Ok(())
}
