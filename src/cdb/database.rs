//! Reading and writing of the JSON compilation database.
//!
//! The on-disk format is the array-of-objects form that clang tooling
//! consumes: each object names a source `file`, the `directory` the compiler
//! ran in, the invocation either as an `arguments` array or a `command`
//! string, and optionally the `output` file.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cdb::config::Format;
use crate::cdb::shell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub file : PathBuf,
    pub directory : PathBuf,
    pub output : Option<PathBuf>,
    pub arguments : Vec<String>,
}

/// The entry attributes that duplicate detection can compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryField {
    File,
    Directory,
    Output,
    Arguments,
}

impl EntryField {
    pub fn all() -> Vec<EntryField> {
        vec![
            EntryField::File,
            EntryField::Directory,
            EntryField::Output,
            EntryField::Arguments,
        ]
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to access compilation database: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed compilation database: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("Invalid entry at index {0}: {1}")]
    Format(usize, String),
}

fn entry_to_json(entry : &Entry, format : &Format) -> Value {
    let mut json = json!({
        "file": entry.file,
        "directory": entry.directory,
    });
    if !format.drop_output_field {
        if let Some(output) = &entry.output {
            json["output"] = json!(output);
        }
    }
    if format.command_as_array {
        json["arguments"] = json!(entry.arguments);
    } else {
        json["command"] = json!(shell::join(&entry.arguments));
    }
    json
}

fn string_field(value : &Value, key : &str, index : usize) -> Result<String, DatabaseError> {
    value.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DatabaseError::Format(index, format!("field '{}' is missing or not a string", key)))
}

fn arguments_field(value : &Value, index : usize) -> Result<Vec<String>, DatabaseError> {
    match (value.get("arguments"), value.get("command")) {
        (Some(_), Some(_)) => {
            Err(DatabaseError::Format(index, "fields 'arguments' and 'command' are both present".to_string()))
        }
        (Some(arguments), None) => {
            let list = arguments.as_array()
                .ok_or_else(|| DatabaseError::Format(index, "field 'arguments' is not an array".to_string()))?;
            list.iter()
                .map(|it| {
                    it.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| DatabaseError::Format(index, "field 'arguments' contains a non string".to_string()))
                })
                .collect()
        }
        (None, Some(command)) => {
            let line = command.as_str()
                .ok_or_else(|| DatabaseError::Format(index, "field 'command' is not a string".to_string()))?;
            shell::split(line)
                .map_err(|error| DatabaseError::Format(index, error.to_string()))
        }
        (None, None) => {
            Err(DatabaseError::Format(index, "field 'arguments' or 'command' not found".to_string()))
        }
    }
}

fn validate(entry : &Entry, index : usize) -> Result<(), DatabaseError> {
    if entry.file.as_os_str().is_empty() {
        return Err(DatabaseError::Format(index, "field 'file' is empty".to_string()));
    }
    if entry.directory.as_os_str().is_empty() {
        return Err(DatabaseError::Format(index, "field 'directory' is empty".to_string()));
    }
    if let Some(output) = &entry.output {
        if output.as_os_str().is_empty() {
            return Err(DatabaseError::Format(index, "field 'output' is empty".to_string()));
        }
    }
    if entry.arguments.is_empty() {
        return Err(DatabaseError::Format(index, "field 'arguments' is empty".to_string()));
    }
    Ok(())
}

fn entry_from_json(value : &Value, index : usize) -> Result<Entry, DatabaseError> {
    let file = string_field(value, "file", index)?;
    let directory = string_field(value, "directory", index)?;
    let output = match value.get("output") {
        None => None,
        Some(output) => {
            let path = output.as_str()
                .ok_or_else(|| DatabaseError::Format(index, "field 'output' is not a string".to_string()))?;
            Some(PathBuf::from(path))
        }
    };
    let arguments = arguments_field(value, index)?;

    let entry = Entry {
        file : PathBuf::from(file),
        directory : PathBuf::from(directory),
        output,
        arguments,
    };
    validate(&entry, index)?;
    Ok(entry)
}

pub fn from_reader(reader : impl std::io::Read) -> Result<Vec<Entry>, DatabaseError> {
    let array : Vec<Value> = serde_json::from_reader(reader)?;
    array.iter()
        .enumerate()
        .map(|(index, value)| entry_from_json(value, index))
        .collect()
}

pub fn from_file(file : &Path) -> Result<Vec<Entry>, DatabaseError> {
    let source = File::open(file)?;
    from_reader(BufReader::new(source))
}

pub fn to_writer(writer : impl std::io::Write, entries : &[Entry], format : &Format) -> Result<(), DatabaseError> {
    let array : Vec<Value> = entries.iter()
        .map(|entry| entry_to_json(entry, format))
        .collect();
    serde_json::to_writer_pretty(writer, &array)?;
    Ok(())
}

/// Write the database atomically.
///
/// The content goes to a temporary file in the target directory first, then
/// replaces the target with a rename. A failed run never leaves a truncated
/// database behind.
pub fn to_file(file : &Path, entries : &[Entry], format : &Format) -> Result<(), DatabaseError> {
    let directory = file.parent().unwrap_or_else(|| Path::new("."));
    let temporary = tempfile::NamedTempFile::new_in(directory)?;
    to_writer(&temporary, entries, format)?;
    temporary.persist(file).map_err(|error| error.error)?;
    Ok(())
}

fn equal_on(fields : &[EntryField], lhs : &Entry, rhs : &Entry) -> bool {
    fields.iter().all(|field| {
        match field {
            EntryField::File => { lhs.file == rhs.file }
            EntryField::Directory => { lhs.directory == rhs.directory }
            EntryField::Output => { lhs.output == rhs.output }
            EntryField::Arguments => { lhs.arguments == rhs.arguments }
        }
    })
}

/// Extend `old` with the elements of `new` that are not already present.
///
/// Presence is equality restricted to the configured duplicate filter
/// fields. The order of `old` is kept, appended entries keep the order
/// they have in `new`.
pub fn merge(old : Vec<Entry>, new : Vec<Entry>, fields : &[EntryField]) -> Vec<Entry> {
    let mut result = old;
    for candidate in new {
        if !result.iter().any(|present| equal_on(fields, present, &candidate)) {
            result.push(candidate);
        }
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(file : &str) -> Entry {
        Entry {
            file : PathBuf::from(file),
            directory : PathBuf::from("/home/user/project"),
            output : None,
            arguments : vec!["cc".to_string(), "-c".to_string(), file.to_string()],
        }
    }

    #[test]
    fn reads_arguments_form() -> anyhow::Result<()> {
        let input = r#"[
            { "file": "hello.c",
              "directory": "/home/user/project",
              "arguments": ["cc", "-c", "hello.c"] }
        ]"#;

        let entries = from_reader(input.as_bytes())?;
        assert_eq!(entries, vec![entry("hello.c")]);
        Ok(())
    }

    #[test]
    fn reads_command_form() -> anyhow::Result<()> {
        let input = r#"[
            { "file": "hello.c",
              "directory": "/home/user/project",
              "command": "cc -c hello.c" }
        ]"#;

        let entries = from_reader(input.as_bytes())?;
        assert_eq!(entries, vec![entry("hello.c")]);
        Ok(())
    }

    #[test]
    fn rejects_entry_without_invocation() {
        let input = r#"[
            { "file": "hello.c", "directory": "/home/user/project" }
        ]"#;

        match from_reader(input.as_bytes()) {
            Err(DatabaseError::Format(0, _)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn rejects_entry_with_both_invocation_forms() {
        let input = r#"[
            { "file": "ok.c", "directory": "/dir", "arguments": ["cc", "-c", "ok.c"] },
            { "file": "hello.c",
              "directory": "/home/user/project",
              "command": "cc -c hello.c",
              "arguments": ["cc", "-c", "hello.c"] }
        ]"#;

        match from_reader(input.as_bytes()) {
            Err(DatabaseError::Format(1, _)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn rejects_empty_fields() {
        let input = r#"[
            { "file": "", "directory": "/dir", "arguments": ["cc"] }
        ]"#;

        assert!(matches!(from_reader(input.as_bytes()), Err(DatabaseError::Format(0, _))));
    }

    #[test]
    fn writes_arguments_or_command_per_format() -> anyhow::Result<()> {
        let entries = vec![entry("hello.c")];

        let mut buffer = Vec::new();
        to_writer(&mut buffer, &entries, &Format { command_as_array : true, drop_output_field : false })?;
        let value : Vec<Value> = serde_json::from_slice(&buffer)?;
        assert!(value[0].get("arguments").is_some());
        assert!(value[0].get("command").is_none());

        let mut buffer = Vec::new();
        to_writer(&mut buffer, &entries, &Format { command_as_array : false, drop_output_field : false })?;
        let value : Vec<Value> = serde_json::from_slice(&buffer)?;
        assert_eq!(value[0].get("command").and_then(Value::as_str), Some("cc -c hello.c"));
        Ok(())
    }

    #[test]
    fn drops_output_field_on_request() -> anyhow::Result<()> {
        let mut with_output = entry("hello.c");
        with_output.output = Some(PathBuf::from("hello.o"));

        let mut buffer = Vec::new();
        to_writer(&mut buffer, &[with_output], &Format { command_as_array : true, drop_output_field : true })?;
        let value : Vec<Value> = serde_json::from_slice(&buffer)?;
        assert!(value[0].get("output").is_none());
        Ok(())
    }

    #[test]
    fn merge_keeps_old_entries_first_and_appends_new_ones() {
        let old = vec![entry("a.c")];
        let new = vec![entry("a.c"), entry("b.c")];

        let result = merge(old, new, &EntryField::all());
        assert_eq!(result, vec![entry("a.c"), entry("b.c")]);
    }

    #[test]
    fn merge_equality_respects_configured_fields() {
        let mut same_file_different_flags = entry("a.c");
        same_file_different_flags.arguments.push("-O2".to_string());

        let result = merge(
            vec![entry("a.c")],
            vec![same_file_different_flags.clone()],
            &[EntryField::File],
        );
        assert_eq!(result, vec![entry("a.c")]);

        let result = merge(
            vec![entry("a.c")],
            vec![same_file_different_flags.clone()],
            &EntryField::all(),
        );
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn round_trip_through_files() -> anyhow::Result<()> {
        let directory = tempfile::tempdir()?;
        let target = directory.path().join("compile_commands.json");
        let entries = vec![entry("a.c"), entry("b.c")];

        to_file(&target, &entries, &Format::default())?;
        let read_back = from_file(&target)?;

        assert_eq!(entries, read_back);
        Ok(())
    }
}
