use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serial_test::serial;
use tempfile::tempdir;

use earshot::cdb::citnames::citnames_entrypoint;
use earshot::cdb::database;
use earshot::cdb::options::CitnamesOptions;
use earshot::cdb::report::{Command, Context, Event, EventKind, Execution, Report, Run};

fn strings(input : &[&str]) -> Vec<String> {
    input.iter().map(|it| it.to_string()).collect()
}

fn execution(program : &str, arguments : &[&str], working_dir : &Path) -> Execution {
    execution_with_environment(program, arguments, working_dir, BTreeMap::new())
}

fn execution_with_environment(
    program : &str,
    arguments : &[&str],
    working_dir : &Path,
    environment : BTreeMap<String, String>,
) -> Execution {
    Execution {
        command : Command {
            program : PathBuf::from(program),
            arguments : strings(arguments),
            working_dir : working_dir.to_path_buf(),
            environment,
        },
        run : Run {
            pid : Some(42),
            ppid : Some(12),
            events : vec![
                Event {
                    kind : EventKind::Start,
                    at : "2020-04-04T07:13:47.027000Z".to_string(),
                    status : None,
                    signal : None,
                },
                Event {
                    kind : EventKind::Stop,
                    at : "2020-04-04T07:13:47.074000Z".to_string(),
                    status : Some(0),
                    signal : None,
                },
            ],
        },
    }
}

fn report_of(executions : Vec<Execution>) -> Report {
    Report {
        context : Context {
            session_type : "library preload".to_string(),
            host_info : BTreeMap::new(),
        },
        executions,
    }
}

fn options(input : &Path, output : &Path) -> CitnamesOptions {
    CitnamesOptions {
        input : input.to_path_buf(),
        output : output.to_path_buf(),
        config : None,
        append : false,
        run_checks : false,
        verbose : false,
    }
}

fn run_citnames(report : &Report, options : &CitnamesOptions) -> anyhow::Result<Vec<database::Entry>> {
    earshot::cdb::report::to_file(&options.input, report)?;
    citnames_entrypoint(options)?;
    Ok(database::from_file(&options.output)?)
}

#[test]
fn test_simple_compilation() -> anyhow::Result<()> {
    let workspace = tempdir()?;
    let project = workspace.path().join("project");
    std::fs::create_dir_all(&project)?;
    let input = workspace.path().join("events.json");
    let output = workspace.path().join("compile_commands.json");

    let report = report_of(vec![execution(
        "/usr/bin/cc",
        &["cc", "-c", "hello.c", "-o", "hello.o", "-I", "inc"],
        &project,
    )]);
    let entries = run_citnames(&report, &options(&input, &output))?;

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file, project.join("hello.c"));
    assert_eq!(entries[0].directory, project);
    assert_eq!(entries[0].output, Some(project.join("hello.o")));
    assert_eq!(
        entries[0].arguments,
        strings(&["/usr/bin/cc", "-c", "hello.c", "-o", "hello.o", "-I", "inc"])
    );
    Ok(())
}

#[test]
fn test_multiple_sources() -> anyhow::Result<()> {
    let workspace = tempdir()?;
    let project = workspace.path().to_path_buf();
    let input = project.join("events.json");
    let output = project.join("compile_commands.json");

    let report = report_of(vec![execution("/usr/bin/cc", &["cc", "-c", "a.c", "b.c"], &project)]);
    let entries = run_citnames(&report, &options(&input, &output))?;

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].file, project.join("a.c"));
    assert_eq!(entries[0].arguments, strings(&["/usr/bin/cc", "-c", "a.c"]));
    assert_eq!(entries[0].output, None);
    assert_eq!(entries[1].file, project.join("b.c"));
    assert_eq!(entries[1].arguments, strings(&["/usr/bin/cc", "-c", "b.c"]));
    Ok(())
}

#[test]
fn test_non_compilations_produce_no_entries() -> anyhow::Result<()> {
    let workspace = tempdir()?;
    let project = workspace.path().to_path_buf();
    let input = project.join("events.json");
    let output = project.join("compile_commands.json");

    let report = report_of(vec![
        // link step
        execution("/usr/bin/cc", &["cc", "a.o", "b.o", "-lm", "-o", "app"], &project),
        // dependency generation
        execution("/usr/bin/cc", &["cc", "-M", "-MF", "deps.d", "a.c"], &project),
        // preprocessing only
        execution("/usr/bin/cc", &["cc", "-E", "a.c", "-o", "a.i"], &project),
        // not a compiler at all
        execution("/usr/bin/make", &["make", "all"], &project),
        // unparsable invocation, skipped without failing the run
        execution("/usr/bin/cc", &["cc", "-c", "a.c", "-o"], &project),
    ]);
    let entries = run_citnames(&report, &options(&input, &output))?;

    assert_eq!(entries, vec![]);
    Ok(())
}

#[test]
fn test_environment_include_paths() -> anyhow::Result<()> {
    let workspace = tempdir()?;
    let project = workspace.path().to_path_buf();
    let input = project.join("events.json");
    let output = project.join("compile_commands.json");

    let environment : BTreeMap<String, String> =
        vec![("CPATH".to_string(), "inc:other".to_string())]
            .into_iter()
            .collect();
    let report = report_of(vec![execution_with_environment(
        "/usr/bin/cc",
        &["cc", "-c", "a.c"],
        &project,
        environment,
    )]);
    let entries = run_citnames(&report, &options(&input, &output))?;

    assert_eq!(
        entries[0].arguments,
        strings(&["/usr/bin/cc", "-c", "a.c", "-I", "inc", "-I", "other"])
    );
    Ok(())
}

#[test]
fn test_append_merges_without_duplicates() -> anyhow::Result<()> {
    let workspace = tempdir()?;
    let project = workspace.path().to_path_buf();
    let input = project.join("events.json");
    let output = project.join("compile_commands.json");

    let report = report_of(vec![execution("/usr/bin/cc", &["cc", "-c", "a.c"], &project)]);
    let entries = run_citnames(&report, &options(&input, &output))?;
    assert_eq!(entries.len(), 1);

    // The second build compiles the same file again, and one more.
    let report = report_of(vec![
        execution("/usr/bin/cc", &["cc", "-c", "a.c"], &project),
        execution("/usr/bin/cc", &["cc", "-c", "b.c"], &project),
    ]);
    let mut append_options = options(&input, &output);
    append_options.append = true;
    let entries = run_citnames(&report, &append_options)?;

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].file, project.join("a.c"));
    assert_eq!(entries[1].file, project.join("b.c"));
    Ok(())
}

#[test]
fn test_run_checks_drops_missing_sources() -> anyhow::Result<()> {
    let workspace = tempdir()?;
    let project = workspace.path().to_path_buf();
    let input = project.join("events.json");
    let output = project.join("compile_commands.json");
    std::fs::write(project.join("present.c"), "int main() { return 0; }")?;

    let report = report_of(vec![
        execution("/usr/bin/cc", &["cc", "-c", "present.c"], &project),
        execution("/usr/bin/cc", &["cc", "-c", "absent.c"], &project),
    ]);
    let mut checked_options = options(&input, &output);
    checked_options.run_checks = true;
    let entries = run_citnames(&report, &checked_options)?;

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file, project.join("present.c"));
    Ok(())
}

#[test]
fn test_command_output_format() -> anyhow::Result<()> {
    let workspace = tempdir()?;
    let project = workspace.path().to_path_buf();
    let input = project.join("events.json");
    let output = project.join("compile_commands.json");
    let config = project.join("config.json");
    std::fs::write(&config, r#"{ "format": { "command_as_array": false } }"#)?;

    let report = report_of(vec![execution("/usr/bin/cc", &["cc", "-c", "a.c"], &project)]);
    let mut configured_options = options(&input, &output);
    configured_options.config = Some(config);
    earshot::cdb::report::to_file(&input, &report)?;
    citnames_entrypoint(&configured_options)?;

    let content : Vec<serde_json::Value> =
        serde_json::from_reader(std::fs::File::open(&output)?)?;
    assert_eq!(
        content[0].get("command").and_then(serde_json::Value::as_str),
        Some("/usr/bin/cc -c a.c")
    );
    assert!(content[0].get("arguments").is_none());
    Ok(())
}

#[test]
#[serial] // changes the process environment
fn test_compilers_from_the_environment() -> anyhow::Result<()> {
    let workspace = tempdir()?;
    let project = workspace.path().to_path_buf();
    let input = project.join("events.json");
    let output = project.join("compile_commands.json");

    std::env::set_var("CC", "my-secret-compiler");
    let report = report_of(vec![execution(
        "/opt/bin/my-secret-compiler",
        &["my-secret-compiler", "-c", "a.c"],
        &project,
    )]);
    let entries = run_citnames(&report, &options(&input, &output));
    std::env::remove_var("CC");

    assert_eq!(entries?.len(), 1);
    Ok(())
}

#[test]
fn test_wrapped_compilations_are_recognized() -> anyhow::Result<()> {
    let workspace = tempdir()?;
    let project = workspace.path().to_path_buf();
    let input = project.join("events.json");
    let output = project.join("compile_commands.json");

    let report = report_of(vec![execution(
        "/usr/bin/ccache",
        &["ccache", "gcc", "-c", "a.c"],
        &project,
    )]);
    let entries = run_citnames(&report, &options(&input, &output))?;

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].arguments, strings(&["gcc", "-c", "a.c"]));
    Ok(())
}

#[test]
fn test_missing_input_is_an_error() {
    let result = citnames_entrypoint(&options(
        Path::new("/no/such/events.json"),
        Path::new("/tmp/should-not-be-written.json"),
    ));
    assert!(result.is_err());
}
