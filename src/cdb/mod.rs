pub mod citnames;
pub mod config;
pub mod database;
pub mod filter;
pub mod flags;
pub mod intercept;
pub mod options;
pub mod path;
pub mod report;
pub mod semantic;
pub mod session;
pub mod shell;
pub mod supervisor;
pub mod tools;
pub mod wire;

/// Install the tracing subscriber for one of the command line tools.
///
/// The `EARSHOT_LOG` environment variable takes precedence; without it the
/// verbose flag decides between debug and warning level. Diagnostics go to
/// stderr, so they never mix with the JSON the tools emit on their outputs.
pub fn init_logging(verbose : bool) {
    let filter = std::env::var("EARSHOT_LOG")
        .map(tracing_subscriber::EnvFilter::new)
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(if verbose { "debug" } else { "warn" })
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
