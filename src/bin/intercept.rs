use structopt::StructOpt;

use earshot::cdb::intercept::intercept_entrypoint;
use earshot::cdb::options::InterceptOptions;

fn main() -> anyhow::Result<()> {
    let options = InterceptOptions::from_args();
    earshot::cdb::init_logging(options.verbose);

    // The tool exits with the exit code of the build command.
    let exit_code = intercept_entrypoint(&options)?;
    std::process::exit(exit_code);
}
