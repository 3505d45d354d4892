use structopt::StructOpt;

use earshot::cdb::options::SupervisorOptions;
use earshot::cdb::supervisor::supervisor_entrypoint;

fn main() -> anyhow::Result<()> {
    let options = SupervisorOptions::from_args();
    earshot::cdb::init_logging(options.verbose);

    // The supervision must be transparent: whatever happened to the child
    // is what happens to the caller.
    let exit_code = supervisor_entrypoint(&options)?;
    std::process::exit(exit_code);
}
