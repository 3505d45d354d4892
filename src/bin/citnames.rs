use structopt::StructOpt;

use earshot::cdb::citnames::citnames_entrypoint;
use earshot::cdb::options::CitnamesOptions;

fn main() -> anyhow::Result<()> {
    let options = CitnamesOptions::from_args();
    earshot::cdb::init_logging(options.verbose);

    citnames_entrypoint(&options)
}
