use anyhow::Result;
use clap::Parser;
use pyblocks_core::cli::Args;

fn main() -> Result<()> {
    let args = Args::parse();
    pyblocks_core::logging::init(args.verbose)?;
    pyblocks_core::run_cli(&args)
}
