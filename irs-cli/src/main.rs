//! irs - incident response orchestrator.

use anyhow::Result;
use irs_core::config::init_logging;
use irs_lib::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.log_level.as_deref())?;
    cli.run()
}
