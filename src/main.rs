//! homemetrics CLI entry point.

use homemetrics_lib::cli::{self, Cli};
use homemetrics_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
