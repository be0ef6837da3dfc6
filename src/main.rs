//! reposerve CLI entry point
//!
//! Parses arguments, installs the log subscriber and runs one request
//! against the manifest service. Failures are printed with suggestions and
//! exit with status 1.

use clap::Parser;
use reposerve::cli;
use reposerve::core::error::user_friendly_error;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    cli.init_logging();

    if let Err(e) = cli.execute().await {
        let error_ctx = user_friendly_error(e);
        error_ctx.display();
        std::process::exit(1);
    }
}
