use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let parsed = cli::Cli::parse();

    match parsed.dispatch().await {
        Ok(()) => Ok(()),
        Err(err) => {
            // Failed scenarios were already reported; only the exit code is left
            if let Some(failed) = err.downcast_ref::<commands::run::SuiteFailed>() {
                tracing::debug!("{}", failed);
                std::process::exit(1);
            }

            Err(err)
        }
    }
}
