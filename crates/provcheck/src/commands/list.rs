//! List command implementation
//!
//! Prints the names of the available scenarios, one per line, in execution
//! order.

use anyhow::Result;
use provcheck_core::scenarios;

use crate::cli::OutputFormat;

/// Execute the list command
pub fn execute_list(output: OutputFormat) -> Result<()> {
    let names: Vec<&'static str> = scenarios::all().iter().map(|s| s.name()).collect();

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&names)?),
        OutputFormat::Text => {
            for name in names {
                println!("{}", name);
            }
        }
    }
    Ok(())
}
