// CLI command implementations

pub mod index;
pub mod query;
pub mod serve;
pub mod stats;

use serde::Serialize;

use crate::error::PrismError;

/// Print a query outcome as pretty JSON or through `render`. Failures print the
/// structured error and exit non-zero.
pub fn emit<T: Serialize>(result: Result<T, PrismError>, json: bool, render: impl FnOnce(&T)) -> anyhow::Result<()> {
    match result {
        Ok(value) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                render(&value);
            }
            Ok(())
        }
        Err(e) => {
            let payload = e.payload();
            if json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                eprintln!("Error ({}): {}", payload.kind, payload.message);
                if let Some(hint) = payload.hint {
                    eprintln!("\n{}", hint);
                }
            }
            std::process::exit(1);
        }
    }
}
