//! keystone - dependency-aware builds for package monorepos

use std::process::ExitCode;

fn main() -> ExitCode {
    match keystone::cli::run() {
        Ok(status) if status.is_failure() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
