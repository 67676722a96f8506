//! chisel binary.

use std::process::ExitCode;

use chisel::dispatch::{execute, parse_command};
use chisel::run::init_logging;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let command = match parse_command(std::env::args_os()) {
        Ok(command) => command,
        Err(e) => {
            init_logging(false);
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(command.verbose());
    match execute(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
