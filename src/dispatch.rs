//! Mode selection and per-mode entry points.

use std::ffi::OsString;

use chisel_core::{ChiselError, Result, ShutdownOutcome};
use clap::Parser;
use tracing::debug;

use crate::cli::{ClientArgs, ServerArgs, TopLevelArgs};
use crate::resolve::{ProcessEnv, ServerPlan, resolve_client, resolve_server};
use crate::run;
use crate::{BUILD_VERSION, usage};

/// What the process was asked to do.
#[derive(Debug, Clone)]
pub enum Command {
    /// Print the version.
    Version,
    /// Print the top-level usage.
    Usage,
    /// Print a mode's help text.
    Help(String),
    /// Run in server mode.
    Server(ServerArgs),
    /// Run in client mode.
    Client(ClientArgs),
}

impl Command {
    /// Returns true when `-v` was given to a mode.
    #[must_use]
    pub fn verbose(&self) -> bool {
        match self {
            Self::Server(args) => args.verbose,
            Self::Client(args) => args.verbose,
            Self::Version | Self::Usage | Self::Help(_) => false,
        }
    }
}

/// Parses the full argument vector, binary name included.
///
/// # Errors
/// Returns a configuration error for malformed flags.
pub fn parse_command<I, T>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let top = TopLevelArgs::try_parse_from(args)
        .map_err(|e| ChiselError::config(e.to_string().trim_end().to_string()))?;

    if top.version {
        return Ok(Command::Version);
    }
    if top.help {
        return Ok(Command::Usage);
    }

    let Some((mode, rest)) = top.rest.split_first() else {
        return Ok(Command::Usage);
    };
    match mode.as_str() {
        "server" => parse_mode(ServerArgs::try_parse_from(rest), Command::Server),
        "client" => parse_mode(ClientArgs::try_parse_from(rest), Command::Client),
        _ => Ok(Command::Usage),
    }
}

fn parse_mode<A>(
    parsed: std::result::Result<A, clap::Error>,
    wrap: impl FnOnce(A) -> Command,
) -> Result<Command> {
    match parsed {
        Ok(args) => Ok(wrap(args)),
        // --help is reported as an error that belongs on stdout.
        Err(e) if !e.use_stderr() => Ok(Command::Help(e.render().to_string())),
        Err(e) => Err(ChiselError::config(e.to_string().trim_end().to_string())),
    }
}

/// Runs a parsed command to completion.
///
/// # Errors
/// Returns configuration, start and PID-file failures. A timed-out close is
/// not an error.
pub async fn execute(command: Command) -> Result<()> {
    match command {
        Command::Version => println!("{BUILD_VERSION}"),
        Command::Usage => print!("{}", usage()),
        Command::Help(text) => print!("{text}"),
        Command::Server(args) => match resolve_server(args, &ProcessEnv)? {
            ServerPlan::KeyGen { path, seed } => chisel_tunnel::generate_key_file(&path, &seed)?,
            ServerPlan::Serve(launch) => finished(run::serve(launch).await?),
        },
        Command::Client(args) => {
            let launch = resolve_client(args, &ProcessEnv)?;
            finished(run::connect(launch).await?);
        }
    }
    Ok(())
}

fn finished(outcome: ShutdownOutcome) {
    debug!(?outcome, "supervisor finished");
}
