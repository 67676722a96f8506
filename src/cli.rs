//! Command-line surface.
//!
//! The top level only looks for `--version`/`--help` and the mode word; each
//! mode then parses its own arguments with a `no_binary_name` parser so the
//! dispatcher decides which one runs.

use std::time::Duration;

use clap::Parser;

/// Top-level arguments: `chisel [--version] [--help] [command] [args...]`.
#[derive(Debug, Parser)]
#[command(
    name = "chisel",
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct TopLevelArgs {
    /// Print the version and exit.
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Print usage and exit.
    #[arg(short = 'h', long)]
    pub help: bool,

    /// Mode word followed by its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 1..)]
    pub rest: Vec<String>,
}

/// `chisel server` arguments.
#[derive(Debug, Clone, Parser)]
#[command(name = "chisel server", no_binary_name = true, about = "Runs chisel in server mode")]
pub struct ServerArgs {
    /// Interface to listen on (env HOST, default 0.0.0.0).
    #[arg(long, default_value = "")]
    pub host: String,

    /// Port to listen on (env PORT, default 8080).
    #[arg(long, default_value = "")]
    pub port: String,

    /// Alias of --port.
    #[arg(short = 'p', value_name = "PORT", default_value = "")]
    pub port_short: String,

    /// Deprecated seed for the key material (env CHISEL_KEY).
    #[arg(long, default_value = "")]
    pub key: String,

    /// Private key file (env CHISEL_KEY_FILE).
    #[arg(long = "keyfile", default_value = "")]
    pub key_file: String,

    /// Users file.
    #[arg(long = "authfile", default_value = "")]
    pub auth_file: String,

    /// `user:pass` credential (env AUTH).
    #[arg(long, default_value = "")]
    pub auth: String,

    /// Keep-alive interval.
    #[arg(long = "keepalive", default_value = "25s", value_parser = humantime::parse_duration)]
    pub keep_alive: Duration,

    /// Reverse proxy target for plain HTTP requests.
    #[arg(long, default_value = "")]
    pub proxy: String,

    /// Alias of --proxy; wins when both are set.
    #[arg(long, default_value = "")]
    pub backend: String,

    /// Allow clients to use the internal SOCKS5 proxy.
    #[arg(long)]
    pub socks5: bool,

    /// Allow clients to open reverse port forwards.
    #[arg(long)]
    pub reverse: bool,

    /// TLS private key.
    #[arg(long = "tls-key", default_value = "")]
    pub tls_key: String,

    /// TLS certificate.
    #[arg(long = "tls-cert", default_value = "")]
    pub tls_cert: String,

    /// Domain to accept for automatic certificates (repeatable).
    #[arg(long = "tls-domain")]
    pub tls_domain: Vec<String>,

    /// CA bundle for client certificate verification.
    #[arg(long = "tls-ca", default_value = "")]
    pub tls_ca: String,

    /// Write the process id to chisel.pid.
    #[arg(long)]
    pub pid: bool,

    /// Verbose logging.
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Write a new private key to this path ("-" for stdout) and exit.
    #[arg(long = "keygen", default_value = "")]
    pub key_gen: String,
}

/// `chisel client` arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "chisel client",
    no_binary_name = true,
    about = "Runs chisel in client mode"
)]
pub struct ClientArgs {
    /// Expected server key fingerprint.
    #[arg(long, default_value = "")]
    pub fingerprint: String,

    /// `user:pass` credential (env AUTH).
    #[arg(long, default_value = "")]
    pub auth: String,

    /// Keep-alive interval.
    #[arg(long = "keepalive", default_value = "25s", value_parser = humantime::parse_duration)]
    pub keep_alive: Duration,

    /// Maximum connection attempts; -1 is unlimited.
    #[arg(
        long = "max-retry-count",
        default_value_t = -1,
        allow_negative_numbers = true
    )]
    pub max_retry_count: i32,

    /// Maximum delay between attempts; 0s selects the default.
    #[arg(long = "max-retry-interval", default_value = "0s", value_parser = humantime::parse_duration)]
    pub max_retry_interval: Duration,

    /// Upstream HTTP CONNECT or SOCKS proxy.
    #[arg(long, default_value = "")]
    pub proxy: String,

    /// CA bundle for server verification.
    #[arg(long = "tls-ca", default_value = "")]
    pub tls_ca: String,

    /// Skip server certificate verification.
    #[arg(long = "tls-skip-verify")]
    pub tls_skip_verify: bool,

    /// Client certificate.
    #[arg(long = "tls-cert", default_value = "")]
    pub tls_cert: String,

    /// Client private key.
    #[arg(long = "tls-key", default_value = "")]
    pub tls_key: String,

    /// Extra request header, `Name: Value` (repeatable).
    #[arg(long)]
    pub header: Vec<String>,

    /// Host header and TLS server name.
    #[arg(long, default_value = "")]
    pub hostname: String,

    /// TLS server name, overriding --hostname.
    #[arg(long, default_value = "")]
    pub sni: String,

    /// Write the process id to chisel.pid.
    #[arg(long)]
    pub pid: bool,

    /// Verbose logging.
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Server address followed by one or more remotes.
    #[arg(value_name = "SERVER REMOTE")]
    pub positional: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_commands_are_well_formed() {
        TopLevelArgs::command().debug_assert();
        ServerArgs::command().debug_assert();
        ClientArgs::command().debug_assert();
    }

    #[test]
    fn test_server_defaults() {
        let args = ServerArgs::try_parse_from(Vec::<String>::new()).unwrap();
        assert_eq!(args.port, "");
        assert_eq!(args.keep_alive, Duration::from_secs(25));
        assert!(args.tls_domain.is_empty());
        assert!(!args.pid);
    }

    #[test]
    fn test_client_negative_retry_count() {
        let args =
            ClientArgs::try_parse_from(["--max-retry-count", "-1", "server", "3000"]).unwrap();
        assert_eq!(args.max_retry_count, -1);
        assert_eq!(args.positional, ["server", "3000"]);
    }

    #[test]
    fn test_humantime_durations() {
        let args = ClientArgs::try_parse_from([
            "--keepalive",
            "1m30s",
            "--max-retry-interval",
            "10s",
        ])
        .unwrap();
        assert_eq!(args.keep_alive, Duration::from_secs(90));
        assert_eq!(args.max_retry_interval, Duration::from_secs(10));

        assert!(ServerArgs::try_parse_from(["--keepalive", "soon"]).is_err());
    }

    #[test]
    fn test_top_level_passes_mode_args_through() {
        let args = TopLevelArgs::try_parse_from(["chisel", "server", "-v", "--port", "1"]).unwrap();
        assert!(!args.version);
        assert_eq!(args.rest, ["server", "-v", "--port", "1"]);
    }
}
