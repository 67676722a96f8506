//! Layers command-line flags over environment variables over defaults.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

use chisel_core::{
    ChiselError, ClientConfig, ClientTlsConfig, DEFAULT_HOST, DEFAULT_PORT, FlagValue,
    HeaderFlags, MultiFlag, Result, ServerConfig, ServerTlsConfig,
};

use crate::cli::{ClientArgs, ServerArgs};

/// Listen host fallback.
pub const ENV_HOST: &str = "HOST";
/// Listen port fallback.
pub const ENV_PORT: &str = "PORT";
/// Credential fallback for both modes.
pub const ENV_AUTH: &str = "AUTH";
/// Key file fallback.
pub const ENV_KEY_FILE: &str = "CHISEL_KEY_FILE";
/// Key seed fallback.
pub const ENV_KEY: &str = "CHISEL_KEY";

/// First line of the `--key` deprecation notice.
pub const KEY_DEPRECATED: &str =
    "Option `--key` is deprecated and will be removed in a future version of chisel.";
/// Second line of the `--key` deprecation notice.
pub const KEY_DEPRECATED_HINT: &str = "Please use `chisel server --keygen /file/path`, followed by `chisel server --keyfile /file/path` to specify the SSH private key";

/// Read access to environment variables.
///
/// An empty value is reported as unset.
pub trait EnvSource {
    /// Returns the non-empty value of `name`.
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

impl<K, V, S> EnvSource for HashMap<K, V, S>
where
    K: Borrow<str> + Hash + Eq,
    V: AsRef<str>,
    S: BuildHasher,
{
    fn var(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(|v| v.as_ref().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// A resolved configuration plus what the supervisor should do around it.
#[derive(Debug, Clone)]
pub struct Launch<C> {
    /// Configuration handed to the engine.
    pub config: C,
    /// Write `chisel.pid` after the engine is constructed.
    pub write_pid: bool,
    /// Verbose logging requested with `-v`.
    pub verbose: bool,
    /// Warnings to log before the engine starts.
    pub warnings: Vec<String>,
}

/// What `chisel server` should do.
#[derive(Debug, Clone)]
pub enum ServerPlan {
    /// Write a key file and exit.
    KeyGen {
        /// Destination, `-` for stdout.
        path: String,
        /// Seed from `--key`; may be empty.
        seed: String,
    },
    /// Run the server engine.
    Serve(Launch<ServerConfig>),
}

fn or_env(flag: String, env: &impl EnvSource, name: &str) -> String {
    if flag.is_empty() {
        env.var(name).unwrap_or_default()
    } else {
        flag
    }
}

fn or_default(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

/// Resolves server arguments.
///
/// # Errors
/// Returns a configuration error if a repeated flag value is malformed.
pub fn resolve_server(args: ServerArgs, env: &impl EnvSource) -> Result<ServerPlan> {
    let proxy = if args.backend.is_empty() {
        args.proxy
    } else {
        args.backend
    };

    if !args.key_gen.is_empty() {
        return Ok(ServerPlan::KeyGen {
            path: args.key_gen,
            seed: args.key,
        });
    }

    let mut warnings = Vec::new();
    if !args.key.is_empty() {
        warnings.push(KEY_DEPRECATED.to_string());
        warnings.push(KEY_DEPRECATED_HINT.to_string());
    }

    let host = or_default(or_env(args.host, env, ENV_HOST), DEFAULT_HOST);
    let port = if args.port.is_empty() {
        args.port_short
    } else {
        args.port
    };
    let port = or_default(or_env(port, env, ENV_PORT), DEFAULT_PORT);

    // Only one of the two key lookups happens per invocation.
    let (key_file, key_seed) = if args.key_file.is_empty() {
        (env.var(ENV_KEY_FILE).unwrap_or_default(), args.key)
    } else if args.key.is_empty() {
        (args.key_file, env.var(ENV_KEY).unwrap_or_default())
    } else {
        (args.key_file, args.key)
    };

    let mut domains = MultiFlag::new();
    for domain in &args.tls_domain {
        domains.set(domain)?;
    }

    let config = ServerConfig {
        host,
        port,
        key_seed,
        key_file,
        auth_file: args.auth_file,
        auth: or_env(args.auth, env, ENV_AUTH),
        keep_alive: args.keep_alive,
        proxy,
        socks5: args.socks5,
        reverse: args.reverse,
        tls: ServerTlsConfig {
            cert: args.tls_cert,
            key: args.tls_key,
            domains: domains.into_inner(),
            ca: args.tls_ca,
        },
        debug: args.verbose,
    };

    Ok(ServerPlan::Serve(Launch {
        config,
        write_pid: args.pid,
        verbose: args.verbose,
        warnings,
    }))
}

/// Resolves client arguments.
///
/// # Errors
/// Returns a configuration error when fewer than two positional arguments
/// are given or a `--header` value has no `:`.
pub fn resolve_client(args: ClientArgs, env: &impl EnvSource) -> Result<Launch<ClientConfig>> {
    let mut positional = args.positional.into_iter();
    let (Some(server), Some(first_remote)) = (positional.next(), positional.next()) else {
        return Err(ChiselError::config(
            "A server and at least one remote is required",
        ));
    };
    let mut remotes = vec![first_remote];
    remotes.extend(positional);

    let mut headers = HeaderFlags::new();
    for header in &args.header {
        headers.set(header)?;
    }
    let mut headers = headers.into_inner();

    let mut tls = ClientTlsConfig {
        ca: args.tls_ca,
        skip_verify: args.tls_skip_verify,
        cert: args.tls_cert,
        key: args.tls_key,
        server_name: String::new(),
    };
    if !args.hostname.is_empty() {
        headers.set("Host", args.hostname.clone());
        tls.server_name = args.hostname;
    }
    if !args.sni.is_empty() {
        tls.server_name = args.sni;
    }

    let mut config = ClientConfig::new(server, remotes);
    config.fingerprint = args.fingerprint;
    config.auth = or_env(args.auth, env, ENV_AUTH);
    config.keep_alive = args.keep_alive;
    config.max_retry_count = args.max_retry_count;
    config.max_retry_interval = args.max_retry_interval;
    config.proxy = args.proxy;
    config.tls = tls;
    config.headers = headers;
    config.debug = args.verbose;

    Ok(Launch {
        config,
        write_pid: args.pid,
        verbose: args.verbose,
        warnings: Vec::new(),
    })
}
