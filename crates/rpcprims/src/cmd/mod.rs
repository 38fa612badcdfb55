use std::time::Duration;

use clap::{Args, Subcommand};
use rpcprims_transport::Endpoint;

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod serve;
pub mod version;

/// Method served and called when `--method` is not given.
pub const DEFAULT_METHOD: &str = "/rpcprims.Echo/Echo";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an echo server until SIGINT/SIGTERM.
    Serve(ServeArgs),
    /// Send JSON requests and print the replies.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args).await,
        Command::Call(args) => call::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint to bind: `host:port`, `unix:<path>` or a socket path.
    pub endpoint: String,
    /// Upper bound on every call (e.g. 5s, 500ms). Callers may ask for less.
    #[arg(long)]
    pub timeout: Option<String>,
    /// Only answer this method; calls to other methods are closed without a
    /// reply.
    #[arg(long)]
    pub method: Option<String>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Endpoint to connect to: `host:port`, `unix:<path>` or a socket path.
    pub endpoint: String,
    /// JSON request payload. Repeat to stream several requests.
    #[arg(long, required = true)]
    pub json: Vec<String>,
    /// Method name sent in the request head.
    #[arg(long, default_value = DEFAULT_METHOD)]
    pub method: String,
    /// Call deadline (e.g. 5s, 500ms). Default: none.
    #[arg(long)]
    pub timeout: Option<String>,
    /// Request metadata as `key=value`. Repeatable.
    #[arg(long = "header", short = 'H', value_name = "KEY=VALUE")]
    pub headers: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_endpoint(input: &str) -> CliResult<Endpoint> {
    input
        .parse()
        .map_err(|err| transport_error("invalid endpoint", err))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else if let Some(num) = input.strip_suffix('m') {
        (num, "m")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
