use std::time::Duration;

use clap::{Args, Subcommand};

use crate::demo::MethodName;
use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod call;
pub mod serve;
pub mod version;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: &str = "7400";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the demo server (echo, sleep, fail, add) until Ctrl-C.
    Serve(ServeArgs),
    /// Connect to a server, make one call and print the result.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "WIRECALL_HOST", default_value = DEFAULT_HOST)]
    pub host: String,
    /// Port to bind; 0 picks a free port.
    #[arg(long, env = "WIRECALL_PORT", default_value = DEFAULT_PORT)]
    pub port: u16,
    /// Runtime worker threads.
    #[arg(long, default_value_t = 1)]
    pub threads: usize,
    /// How long stopping waits for open connections (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub grace: String,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Method to call.
    #[arg(value_enum)]
    pub method: MethodName,
    /// Method arguments: `echo <text>...`, `sleep <millis>`, `fail [message]`, `add <a> <b>`.
    #[arg(allow_negative_numbers = true)]
    pub args: Vec<String>,
    /// Server address.
    #[arg(long, env = "WIRECALL_HOST", default_value = DEFAULT_HOST)]
    pub host: String,
    /// Server port.
    #[arg(long, env = "WIRECALL_PORT", default_value = DEFAULT_PORT)]
    pub port: u16,
    /// Call timeout (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
    /// Connection attempts before giving up.
    #[arg(long, default_value_t = 10)]
    pub attempts: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show build details.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `150ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
