use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a demo hub with echo, broadcast and room routes.
    Serve(ServeArgs),
    /// Send a single request.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args).await,
        Command::Send(args) => send::run(args, format).await,
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(default_value = "127.0.0.1:8080")]
    pub addr: String,
    /// Close connections idle for this long (e.g. 60s, 500ms).
    #[arg(long, default_value = "60s")]
    pub read_timeout: String,
    /// Upper bound for a single outbound message.
    #[arg(long, default_value = "10s")]
    pub write_timeout: String,
    /// Keep-alive ping period. Defaults to 9/10 of the read timeout.
    #[arg(long, conflicts_with = "no_ping")]
    pub ping_interval: Option<String>,
    /// Disable keep-alive pings.
    #[arg(long)]
    pub no_ping: bool,
    /// How long to wait for connections to finish after Ctrl-C.
    #[arg(long, default_value = "5s")]
    pub drain_timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// WebSocket URL to dial (ws://host:port/path).
    pub url: String,
    /// Verb of the request.
    #[arg(long, short = 'v')]
    pub verb: String,
    /// JSON body.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string body.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Stream the body from a file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Request header as key=value. Repeatable.
    #[arg(long, short = 'H', value_name = "KEY=VALUE")]
    pub header: Vec<String>,
    /// Wait for one response and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
