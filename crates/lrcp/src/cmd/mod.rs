use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a line-reversal server.
    Serve(ServeArgs),
    /// Send lines through a server and print the replies.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// UDP address to bind.
    #[arg(long, default_value = "0.0.0.0:7000")]
    pub bind: SocketAddr,
    /// Resend unacknowledged data this often (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s")]
    pub retransmit: String,
    /// Close sessions of peers silent this long (e.g. 60s).
    #[arg(long, default_value = "60s")]
    pub idle: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server address.
    pub addr: SocketAddr,
    /// Session id. Default: derived from the process id and clock.
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=i64::from(lrcp_frame::MAX_INT)))]
    pub session: Option<u32>,
    /// Text to send; a trailing newline is added if missing.
    #[arg(long)]
    pub data: String,
    /// Maximum time to wait for the connection and every reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Resend unacknowledged data this often.
    #[arg(long, default_value = "3s")]
    pub retransmit: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `3s` or bare seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
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
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-1s").is_err());
    }
}
