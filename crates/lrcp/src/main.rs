mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "lrcp", version, about = "Reliable line streams over UDP")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "lrcp",
            "send",
            "127.0.0.1:7000",
            "--session",
            "12345",
            "--data",
            "hello",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.session, Some(12345));
                assert_eq!(args.wait_timeout, "5s");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn send_requires_data() {
        let err = Cli::try_parse_from(["lrcp", "send", "127.0.0.1:7000"])
            .expect_err("missing --data should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_bad_address() {
        let err = Cli::try_parse_from(["lrcp", "send", "not-an-addr", "--data", "x"])
            .expect_err("bad address should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_serve_defaults() {
        let cli = Cli::try_parse_from(["lrcp", "serve"]).expect("serve args should parse");
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.bind.port(), 7000);
                assert_eq!(args.retransmit, "3s");
                assert_eq!(args.idle, "60s");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["lrcp", "version", "--format", "json", "--log-level", "debug"])
            .expect("global flags should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.log_level, LogLevel::Debug));
    }
}
