mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel, SectionLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "multio", version, about = "Byte-stream multiplexer CLI")]
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

    /// Level for one section (mux, frame, transport, cli), e.g. `mux=debug`.
    #[arg(long = "log-section", value_name = "SECTION=LEVEL", global = true)]
    log_sections: Vec<SectionLevel>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level, &cli.log_sections);

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
            "multio",
            "send",
            "/tmp/test.sock",
            "--stream",
            "3",
            "--data",
            "hello",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.stream, 3);
        assert_eq!(args.data.as_deref(), Some("hello"));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "multio",
            "send",
            "/tmp/test.sock",
            "--file",
            "/tmp/payload.bin",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_listen_stream_list() {
        let cli = Cli::try_parse_from([
            "multio",
            "--format",
            "json",
            "listen",
            "/tmp/test.sock",
            "--streams",
            "0,1,7",
            "--count",
            "2",
        ])
        .expect("listen args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(args.streams, vec![0, 1, 7]);
        assert_eq!(args.count, Some(2));
    }

    #[test]
    fn listen_defaults_to_stream_zero() {
        let cli = Cli::try_parse_from(["multio", "listen", "/tmp/test.sock"])
            .expect("listen args should parse");
        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(args.streams, vec![0]);
    }

    #[test]
    fn parses_repeated_log_sections() {
        let cli = Cli::try_parse_from([
            "multio",
            "--log-section",
            "mux=debug",
            "--log-section",
            "frame=off",
            "version",
        ])
        .expect("log sections should parse");

        assert_eq!(cli.log_sections.len(), 2);
        assert_eq!(cli.log_sections[0].level, LogLevel::Debug);
        assert_eq!(cli.log_sections[1].level, LogLevel::Off);
    }

    #[test]
    fn demo_selectors_conflict() {
        let err = Cli::try_parse_from(["multio", "demo", "--simple-pipe", "--read-writer"])
            .expect_err("conflicting demo selectors should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
