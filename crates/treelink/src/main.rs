mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "treelink", version, about = "Instrument configuration tree CLI")]
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
    fn parses_encode_subcommand() {
        let cli = Cli::try_parse_from(["treelink", "encode", "ADMIN:CRC32 42"])
            .expect("encode args should parse");
        match cli.command {
            Command::Encode(args) => {
                assert_eq!(args.command, "ADMIN:CRC32 42");
                assert!(args.tree.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_decode_with_many_frames() {
        let cli = Cli::try_parse_from([
            "treelink",
            "--format",
            "json",
            "decode",
            "0200056865",
            "6c6c6f",
        ])
        .expect("decode args should parse");
        match cli.command {
            Command::Decode(args) => assert_eq!(args.frames.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn decode_requires_a_frame() {
        let err = Cli::try_parse_from(["treelink", "decode"]).expect_err("no frames should fail");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn pack_requires_output() {
        let err = Cli::try_parse_from(["treelink", "pack", "tree.json"])
            .expect_err("missing -o should fail");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn parses_exec_subcommand() {
        let cli = Cli::try_parse_from([
            "treelink",
            "exec",
            "/tmp/inst.sock",
            "TEMP",
            "GAIN 3",
            "--timeout",
            "2s",
        ])
        .expect("exec args should parse");
        match cli.command {
            Command::Exec(args) => {
                assert_eq!(args.commands, vec!["TEMP", "GAIN 3"]);
                assert_eq!(args.timeout, "2s");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_log_level() {
        let err = Cli::try_parse_from(["treelink", "--log-level", "loud", "version"])
            .expect_err("bad level should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
