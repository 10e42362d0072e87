//! Purpose: `realm-reader` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout; logs and errors go to stderr.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Files are only ever opened read-only.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod dump_json;

use realm_reader::api::{Error, ErrorKind, Group, RealmFile, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `realm-reader --help`."));
            }
        },
    };

    command_dispatch::dispatch_command(cli.command).map_err(add_format_hint)
}

#[derive(Parser)]
#[command(
    name = "realm-reader",
    version,
    about = "Inspect Realm database files without writing to them",
    long_about = None,
    after_help = r#"EXAMPLES
  $ realm-reader info default.realm
  $ realm-reader schema default.realm --table class_Currency
  $ realm-reader dump default.realm --limit 20

Set RUST_LOG=debug to trace how the file is resolved."#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Show the file header and the table list with row counts")]
    Info {
        #[arg(value_hint = ValueHint::FilePath, help = "Database file")]
        file: PathBuf,
    },
    #[command(about = "Show column types, attributes, link targets, and nested specs")]
    Schema {
        #[arg(value_hint = ValueHint::FilePath, help = "Database file")]
        file: PathBuf,
        #[arg(long, help = "Only this table")]
        table: Option<String>,
    },
    #[command(about = "Decode rows; cells that fail to decode are reported inline")]
    Dump {
        #[arg(value_hint = ValueHint::FilePath, help = "Database file")]
        file: PathBuf,
        #[arg(long, help = "Only this table")]
        table: Option<String>,
        #[arg(long, default_value_t = 5, help = "Rows per table (and per subtable)")]
        limit: usize,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn add_format_hint(err: Error) -> Error {
    if err.kind() == ErrorKind::Format && err.hint().is_none() {
        return err.with_hint(
            "The file may be corrupt, encrypted, or written in an unsupported format version.",
        );
    }
    err
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Io\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Format => "malformed file".to_string(),
        ErrorKind::Range => "index or offset out of range".to_string(),
        ErrorKind::TypeMismatch => "column type mismatch".to_string(),
        ErrorKind::Unsupported => "unsupported encoding".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

pub(crate) fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!("offset: {offset:#x}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, add_format_hint, error_json, error_text};
    use clap::Parser;
    use realm_reader::api::{Error, ErrorKind};

    #[test]
    fn dump_limit_defaults_to_five() {
        let cli = Cli::try_parse_from(["realm-reader", "dump", "db.realm"]).expect("parse");
        match cli.command {
            Command::Dump { limit, table, .. } => {
                assert_eq!(limit, 5);
                assert!(table.is_none());
            }
            _ => panic!("expected dump"),
        }
    }

    #[test]
    fn error_json_carries_context() {
        let err = Error::new(ErrorKind::Range)
            .with_message("index 9 out of range")
            .with_offset(64);
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Range");
        assert_eq!(value["error"]["message"], "index 9 out of range");
        assert_eq!(value["error"]["offset"], 64);
    }

    #[test]
    fn format_errors_get_a_hint() {
        let err = add_format_hint(Error::new(ErrorKind::Format).with_message("bad magic"));
        assert!(err.hint().is_some());
        let text = error_text(&err);
        assert!(text.starts_with("error: bad magic"));
        assert!(text.contains("hint:"));

        let usage = add_format_hint(Error::new(ErrorKind::Usage));
        assert!(usage.hint().is_none());
    }
}
