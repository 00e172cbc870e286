use crate::domain::{ReviewFile, ReviewRow, ReviewView, SessionId};
use crate::infra::{GitCli, NormalizePathError, ProcessRunner, normalize_path};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HELP_TEXT: &str = "\
agentbay - run several coding-agent sessions side by side

Usage:
  agentbay [--agent PROGRAM] [--poll-ms N] [--no-ide-bridge]
  agentbay status [PATH]
  agentbay review [PATH] [--cap N]

Commands:
  (none)    start the interactive orchestrator in the current directory
  status    print the change set of PATH (default .): kind, +adds, -dels, path
  review    print the per-file review of PATH (default .)

Options:
  --agent PROGRAM   agent command started in each session (default: claude)
  --poll-ms N       change polling interval in milliseconds
  --no-ide-bridge   do not start the IDE bridge server
  --cap N           lines shown per file in review (default: 200)
  -h, --help        print this help
  -V, --version     print the version

Environment:
  AGENTBAY_STATE_DIR, AGENTBAY_AGENT, AGENTBAY_POLL_MS, AGENTBAY_GIT_BIN,
  AGENTBAY_OPEN, AGENTBAY_LOG
";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliInvocation {
    PrintHelp,
    PrintVersion,
    Tui {
        agent: Option<String>,
        poll_ms: Option<u64>,
        no_ide_bridge: bool,
    },
    Command(CliCommand),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliCommand {
    Status { path: PathBuf },
    Review { path: PathBuf, cap: Option<usize> },
}

#[derive(Debug, Error)]
pub enum CliParseError {
    #[error("unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("missing value for flag: {0}")]
    MissingFlagValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidFlagValue { flag: String, value: String },

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}

pub fn parse_invocation(args: &[String]) -> Result<CliInvocation, CliParseError> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(CliInvocation::PrintHelp);
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        return Ok(CliInvocation::PrintVersion);
    }

    let mut iter = args.iter().skip(1);
    let Some(first) = iter.next() else {
        return Ok(CliInvocation::Tui {
            agent: None,
            poll_ms: None,
            no_ide_bridge: false,
        });
    };

    match first.as_str() {
        "status" => {
            let mut path: Option<PathBuf> = None;
            for arg in iter {
                if arg.starts_with('-') && arg != "-" {
                    return Err(CliParseError::UnknownFlag(arg.to_string()));
                }
                if path.is_some() {
                    return Err(CliParseError::UnexpectedArgument(arg.to_string()));
                }
                path = Some(PathBuf::from(arg));
            }
            Ok(CliInvocation::Command(CliCommand::Status {
                path: path.unwrap_or_else(|| PathBuf::from(".")),
            }))
        }
        "review" => {
            let mut path: Option<PathBuf> = None;
            let mut cap: Option<usize> = None;
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--cap" => {
                        let value = iter
                            .next()
                            .ok_or_else(|| CliParseError::MissingFlagValue("--cap".to_string()))?;
                        cap = Some(parse_number_flag("--cap", value)?);
                    }
                    _ if arg.starts_with('-') => {
                        return Err(CliParseError::UnknownFlag(arg.to_string()));
                    }
                    _ if path.is_some() => {
                        return Err(CliParseError::UnexpectedArgument(arg.to_string()));
                    }
                    _ => path = Some(PathBuf::from(arg)),
                }
            }
            Ok(CliInvocation::Command(CliCommand::Review {
                path: path.unwrap_or_else(|| PathBuf::from(".")),
                cap,
            }))
        }
        _ if first.starts_with('-') => parse_tui_flags(args.iter().skip(1)),
        other => Err(CliParseError::UnknownSubcommand(other.to_string())),
    }
}

fn parse_tui_flags<'a>(
    mut iter: impl Iterator<Item = &'a String>,
) -> Result<CliInvocation, CliParseError> {
    let mut agent = None;
    let mut poll_ms = None;
    let mut no_ide_bridge = false;

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--agent" => {
                let value = iter
                    .next()
                    .filter(|value| !value.trim().is_empty())
                    .ok_or_else(|| CliParseError::MissingFlagValue("--agent".to_string()))?;
                agent = Some(value.to_string());
            }
            "--poll-ms" => {
                let value = iter
                    .next()
                    .ok_or_else(|| CliParseError::MissingFlagValue("--poll-ms".to_string()))?;
                poll_ms = Some(parse_number_flag("--poll-ms", value)?);
            }
            "--no-ide-bridge" => no_ide_bridge = true,
            _ if arg.starts_with('-') => return Err(CliParseError::UnknownFlag(arg.to_string())),
            _ => return Err(CliParseError::UnexpectedArgument(arg.to_string())),
        }
    }

    Ok(CliInvocation::Tui {
        agent,
        poll_ms,
        no_ide_bridge,
    })
}

fn parse_number_flag<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, CliParseError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| CliParseError::InvalidFlagValue {
            flag: flag.to_string(),
            value: value.to_string(),
        })
}

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("invalid path: {0}")]
    InvalidPath(#[from] NormalizePathError),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error(transparent)]
    WriteOutput(#[from] io::Error),
}

/// Runs a non-interactive command, writing to `out`. A closed pipe ends
/// output early without an error.
pub async fn run<R: ProcessRunner>(
    command: CliCommand,
    git: &GitCli<R>,
    cwd: &Path,
    default_cap: usize,
    out: &mut impl Write,
) -> Result<(), CliRunError> {
    match command {
        CliCommand::Status { path } => {
            let work_area = resolve_work_area(&path, cwd)?;
            for change in git.changes(&work_area).await {
                let line = format!(
                    "{}\t+{}\t-{}\t{}",
                    change.kind.label(),
                    change.additions,
                    change.deletions,
                    change.path
                );
                if !write_line(out, &line)? {
                    return Ok(());
                }
            }
        }
        CliCommand::Review { path, cap } => {
            let work_area = resolve_work_area(&path, cwd)?;
            let cap = cap.unwrap_or(default_cap);
            let changes = git.changes(&work_area).await;
            let mut files = Vec::with_capacity(changes.len());
            for change in &changes {
                let diff = git.file_diff(&work_area, change).await.unwrap_or_default();
                files.push(ReviewFile::from_diff(change, &diff, cap));
            }
            let view = ReviewView {
                session_id: SessionId::generate(),
                title: work_area.display().to_string(),
                files,
            };
            print_review(out, &view)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn resolve_work_area(path: &Path, cwd: &Path) -> Result<PathBuf, CliRunError> {
    let home = dirs::home_dir();
    let resolved = normalize_path(&path.to_string_lossy(), cwd, home.as_deref())?;
    if !resolved.is_dir() {
        return Err(CliRunError::NotADirectory(resolved.display().to_string()));
    }
    Ok(resolved)
}

fn print_review(out: &mut impl Write, view: &ReviewView) -> io::Result<()> {
    if view.files.is_empty() {
        write_line(out, &format!("no changes in {}", view.title))?;
        return Ok(());
    }
    for row in view.rows() {
        let line = match row {
            ReviewRow::FileHeader(file) => format!(
                "== {} {} (+{} -{})",
                file.kind.symbol(),
                file.path,
                file.additions,
                file.deletions
            ),
            ReviewRow::Line(line) => line.text.clone(),
            ReviewRow::MoreLines(count) => format!("… {count} more lines"),
            ReviewRow::Blank => String::new(),
        };
        if !write_line(out, &line)? {
            break;
        }
    }
    Ok(())
}

fn write_line(out: &mut impl Write, line: &str) -> io::Result<bool> {
    match writeln!(out, "{line}") {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(false),
        Err(error) => Err(error),
    }
}
