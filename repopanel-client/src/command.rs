use std::fmt;

use repopanel_core::{CopyMode, DEFAULT_BUNDLE_ID, DebugRunId, GOOGLE_API_KEY, PINECONE_API_KEY, Tab};

pub const HELP: &str = "\
commands:
  tab <bundles|agent|settings|debug|search>
  check <google|pinecone>          ask whether a key is stored
  secret <google|pinecone> <value> store a key
  indexes                          list Pinecone indexes
  index <name>                     select a Pinecone index
  mode [file|content]              set or toggle the copy mode
  copy <bundle-id>                 copy a bundle's output
  copy-default                     copy the whole-repository output
  copy-run <run-id>                copy the newest debug run's output
  copy-agent                       copy the last Smart Agent output
  agent <query>                    run the Smart Agent
  history                          refresh the Smart Agent history
  runs                             refresh debug runs
  rerun <run-id>                   run again on a debug run's files
  delete-run <run-id>
  run [bundle-id] [--compress]     run a bundle (default: whole repository)
  cancel [bundle-id]
  dismiss                          clear the notice
  help
  quit";

/// One line typed at the panel prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tab(Tab),
    CheckSecret(&'static str),
    SaveSecret { key: &'static str, value: String },
    FetchIndexes,
    SaveIndex(String),
    CopyMode(Option<CopyMode>),
    CopyBundle(String),
    CopyDefault,
    CopyRun(DebugRunId),
    CopyAgent,
    RunAgent(String),
    AgentHistory,
    RefreshRuns,
    ReRun(DebugRunId),
    DeleteRun(DebugRunId),
    Run { bundle_id: String, compress: bool },
    Cancel(String),
    Dismiss,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    MissingArgument { command: &'static str, argument: &'static str },
    InvalidArgument { command: &'static str, value: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty command"),
            CommandError::Unknown(word) => write!(f, "unknown command `{word}` (try `help`)"),
            CommandError::MissingArgument { command, argument } => {
                write!(f, "`{command}` needs <{argument}>")
            }
            CommandError::InvalidArgument { command, value } => {
                write!(f, "`{command}`: invalid argument `{value}`")
            }
        }
    }
}

impl std::error::Error for CommandError {}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err(CommandError::Empty);
    };

    let command = match head {
        "tab" => {
            let name = required(words.next(), "tab", "name")?;
            Command::Tab(Tab::from_wire(name).ok_or_else(|| invalid("tab", name))?)
        }
        "check" => Command::CheckSecret(secret_key(required(words.next(), "check", "key")?)?),
        "secret" => {
            let key = secret_key(required(words.next(), "secret", "key")?)?;
            let value = words.collect::<Vec<_>>().join(" ");
            if value.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "secret",
                    argument: "value",
                });
            }
            Command::SaveSecret { key, value }
        }
        "indexes" => Command::FetchIndexes,
        "index" => Command::SaveIndex(required(words.next(), "index", "name")?.to_owned()),
        "mode" => match words.next() {
            None => Command::CopyMode(None),
            Some(name) => {
                Command::CopyMode(Some(CopyMode::from_wire(name).ok_or_else(|| invalid("mode", name))?))
            }
        },
        "copy" => Command::CopyBundle(required(words.next(), "copy", "bundle-id")?.to_owned()),
        "copy-default" => Command::CopyDefault,
        "copy-run" => Command::CopyRun(run_id("copy-run", words.next())?),
        "copy-agent" => Command::CopyAgent,
        "agent" => {
            let query = words.collect::<Vec<_>>().join(" ");
            if query.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "agent",
                    argument: "query",
                });
            }
            Command::RunAgent(query)
        }
        "history" => Command::AgentHistory,
        "runs" => Command::RefreshRuns,
        "rerun" => Command::ReRun(run_id("rerun", words.next())?),
        "delete-run" => Command::DeleteRun(run_id("delete-run", words.next())?),
        "run" => {
            let mut bundle_id = DEFAULT_BUNDLE_ID.to_owned();
            let mut compress = false;
            for word in words {
                if word == "--compress" {
                    compress = true;
                } else {
                    bundle_id = word.to_owned();
                }
            }
            Command::Run {
                bundle_id,
                compress,
            }
        }
        "cancel" => Command::Cancel(words.next().unwrap_or(DEFAULT_BUNDLE_ID).to_owned()),
        "dismiss" => Command::Dismiss,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_owned())),
    };
    Ok(command)
}

fn required<'a>(
    word: Option<&'a str>,
    command: &'static str,
    argument: &'static str,
) -> Result<&'a str, CommandError> {
    word.ok_or(CommandError::MissingArgument { command, argument })
}

fn invalid(command: &'static str, value: &str) -> CommandError {
    CommandError::InvalidArgument {
        command,
        value: value.to_owned(),
    }
}

fn secret_key(word: &str) -> Result<&'static str, CommandError> {
    match word {
        "google" | GOOGLE_API_KEY => Ok(GOOGLE_API_KEY),
        "pinecone" | PINECONE_API_KEY => Ok(PINECONE_API_KEY),
        other => Err(invalid("secret", other)),
    }
}

fn run_id(command: &'static str, word: Option<&str>) -> Result<DebugRunId, CommandError> {
    let word = required(word, command, "run-id")?;
    word.parse().map_err(|_| invalid(command, word))
}
