//! REPL line parsing.

use anima_core::Emotion;
use anyhow::{anyhow, bail, Context};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Plain text, handled as a conversational turn.
    Say(String),
    State,
    Rest,
    Novel,
    Stimulus { channel: Emotion, magnitude: f32 },
    Recall(String),
    Remember(String),
    Consolidate,
    Save,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  /state                      show the current state as JSON
  /rest                       apply a Rest event
  /novel                      apply a NovelTopic event
  /stimulus <channel> <m>     push an emotion channel by m in [-1, 1]
  /recall <query>             retrieve memories for a query
  /remember <text>            store a memory now
  /consolidate                forget faded memories
  /save                       persist the organism snapshot
  /help                       this text
  /quit                       save and exit
Anything else is a message to the organism.";

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> anyhow::Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line == "quit" || line == "exit" {
        return Ok(Some(Command::Quit));
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "state" => Command::State,
        "rest" => Command::Rest,
        "novel" => Command::Novel,
        "consolidate" => Command::Consolidate,
        "save" => Command::Save,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "recall" => Command::Recall(required(arg, "/recall <query>")?),
        "remember" => Command::Remember(required(arg, "/remember <text>")?),
        "stimulus" => {
            let mut parts = arg.split_whitespace();
            let (Some(channel), Some(magnitude), None) = (parts.next(), parts.next(), parts.next())
            else {
                bail!("usage: /stimulus <channel> <magnitude>");
            };
            let channel: Emotion = channel.parse()?;
            let magnitude: f32 = magnitude
                .parse()
                .with_context(|| format!("magnitude '{}' is not a number", magnitude))?;
            Command::Stimulus { channel, magnitude }
        }
        other => return Err(anyhow!("unknown command /{} (try /help)", other)),
    };
    Ok(Some(command))
}

fn required(arg: &str, usage: &str) -> anyhow::Result<String> {
    if arg.is_empty() {
        bail!("usage: {}", usage);
    }
    Ok(arg.to_string())
}
