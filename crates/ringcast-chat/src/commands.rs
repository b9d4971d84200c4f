/// Console command line parsing.
use anyhow::{bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `send <r1,r2,...> <text>`
    Send { recipients: Vec<String>, text: String },
    /// `print`: messages delivered to us.
    Print,
    /// `peers`: peers learned from notifications.
    Peers,
    /// `status <id>`: progress of a message we sent.
    Status(String),
    /// `stats`: relay counters as JSON.
    Stats,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  send <name1,name2,...> <text>   send a message around the ring
  print                           list messages delivered to you
  peers                           list peers seen in notifications
  status <message-id>             delivery progress of a sent message
  stats                           relay counters
  help                            this text
  quit                            leave the ring";

/// Parse one console line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "send" => parse_send(rest)?,
        "print" => Command::Print,
        "peers" => Command::Peers,
        "status" => {
            if rest.is_empty() {
                bail!("usage: status <message-id>");
            }
            Command::Status(rest.to_string())
        }
        "stats" => Command::Stats,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command {other:?}, type 'help'"),
    };
    Ok(Some(command))
}

fn parse_send(rest: &str) -> Result<Command> {
    let Some((names, text)) = rest.split_once(char::is_whitespace) else {
        bail!("usage: send <name1,name2,...> <text>");
    };
    let recipients: Vec<String> = names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect();
    let text = text.trim();
    if recipients.is_empty() || text.is_empty() {
        bail!("usage: send <name1,name2,...> <text>");
    }
    Ok(Command::Send {
        recipients,
        text: text.to_string(),
    })
}
