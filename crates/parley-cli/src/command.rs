//! Input line parsing.
//!
//! Lines starting with `/` are commands; anything else is a message for the
//! open conversation.

use parley_client::{ConversationId, MessageId};
use thiserror::Error;

/// Shown by `/help`.
pub const HELP: &str = "\
/open <id>            open a conversation (loads history)
/close                close the open conversation
/list [filter]        list conversations
/create <name>        create a conversation
/rename <id> <name>   rename a conversation
/delete <id>          delete a conversation
/edit <msg> <text>    edit a message
/read <msg>           mark a message read
/typing               announce typing in the open conversation
/connect              reconnect after the connection was lost
/quit                 disconnect and exit
<text>                send a message";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Send text to the open conversation.
    Say(String),
    /// Open a conversation.
    Open(ConversationId),
    /// Close the open conversation.
    Close,
    /// List conversations, optionally filtered by name.
    List(Option<String>),
    /// Create a conversation.
    Create(String),
    /// Rename a conversation.
    Rename(ConversationId, String),
    /// Delete a conversation.
    Delete(ConversationId),
    /// Replace a message's text.
    Edit(MessageId, String),
    /// Mark a message read.
    Read(MessageId),
    /// Report a keystroke.
    Typing,
    /// Connect again.
    Connect,
    /// Show command help.
    Help,
    /// Exit.
    Quit,
}

/// Why a line could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// `/something` that is not a command.
    #[error("unknown command /{0} (try /help)")]
    UnknownCommand(String),

    /// A required argument is missing.
    #[error("/{command} needs {argument}")]
    MissingArgument {
        /// Command name.
        command: &'static str,
        /// What was expected.
        argument: &'static str,
    },

    /// An id argument is not a number.
    #[error("not an id: {0}")]
    InvalidId(String),
}

/// Parse one line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Input>, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Some(Input::Say(line.to_owned())));
    };

    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    let rest = rest.trim();
    let input = match name {
        "open" => Input::Open(ConversationId(id(rest, "open")?)),
        "close" => Input::Close,
        "list" => Input::List(Some(rest.to_owned()).filter(|f| !f.is_empty())),
        "create" => Input::Create(text(rest, "create", "a name")?),
        "rename" => {
            let (target, name) = split(rest, "rename", "an id and a name")?;
            Input::Rename(ConversationId(id(target, "rename")?), name)
        },
        "delete" => Input::Delete(ConversationId(id(rest, "delete")?)),
        "edit" => {
            let (target, content) = split(rest, "edit", "a message id and text")?;
            Input::Edit(MessageId(id(target, "edit")?), content)
        },
        "read" => Input::Read(MessageId(id(rest, "read")?)),
        "typing" => Input::Typing,
        "connect" => Input::Connect,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(InputError::UnknownCommand(other.to_owned())),
    };
    Ok(Some(input))
}

fn id(raw: &str, command: &'static str) -> Result<u64, InputError> {
    if raw.is_empty() {
        return Err(InputError::MissingArgument { command, argument: "an id" });
    }
    raw.parse().map_err(|_| InputError::InvalidId(raw.to_owned()))
}

fn text(raw: &str, command: &'static str, argument: &'static str) -> Result<String, InputError> {
    if raw.is_empty() {
        return Err(InputError::MissingArgument { command, argument });
    }
    Ok(raw.to_owned())
}

fn split<'a>(raw: &'a str, command: &'static str, argument: &'static str) -> Result<(&'a str, String), InputError> {
    match raw.split_once(char::is_whitespace) {
        Some((head, tail)) if !tail.trim().is_empty() => Ok((head, tail.trim().to_owned())),
        _ => Err(InputError::MissingArgument { command, argument }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse("  hola a todos ").unwrap(), Some(Input::Say("hola a todos".to_owned())));
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(parse("/open 42").unwrap(), Some(Input::Open(ConversationId(42))));
        assert_eq!(parse("/edit 7  fixed typo").unwrap(), Some(Input::Edit(MessageId(7), "fixed typo".to_owned())));
        assert_eq!(parse("/rename 3 off topic").unwrap(), Some(Input::Rename(ConversationId(3), "off topic".to_owned())));
        assert_eq!(parse("/list gen").unwrap(), Some(Input::List(Some("gen".to_owned()))));
        assert_eq!(parse("/list").unwrap(), Some(Input::List(None)));
        assert_eq!(parse("/exit").unwrap(), Some(Input::Quit));
    }

    #[test]
    fn malformed_commands() {
        assert_eq!(parse("/open").unwrap_err(), InputError::MissingArgument { command: "open", argument: "an id" });
        assert_eq!(parse("/open general").unwrap_err(), InputError::InvalidId("general".to_owned()));
        assert_eq!(
            parse("/edit 7").unwrap_err(),
            InputError::MissingArgument { command: "edit", argument: "a message id and text" }
        );
        assert_eq!(parse("/shout hi").unwrap_err(), InputError::UnknownCommand("shout".to_owned()));
    }
}
