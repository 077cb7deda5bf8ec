//! Text rendering of store contents.

use parley_client::{Conversation, Message};

/// `[10:01] #7 ana: hola`, with the local user shown as `you`.
pub fn message_line(message: &Message, own: Option<&str>) -> String {
    let author = if own.is_some_and(|own| message.is_from(own)) { "you" } else { message.username.as_str() };
    let time = message.sent_at.as_datetime().format("%H:%M");
    let edited = if message.edited_at.is_some() { " (edited)" } else { "" };
    format!("[{time}] #{} {author}: {}{edited}", message.id, message.content)
}

/// Who is typing, excluding the local user. `None` when nobody is.
pub fn typing_line(users: &[String], own: Option<&str>) -> Option<String> {
    let others: Vec<&str> = users.iter().map(String::as_str).filter(|user| Some(*user) != own).collect();
    match others.as_slice() {
        [] => None,
        [one] => Some(format!("... {one} is typing")),
        [init @ .., last] => Some(format!("... {} and {last} are typing", init.join(", "))),
    }
}

/// `42  general  (3 unread)`.
pub fn conversation_line(conversation: &Conversation) -> String {
    match conversation.unread_count() {
        0 => format!("{:>4}  {}", conversation.id.0, conversation.name),
        unread => format!("{:>4}  {}  ({unread} unread)", conversation.id.0, conversation.name),
    }
}
