//! Interactive session loop.
//!
//! Multiplexes three sources with `select!`: input lines, events from the
//! open conversation's subscriptions, and connection notifications. Output
//! is plain lines on the given writer; diagnostics go through `tracing`.

use std::io::{self, Write};

use parley_client::{
    ConnectError, ConversationApi, ConversationId, ConversationView, Connector, InboundEvent, Messenger,
    MessengerEvent, OpenError,
};
use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::broadcast::error::RecvError,
};

use crate::{
    command::{self, HELP, Input},
    render,
};

/// Fatal session failure.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Reading input or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The initial connection failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// One interactive session.
pub struct Runtime<C, A> {
    messenger: Messenger<C>,
    api: Option<A>,
    own: Option<String>,
    view: Option<ConversationView>,
}

impl<C: Connector, A: ConversationApi> Runtime<C, A> {
    /// Session over `messenger`. Without `api` there is no history and no
    /// conversation directory. `own` is the local username, if known.
    pub fn new(messenger: Messenger<C>, api: Option<A>, own: Option<String>) -> Self {
        Self { messenger, api, own, view: None }
    }

    /// Connect, optionally open `initial`, then process input until EOF or
    /// `/quit`. Disconnects before returning.
    pub async fn run<R, W>(mut self, initial: Option<ConversationId>, input: R, mut out: W) -> Result<(), RuntimeError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        self.messenger.connect().await?;
        writeln!(out, "connected")?;
        if let Some(id) = initial {
            self.open(id, &mut out).await?;
        }

        let mut events = self.messenger.events();
        let mut lines = input.lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match command::parse(&line) {
                        Ok(Some(Input::Quit)) => break,
                        Ok(Some(input)) => self.execute(input, &mut out).await?,
                        Ok(None) => {},
                        Err(error) => writeln!(out, "! {error}")?,
                    }
                },
                inbound = next_inbound(&mut self.view) => match inbound {
                    Some((conversation_id, event)) => self.render_inbound(conversation_id, event, &mut out).await?,
                    None => self.view = None,
                },
                event = events.recv() => match event {
                    Ok(MessengerEvent::ConnectionLost { reason }) => {
                        writeln!(out, "! connection lost: {reason} (/connect to retry)")?;
                    },
                    Ok(MessengerEvent::Store(_)) => {},
                    Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "event receiver lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
            out.flush()?;
        }

        self.messenger.disconnect().await;
        writeln!(out, "bye")?;
        Ok(())
    }

    fn own(&self) -> Option<&str> {
        self.own.as_deref()
    }

    fn active(&self) -> Option<ConversationId> {
        self.view.as_ref().map(|view| view.conversation_id)
    }

    async fn execute(&mut self, input: Input, out: &mut impl Write) -> Result<(), RuntimeError> {
        match input {
            Input::Say(text) => match self.active() {
                Some(id) => report(out, self.messenger.send_message(id, &text).await)?,
                None => writeln!(out, "! no conversation open (/open <id>)")?,
            },
            Input::Open(id) => self.open(id, out).await?,
            Input::Close => {
                self.messenger.close_conversation().await;
                self.view = None;
            },
            Input::List(filter) => self.list(filter.as_deref(), out).await?,
            Input::Create(name) => {
                let Some(api) = self.api(out)? else { return Ok(()) };
                match self.messenger.create_conversation(api, &name).await {
                    Ok(created) => writeln!(out, "{}", render::conversation_line(&created))?,
                    Err(error) => writeln!(out, "! {error}")?,
                }
            },
            Input::Rename(id, name) => {
                let Some(api) = self.api(out)? else { return Ok(()) };
                report(out, self.messenger.rename_conversation(api, id, &name).await)?;
            },
            Input::Delete(id) => {
                let Some(api) = self.api(out)? else { return Ok(()) };
                report(out, self.messenger.delete_conversation(api, id).await)?;
                if self.active() == Some(id) {
                    self.view = None;
                }
            },
            Input::Edit(message_id, content) => match self.active() {
                Some(id) => report(out, self.messenger.edit_message(id, message_id, &content).await)?,
                None => writeln!(out, "! no conversation open")?,
            },
            Input::Read(message_id) => match self.active() {
                Some(id) => report(out, self.messenger.mark_read(id, message_id).await)?,
                None => writeln!(out, "! no conversation open")?,
            },
            Input::Typing => match self.active() {
                Some(id) => report(out, self.messenger.keystroke(id).await)?,
                None => writeln!(out, "! no conversation open")?,
            },
            Input::Connect => match self.messenger.connect().await {
                Ok(()) => writeln!(out, "connected")?,
                Err(error) => writeln!(out, "! {error}")?,
            },
            Input::Help => writeln!(out, "{HELP}")?,
            Input::Quit => {},
        }
        Ok(())
    }

    fn api(&self, out: &mut impl Write) -> io::Result<Option<&A>> {
        if self.api.is_none() {
            writeln!(out, "! no REST API configured (--api-url)")?;
        }
        Ok(self.api.as_ref())
    }

    async fn open(&mut self, id: ConversationId, out: &mut impl Write) -> Result<(), RuntimeError> {
        let opened = match &self.api {
            Some(api) => self.messenger.open_conversation_with_history(api, id).await,
            None => self.messenger.open_conversation(id).await.map_err(OpenError::from),
        };
        let view = match opened {
            Ok(view) => view,
            Err(error) => {
                writeln!(out, "! cannot open {id}: {error}")?;
                return Ok(());
            },
        };
        self.view = Some(view);

        let conversation = self.messenger.conversation(id).await;
        let name = conversation.as_ref().map_or_else(|| format!("#{id}"), |c| c.name.clone());
        writeln!(out, "== {name} ==")?;
        for message in conversation.iter().flat_map(|c| &c.messages) {
            writeln!(out, "{}", render::message_line(message, self.own()))?;
        }
        Ok(())
    }

    async fn list(&self, filter: Option<&str>, out: &mut impl Write) -> Result<(), RuntimeError> {
        let Some(api) = self.api(out)? else { return Ok(()) };
        if let Err(error) = self.messenger.refresh_conversations(api).await {
            writeln!(out, "! {error}")?;
            return Ok(());
        }

        let lines: Vec<String> = {
            let store = self.messenger.store().await;
            match filter {
                Some(filter) => store.filter_by_name(filter).map(render::conversation_line).collect(),
                None => store.conversations().map(render::conversation_line).collect(),
            }
        };
        if lines.is_empty() {
            writeln!(out, "(no conversations)")?;
        }
        for line in lines {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    async fn render_inbound(
        &self,
        conversation_id: ConversationId,
        event: InboundEvent,
        out: &mut impl Write,
    ) -> Result<(), RuntimeError> {
        match event {
            InboundEvent::NewMessage(message) | InboundEvent::MessageEdited(message) => {
                writeln!(out, "{}", render::message_line(&message, self.own()))?;
            },
            InboundEvent::TypingStarted { .. } | InboundEvent::TypingStopped { .. } => {
                let users = self.messenger.typing_users(conversation_id).await;
                if let Some(line) = render::typing_line(&users, self.own()) {
                    writeln!(out, "{line}")?;
                }
            },
            InboundEvent::Notice { kind, content } => {
                writeln!(out, "* {kind}: {}", content.unwrap_or_default())?;
            },
        }
        Ok(())
    }
}

/// Next event from either subscription of the open conversation. Pending
/// forever without one; `None` once both streams have ended.
async fn next_inbound(view: &mut Option<ConversationView>) -> Option<(ConversationId, InboundEvent)> {
    let Some(view) = view else {
        return std::future::pending().await;
    };
    let conversation_id = view.conversation_id;
    tokio::select! {
        Some(event) = view.messages.recv() => Some((conversation_id, event)),
        Some(event) = view.typing.recv() => Some((conversation_id, event)),
        else => None,
    }
}

fn report<E: std::fmt::Display>(out: &mut impl Write, result: Result<(), E>) -> io::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(error) => writeln!(out, "! {error}"),
    }
}
