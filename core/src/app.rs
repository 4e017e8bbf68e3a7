//! Line-oriented terminal front end over [`RoomDirectory`] and [`RoomTimeline`].

use std::{io::Write, sync::Arc};

use anyhow::Result;
use store_api::DocumentStore;
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

use crate::{
    directory::RoomDirectory,
    events::{EventChannel, Notice, RoomSelected},
    model::{ChatMessage, ChatRoom},
    timeline::RoomTimeline,
};

const ROOM_TIME: &[FormatItem<'static>] =
    format_description!("[year]/[month]/[day] [hour repr:12]:[minute]:[second]");
const MESSAGE_TIME: &[FormatItem<'static>] = format_description!("[hour repr:12]:[minute]");

pub const HELP: &str = "\
commands:
  rooms          list rooms
  make <name>    create a room
  open <n>       open room number n
  send <text>    send a message to the open room
  refresh        reload rooms or the open room
  back           leave the open room
  help           show this help
  quit           exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Rooms,
    Make(String),
    /// Zero-based index into the room list.
    Open(usize),
    Send(String),
    Refresh,
    Back,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match word {
        "" => Command::Empty,
        "rooms" => Command::Rooms,
        "make" if rest.is_empty() => Command::Invalid("usage: make <name>".into()),
        "make" => Command::Make(rest.to_string()),
        "open" => match rest.parse::<usize>() {
            Ok(n) if n > 0 => Command::Open(n - 1),
            _ => Command::Invalid("usage: open <n>".into()),
        },
        "send" if rest.is_empty() => Command::Invalid("usage: send <text>".into()),
        "send" => Command::Send(rest.to_string()),
        "refresh" => Command::Refresh,
        "back" => Command::Back,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command {other:?}, try help")),
    }
}

fn stamp(at: OffsetDateTime, format: &[FormatItem<'_>]) -> String {
    at.format(format).unwrap_or_else(|_| at.to_string())
}

pub fn room_line(index: usize, room: &ChatRoom) -> String {
    format!(
        "{:>3}. {}  {}",
        index + 1,
        room.name,
        stamp(room.created_at, ROOM_TIME)
    )
}

pub fn message_line(message: &ChatMessage) -> String {
    format!(
        "[{}] {}",
        stamp(message.created_at, MESSAGE_TIME),
        message.message
    )
}

async fn next_message(timeline: &mut Option<RoomTimeline>) -> Option<ChatMessage> {
    match timeline {
        Some(timeline) => timeline.next_update().await,
        None => std::future::pending().await,
    }
}

struct Session<W> {
    store: Arc<dyn DocumentStore>,
    events: EventChannel,
    directory: RoomDirectory,
    timeline: Option<RoomTimeline>,
    out: W,
}

impl<W: Write> Session<W> {
    fn print_rooms(&mut self) -> Result<()> {
        if self.directory.rooms().is_empty() {
            writeln!(self.out, "no rooms yet, create one with: make <name>")?;
        }
        for (i, room) in self.directory.rooms().iter().enumerate() {
            writeln!(self.out, "{}", room_line(i, room))?;
        }
        Ok(())
    }

    fn print_timeline(&mut self) -> Result<()> {
        let Some(timeline) = &self.timeline else {
            return Ok(());
        };
        writeln!(self.out, "== {} ==", timeline.title())?;
        for message in timeline.messages() {
            writeln!(self.out, "{}", message_line(message))?;
        }
        Ok(())
    }

    async fn list_rooms(&mut self) -> Result<()> {
        if let Err(err) = self.directory.list_rooms().await {
            writeln!(self.out, "could not load rooms: {err}")?;
        }
        self.print_rooms()
    }

    async fn open(&mut self, selected: RoomSelected) -> Result<()> {
        if let Some(mut old) = self.timeline.take() {
            old.close();
        }
        match RoomTimeline::open(
            self.store.clone(),
            self.events.clone(),
            &selected.room_id,
            &selected.name,
        )
        .await
        {
            Ok(timeline) => {
                self.timeline = Some(timeline);
                self.print_timeline()
            }
            Err(err) => {
                writeln!(self.out, "could not open room: {err}")?;
                Ok(())
            }
        }
    }

    fn leave(&mut self) {
        if let Some(mut timeline) = self.timeline.take() {
            timeline.close();
        }
    }

    /// Returns false once the session should end.
    async fn execute(&mut self, command: Command) -> Result<bool> {
        debug!(?command, "command");
        match command {
            Command::Empty => {}
            Command::Rooms => self.list_rooms().await?,
            Command::Make(name) => {
                // The outcome arrives as a Notice; the list is reloaded either way.
                let _ = self.directory.create_room(&name).await;
                self.print_rooms()?;
            }
            Command::Open(index) => {
                if self.directory.select_index(index).is_none() {
                    writeln!(self.out, "no room number {}", index + 1)?;
                }
            }
            Command::Send(text) => match &self.timeline {
                Some(timeline) => {
                    let _ = timeline.send(&text).await;
                }
                None => writeln!(self.out, "open a room first")?,
            },
            Command::Refresh => match &mut self.timeline {
                Some(timeline) => {
                    timeline.refresh().await;
                    self.print_timeline()?;
                }
                None => self.list_rooms().await?,
            },
            Command::Back => {
                self.leave();
                self.print_rooms()?;
            }
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Quit => return Ok(false),
            Command::Invalid(reason) => writeln!(self.out, "{reason}")?,
        }
        Ok(true)
    }
}

/// Drive a session until `input` is exhausted or `quit` is entered.
pub async fn run<R, W>(store: Arc<dyn DocumentStore>, input: R, out: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let events = EventChannel::new();
    let mut selections = events.subscribe::<RoomSelected>();
    let mut notices = events.subscribe::<Notice>();
    let mut session = Session {
        directory: RoomDirectory::new(store.clone(), events.clone()),
        store,
        events,
        timeline: None,
        out,
    };
    let mut lines = input.lines();

    session.list_rooms().await?;
    writeln!(session.out, "type help for commands")?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !session.execute(parse_command(&line)).await? {
                    break;
                }
                while let Some(selected) = selections.try_recv() {
                    session.open(selected).await?;
                }
                while let Some(notice) = notices.try_recv() {
                    writeln!(session.out, "* {notice}")?;
                }
            }
            Some(selected) = selections.recv() => session.open(selected).await?,
            Some(notice) = notices.recv() => writeln!(session.out, "* {notice}")?,
            Some(message) = next_message(&mut session.timeline) => {
                writeln!(session.out, "{}", message_line(&message))?;
            }
        }
        session.out.flush()?;
    }

    session.leave();
    info!("session ended");
    Ok(())
}
