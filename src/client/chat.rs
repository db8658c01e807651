use std::path::{Path, PathBuf};

use console::style;
use dialoguer::Input;
use tracing::debug;

use super::BackendClient;
use crate::sessions::sanitize_session_id;
use crate::{RagError, Result};

/// Placeholder id for a conversation that has not asked anything yet
pub const NEW_CHAT_ID: &str = "new_chat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Ask(String),
    New,
    Switch(String),
    Sessions,
    History,
    Delete,
    Export(Option<PathBuf>),
    Help,
    Quit,
}

impl ChatCommand {
    /// Interpret one line of input; anything that is not a known `/command` is a question
    #[inline]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return ChatCommand::Ask(trimmed.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };

        match (name, arg) {
            ("new", _) => ChatCommand::New,
            ("switch" | "open", Some(id)) => ChatCommand::Switch(id.to_string()),
            ("sessions" | "list", _) => ChatCommand::Sessions,
            ("history", _) => ChatCommand::History,
            ("delete", _) => ChatCommand::Delete,
            ("export" | "download", path) => ChatCommand::Export(path.map(PathBuf::from)),
            ("quit" | "exit" | "q", _) => ChatCommand::Quit,
            _ => ChatCommand::Help,
        }
    }
}

/// Which session the chat loop is writing to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatState {
    session_id: String,
}

impl Default for ChatState {
    #[inline]
    fn default() -> Self {
        Self::new(None)
    }
}

impl ChatState {
    #[inline]
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            session_id: session_id.unwrap_or_else(|| NEW_CHAT_ID.to_string()),
        }
    }

    #[inline]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[inline]
    pub fn is_new(&self) -> bool {
        self.session_id == NEW_CHAT_ID
    }

    /// Session to ask `question` in; a new chat takes its name from its first question
    #[inline]
    pub fn session_for_question(&mut self, question: &str) -> &str {
        if self.is_new() {
            self.session_id = sanitize_session_id(question);
        }
        &self.session_id
    }

    #[inline]
    pub fn reset(&mut self) {
        NEW_CHAT_ID.clone_into(&mut self.session_id);
    }

    #[inline]
    pub fn switch(&mut self, session_id: &str) {
        self.session_id = sanitize_session_id(session_id);
    }

    /// Default file name for an exported transcript
    #[inline]
    pub fn export_path(&self) -> PathBuf {
        PathBuf::from(format!("chat_{}.txt", self.session_id))
    }
}

/// Interactive question loop against a running query server
#[inline]
pub fn run_chat(client: &BackendClient, session_id: Option<String>) -> Result<()> {
    let mut state = ChatState::new(session_id);

    eprintln!("{}", style("📄 PDF RAG Chat").bold().cyan());
    eprintln!("Ask a question, or type /help for commands.");
    eprintln!();

    loop {
        let line: String = Input::new()
            .with_prompt(format!("[{}]", state.session_id()))
            .allow_empty(true)
            .interact_text()
            .map_err(|e| RagError::Other(e.into()))?;

        match ChatCommand::parse(&line) {
            ChatCommand::Quit => break,
            ChatCommand::Help => print_help(),
            ChatCommand::New => {
                state.reset();
                eprintln!("{}", style("Started a new chat.").green());
            }
            ChatCommand::Switch(id) => {
                state.switch(&id);
                report(show_history(client, state.session_id()));
            }
            ChatCommand::Sessions => report(show_sessions(client, state.session_id())),
            ChatCommand::History => report(show_history(client, state.session_id())),
            ChatCommand::Delete => {
                if state.is_new() {
                    eprintln!("Nothing to delete yet.");
                } else {
                    report(client.delete_session(state.session_id()).map(|deleted| {
                        if deleted {
                            eprintln!("{}", style("Chat deleted.").green());
                        } else {
                            eprintln!("Chat was already gone.");
                        }
                    }));
                    state.reset();
                }
            }
            ChatCommand::Export(path) => {
                let path = path.unwrap_or_else(|| state.export_path());
                report(export_transcript(client, state.session_id(), &path));
            }
            ChatCommand::Ask(question) => {
                let session_id = if question.is_empty() {
                    state.session_id().to_string()
                } else {
                    state.session_for_question(&question).to_string()
                };
                debug!("Asking in session {}", session_id);

                report(client.ask(&session_id, &question).map(|reply| {
                    eprintln!("{} {}", style("Bot:").bold().green(), reply.answer);
                }));
            }
        }
    }

    Ok(())
}

/// Print a backend failure without leaving the loop
fn report(result: Result<()>) {
    if let Err(e) = result {
        eprintln!("{} {}", style("⚠").yellow(), e);
    }
}

fn show_sessions(client: &BackendClient, current: &str) -> Result<()> {
    let sessions = client.list_sessions()?;
    if sessions.is_empty() {
        eprintln!("No saved chats.");
    }
    for id in sessions {
        let marker = if id == current { "*" } else { " " };
        eprintln!("{} {}", marker, id);
    }
    Ok(())
}

fn show_history(client: &BackendClient, session_id: &str) -> Result<()> {
    let turns = client.history(session_id)?;
    if turns.is_empty() {
        eprintln!("No messages yet.");
    }
    for turn in turns {
        eprintln!("{} {}", style("You:").bold().cyan(), turn.question);
        eprintln!("{} {}", style("Bot:").bold().green(), turn.answer);
    }
    Ok(())
}

fn export_transcript(client: &BackendClient, session_id: &str, path: &Path) -> Result<()> {
    let transcript = client.transcript(session_id)?;
    std::fs::write(path, transcript)?;
    eprintln!(
        "{} {}",
        style("Transcript saved to").green(),
        style(path.display()).cyan()
    );
    Ok(())
}

fn print_help() {
    eprintln!("Commands:");
    eprintln!("  /new              start a new chat");
    eprintln!("  /switch <id>      continue a saved chat");
    eprintln!("  /sessions         list saved chats");
    eprintln!("  /history          show this chat");
    eprintln!("  /delete           delete this chat");
    eprintln!("  /export [path]    save this chat as text");
    eprintln!("  /quit             leave");
}
