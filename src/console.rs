//! Interactive editing console.
//!
//! Hosts an [`EditorSession`] together with a [`TaskPoller`]: edits are
//! typed as commands, autosave runs in the background, and the session is
//! reopened when the server finishes a voice generation.

use std::fmt::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::api::TaskApi;
use crate::config::Config;
use crate::editor::{EditorView, SaveOutcome};
use crate::error::{Result, DeskError};
use crate::poller::{TaskEvent, TaskPoller};
use crate::session::{EditorSession, GenerateOutcome};
use crate::subtitle::SubtitleField;
use crate::task::TaskData;

pub const HELP: &str = "\
Commands:
  list                          show the subtitle list
  set <index> <field> <value>   change start, end, text or speaker of an entry
  save                          save now instead of waiting for autosave
  generate                      save and request voice generation
  status                        show the task status
  help                          show this help
  quit                          leave the editor";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    Set {
        index: usize,
        field: SubtitleField,
        value: String,
    },
    Save,
    Generate,
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

        match word.to_lowercase().as_str() {
            "list" | "ls" => Ok(Self::List),
            "save" => Ok(Self::Save),
            "generate" => Ok(Self::Generate),
            "status" => Ok(Self::Status),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            "set" => {
                let mut parts = rest.trim_start().splitn(3, char::is_whitespace);
                let index = parts
                    .next()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| usage("set needs an index"))?
                    .parse::<usize>()
                    .map_err(|e| usage(&format!("invalid index: {}", e)))?;
                let field = parts
                    .next()
                    .ok_or_else(|| usage("set needs a field"))?
                    .parse::<SubtitleField>()?;
                // Value keeps its inner spacing; empty is allowed and fails validation
                let value = parts.next().unwrap_or("").trim_start().to_string();
                Ok(Self::Set { index, field, value })
            }
            _ => Err(usage(&format!("unknown command '{}'", word))),
        }
    }
}

fn usage(message: &str) -> DeskError {
    DeskError::Config(format!("{} (type 'help' for commands)", message))
}

/// Text rendering of the editor view
pub fn render_view(view: &EditorView) -> String {
    let mut out = String::new();
    match view {
        EditorView::Failed { message } => {
            let _ = writeln!(out, "Error: {}", message);
        }
        EditorView::Ready(panel) => {
            if let Some(rows) = &panel.rows {
                for row in rows {
                    let marker = if row.subtitle.modified { "*" } else { " " };
                    let flag = |field: SubtitleField| if row.invalid.contains(&field) { "!" } else { "" };
                    let _ = writeln!(
                        out,
                        "[{:>3}] #{}{} {}{} {}{} --> {}{} | {}{}",
                        row.index,
                        row.subtitle.id,
                        marker,
                        row.subtitle.speaker,
                        flag(SubtitleField::Speaker),
                        row.subtitle.start,
                        flag(SubtitleField::Start),
                        row.subtitle.end,
                        flag(SubtitleField::End),
                        row.subtitle.text,
                        flag(SubtitleField::Text),
                    );
                }
            }
            if let Some(status) = panel.status_indicator {
                let _ = writeln!(out, "Voice generation: {}...", status);
            }
            for banner in panel.banners() {
                let _ = writeln!(out, "! {}", banner);
            }
            let _ = writeln!(
                out,
                "Generate voice: {}",
                if panel.generate_enabled { "available" } else { "unavailable" }
            );
        }
    }
    out
}

async fn open_session(api: &Arc<dyn TaskApi>, poller: &TaskPoller, config: &Config) -> EditorSession {
    EditorSession::open(
        Arc::clone(api),
        poller.subscribe(),
        poller.refresh_handle(),
        config.editor.autosave_interval(),
    )
    .await
}

/// Run the console on stdin until `quit`, end of input or Ctrl-C.
pub async fn run_console(api: Arc<dyn TaskApi>, task: TaskData, config: &Config) -> Result<()> {
    let task_id = task.id.clone();
    let mut poller = TaskPoller::start(Arc::clone(&api), task, config.poller.interval());
    let mut events = poller.events();
    let mut session = open_session(&api, &poller, config).await;

    println!("Editing task {} ({} entries). Type 'help' for commands.", task_id, session.subtitles().len());
    print!("{}", render_view(&session.view()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match ConsoleCommand::parse(&line) {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => execute(&session, command).await,
                    Err(e) => println!("{}", e),
                }
            }
            event = events.recv() => match event {
                Ok(TaskEvent::StatusChanged { previous, current, .. }) => {
                    println!("Voice generation status: {} -> {}", previous, current);
                }
                Ok(TaskEvent::VoiceGenerationFinished { .. }) => {
                    info!("Voice generation finished, reloading subtitles");
                    session.close();
                    session = open_session(&api, &poller, config).await;
                    print!("{}", render_view(&session.view()));
                }
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} task events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    match session.flush().await {
        Some(SaveOutcome::Saved) => println!("Saved pending changes"),
        Some(SaveOutcome::Rejected(message)) => println!("Server rejected subtitles: {}", message),
        Some(SaveOutcome::Failed(message)) => println!("Pending changes were not saved: {}", message),
        Some(SaveOutcome::Discarded) | None => {}
    }
    session.close();
    poller.stop();
    Ok(())
}

async fn execute(session: &EditorSession, command: ConsoleCommand) {
    match command {
        ConsoleCommand::List => print!("{}", render_view(&session.view())),
        ConsoleCommand::Set { index, field, value } => match session.edit(index, field, value) {
            Ok(true) => println!("Updated {} of entry {}", field, index),
            Ok(false) => println!("Updated {} of entry {} (invalid format)", field, index),
            Err(e) => println!("{}", e),
        },
        ConsoleCommand::Save => match session.save().await {
            SaveOutcome::Saved => println!("Saved"),
            SaveOutcome::Rejected(message) => println!("Server rejected subtitles: {}", message),
            SaveOutcome::Failed(message) => println!("Save failed: {}", message),
            SaveOutcome::Discarded => {}
        },
        ConsoleCommand::Generate => match session.generate_voice().await {
            Ok(GenerateOutcome::Queued) => println!("Voice generation requested"),
            Ok(GenerateOutcome::Blocked) => println!("Subtitle format is wrong; fix the flagged fields first"),
            Ok(GenerateOutcome::Failed(message)) => println!("Error: {}", message),
            Ok(GenerateOutcome::Discarded) => {}
            Err(e) => println!("{}", e),
        },
        ConsoleCommand::Status => {
            let task = session.task();
            println!(
                "Subtitles: {} | Voice: {} | Unsaved changes: {}",
                task.subs_generation_status,
                task.voice_generation_status,
                session.has_unsaved_changes()
            );
        }
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
}
