//! Editor session: one mounted lifetime of the subtitle editor for a task.
//!
//! Opening a session loads the subtitle list and starts the autosave timer.
//! The task record arrives on a watch channel, usually fed by
//! [`crate::poller::TaskPoller`], and successful generation requests a
//! refetch through a [`RefreshHandle`]. Closing stops the timer and drops
//! the results of requests still in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::TaskApi;
use crate::editor::{EditorView, SaveOutcome, SubtitleEditor, GENERATE_ERROR_MESSAGE};
use crate::error::{EditRejection, Result, DeskError};
use crate::poller::RefreshHandle;
use crate::subtitle::{Subtitle, SubtitleField};
use crate::task::TaskData;

/// Result of the "generate voice" action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// Server accepted the request; a task refetch was requested
    Queued,
    /// Subtitle format is wrong, generation was not requested
    Blocked,
    /// Server or transport failure, now shown as the editor error
    Failed(String),
    /// Session closed while the request was in flight
    Discarded,
}

struct SessionInner {
    api: Arc<dyn TaskApi>,
    task_id: String,
    task: watch::Receiver<TaskData>,
    refresh: RefreshHandle,
    editor: Mutex<SubtitleEditor>,
    closed: AtomicBool,
}

impl SessionInner {
    fn editor(&self) -> MutexGuard<'_, SubtitleEditor> {
        self.editor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn save_snapshot(&self, snapshot: Vec<Subtitle>) -> SaveOutcome {
        debug!("Saving {} subtitles for task {}", snapshot.len(), self.task_id);
        let response = self.api.save_subs(&self.task_id, &snapshot).await;
        if self.is_closed() {
            return SaveOutcome::Discarded;
        }
        self.editor().apply_save(response)
    }

    async fn autosave_tick(&self) -> Option<SaveOutcome> {
        let snapshot = self.editor().take_autosave()?;
        Some(self.save_snapshot(snapshot).await)
    }
}

pub struct EditorSession {
    inner: Arc<SessionInner>,
    autosave: Mutex<Option<JoinHandle<()>>>,
}

impl EditorSession {
    /// Load the task's subtitles and start autosaving every `autosave_interval`.
    ///
    /// A failed load still yields a session; its view shows only the error.
    pub async fn open(
        api: Arc<dyn TaskApi>,
        task: watch::Receiver<TaskData>,
        refresh: RefreshHandle,
        autosave_interval: Duration,
    ) -> Self {
        let task_id = task.borrow().id.clone();
        info!("Opening subtitle editor for task {}", task_id);

        let editor = SubtitleEditor::from_load(api.get_json_subs(&task_id).await);
        let inner = Arc::new(SessionInner {
            api,
            task_id,
            task,
            refresh,
            editor: Mutex::new(editor),
            closed: AtomicBool::new(false),
        });

        let handle = tokio::spawn(run_autosave(Arc::clone(&inner), autosave_interval));

        Self {
            inner,
            autosave: Mutex::new(Some(handle)),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.inner.task_id
    }

    /// Latest task record seen by this session.
    pub fn task(&self) -> TaskData {
        self.inner.task.borrow().clone()
    }

    pub fn subtitles(&self) -> Vec<Subtitle> {
        self.inner.editor().snapshot()
    }

    pub fn format_wrong(&self) -> bool {
        self.inner.editor().format_wrong()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.inner.editor().has_unsaved_changes()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn view(&self) -> EditorView {
        let task = self.task();
        self.inner.editor().view(&task)
    }

    /// Change one field of the entry at `index`. Returns whether the value is valid.
    pub fn edit(&self, index: usize, field: SubtitleField, value: impl Into<String>) -> Result<bool> {
        if self.is_closed() {
            return Err(EditRejection::Closed.into());
        }
        let status = self.inner.task.borrow().voice_generation_status;
        let valid = self.inner.editor().edit(index, field, value, status)?;
        if !valid {
            debug!("Invalid {} at index {}", field, index);
        }
        Ok(valid)
    }

    /// Save the current list right away.
    pub async fn save(&self) -> SaveOutcome {
        if self.is_closed() {
            return SaveOutcome::Discarded;
        }
        let snapshot = self.inner.editor().snapshot();
        self.inner.save_snapshot(snapshot).await
    }

    /// Save pending edits now, if there are any. Used before closing.
    pub async fn flush(&self) -> Option<SaveOutcome> {
        if self.is_closed() {
            return None;
        }
        self.inner.autosave_tick().await
    }

    /// Save, then ask the server to generate the dubbed voice track.
    pub async fn generate_voice(&self) -> Result<GenerateOutcome> {
        if self.is_closed() {
            return Err(EditRejection::Closed.into());
        }
        let task = self.task();
        let format_wrong_before = {
            let editor = self.inner.editor();
            if let Some(message) = editor.fetch_error() {
                return Err(EditRejection::LoadFailed(message.to_string()).into());
            }
            editor.format_wrong()
        };
        if task.voice_generation_status.is_busy() {
            return Err(EditRejection::ReadOnly(task.voice_generation_status.to_string()).into());
        }
        if !task.has_translated_subs() {
            return Err(DeskError::NotFound(format!("translated subtitles for task {}", task.id)));
        }

        if self.save().await == SaveOutcome::Discarded {
            return Ok(GenerateOutcome::Discarded);
        }
        if format_wrong_before || self.format_wrong() {
            warn!("Subtitle format is wrong, voice generation not requested");
            return Ok(GenerateOutcome::Blocked);
        }

        info!("Requesting voice generation for task {}", self.inner.task_id);
        let response = self.inner.api.generate_voice(&self.inner.task_id).await;
        if self.is_closed() {
            return Ok(GenerateOutcome::Discarded);
        }

        match response {
            Ok(response) if response.is_success() => {
                self.inner.refresh.request();
                Ok(GenerateOutcome::Queued)
            }
            Ok(response) => {
                let message = response.error_message();
                warn!("Voice generation rejected: {}", message);
                self.inner.editor().set_fetch_error(message.clone());
                Ok(GenerateOutcome::Failed(message))
            }
            Err(e) => {
                warn!("Voice generation request failed: {}", e);
                self.inner.editor().set_fetch_error(GENERATE_ERROR_MESSAGE);
                Ok(GenerateOutcome::Failed(GENERATE_ERROR_MESSAGE.to_string()))
            }
        }
    }

    /// Stop autosaving and ignore responses still in flight.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = self
            .autosave
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        info!("Closed subtitle editor for task {}", self.inner.task_id);
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_autosave(inner: Arc<SessionInner>, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if inner.is_closed() {
            break;
        }
        if let Some(outcome) = inner.autosave_tick().await {
            debug!("Autosave finished: {:?}", outcome);
        }
    }
}
