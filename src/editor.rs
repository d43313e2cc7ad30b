//! Subtitle editor state.
//!
//! [`SubtitleEditor`] is the synchronous core of an editing session: the
//! local subtitle list, per-field validation flags, the sticky
//! "format is wrong" flag and the unsaved-changes marker. It performs no
//! I/O; [`crate::session::EditorSession`] feeds it server responses.

use tracing::{debug, warn};

use crate::api::{ApiResponse, Empty, SubsPayload};
use crate::error::{EditRejection, Result as DeskResult};
use crate::subtitle::{FieldErrors, Subtitle, SubtitleField};
use crate::task::{TaskData, TaskStatus};

pub const FETCH_ERROR_MESSAGE: &str = "Error fetching subtitles";
pub const GENERATE_ERROR_MESSAGE: &str = "Error uploading subtitles and generating voice";
pub const GENERATION_FAILED_BANNER: &str =
    "Last generation process failed. Please check subs and try again.";
pub const FORMAT_WRONG_BANNER: &str =
    "Incorrect subs format! Please check the subs or reload page to reset subs.";

/// Result of one save round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Server accepted the list
    Saved,
    /// Server answered with a non-success status
    Rejected(String),
    /// Request never produced an envelope
    Failed(String),
    /// Session closed before the response arrived
    Discarded,
}

#[derive(Debug, Default)]
pub struct SubtitleEditor {
    subtitles: Vec<Subtitle>,
    field_errors: FieldErrors,
    format_wrong: bool,
    unsaved_changes: bool,
    fetch_error: Option<String>,
}

impl SubtitleEditor {
    /// Editor holding a freshly loaded list
    pub fn with_subtitles(subtitles: Vec<Subtitle>) -> Self {
        Self {
            subtitles,
            ..Default::default()
        }
    }

    /// Editor whose initial load failed
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            fetch_error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Build the editor from the outcome of `get_json_subs`.
    pub fn from_load(response: DeskResult<ApiResponse<SubsPayload>>) -> Self {
        match response {
            Ok(response) if response.is_success() => {
                debug!("Loaded {} subtitles", response.data.json_subs.len());
                Self::with_subtitles(response.data.json_subs)
            }
            Ok(response) => {
                let message = response.message.unwrap_or_else(|| FETCH_ERROR_MESSAGE.to_string());
                warn!("Subtitle load rejected: {}", message);
                Self::failed(message)
            }
            Err(e) => {
                warn!("Subtitle load failed: {}", e);
                Self::failed(FETCH_ERROR_MESSAGE)
            }
        }
    }

    pub fn subtitles(&self) -> &[Subtitle] {
        &self.subtitles
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    pub fn format_wrong(&self) -> bool {
        self.format_wrong
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved_changes
    }

    pub fn fetch_error(&self) -> Option<&str> {
        self.fetch_error.as_deref()
    }

    pub fn set_fetch_error(&mut self, message: impl Into<String>) {
        self.fetch_error = Some(message.into());
    }

    /// Apply one field edit. Returns whether the new value is valid.
    ///
    /// An invalid value is still stored; it raises the format-wrong flag,
    /// which only a successful save clears.
    pub fn edit(
        &mut self,
        index: usize,
        field: SubtitleField,
        value: impl Into<String>,
        status: TaskStatus,
    ) -> Result<bool, EditRejection> {
        if let Some(message) = &self.fetch_error {
            return Err(EditRejection::LoadFailed(message.clone()));
        }
        if status.is_busy() {
            return Err(EditRejection::ReadOnly(status.to_string()));
        }
        let len = self.subtitles.len();
        let subtitle = self
            .subtitles
            .get_mut(index)
            .ok_or(EditRejection::IndexOutOfRange { index, len })?;

        let value = value.into();
        let valid = field.validate(&value);
        self.field_errors.set(index, field, !valid);
        if !self.field_errors.is_empty() {
            self.format_wrong = true;
        }

        subtitle.set_field(field, value);
        self.unsaved_changes = true;
        Ok(valid)
    }

    /// Snapshot to save if the autosave timer should fire now.
    ///
    /// Clears the unsaved-changes marker when it returns a snapshot.
    pub fn take_autosave(&mut self) -> Option<Vec<Subtitle>> {
        if self.fetch_error.is_some() || self.subtitles.is_empty() || !self.unsaved_changes {
            return None;
        }
        self.unsaved_changes = false;
        Some(self.subtitles.clone())
    }

    /// Snapshot for an explicit save.
    pub fn snapshot(&self) -> Vec<Subtitle> {
        self.subtitles.clone()
    }

    /// Fold a save response into the format-wrong flag.
    pub fn apply_save(&mut self, response: DeskResult<ApiResponse<Empty>>) -> SaveOutcome {
        match response {
            Ok(response) if response.is_success() => {
                self.format_wrong = false;
                SaveOutcome::Saved
            }
            Ok(response) => {
                self.format_wrong = true;
                let message = response.error_message();
                warn!("Subtitle save rejected: {}", message);
                SaveOutcome::Rejected(message)
            }
            Err(e) => {
                warn!("Error saving subtitles: {}", e);
                SaveOutcome::Failed(e.to_string())
            }
        }
    }

    /// Compute what the editor shows for the given task state.
    pub fn view(&self, task: &TaskData) -> EditorView {
        if let Some(message) = &self.fetch_error {
            return EditorView::Failed {
                message: message.clone(),
            };
        }

        let status = task.voice_generation_status;
        let busy = status.is_busy();
        let rows = (!busy).then(|| {
            self.subtitles
                .iter()
                .enumerate()
                .map(|(index, subtitle)| SubtitleRow {
                    index,
                    subtitle: subtitle.clone(),
                    invalid: self.field_errors.fields_for(index),
                })
                .collect()
        });

        EditorView::Ready(EditorPanel {
            rows,
            status_indicator: busy.then_some(status),
            generation_failed: status == TaskStatus::Error,
            format_wrong: self.format_wrong,
            generate_enabled: task.has_translated_subs() && !busy && !self.format_wrong,
        })
    }
}

/// What the editor presents to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorView {
    /// Load or generation failed; nothing else is shown
    Failed { message: String },
    Ready(EditorPanel),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditorPanel {
    /// Editable rows; absent while the server is generating
    pub rows: Option<Vec<SubtitleRow>>,
    pub status_indicator: Option<TaskStatus>,
    pub generation_failed: bool,
    pub format_wrong: bool,
    pub generate_enabled: bool,
}

impl EditorPanel {
    pub fn banners(&self) -> Vec<&'static str> {
        let mut banners = Vec::new();
        if self.generation_failed {
            banners.push(GENERATION_FAILED_BANNER);
        }
        if self.format_wrong {
            banners.push(FORMAT_WRONG_BANNER);
        }
        banners
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleRow {
    pub index: usize,
    pub subtitle: Subtitle,
    pub invalid: Vec<SubtitleField>,
}
