use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Progress of one server-side pipeline stage of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    #[default]
    Idle,
    Queued,
    Processing,
    Error,
    /// Anything the server sends that is not one of the above
    Unknown,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Queued => "Queued",
            Self::Processing => "Processing",
            Self::Error => "Error",
            Self::Unknown => "Unknown",
        }
    }

    /// Queued or processing: the server owns the subtitles right now.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Idle" => Self::Idle,
            "Queued" => Self::Queued,
            "Processing" => Self::Processing,
            "Error" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Task record as returned by `get_task` and `get_all_tasks`.
///
/// Artifact paths are empty until the corresponding stage has produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskData {
    #[serde(deserialize_with = "nullable_string")]
    pub id: String,
    pub number_id: Option<i64>,
    #[serde(deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(deserialize_with = "nullable_string")]
    pub creation_date: String,
    #[serde(deserialize_with = "nullable_string")]
    pub last_used: String,
    #[serde(deserialize_with = "nullable_string")]
    pub lang_from: String,
    #[serde(deserialize_with = "nullable_string")]
    pub lang_to: String,
    #[serde(deserialize_with = "nullable_string")]
    pub src_vid_path: String,
    #[serde(deserialize_with = "nullable_string")]
    pub src_audio_path: String,
    #[serde(deserialize_with = "nullable_string")]
    pub srt_orig_subs_path: String,
    #[serde(deserialize_with = "nullable_string")]
    pub srt_translated_subs_path: String,
    #[serde(deserialize_with = "nullable_string")]
    pub json_translated_subs_path: String,
    #[serde(deserialize_with = "nullable_string")]
    pub translated_audio_path: String,
    #[serde(deserialize_with = "nullable_string")]
    pub translated_video_path: String,
    pub subs_generation_status: TaskStatus,
    pub voice_generation_status: TaskStatus,
    #[serde(deserialize_with = "nullable_string")]
    pub creator_username: String,
}

/// A downloadable artifact of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub label: String,
    pub path: String,
}

impl TaskData {
    pub fn has_translated_subs(&self) -> bool {
        !self.json_translated_subs_path.is_empty()
    }

    /// Overall status shown in the task list.
    pub fn overall_status(&self) -> TaskStatus {
        aggregate_status(self.subs_generation_status, self.voice_generation_status)
    }

    /// Artifacts produced so far, in the order a results panel lists them.
    pub fn artifacts(&self) -> Vec<Artifact> {
        let candidates = [
            ("translated audio".to_string(), &self.translated_audio_path),
            ("original audio".to_string(), &self.src_audio_path),
            (format!("SRT subs ({})", self.lang_from), &self.srt_orig_subs_path),
            (format!("SRT subs ({})", self.lang_to), &self.srt_translated_subs_path),
            ("JSON subs".to_string(), &self.json_translated_subs_path),
            ("translated video".to_string(), &self.translated_video_path),
        ];

        candidates
            .into_iter()
            .filter(|(_, path)| !path.is_empty())
            .map(|(label, path)| Artifact { label, path: path.clone() })
            .collect()
    }
}

/// Combine the two stage statuses: processing beats queued beats idle.
pub fn aggregate_status(subs: TaskStatus, voice: TaskStatus) -> TaskStatus {
    let statuses = [subs, voice];
    for priority in [TaskStatus::Processing, TaskStatus::Queued, TaskStatus::Idle] {
        if statuses.contains(&priority) {
            return priority;
        }
    }
    if statuses.contains(&TaskStatus::Error) {
        TaskStatus::Error
    } else {
        TaskStatus::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_values() {
        let status: TaskStatus = serde_json::from_value(json!("Queued")).unwrap();
        assert_eq!(status, TaskStatus::Queued);
        assert!(status.is_busy());

        let status: TaskStatus = serde_json::from_value(json!("queued")).unwrap();
        assert_eq!(status, TaskStatus::Unknown);
        assert!(!status.is_busy());

        assert_eq!(serde_json::to_value(TaskStatus::Processing).unwrap(), json!("Processing"));
    }

    #[test]
    fn test_task_with_nulls_and_missing_fields() {
        let task: TaskData = serde_json::from_value(json!({
            "id": "abc",
            "title": "Interview",
            "json_translated_subs_path": null,
            "voice_generation_status": "Error",
        }))
        .unwrap();

        assert_eq!(task.id, "abc");
        assert!(!task.has_translated_subs());
        assert_eq!(task.voice_generation_status, TaskStatus::Error);
        assert_eq!(task.subs_generation_status, TaskStatus::Idle);
    }

    #[test]
    fn test_aggregate_status_priority() {
        use TaskStatus::*;
        assert_eq!(aggregate_status(Idle, Processing), Processing);
        assert_eq!(aggregate_status(Queued, Processing), Processing);
        assert_eq!(aggregate_status(Queued, Idle), Queued);
        assert_eq!(aggregate_status(Error, Idle), Idle);
        assert_eq!(aggregate_status(Error, Error), Error);
        assert_eq!(aggregate_status(Unknown, Unknown), Unknown);
    }

    #[test]
    fn test_artifacts_skip_missing() {
        let task = TaskData {
            lang_from: "en".into(),
            lang_to: "de".into(),
            src_audio_path: "uploads/a.wav".into(),
            srt_translated_subs_path: "uploads/a_de.srt".into(),
            ..Default::default()
        };
        let labels: Vec<_> = task.artifacts().into_iter().map(|a| a.label).collect();
        assert_eq!(labels, vec!["original audio", "SRT subs (de)"]);
    }
}
