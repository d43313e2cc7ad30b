// Task server API
//
// Every endpoint answers with a JSON envelope `{status, message?, ...}`.
// The envelope's `status` decides success; the HTTP code does not. A body
// that is not an envelope surfaces as an `Err`.
//
// - TaskApi: the operations the client needs, one method per endpoint
// - http: reqwest implementation with a cookie-backed login session

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[cfg(test)]
use mockall::automock;

pub use http::HttpTaskApi;

use crate::error::{Result, DeskError};
use crate::subtitle::Subtitle;
use crate::task::TaskData;

pub const STATUS_SUCCESS: &str = "success";

/// Response envelope shared by all JSON endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: None,
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Server message, or a generic description of the failed status.
    pub fn error_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("server responded with status '{}'", self.status))
    }

    /// Unwrap the payload of a successful response.
    pub fn into_result(self) -> Result<T> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(DeskError::Api(self.error_message()))
        }
    }
}

impl<T: Default> ApiResponse<T> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
            data: T::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    #[serde(default)]
    pub task_info: Option<TaskData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskListPayload {
    #[serde(default)]
    pub tasks: Vec<TaskData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatedTaskPayload {
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsPayload {
    #[serde(default)]
    pub json_subs: Vec<Subtitle>,
}

/// Source video upload that starts subtitle generation for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub task_id: String,
    pub lang_from: String,
    pub lang_to: String,
    pub video_path: PathBuf,
}

impl UploadRequest {
    /// The server only accepts `.mp4` sources.
    pub fn validate(&self) -> Result<()> {
        let is_mp4 = self
            .video_path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "mp4");
        if !is_mp4 {
            return Err(DeskError::Upload(format!(
                "Invalid video file extension: {} (only .mp4 is accepted)",
                self.video_path.display()
            )));
        }
        if self.lang_from.trim().is_empty() || self.lang_to.trim().is_empty() {
            return Err(DeskError::Upload("Source and target languages are required".to_string()));
        }
        Ok(())
    }
}

/// Operations offered by the task server
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Currently logged-in user
    async fn current_user(&self) -> Result<ApiResponse<UserPayload>>;

    /// Start a session for the given account
    async fn login(&self, username: &str, password: &str) -> Result<ApiResponse<UserPayload>>;

    async fn logout(&self) -> Result<ApiResponse<Empty>>;

    async fn list_tasks(&self) -> Result<ApiResponse<TaskListPayload>>;

    async fn get_task(&self, task_id: &str) -> Result<ApiResponse<TaskPayload>>;

    async fn create_task(&self, title: &str, creator_username: &str) -> Result<ApiResponse<CreatedTaskPayload>>;

    async fn delete_task(&self, task_id: &str) -> Result<ApiResponse<Empty>>;

    /// Upload the source video and queue subtitle generation
    async fn create_subs(&self, request: &UploadRequest) -> Result<ApiResponse<Empty>>;

    async fn get_json_subs(&self, task_id: &str) -> Result<ApiResponse<SubsPayload>>;

    /// Replace the task's subtitle list on the server
    async fn save_subs(&self, task_id: &str, subtitles: &[Subtitle]) -> Result<ApiResponse<Empty>>;

    /// Queue voice generation from the saved subtitles
    async fn generate_voice(&self, task_id: &str) -> Result<ApiResponse<Empty>>;

    /// Raw bytes of an artifact under the server's upload folder
    async fn download(&self, path: &str) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_with_payload() {
        let response: ApiResponse<SubsPayload> = serde_json::from_value(json!({
            "status": "success",
            "json_subs": [
                {"id": 1, "start": "00:00:01,000", "end": "00:00:02,000", "text": "Hi", "speaker": "A", "modified": false}
            ]
        }))
        .unwrap();
        assert!(response.is_success());
        assert_eq!(response.data.json_subs.len(), 1);
    }

    #[test]
    fn test_envelope_error_without_payload() {
        let response: ApiResponse<SubsPayload> =
            serde_json::from_value(json!({"status": "error", "message": "bad id"})).unwrap();
        assert!(!response.is_success());
        assert!(response.data.json_subs.is_empty());
        match response.into_result() {
            Err(DeskError::Api(message)) => assert_eq!(message, "bad id"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_message_fallback() {
        let response: ApiResponse<Empty> = serde_json::from_value(json!({"status": "error"})).unwrap();
        assert_eq!(response.error_message(), "server responded with status 'error'");
    }

    #[test]
    fn test_upload_request_validation() {
        let mut request = UploadRequest {
            task_id: "t1".into(),
            lang_from: "en".into(),
            lang_to: "de".into(),
            video_path: PathBuf::from("clip.mp4"),
        };
        assert!(request.validate().is_ok());

        request.video_path = PathBuf::from("clip.mkv");
        assert!(matches!(request.validate(), Err(DeskError::Upload(_))));

        request.video_path = PathBuf::from("clip.mp4");
        request.lang_to = " ".into();
        assert!(matches!(request.validate(), Err(DeskError::Upload(_))));
    }
}
