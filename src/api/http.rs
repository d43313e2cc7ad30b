use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::fs;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::{Result, DeskError};
use crate::subtitle::Subtitle;
use super::{
    ApiResponse, CreatedTaskPayload, Empty, SubsPayload, TaskApi, TaskListPayload, TaskPayload,
    UploadRequest, UserPayload,
};

/// reqwest-backed client for the task server.
///
/// Keeps a cookie store, so a successful `login` authenticates every later
/// request made through the same instance.
pub struct HttpTaskApi {
    client: Client,
    base_url: String,
}

impl HttpTaskApi {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request and decode the JSON envelope, whatever the HTTP code.
    async fn envelope<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<ApiResponse<T>> {
        let response = request.send().await?;
        let http_status = response.status();
        let body = response.text().await?;

        debug!("Server answered HTTP {} ({} bytes)", http_status, body.len());

        serde_json::from_str(&body).map_err(|e| {
            DeskError::Api(format!("Unexpected response (HTTP {}): {}", http_status, e))
        })
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn current_user(&self) -> Result<ApiResponse<UserPayload>> {
        self.envelope(self.client.get(self.url("@me"))).await
    }

    async fn login(&self, username: &str, password: &str) -> Result<ApiResponse<UserPayload>> {
        debug!("Logging in as {}", username);
        let body = json!({ "username": username, "password": password });
        self.envelope(self.client.post(self.url("login_user")).json(&body)).await
    }

    async fn logout(&self) -> Result<ApiResponse<Empty>> {
        self.envelope(self.client.post(self.url("logout"))).await
    }

    async fn list_tasks(&self) -> Result<ApiResponse<TaskListPayload>> {
        self.envelope(self.client.get(self.url("get_all_tasks"))).await
    }

    async fn get_task(&self, task_id: &str) -> Result<ApiResponse<TaskPayload>> {
        self.envelope(self.client.get(self.url(&format!("get_task/{}", task_id)))).await
    }

    async fn create_task(&self, title: &str, creator_username: &str) -> Result<ApiResponse<CreatedTaskPayload>> {
        let body = json!({ "title": title, "creator_username": creator_username });
        self.envelope(self.client.post(self.url("create_task")).json(&body)).await
    }

    async fn delete_task(&self, task_id: &str) -> Result<ApiResponse<Empty>> {
        self.envelope(self.client.delete(self.url(&format!("delete_task/{}", task_id)))).await
    }

    async fn create_subs(&self, request: &UploadRequest) -> Result<ApiResponse<Empty>> {
        request.validate()?;

        let file_name = request
            .video_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| DeskError::Upload("Video path has no file name".to_string()))?;
        let bytes = fs::read(&request.video_path).await?;
        debug!("Uploading {} ({} bytes) for task {}", file_name, bytes.len(), request.task_id);

        let video = Part::bytes(bytes).file_name(file_name).mime_str("video/mp4")?;
        let form = Form::new()
            .text("task_id", request.task_id.clone())
            .text("lang_from", request.lang_from.clone())
            .text("lang_to", request.lang_to.clone())
            .part("video_file", video);

        self.envelope(self.client.post(self.url("create_subs")).multipart(form)).await
    }

    async fn get_json_subs(&self, task_id: &str) -> Result<ApiResponse<SubsPayload>> {
        self.envelope(self.client.get(self.url(&format!("get_json_subs/{}", task_id)))).await
    }

    async fn save_subs(&self, task_id: &str, subtitles: &[Subtitle]) -> Result<ApiResponse<Empty>> {
        debug!("Saving {} subtitles for task {}", subtitles.len(), task_id);
        let body = json!({ "json_subs": subtitles });
        self.envelope(self.client.post(self.url(&format!("save_subs/{}", task_id))).json(&body)).await
    }

    async fn generate_voice(&self, task_id: &str) -> Result<ApiResponse<Empty>> {
        self.envelope(self.client.post(self.url(&format!("generate_voice/{}", task_id)))).await
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let response = self.client.get(self.url(&format!("download/{}", path))).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiResponse<Empty>>(&error_text)
                .map(|envelope| envelope.error_message())
                .unwrap_or(error_text);
            return Err(DeskError::Download(format!("HTTP {}: {}", status, message)));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let config = ServerConfig {
            url: "http://localhost:5000/".to_string(),
            ..Default::default()
        };
        let api = HttpTaskApi::new(&config).unwrap();
        assert_eq!(api.base_url(), "http://localhost:5000");
        assert_eq!(api.url("get_task/42"), "http://localhost:5000/get_task/42");
        assert_eq!(api.url("/@me"), "http://localhost:5000/@me");
    }

    #[tokio::test]
    async fn test_upload_rejects_non_mp4_before_sending() {
        let api = HttpTaskApi::new(&ServerConfig::default()).unwrap();
        let request = UploadRequest {
            task_id: "t1".into(),
            lang_from: "en".into(),
            lang_to: "de".into(),
            video_path: "movie.avi".into(),
        };
        assert!(matches!(api.create_subs(&request).await, Err(DeskError::Upload(_))));
    }
}
