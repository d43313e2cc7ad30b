use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Editor error: {0}")]
    Editor(#[from] EditRejection),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Reasons an editor operation is refused without touching any state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditRejection {
    #[error("subtitles could not be loaded: {0}")]
    LoadFailed(String),

    #[error("editor is read-only while voice generation is {0}")]
    ReadOnly(String),

    #[error("no subtitle at index {index} (list has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("editor session is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, DeskError>;
