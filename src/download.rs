use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::api::TaskApi;
use crate::error::{Result, DeskError};

/// Destination for an artifact when none is given: its file name in `dir`.
pub fn default_destination(artifact_path: &str, dir: &Path) -> Result<PathBuf> {
    let file_name = Path::new(artifact_path)
        .file_name()
        .ok_or_else(|| DeskError::Download(format!("Artifact path has no file name: '{}'", artifact_path)))?;
    Ok(dir.join(file_name))
}

/// Download a task artifact to `output`, replacing any existing file.
pub async fn download_artifact(api: &dyn TaskApi, artifact_path: &str, output: &Path) -> Result<u64> {
    if artifact_path.trim().is_empty() {
        return Err(DeskError::Download("Artifact has not been produced yet".to_string()));
    }

    info!("Downloading {} to {}", artifact_path, output.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg} {bytes}")
            .map_err(|e| DeskError::Download(format!("Invalid progress template: {}", e)))?,
    );
    pb.set_message(artifact_path.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));

    let bytes = match api.download(artifact_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            pb.abandon_with_message(format!("Failed {}", artifact_path));
            return Err(e);
        }
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        async_fs::create_dir_all(parent).await?;
    }

    let temp_path = part_path(output);
    let downloaded = bytes.len() as u64;
    if let Err(e) = write_then_rename(&bytes, &temp_path, output).await {
        pb.abandon_with_message(format!("Failed {}", artifact_path));
        if let Err(cleanup) = async_fs::remove_file(&temp_path).await {
            debug!("Could not remove {}: {}", temp_path.display(), cleanup);
        }
        return Err(e);
    }
    pb.set_length(downloaded);
    pb.set_position(downloaded);

    pb.finish_with_message(format!("Downloaded {}", artifact_path));
    info!("Saved {} bytes to {}", downloaded, output.display());

    Ok(downloaded)
}

/// Partial-download path: the full file name with `.part` appended.
fn part_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

async fn write_then_rename(bytes: &[u8], temp_path: &Path, output: &Path) -> Result<()> {
    let mut file = async_fs::File::create(temp_path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    async_fs::rename(temp_path, output).await?;
    Ok(())
}
