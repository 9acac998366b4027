use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub interpreter: String,
    /// Script file name, resolved inside each item folder.
    pub script: String,
    pub keep_video: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            script: "run.py".to_string(),
            keep_video: false,
        }
    }
}

/// Run the folder's processing script on `video`.
///
/// The script runs with `folder` as its working directory and receives the
/// absolute video path as its only argument. The video is removed afterwards
/// unless `keep_video` is set.
pub async fn process_video(config: &ProcessorConfig, folder: &Path, video: &Path) -> Result<()> {
    let script = folder.join(&config.script);
    if !script.is_file() {
        anyhow::bail!("{} not found", script.display());
    }

    let video = tokio::fs::canonicalize(video)
        .await
        .with_context(|| format!("Video {} is missing", video.display()))?;

    info!("Running {} on {}", script.display(), video.display());

    let status = tokio::process::Command::new(&config.interpreter)
        .arg(&config.script)
        .arg(&video)
        .current_dir(folder)
        .status()
        .await
        .with_context(|| format!("Failed to execute {}", config.interpreter))?;

    if !status.success() {
        anyhow::bail!("{} exited with {}", script.display(), status);
    }
    info!("{} processed", folder.display());

    if !config.keep_video {
        tokio::fs::remove_file(&video)
            .await
            .with_context(|| format!("Failed to delete {}", video.display()))?;
        info!("Deleted {}", video.display());
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh_config(script: &str, keep_video: bool) -> ProcessorConfig {
        ProcessorConfig {
            interpreter: "sh".to_string(),
            script: script.to_string(),
            keep_video,
        }
    }

    #[tokio::test]
    async fn test_script_receives_video_path_and_video_is_deleted() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("run.sh"), "echo \"$1\" > seen.txt\n").unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, "data").unwrap();

        process_video(&sh_config("run.sh", false), dir.path(), &video)
            .await
            .unwrap();

        let seen = std::fs::read_to_string(dir.path().join("seen.txt")).unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap().join("clip.mp4");
        assert_eq!(seen.trim(), expected.to_string_lossy());
        assert!(!video.exists());
    }

    #[tokio::test]
    async fn test_keep_video() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("run.sh"), "exit 0\n").unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, "data").unwrap();

        process_video(&sh_config("run.sh", true), dir.path(), &video)
            .await
            .unwrap();
        assert!(video.exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_error_and_keeps_video() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("run.sh"), "exit 3\n").unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, "data").unwrap();

        let result = process_video(&sh_config("run.sh", false), dir.path(), &video).await;
        assert!(result.is_err());
        assert!(video.exists());
    }

    #[tokio::test]
    async fn test_missing_script_is_error() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, "data").unwrap();

        let err = process_video(&sh_config("run.sh", false), dir.path(), &video)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
