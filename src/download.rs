use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Extensions yt-dlp produces for video-only formats.
const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "mkv", "webm"];

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub binary: String,
    pub format: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            format: "bestvideo".to_string(),
        }
    }
}

/// Build the yt-dlp argument list. Output lands in `folder` as `<key>.<ext>`.
pub fn ytdlp_args(
    config: &DownloaderConfig,
    url: &str,
    folder: &Path,
    key: &str,
    cookies: &Path,
) -> Vec<String> {
    let output_template = folder.join(format!("{}.%(ext)s", key));

    vec![
        "-f".to_string(),
        config.format.clone(),
        "--cookies".to_string(),
        cookies.to_string_lossy().to_string(),
        "-o".to_string(),
        output_template.to_string_lossy().to_string(),
        url.to_string(),
    ]
}

/// Download video from URL using yt-dlp into `folder`
pub async fn download_video(
    config: &DownloaderConfig,
    url: &str,
    folder: &Path,
    key: &str,
    cookies: &Path,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(folder)
        .await
        .with_context(|| format!("Failed to create {}", folder.display()))?;

    info!("Downloading {} into {}", url, folder.display());

    let output = tokio::process::Command::new(&config.binary)
        .args(ytdlp_args(config, url, folder, key, cookies))
        .output()
        .await
        .with_context(|| format!("Failed to execute {}", config.binary))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{} failed ({}): {}", config.binary, output.status, stderr.trim());
    }

    find_video_file(folder, key)?
        .with_context(|| format!("No video downloaded in {}", folder.display()))
}

/// The `<key>.<ext>` video yt-dlp wrote into `folder`. Other videos in the
/// folder, e.g. from the template, are ignored.
pub fn find_video_file(folder: &Path, key: &str) -> Result<Option<PathBuf>> {
    let mut videos = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        if !path.is_file() || path.file_stem().and_then(|s| s.to_str()) != Some(key) {
            continue;
        }
        let is_video = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| VIDEO_EXTENSIONS.contains(&ext))
            .unwrap_or(false);
        if is_video {
            videos.push(path);
        }
    }

    videos.sort();
    Ok(videos.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ytdlp_args_layout() {
        let args = ytdlp_args(
            &DownloaderConfig::default(),
            "https://example.com/v",
            Path::new("work/Intro_Video"),
            "Intro_Video",
            Path::new("cookies/c1.txt"),
        );

        assert_eq!(
            args,
            vec![
                "-f",
                "bestvideo",
                "--cookies",
                "cookies/c1.txt",
                "-o",
                "work/Intro_Video/Intro_Video.%(ext)s",
                "https://example.com/v",
            ]
        );
    }

    #[test]
    fn test_find_video_file_ignores_other_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("info.json"), "{}").unwrap();
        std::fs::write(dir.path().join("clip.part"), "").unwrap();
        std::fs::write(dir.path().join("clip.json"), "").unwrap();
        assert!(find_video_file(dir.path(), "clip").unwrap().is_none());

        std::fs::write(dir.path().join("clip.webm"), "").unwrap();
        std::fs::write(dir.path().join("clip.mkv"), "").unwrap();
        let found = find_video_file(dir.path(), "clip").unwrap().unwrap();
        assert_eq!(found, dir.path().join("clip.mkv"));
    }

    #[test]
    fn test_find_video_file_skips_template_videos() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("background.mp4"), "template").unwrap();
        std::fs::write(dir.path().join("zed_item.mp4"), "download").unwrap();

        let found = find_video_file(dir.path(), "zed_item").unwrap().unwrap();
        assert_eq!(found, dir.path().join("zed_item.mp4"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_error() {
        let dir = tempdir().unwrap();
        let config = DownloaderConfig {
            binary: "definitely-not-a-real-downloader".to_string(),
            ..DownloaderConfig::default()
        };

        let result = download_video(
            &config,
            "https://example.com/v",
            &dir.path().join("Item"),
            "Item",
            Path::new("cookies.txt"),
        )
        .await;

        assert!(result.is_err());
        assert!(dir.path().join("Item").is_dir());
    }
}
