use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Contents of `info.json`, read by the per-item script.
#[derive(Debug, Serialize)]
pub struct VideoMetadata<'a> {
    pub video_name: &'a str,
    pub video_title: &'a str,
    pub video_url: &'a str,
}

pub async fn write_metadata(folder: &Path, key: &str, url: &str) -> Result<()> {
    let metadata = VideoMetadata {
        video_name: key,
        video_title: key,
        video_url: url,
    };
    let path = folder.join("info.json");
    tokio::fs::write(&path, serde_json::to_string_pretty(&metadata)?)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Copy the template's top-level entries into `folder`.
///
/// Entries whose destination already exists are left alone, so a re-run keeps
/// whatever the previous attempt produced.
pub fn copy_template(template: &Path, folder: &Path) -> Result<()> {
    let entries = std::fs::read_dir(template)
        .with_context(|| format!("Failed to read template {}", template.display()))?;

    for entry in entries {
        let src = entry?.path();
        let Some(name) = src.file_name() else {
            continue;
        };
        let dst = folder.join(name);
        if dst.exists() {
            debug!("Keeping existing {}", dst.display());
            continue;
        }

        if src.is_dir() {
            copy_dir(&src, &dst)?;
        } else {
            std::fs::copy(&src, &dst)
                .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
        }
    }

    Ok(())
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src)?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), target.display())
            })?;
        }
    }
    Ok(())
}
