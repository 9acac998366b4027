use anyhow::Result;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::download::{self, DownloaderConfig};
use crate::folder;
use crate::input::WorkItem;
use crate::lease::{AcquirePolicy, LeaseClient};
use crate::ledger::{derive_key, Ledger};
use crate::process::{self, ProcessorConfig};
use crate::report::{BatchReport, ItemOutcome};

/// The external work done for one item.
#[async_trait]
pub trait ItemPipeline: Send + Sync {
    /// Download `item` into `folder` and return the video. The only step that
    /// needs the cookie file.
    async fn download(
        &self,
        item: &WorkItem,
        key: &str,
        folder: &Path,
        cookies: &Path,
    ) -> Result<PathBuf>;

    /// Lay out the rest of the folder around the downloaded video.
    async fn prepare(&self, item: &WorkItem, key: &str, folder: &Path) -> Result<()>;

    /// Run the per-item processing on a downloaded video.
    async fn process(&self, folder: &Path, video: &Path) -> Result<()>;
}

/// yt-dlp download, `info.json`, template copy, then the folder's script.
#[derive(Debug, Clone, Default)]
pub struct VideoPipeline {
    pub downloader: DownloaderConfig,
    pub template: Option<PathBuf>,
    pub processor: ProcessorConfig,
}

#[async_trait]
impl ItemPipeline for VideoPipeline {
    async fn download(
        &self,
        item: &WorkItem,
        key: &str,
        folder: &Path,
        cookies: &Path,
    ) -> Result<PathBuf> {
        download::download_video(&self.downloader, &item.url, folder, key, cookies).await
    }

    async fn prepare(&self, item: &WorkItem, key: &str, folder: &Path) -> Result<()> {
        folder::write_metadata(folder, key, &item.url).await?;
        if let Some(template) = &self.template {
            folder::copy_template(template, folder)?;
        }
        info!("{} ready with template + video", folder.display());
        Ok(())
    }

    async fn process(&self, folder: &Path, video: &Path) -> Result<()> {
        process::process_video(&self.processor, folder, video).await
    }
}

/// Where the downloader's cookie file comes from.
#[derive(Debug, Clone)]
pub enum CookieSource {
    /// The same file for every item.
    Static(PathBuf),
    /// Leased per download; the granted id names a file in `cookies_dir`.
    Leased {
        client: LeaseClient,
        policy: AcquirePolicy,
        cookies_dir: PathBuf,
    },
}

/// Runs work items one at a time, skipping those already in the ledger.
pub struct BatchRunner<P> {
    pipeline: P,
    ledger: Ledger,
    cookies: CookieSource,
    work_dir: PathBuf,
    cancel: CancellationToken,
}

impl<P: ItemPipeline> BatchRunner<P> {
    pub fn new(
        pipeline: P,
        ledger: Ledger,
        cookies: CookieSource,
        work_dir: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            ledger,
            cookies,
            work_dir: work_dir.into(),
            cancel,
        }
    }

    pub async fn run(&mut self, items: Vec<WorkItem>) -> BatchReport {
        let mut report = BatchReport::new();
        info!(
            "Batch {} started with {} items, {} already in the ledger",
            report.run_id,
            items.len(),
            self.ledger.len()
        );

        for item in items {
            if self.cancel.is_cancelled() {
                warn!("Batch cancelled, stopping before row {}", item.row);
                report.interrupted = true;
                break;
            }

            let key = derive_key(&item.title);

            if let Some(reason) = invalid_reason(&item, &key) {
                error!("Row {} rejected: {}", item.row, reason);
                report.push(item.row, &key, &item.title, ItemOutcome::Failed { reason });
                continue;
            }

            if self.ledger.is_done(&key) {
                info!("Skipping {}: already processed", key);
                report.push(item.row, &key, &item.title, ItemOutcome::Skipped);
                continue;
            }

            info!("=== Starting {} (row {}) ===", key, item.row);
            match self.run_item(&item, &key).await {
                Ok(()) => {
                    info!("=== Finished {} ===", key);
                    report.push(item.row, &key, &item.title, ItemOutcome::Completed);
                }
                Err(e) => {
                    error!("{} failed: {:?}", key, e);
                    report.push(
                        item.row,
                        &key,
                        &item.title,
                        ItemOutcome::Failed {
                            reason: format!("{:#}", e),
                        },
                    );
                    if self.cancel.is_cancelled() {
                        report.interrupted = true;
                        break;
                    }
                }
            }
        }

        report.finish();
        info!(
            "Batch {} done: {} completed, {} skipped, {} failed{}",
            report.run_id,
            report.completed(),
            report.skipped(),
            report.failed(),
            if report.interrupted { " (interrupted)" } else { "" }
        );
        report
    }

    /// Lease, download, release, prepare, process, record. Any error leaves
    /// the key out of the ledger.
    async fn run_item(&mut self, item: &WorkItem, key: &str) -> Result<()> {
        let folder = self.work_dir.join(key);

        let video = match &self.cookies {
            CookieSource::Static(cookies) => {
                self.pipeline.download(item, key, &folder, cookies).await?
            }
            CookieSource::Leased {
                client,
                policy,
                cookies_dir,
            } => {
                let lease = client.acquire(policy, &self.cancel).await?;
                let downloaded = match cookie_path(cookies_dir, lease.resource_id()) {
                    Ok(cookies) => self.pipeline.download(item, key, &folder, &cookies).await,
                    Err(e) => Err(e),
                };
                client.release(lease).await;
                downloaded?
            }
        };

        self.pipeline.prepare(item, key, &folder).await?;
        self.pipeline.process(&folder, &video).await?;
        self.ledger.record(key).await?;
        Ok(())
    }
}

/// Resolve a leased cookie name inside `cookies_dir`. Names that are empty,
/// absolute or climb out of the directory are refused.
fn cookie_path(cookies_dir: &Path, resource_id: &str) -> Result<PathBuf> {
    let name = Path::new(resource_id);
    if resource_id.is_empty() || !name.components().all(|c| matches!(c, Component::Normal(_))) {
        anyhow::bail!("Coordinator returned unusable cookie name {:?}", resource_id);
    }
    Ok(cookies_dir.join(name))
}

fn invalid_reason(item: &WorkItem, key: &str) -> Option<String> {
    if item.title.trim().is_empty() {
        Some("empty title".to_string())
    } else if item.url.trim().is_empty() {
        Some("empty URL".to_string())
    } else if key == "." || key == ".." {
        Some(format!("title {:?} is not a usable folder name", item.title))
    } else {
        None
    }
}
