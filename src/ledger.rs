use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Characters that are not allowed in file names on Windows, Linux or macOS.
const ILLEGAL_CHARS: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Marker written after each completed key.
const DONE_MARKER: &str = "done";

/// Derive the folder name and ledger key for a work item title.
///
/// Illegal file name characters, whitespace and control characters each
/// become `_`, so the key is always a single ledger token. Applying it to its
/// own output returns the same string.
pub fn derive_key(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_whitespace() || c.is_control() || ILLEGAL_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Read the set of completed keys from a ledger file.
///
/// A missing file is an empty ledger.
pub async fn load_keys(path: &Path) -> Result<HashSet<String>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Ledger {} not found, starting empty", path.display());
            return Ok(HashSet::new());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read ledger {}", path.display()))
        }
    };

    Ok(content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect())
}

/// Append `<key> done` to the ledger, creating the file if needed.
pub async fn append_key(path: &Path, key: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open ledger {}", path.display()))?;

    file.write_all(format!("{} {}\n", key, DONE_MARKER).as_bytes())
        .await
        .with_context(|| format!("Failed to append to ledger {}", path.display()))?;
    file.flush().await?;

    Ok(())
}

/// Append-only record of completed work items.
///
/// Only one batch process may write a given ledger file; appends from
/// separate processes are not coordinated.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    done: HashSet<String>,
}

impl Ledger {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let done = load_keys(&path).await?;
        info!("Ledger {}: {} items already finished", path.display(), done.len());
        Ok(Self { path, done })
    }

    pub fn is_done(&self, key: &str) -> bool {
        self.done.contains(key)
    }

    /// Persist `key` as finished. The in-memory set also picks it up so a
    /// repeated title later in the same input is skipped.
    pub async fn record(&mut self, key: &str) -> Result<()> {
        append_key(&self.path, key).await?;
        self.done.insert(key.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }
}
