use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

/// What happened to one work item during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Completed,
    /// Already in the ledger.
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub row: usize,
    pub key: String,
    pub title: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Per-run summary of every item the batch looked at.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set when the run stopped before reaching the end of the input.
    pub interrupted: bool,
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            interrupted: false,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, row: usize, key: &str, title: &str, outcome: ItemOutcome) {
        self.items.push(ItemReport {
            row,
            key: key.to_string(),
            title: title.to_string(),
            outcome,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Completed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }

    pub async fn write_json(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, serde_json::to_string_pretty(self)?)
            .await
            .with_context(|| format!("Failed to write report {}", path.display()))
    }
}

impl Default for BatchReport {
    fn default() -> Self {
        Self::new()
    }
}
