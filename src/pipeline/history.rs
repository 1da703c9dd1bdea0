//! Append-only log of pipeline results.
//!
//! The only shared mutable state in the pipeline. Appends go through a
//! single write lock so entries never interleave; retention is count-based.

use super::PipelineResult;
use std::collections::VecDeque;
use tokio::sync::RwLock;

pub struct HistoryStore {
    entries: RwLock<VecDeque<PipelineResult>>,
    retention: usize,
}

impl HistoryStore {
    pub fn new(retention: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            retention: retention.max(1),
        }
    }

    pub async fn append(&self, result: PipelineResult) {
        let mut entries = self.entries.write().await;
        entries.push_back(result);
        while entries.len() > self.retention {
            entries.pop_front();
        }
    }

    /// Most recent first, optionally filtered by success.
    pub async fn recent(&self, limit: usize, success: Option<bool>) -> Vec<PipelineResult> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .filter(|r| success.is_none_or(|wanted| r.success == wanted))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
