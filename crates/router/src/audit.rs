//! Route audit trail: a bounded in-memory ring of resolved routes,
//! optionally mirrored line by line to a JSONL file.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use lg_domain::config::RoutingConfig;

use crate::route::EffectiveRoute;

/// One resolved route, keyed by the work item it was resolved for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAuditRecord {
    pub work_item_id: String,
    pub timestamp: DateTime<Utc>,
    pub route: EffectiveRoute,
    /// `"lane:provider"` the caller dispatched to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane: Option<String>,
}

/// Thread-safe ring buffer of recent routes.
///
/// The oldest record is evicted once the buffer is full.  When a
/// `persist_path` is set every record is also appended to it as one
/// JSON line; a failed append is logged and does not affect the buffer.
pub struct RouteAuditLog {
    inner: Mutex<VecDeque<RouteAuditRecord>>,
    capacity: usize,
    persist_path: Option<PathBuf>,
}

impl RouteAuditLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            persist_path: None,
        }
    }

    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    pub fn from_config(cfg: &RoutingConfig) -> Self {
        let log = Self::new(cfg.audit_capacity);
        match &cfg.audit_path {
            Some(path) => log.with_persist_path(path.clone()),
            None => log,
        }
    }

    /// Store the route unchanged and return the stored record.
    pub fn record(&self, work_item_id: &str, route: &EffectiveRoute, lane: Option<String>) -> RouteAuditRecord {
        let record = RouteAuditRecord {
            work_item_id: work_item_id.to_owned(),
            timestamp: Utc::now(),
            route: route.clone(),
            lane,
        };

        {
            let mut buf = self.inner.lock();
            if buf.len() >= self.capacity {
                buf.pop_front();
            }
            buf.push_back(record.clone());
        }

        tracing::info!(
            work_item_id = %record.work_item_id,
            mode = %route.mode(),
            route_score = route.route_score(),
            reasons = ?route.reason_codes(),
            "route recorded"
        );

        if let Some(path) = &self.persist_path {
            if let Err(e) = append_line(path, &record) {
                tracing::warn!(error = %e, path = %path.display(), "failed to append route audit record");
            }
        }
        record
    }

    /// The `limit` most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<RouteAuditRecord> {
        let buf = self.inner.lock();
        buf.iter().rev().take(limit).cloned().collect()
    }

    /// Latest record for a work item, if still buffered.
    pub fn get(&self, work_item_id: &str) -> Option<RouteAuditRecord> {
        self.inner
            .lock()
            .iter()
            .rev()
            .find(|r| r.work_item_id == work_item_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

fn append_line(path: &Path, record: &RouteAuditRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(record)?;
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{json}")
}
