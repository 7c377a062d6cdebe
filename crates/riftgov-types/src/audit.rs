//! Append-only audit trail and the run-scoped context that owns it.
//!
//! A [`RunContext`] is created once per validation or orchestration run and
//! passed by reference to every collaborator. Nothing here is process-global:
//! two runs with two contexts share no state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GovernanceDescriptor, ValidationOutcome};

// ---------------------------------------------------------------------------
// AuditRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "outcome")]
pub enum AuditOutcome {
    Passed,
    Failed,
    Warning,
    Governance(ValidationOutcome),
}

impl std::fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditOutcome::Passed => f.write_str("passed"),
            AuditOutcome::Failed => f.write_str("failed"),
            AuditOutcome::Warning => f.write_str("warning"),
            AuditOutcome::Governance(outcome) => write!(f, "{outcome}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub outcome: AuditOutcome,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

/// Append-only record of every check and its outcome.
///
/// Cloning an `AuditLog` yields another handle to the **same** records. There
/// is no API to edit or remove a record.
#[derive(Clone, Default)]
pub struct AuditLog {
    inner: Arc<tokio::sync::RwLock<Vec<AuditRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record stamped with the current time.
    pub async fn append(
        &self,
        subject: impl Into<String>,
        outcome: AuditOutcome,
        detail: impl Into<String>,
    ) {
        let record = AuditRecord {
            timestamp: Utc::now(),
            subject: subject.into(),
            outcome,
            detail: detail.into(),
        };
        tracing::debug!(subject = %record.subject, outcome = %record.outcome, "audit");
        self.inner.write().await.push(record);
    }

    /// Copy of all records in append order.
    pub async fn snapshot(&self) -> Vec<AuditRecord> {
        self.inner.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DescriptorCache
// ---------------------------------------------------------------------------

/// Descriptors parsed during this run, keyed by source path.
///
/// Populated lazily by the validator; every validation call still re-reads
/// its source and overwrites the entry.
#[derive(Clone, Default)]
pub struct DescriptorCache {
    inner: Arc<tokio::sync::RwLock<HashMap<PathBuf, GovernanceDescriptor>>>,
}

impl DescriptorCache {
    pub async fn get(&self, path: &Path) -> Option<GovernanceDescriptor> {
        self.inner.read().await.get(path).cloned()
    }

    pub async fn insert(&self, path: PathBuf, descriptor: GovernanceDescriptor) {
        self.inner.write().await.insert(path, descriptor);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// State owned by exactly one run.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub audit: AuditLog,
    pub descriptors: DescriptorCache,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            audit: AuditLog::new(),
            descriptors: DescriptorCache::default(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
