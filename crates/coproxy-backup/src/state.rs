//! Tracks the one in-flight export/import operation plus a history of
//! completed ones. Peripheral to the proxy's core request path; its only
//! contract with the rest of the system is via [`coproxy_pool::CredentialPool`].

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Idle,
    Export,
    Import,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Idle,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupRecord {
    pub operation: OperationType,
    pub accounts_count: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

struct Inner {
    operation: OperationType,
    status: OperationStatus,
    progress: f64,
    last_error: Option<String>,
    history: Vec<BackupRecord>,
}

pub struct BackupState {
    inner: RwLock<Inner>,
}

impl Default for BackupState {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupState {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                operation: OperationType::Idle,
                status: OperationStatus::Idle,
                progress: 0.0,
                last_error: None,
                history: Vec::new(),
            }),
        }
    }

    pub async fn start(&self, operation: OperationType) {
        let mut guard = self.inner.write().await;
        guard.operation = operation;
        guard.status = OperationStatus::InProgress;
        guard.progress = 0.0;
        guard.last_error = None;
    }

    pub async fn update_progress(&self, progress: f64) {
        let mut guard = self.inner.write().await;
        guard.progress = progress.clamp(0.0, 1.0);
    }

    pub async fn complete(&self, accounts_count: usize) {
        let mut guard = self.inner.write().await;
        let operation = guard.operation;
        guard.status = OperationStatus::Completed;
        guard.progress = 1.0;
        guard.last_error = None;
        guard.history.push(BackupRecord {
            operation,
            accounts_count,
            completed_at: OffsetDateTime::now_utc(),
        });
        guard.operation = OperationType::Idle;
    }

    pub async fn fail(&self, message: impl Into<String>) {
        let mut guard = self.inner.write().await;
        guard.status = OperationStatus::Failed;
        guard.last_error = Some(message.into());
    }

    pub async fn status(&self) -> OperationStatus {
        self.inner.read().await.status
    }

    pub async fn progress(&self) -> f64 {
        self.inner.read().await.progress
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.read().await.last_error.clone()
    }

    pub async fn history(&self) -> Vec<BackupRecord> {
        self.inner.read().await.history.clone()
    }
}
