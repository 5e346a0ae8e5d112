//! Built-in feedback subscribers.

use super::{FeedbackHandler, HandlerError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;
use veritas_kernel::FeedbackEvent;

/// Appends each event as one JSON line, for replay and offline analysis.
pub struct JsonlTraceSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlTraceSink {
    /// Open `path` for appending, creating parent directories as needed.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FeedbackHandler for JsonlTraceSink {
    fn name(&self) -> &str {
        "jsonl-trace"
    }

    async fn handle(&self, event: &FeedbackEvent) -> Result<(), HandlerError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Writes a structured `tracing` record per event under the
/// `veritas::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl FeedbackHandler for TracingAuditSink {
    fn name(&self) -> &str {
        "tracing-audit"
    }

    async fn handle(&self, event: &FeedbackEvent) -> Result<(), HandlerError> {
        info!(
            target: "veritas::audit",
            event_id = %event.id,
            request_id = %event.request_id,
            kind = %event.kind(),
            source = %event.source,
            "feedback"
        );
        Ok(())
    }
}
