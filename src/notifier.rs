use std::{io, path::PathBuf, time::Duration};

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::models::RequisitionStatus;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to run hook: {0}")]
    Spawn(#[from] io::Error),

    #[error("Hook exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("Webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Tells the operator that a new consent flow was started.
///
/// Notifications are best effort: the requisition manager logs failures and
/// carries on.
#[async_trait]
pub trait RenewalNotifier: Send + Sync {
    async fn notify(&self, status: &RequisitionStatus, link: &str) -> Result<(), NotifyError>;
}

/// Runs an executable as `<program> <status> <link>`
#[derive(Debug, Clone)]
pub struct CommandHook {
    program: PathBuf,
}

impl CommandHook {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl RenewalNotifier for CommandHook {
    async fn notify(&self, status: &RequisitionStatus, link: &str) -> Result<(), NotifyError> {
        let output = Command::new(&self.program)
            .arg(status.code())
            .arg(link)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(NotifyError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!("Hook {} completed", self.program.display());
        Ok(())
    }
}

/// Posts `{"status": ..., "link": ...}` to a URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RenewalNotifier for WebhookNotifier {
    async fn notify(&self, status: &RequisitionStatus, link: &str) -> Result<(), NotifyError> {
        self.client
            .post(&self.url)
            .json(&json!({ "status": status.code(), "link": link }))
            .send()
            .await?
            .error_for_status()?;
        debug!("Webhook {} notified", self.url);
        Ok(())
    }
}
