use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::repo::BatchStore;
use crate::email::{repo_types::EmailKind, services::EmailService};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NotificationContent {
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifySummary {
    pub sent: usize,
    pub failed: usize,
}

pub type BuildMessage = Arc<dyn Fn(&Recipient) -> NotificationContent + Send + Sync>;

/// Sends to each recipient in turn, waiting `interval` between recipients.
/// A failed recipient is counted and skipped; the batch always runs to the end.
pub async fn notify_all<F>(
    email: &EmailService,
    recipients: &[Recipient],
    kind: EmailKind,
    related_to: Option<&str>,
    build: F,
    interval: Duration,
) -> NotifySummary
where
    F: Fn(&Recipient) -> NotificationContent,
{
    let mut summary = NotifySummary::default();
    for (i, recipient) in recipients.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(interval).await;
        }
        let content = build(recipient);
        let outcome = match email.compose(&recipient.email, content.subject, content.html, kind) {
            Ok(mut message) => {
                if let Some(related) = related_to {
                    message = message.related_to(related);
                }
                email.send(&message).await.map(|_| ())
            }
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => summary.sent += 1,
            Err(e) => {
                warn!(to = %recipient.email, error = %e, "notification failed; continuing batch");
                summary.failed += 1;
            }
        }
    }
    summary
}

pub struct NotificationJob {
    pub batch_id: Uuid,
    pub recipients: Vec<Recipient>,
    pub kind: EmailKind,
    pub related_to: Option<String>,
    pub build: BuildMessage,
}

/// Handle for queueing paced batches onto the single notifier worker.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<NotificationJob>,
    batches: Arc<dyn BatchStore>,
}

impl NotificationQueue {
    /// Reports batches a previous process left unfinished, then starts the worker.
    pub async fn start(
        email: Arc<EmailService>,
        batches: Arc<dyn BatchStore>,
        interval: Duration,
    ) -> anyhow::Result<Self> {
        for batch in batches.recover_interrupted().await? {
            warn!(
                batch_id = %batch.id,
                label = %batch.label,
                total = batch.total,
                "notification batch interrupted by restart; remaining sends were not delivered"
            );
        }
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_notifier_worker(rx, email, batches.clone(), interval);
        Ok(Self { tx, batches })
    }

    /// Records the batch as queued and hands it to the worker. Returns the batch id.
    pub async fn enqueue(
        &self,
        label: &str,
        recipients: Vec<Recipient>,
        kind: EmailKind,
        related_to: Option<String>,
        build: BuildMessage,
    ) -> anyhow::Result<Uuid> {
        let total = i32::try_from(recipients.len()).unwrap_or(i32::MAX);
        let batch = self.batches.create(label, total).await?;
        self.tx
            .send(NotificationJob {
                batch_id: batch.id,
                recipients,
                kind,
                related_to,
                build,
            })
            .map_err(|_| anyhow::anyhow!("notifier worker is not running"))?;
        info!(batch_id = %batch.id, %label, total, "notification batch queued");
        Ok(batch.id)
    }
}

/// One worker drains the queue, so batches never interleave their sends.
pub fn spawn_notifier_worker(
    mut rx: mpsc::UnboundedReceiver<NotificationJob>,
    email: Arc<EmailService>,
    batches: Arc<dyn BatchStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            if let Err(e) = batches.mark_running(job.batch_id).await {
                error!(batch_id = %job.batch_id, error = %e, "failed to mark batch running");
            }
            let build = job.build.clone();
            let summary = notify_all(
                &email,
                &job.recipients,
                job.kind,
                job.related_to.as_deref(),
                |r| build(r),
                interval,
            )
            .await;
            info!(batch_id = %job.batch_id, sent = summary.sent, failed = summary.failed, "notification batch finished");
            let (sent, failed) = (
                i32::try_from(summary.sent).unwrap_or(i32::MAX),
                i32::try_from(summary.failed).unwrap_or(i32::MAX),
            );
            if let Err(e) = batches.complete(job.batch_id, sent, failed).await {
                error!(batch_id = %job.batch_id, error = %e, "failed to record batch outcome");
            }
        }
    })
}
