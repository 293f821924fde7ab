use wabiz_core::MessageStatus;
use wabiz_core::webhook::StatusUpdate;
use wabiz_db::StatusOutcome;

use crate::error::Result;
use crate::events::PushEvent;
use crate::worker::WabizWorker;

impl WabizWorker {
    /// Applies one delivery receipt to the stored message.
    ///
    /// Receipts may arrive late, twice or out of order. Only a receipt that
    /// actually moves the message forward is pushed to the owner.
    pub async fn reconcile_status(&self, update: &StatusUpdate) -> Result<StatusOutcome> {
        let outcome = match update.status {
            MessageStatus::Failed => {
                self.db
                    .mark_failed(
                        &update.provider_message_id,
                        update.timestamp,
                        update.error.as_deref(),
                    )
                    .await?
            }
            status => {
                self.db
                    .apply_status(&update.provider_message_id, status, update.timestamp)
                    .await?
            }
        };

        match &outcome {
            StatusOutcome::Applied(message) => {
                tracing::debug!(
                    message_id = %message.id,
                    provider_message_id = %update.provider_message_id,
                    status = %message.status,
                    "Status applied"
                );
                self.publish(
                    &message.user_id,
                    PushEvent::MessageStatusUpdate {
                        message: message.clone(),
                    },
                );
            }
            StatusOutcome::Stale { current } => {
                tracing::debug!(
                    provider_message_id = %update.provider_message_id,
                    incoming = %update.status,
                    current = %current,
                    "Stale status ignored"
                );
            }
            StatusOutcome::Unknown => {
                tracing::debug!(
                    provider_message_id = %update.provider_message_id,
                    status = %update.status,
                    "Status for unknown message"
                );
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use wabiz_core::MessageStatus::*;

    use super::*;
    use crate::test_support::*;

    fn receipt(pid: &str, status: MessageStatus, timestamp: i64) -> StatusUpdate {
        StatusUpdate {
            phone_number_id: "pn-1".into(),
            provider_message_id: pid.into(),
            status,
            timestamp,
            recipient_id: "15550002222".into(),
            error: None,
        }
    }

    #[tokio::test]
    async fn read_then_delivered_stays_read() {
        let h = harness().await;
        let sent = h.send_text("15550002222", "hi").await;
        let pid = sent.message.provider_message_id.clone().unwrap();

        let read = h.worker.reconcile_status(&receipt(&pid, Read, 200)).await.unwrap();
        assert!(matches!(read, StatusOutcome::Applied(ref m) if m.status == Read));

        let late = h.worker.reconcile_status(&receipt(&pid, Delivered, 150)).await.unwrap();
        assert!(matches!(late, StatusOutcome::Stale { current: Read }));

        let stored = h.worker.db().get_message("u1", &sent.message.id).await.unwrap();
        assert_eq!(stored.status, Read);
        assert_eq!(stored.read_at, Some(200));
        assert_eq!(stored.delivered_at, None);
    }

    #[tokio::test]
    async fn failure_is_final_and_keeps_reason() {
        let h = harness().await;
        let sent = h.send_text("15550002222", "hi").await;
        let pid = sent.message.provider_message_id.clone().unwrap();

        let mut failed = receipt(&pid, Failed, 300);
        failed.error = Some("131026: Message undeliverable".into());
        h.worker.reconcile_status(&failed).await.unwrap();

        let after = h.worker.reconcile_status(&receipt(&pid, Read, 400)).await.unwrap();
        assert!(matches!(after, StatusOutcome::Stale { current: Failed }));

        let stored = h.worker.db().get_message("u1", &sent.message.id).await.unwrap();
        assert_eq!(stored.status, Failed);
        assert_eq!(stored.error_message.as_deref(), Some("131026: Message undeliverable"));
    }

    #[tokio::test]
    async fn applied_status_is_pushed_to_owner() {
        let h = harness().await;
        let sent = h.send_text("15550002222", "hi").await;
        let pid = sent.message.provider_message_id.clone().unwrap();

        let mut rx = h.worker.notifier().subscribe("u1");
        h.worker.reconcile_status(&receipt(&pid, Delivered, 100)).await.unwrap();

        match rx.try_recv().unwrap() {
            PushEvent::MessageStatusUpdate { message } => assert_eq!(message.status, Delivered),
            other => panic!("unexpected event {other:?}"),
        }

        h.worker.reconcile_status(&receipt(&pid, Sent, 90)).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_provider_id_is_ignored() {
        let h = harness().await;
        let outcome = h.worker.reconcile_status(&receipt("wamid.nope", Read, 1)).await.unwrap();
        assert!(matches!(outcome, StatusOutcome::Unknown));
    }
}
