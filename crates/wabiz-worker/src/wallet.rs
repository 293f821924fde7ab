use wabiz_core::signature::verify_hmac_sha256_hex;
use wabiz_core::{PageRequest, Paged};
use wabiz_db::{PaymentOutcome, Wallet, WalletTransaction};

use crate::error::{Result, WorkerError};
use crate::worker::WabizWorker;

/// The string the payment provider signs for a callback.
pub fn payment_signature_payload(order_id: &str, payment_id: &str) -> String {
    format!("{order_id}|{payment_id}")
}

impl WabizWorker {
    pub async fn wallet(&self, user_id: &str) -> Result<Wallet> {
        Ok(self.db.get_or_create_wallet(user_id).await?)
    }

    pub async fn list_transactions(&self, user_id: &str, page: PageRequest) -> Result<Paged<WalletTransaction>> {
        Ok(self.db.list_transactions(user_id, page).await?)
    }

    pub async fn create_order(&self, user_id: &str, order_id: &str, amount: i64) -> Result<WalletTransaction> {
        if order_id.trim().is_empty() {
            return Err(WorkerError::Validation("order_id is required".into()));
        }
        Ok(self.db.create_order(user_id, order_id.trim(), amount).await?)
    }

    /// Settles a payment provider callback.
    ///
    /// A bad signature is rejected without touching the order. A valid one
    /// credits the wallet once; repeated callbacks report `AlreadyHandled`.
    pub async fn reconcile_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<PaymentOutcome> {
        let Some(secret) = self.settings.payment_secret.as_deref() else {
            tracing::error!(order_id, "Payment callback received but no payment secret is configured");
            return Err(WorkerError::InvalidSignature);
        };

        let payload = payment_signature_payload(order_id, payment_id);
        if !verify_hmac_sha256_hex(secret, signature, payload.as_bytes()) {
            tracing::warn!(order_id, payment_id, "Payment signature mismatch");
            return Err(WorkerError::InvalidSignature);
        }

        let outcome = self.db.complete_payment(order_id, payment_id).await?;
        if let PaymentOutcome::AlreadyHandled(tx) = &outcome {
            tracing::info!(order_id, status = tx.status.as_str(), "Payment callback repeated");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use wabiz_core::signature::hmac_sha256_hex;
    use wabiz_db::TransactionStatus;

    use super::*;
    use crate::test_support::*;

    fn sign(order_id: &str, payment_id: &str) -> String {
        hmac_sha256_hex(PAYMENT_SECRET, payment_signature_payload(order_id, payment_id).as_bytes())
    }

    #[tokio::test]
    async fn valid_callback_credits_once() {
        let h = harness().await;
        h.worker.create_order("u1", "order-1", 500).await.unwrap();

        let sig = sign("order-1", "pay-1");
        let first = h.worker.reconcile_payment("order-1", "pay-1", &sig).await.unwrap();
        match first {
            PaymentOutcome::Completed { wallet, transaction } => {
                assert_eq!(wallet.balance, 500);
                assert_eq!(transaction.status, TransactionStatus::Success);
            }
            other => panic!("expected completion, got {other:?}"),
        }

        let second = h.worker.reconcile_payment("order-1", "pay-1", &sig).await.unwrap();
        assert!(matches!(second, PaymentOutcome::AlreadyHandled(_)));
        assert_eq!(h.worker.wallet("u1").await.unwrap().balance, 500);
    }

    #[tokio::test]
    async fn forged_callback_leaves_the_order_payable() {
        let h = harness().await;
        h.worker.create_order("u1", "order-2", 300).await.unwrap();

        let err = h
            .worker
            .reconcile_payment("order-2", "pay-2", "deadbeef")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::InvalidSignature));

        let tx = h.worker.db().get_transaction_by_order("order-2").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(h.worker.wallet("u1").await.unwrap().balance, 0);

        let genuine = h
            .worker
            .reconcile_payment("order-2", "pay-2", &sign("order-2", "pay-2"))
            .await
            .unwrap();
        assert!(matches!(genuine, PaymentOutcome::Completed { .. }));
        assert_eq!(h.worker.wallet("u1").await.unwrap().balance, 300);
    }

    #[tokio::test]
    async fn rejects_non_positive_orders() {
        let h = harness().await;
        let err = h.worker.create_order("u1", "order-3", 0).await.unwrap_err();
        assert!(matches!(err, WorkerError::Validation(_)));
    }
}
