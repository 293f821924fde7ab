use sqlx::SqliteConnection;
use wabiz_core::{PageRequest, Paged};

use crate::error::{DbError, Result};
use crate::models::{PaymentOutcome, Wallet, WalletTransaction};
use crate::repository::{WabizDb, chrono_timestamp};

impl WabizDb {
    pub async fn get_or_create_wallet(&self, user_id: &str) -> Result<Wallet> {
        sqlx::query("INSERT OR IGNORE INTO wallets (user_id, balance, updated_at) VALUES (?, 0, ?)")
            .bind(user_id)
            .bind(chrono_timestamp())
            .execute(&self.pool)
            .await?;

        Ok(sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?)
    }

    /// Takes `amount` credits, or fails without touching the balance.
    ///
    /// The balance check and the subtraction are one statement, so concurrent
    /// debits can never drive the wallet negative.
    pub async fn debit(&self, user_id: &str, amount: i64) -> Result<Wallet> {
        if amount <= 0 {
            return Err(DbError::InvalidAmount(amount));
        }

        let now = chrono_timestamp();
        let mut tx = self.pool.begin().await?;

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"UPDATE wallets SET balance = balance - ?1, updated_at = ?2
               WHERE user_id = ?3 AND balance >= ?1
               RETURNING *"#,
        )
        .bind(amount)
        .bind(now)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(wallet) = wallet else {
            tx.rollback().await?;
            let balance = self.get_or_create_wallet(user_id).await?.balance;
            return Err(DbError::InsufficientCredits {
                balance,
                required: amount,
            });
        };

        insert_ledger_row(&mut tx, user_id, "debit", amount, now).await?;
        tx.commit().await?;

        Ok(wallet)
    }

    /// Adds credits outside of a payment, e.g. a refund for a failed send.
    pub async fn credit(&self, user_id: &str, amount: i64) -> Result<Wallet> {
        if amount <= 0 {
            return Err(DbError::InvalidAmount(amount));
        }

        let now = chrono_timestamp();
        let mut tx = self.pool.begin().await?;
        let wallet = add_balance(&mut tx, user_id, amount, now).await?;
        insert_ledger_row(&mut tx, user_id, "credit", amount, now).await?;
        tx.commit().await?;

        Ok(wallet)
    }

    /// Opens a top-up order awaiting the payment provider's callback.
    pub async fn create_order(
        &self,
        user_id: &str,
        order_id: &str,
        amount: i64,
    ) -> Result<WalletTransaction> {
        if amount <= 0 {
            return Err(DbError::InvalidAmount(amount));
        }

        let now = chrono_timestamp();
        let tx = sqlx::query_as::<_, WalletTransaction>(
            r#"INSERT INTO wallet_transactions
               (id, user_id, order_id, amount, kind, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, 'credit', 'pending', ?, ?)
               RETURNING *"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(order_id)
        .bind(amount)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id, order_id, amount, "Wallet order created");
        Ok(tx)
    }

    pub async fn get_transaction_by_order(&self, order_id: &str) -> Result<Option<WalletTransaction>> {
        Ok(sqlx::query_as::<_, WalletTransaction>(
            "SELECT * FROM wallet_transactions WHERE order_id = ?",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Credits a verified payment exactly once.
    ///
    /// The `pending -> processing` claim, the wallet credit and the final
    /// `success` mark share one database transaction. A second callback for the
    /// same order finds it out of `pending` and reports `AlreadyHandled`.
    pub async fn complete_payment(&self, order_id: &str, payment_id: &str) -> Result<PaymentOutcome> {
        let now = chrono_timestamp();
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query_as::<_, WalletTransaction>(
            r#"UPDATE wallet_transactions SET status = 'processing', payment_id = ?, updated_at = ?
               WHERE order_id = ? AND status = 'pending'
               RETURNING *"#,
        )
        .bind(payment_id)
        .bind(now)
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(claimed) = claimed else {
            tx.rollback().await?;
            return match self.get_transaction_by_order(order_id).await? {
                Some(existing) => Ok(PaymentOutcome::AlreadyHandled(existing)),
                None => Err(DbError::NotFound("Transaction")),
            };
        };

        let wallet = add_balance(&mut tx, &claimed.user_id, claimed.amount, now).await?;

        let transaction = sqlx::query_as::<_, WalletTransaction>(
            "UPDATE wallet_transactions SET status = 'success', updated_at = ? WHERE id = ? RETURNING *",
        )
        .bind(now)
        .bind(&claimed.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id,
            user_id = %transaction.user_id,
            amount = transaction.amount,
            balance = wallet.balance,
            "Payment credited"
        );
        Ok(PaymentOutcome::Completed { transaction, wallet })
    }

    pub async fn list_transactions(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> Result<Paged<WalletTransaction>> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM wallet_transactions WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let items = sqlx::query_as::<_, WalletTransaction>(
            r#"SELECT * FROM wallet_transactions WHERE user_id = ?
               ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"#,
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Paged::new(items, page, total))
    }
}

async fn add_balance(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    now: i64,
) -> Result<Wallet> {
    Ok(sqlx::query_as::<_, Wallet>(
        r#"INSERT INTO wallets (user_id, balance, updated_at) VALUES (?, ?, ?)
           ON CONFLICT(user_id) DO UPDATE SET
             balance = balance + excluded.balance,
             updated_at = excluded.updated_at
           RETURNING *"#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(now)
    .fetch_one(conn)
    .await?)
}

async fn insert_ledger_row(
    conn: &mut SqliteConnection,
    user_id: &str,
    kind: &str,
    amount: i64,
    now: i64,
) -> Result<()> {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO wallet_transactions
           (id, user_id, order_id, amount, kind, status, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, 'success', ?, ?)"#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(format!("{kind}-{id}"))
    .bind(amount)
    .bind(kind)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{TransactionKind, TransactionStatus};
    use crate::repository::test_support::*;

    #[tokio::test]
    async fn debit_refuses_overdraft() {
        let (db, _dir) = temp_db().await;
        db.credit("u1", 5).await.unwrap();

        let err = db.debit("u1", 6).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::InsufficientCredits {
                balance: 5,
                required: 6
            }
        ));
        assert_eq!(db.debit("u1", 5).await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn debit_without_wallet_reports_zero_balance() {
        let (db, _dir) = temp_db().await;
        assert!(matches!(
            db.debit("nobody", 1).await,
            Err(DbError::InsufficientCredits { balance: 0, .. })
        ));
        assert!(matches!(db.debit("nobody", 0).await, Err(DbError::InvalidAmount(0))));
    }

    #[tokio::test]
    async fn concurrent_debits_never_go_negative() {
        let (db, _dir) = temp_db().await;
        let db = Arc::new(db);
        db.credit("u1", 50).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let db = db.clone();
            handles.push(tokio::spawn(async move { db.debit("u1", 10).await.is_ok() }));
        }

        let mut succeeded = 0;
        for h in handles {
            if h.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 5);
        assert_eq!(db.get_or_create_wallet("u1").await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn payment_is_credited_once() {
        let (db, _dir) = temp_db().await;
        db.create_order("u1", "order_1", 100).await.unwrap();

        let first = db.complete_payment("order_1", "pay_1").await.unwrap();
        let PaymentOutcome::Completed { transaction, wallet } = first else {
            panic!("first callback should credit");
        };
        assert_eq!(transaction.status, TransactionStatus::Success);
        assert_eq!(transaction.payment_id.as_deref(), Some("pay_1"));
        assert_eq!(wallet.balance, 100);

        let second = db.complete_payment("order_1", "pay_1").await.unwrap();
        assert!(matches!(second, PaymentOutcome::AlreadyHandled(ref t) if t.status == TransactionStatus::Success));
        assert_eq!(db.get_or_create_wallet("u1").await.unwrap().balance, 100);
    }

    #[tokio::test]
    async fn concurrent_callbacks_credit_once() {
        let (db, _dir) = temp_db().await;
        let db = Arc::new(db);
        db.create_order("u1", "order_2", 40).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                matches!(
                    db.complete_payment("order_2", "pay_2").await.unwrap(),
                    PaymentOutcome::Completed { .. }
                )
            }));
        }

        let mut completed = 0;
        for h in handles {
            if h.await.unwrap() {
                completed += 1;
            }
        }
        assert_eq!(completed, 1);
        assert_eq!(db.get_or_create_wallet("u1").await.unwrap().balance, 40);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let (db, _dir) = temp_db().await;
        db.create_order("u1", "order_3", 10).await.unwrap();

        assert!(matches!(
            db.complete_payment("missing", "pay").await,
            Err(DbError::NotFound(_))
        ));
        let pending = db.get_transaction_by_order("order_3").await.unwrap().unwrap();
        assert_eq!(pending.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn ledger_lists_debits_and_credits() {
        let (db, _dir) = temp_db().await;
        db.credit("u1", 10).await.unwrap();
        db.debit("u1", 3).await.unwrap();

        let page = db.list_transactions("u1", PageRequest::new(1, 10)).await.unwrap();
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.items[0].kind, TransactionKind::Debit);
        assert_eq!(page.items[1].kind, TransactionKind::Credit);
    }
}
