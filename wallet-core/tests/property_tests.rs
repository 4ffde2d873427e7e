//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Balance conservation: balance == Σcredits − Σdebits, by replay
//! - Non-negativity: no debit ever drives a balance below zero
//! - Idempotency: one ledger entry per key, ever
//! - Concurrency safety: racing debits never overdraw an account

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use wallet_core::{
    AccountId, Category, Config, Currency, Direction, Engine, Error, OwnerId, PostingRequest,
};

/// Strategy for generating valid amounts (positive, two fractional digits)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..1_000_000_00u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

/// Strategy for generating posting operations (credit flag + amount)
fn ops_strategy() -> impl Strategy<Value = Vec<(bool, Decimal)>> {
    prop::collection::vec((any::<bool>(), amount_strategy()), 1..25)
}

/// Create a test engine over a scratch directory
fn create_test_engine() -> (Engine, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    (Engine::open(config).unwrap(), temp_dir)
}

fn posting(
    account_id: AccountId,
    direction: Direction,
    amount: Decimal,
    category: Category,
) -> PostingRequest {
    PostingRequest {
        account_id,
        direction,
        amount,
        currency: Currency::KES,
        category,
        idempotency_key: Uuid::new_v4(),
        description: None,
        metadata: HashMap::new(),
    }
}

fn credit(account_id: AccountId, amount: Decimal) -> PostingRequest {
    posting(account_id, Direction::Credit, amount, Category::Topup)
}

fn debit(account_id: AccountId, amount: Decimal) -> PostingRequest {
    posting(account_id, Direction::Debit, amount, Category::Payment)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: credits on an active wallet are always accepted
    #[test]
    fn prop_credits_accepted(amount in amount_strategy()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (engine, _temp) = create_test_engine();
            let owner = OwnerId::new(Uuid::new_v4());
            let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

            let receipt = engine.post(credit(wallet.id, amount)).await;
            prop_assert!(receipt.is_ok());
            prop_assert_eq!(receipt.unwrap().balance_after, amount);
            Ok(())
        })?;
    }

    /// Property: after any sequence of postings, the stored balance
    /// equals the replayed sum of the ledger, never goes negative, and
    /// the per-entry invariants verify
    #[test]
    fn prop_replay_reconstructs_balance(ops in ops_strategy()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (engine, _temp) = create_test_engine();
            let owner = OwnerId::new(Uuid::new_v4());
            let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

            for (is_credit, amount) in ops {
                let request = if is_credit {
                    credit(wallet.id, amount)
                } else {
                    debit(wallet.id, amount)
                };
                match engine.post(request).await {
                    Ok(_) => {}
                    // Overdrafts are rejected whole; anything else fails
                    Err(Error::InsufficientBalance { .. }) => {}
                    Err(e) => return Err(TestCaseError::fail(format!("unexpected: {}", e))),
                }

                let balance = engine.account(wallet.id).unwrap().balance;
                prop_assert!(balance >= Decimal::ZERO);
            }

            let stored = engine.account(wallet.id).unwrap().balance;
            let replayed = engine.replay_balance(wallet.id).unwrap();
            prop_assert_eq!(replayed, stored);
            prop_assert!(engine.verify_account(wallet.id).unwrap());
            Ok(())
        })?;
    }

    /// Property: posting the same request twice produces exactly one
    /// ledger entry, and both receipts agree on the balance
    #[test]
    fn prop_idempotent_replay(amount in amount_strategy()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (engine, _temp) = create_test_engine();
            let owner = OwnerId::new(Uuid::new_v4());
            let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

            let request = credit(wallet.id, amount);
            let first = engine.post(request.clone()).await.unwrap();
            let second = engine.post(request).await.unwrap();

            prop_assert!(!first.idempotent);
            prop_assert!(second.idempotent);
            prop_assert_eq!(first.transaction_id, second.transaction_id);
            prop_assert_eq!(first.balance_after, second.balance_after);

            let history = engine.history(wallet.id, 1, 100).unwrap();
            prop_assert_eq!(history.total, 1);
            prop_assert_eq!(engine.account(wallet.id).unwrap().balance, amount);
            Ok(())
        })?;
    }

    /// Property: a debit exceeding the balance is rejected and leaves
    /// no trace
    #[test]
    fn prop_overdraft_rejected(balance in amount_strategy(), extra in amount_strategy()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (engine, _temp) = create_test_engine();
            let owner = OwnerId::new(Uuid::new_v4());
            let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

            engine.post(credit(wallet.id, balance)).await.unwrap();

            let result = engine.post(debit(wallet.id, balance + extra)).await;
            prop_assert!(matches!(result, Err(Error::InsufficientBalance { .. })));

            prop_assert_eq!(engine.account(wallet.id).unwrap().balance, balance);
            prop_assert_eq!(engine.history(wallet.id, 1, 100).unwrap().total, 1);
            Ok(())
        })?;
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// Create account, credit 1000 KES, debit 300 KES; ledger is
    /// [+1000, −300] and the balance is 700.
    #[tokio::test]
    async fn test_credit_then_debit_lifecycle() {
        let (engine, _temp) = create_test_engine();
        let owner = OwnerId::new(Uuid::new_v4());
        let wallet = engine.open_wallet(owner, Currency::KES).unwrap();
        assert_eq!(wallet.balance, Decimal::new(0, 2));

        let r1 = engine
            .post(credit(wallet.id, Decimal::new(100000, 2)))
            .await
            .unwrap();
        assert_eq!(r1.balance_after, Decimal::new(100000, 2));

        let r2 = engine
            .post(debit(wallet.id, Decimal::new(30000, 2)))
            .await
            .unwrap();
        assert_eq!(r2.balance_after, Decimal::new(70000, 2));

        let history = engine.history(wallet.id, 1, 10).unwrap();
        assert_eq!(history.total, 2);
        assert_eq!(history.items[0].signed_amount(), Decimal::new(100000, 2));
        assert_eq!(history.items[1].signed_amount(), Decimal::new(-30000, 2));

        assert_eq!(
            engine.account(wallet.id).unwrap().balance,
            Decimal::new(70000, 2)
        );
    }

    /// Credit 500 KES, then repeat the identical call: the second
    /// response replays, the balance stays 500, one entry exists.
    #[tokio::test]
    async fn test_duplicate_credit_replays() {
        let (engine, _temp) = create_test_engine();
        let owner = OwnerId::new(Uuid::new_v4());
        let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

        let request = credit(wallet.id, Decimal::new(50000, 2));
        let first = engine.post(request.clone()).await.unwrap();
        let second = engine.post(request).await.unwrap();

        assert!(!first.idempotent);
        assert!(second.idempotent);
        assert_eq!(second.balance_after, Decimal::new(50000, 2));
        assert_eq!(engine.history(wallet.id, 1, 10).unwrap().total, 1);
        assert_eq!(
            engine.account(wallet.id).unwrap().balance,
            Decimal::new(50000, 2)
        );
    }

    /// A replayed key returns the stored result even when the new
    /// payload differs: replays are trusted by key alone.
    #[tokio::test]
    async fn test_replayed_key_ignores_payload_changes() {
        let (engine, _temp) = create_test_engine();
        let owner = OwnerId::new(Uuid::new_v4());
        let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

        let original = credit(wallet.id, Decimal::new(50000, 2));
        let first = engine.post(original.clone()).await.unwrap();

        // Same key, different direction and amount
        let mut changed = debit(wallet.id, Decimal::new(30000, 2));
        changed.idempotency_key = original.idempotency_key;
        let replayed = engine.post(changed).await.unwrap();

        assert!(replayed.idempotent);
        assert_eq!(replayed.transaction_id, first.transaction_id);
        assert_eq!(replayed.balance_after, Decimal::new(50000, 2));
        assert_eq!(engine.history(wallet.id, 1, 10).unwrap().total, 1);
    }

    /// Balance 100, two concurrent debits of 60 with distinct keys:
    /// exactly one succeeds (balance 40), the other rejects.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_racing_debits_cannot_overdraw() {
        let (engine, _temp) = create_test_engine();
        let engine = Arc::new(engine);
        let owner = OwnerId::new(Uuid::new_v4());
        let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

        engine
            .post(credit(wallet.id, Decimal::new(10000, 2)))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            let wallet_id = wallet.id;
            handles.push(tokio::spawn(async move {
                engine
                    .post(debit(wallet_id, Decimal::new(6000, 2)))
                    .await
            }));
        }

        let mut succeeded = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => {
                    succeeded += 1;
                    assert_eq!(receipt.balance_after, Decimal::new(4000, 2));
                }
                Err(Error::InsufficientBalance { .. }) => insufficient += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(succeeded, 1);
        assert_eq!(insufficient, 1);
        assert_eq!(
            engine.account(wallet.id).unwrap().balance,
            Decimal::new(4000, 2)
        );
        assert!(engine.verify_account(wallet.id).unwrap());
    }

    /// Balance N*A with N concurrent debits of A: all succeed and the
    /// account drains to zero. With N+1 debits, exactly one rejects.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_debits_drain_exactly() {
        const N: usize = 8;
        let amount = Decimal::new(2500, 2);

        for extra in [0usize, 1] {
            let (engine, _temp) = create_test_engine();
            let engine = Arc::new(engine);
            let owner = OwnerId::new(Uuid::new_v4());
            let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

            let funded = amount * Decimal::from(N as u64);
            engine.post(credit(wallet.id, funded)).await.unwrap();

            let mut handles = Vec::new();
            for _ in 0..(N + extra) {
                let engine = engine.clone();
                let wallet_id = wallet.id;
                handles.push(tokio::spawn(
                    async move { engine.post(debit(wallet_id, amount)).await },
                ));
            }

            let mut succeeded = 0;
            let mut insufficient = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => succeeded += 1,
                    Err(Error::InsufficientBalance { .. }) => insufficient += 1,
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }

            assert_eq!(succeeded, N);
            assert_eq!(insufficient, extra);
            assert_eq!(
                engine.account(wallet.id).unwrap().balance,
                Decimal::new(0, 2)
            );
            assert!(engine.verify_account(wallet.id).unwrap());
        }
    }

    /// Two concurrent posts with the same key commit exactly one entry;
    /// both callers observe the identical result.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_same_key_single_entry() {
        let (engine, _temp) = create_test_engine();
        let engine = Arc::new(engine);
        let owner = OwnerId::new(Uuid::new_v4());
        let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

        let request = credit(wallet.id, Decimal::new(50000, 2));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            let request = request.clone();
            handles.push(tokio::spawn(async move { engine.post(request).await }));
        }

        let mut receipts = Vec::new();
        for handle in handles {
            receipts.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(receipts[0].transaction_id, receipts[1].transaction_id);
        assert_eq!(receipts[0].balance_after, receipts[1].balance_after);
        assert_eq!(engine.history(wallet.id, 1, 10).unwrap().total, 1);
        assert_eq!(
            engine.account(wallet.id).unwrap().balance,
            Decimal::new(50000, 2)
        );
    }

    /// Cash-in moves float money into the wallet in one commit and
    /// accrues commission to the agent's rollups.
    #[tokio::test]
    async fn test_cash_in_atomic_with_stats() {
        let (engine, _temp) = create_test_engine();
        let agent = OwnerId::new(Uuid::new_v4());
        let customer = OwnerId::new(Uuid::new_v4());

        let float = engine.open_float(agent, Currency::KES).unwrap();
        let wallet = engine.open_wallet(customer, Currency::KES).unwrap();

        engine
            .post(posting(
                float.id,
                Direction::Credit,
                Decimal::new(100000, 2),
                Category::Topup,
            ))
            .await
            .unwrap();

        let receipt = engine
            .cash_in(
                float.id,
                wallet.id,
                Decimal::new(40000, 2),
                Uuid::new_v4(),
                Some("cash-in at kiosk".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(receipt.debit.balance_after, Decimal::new(60000, 2));
        assert_eq!(receipt.credit.balance_after, Decimal::new(40000, 2));
        assert_eq!(
            engine.account(float.id).unwrap().balance,
            Decimal::new(60000, 2)
        );
        assert_eq!(
            engine.account(wallet.id).unwrap().balance,
            Decimal::new(40000, 2)
        );

        // Both legs carry the same transfer id
        let debit_entry = engine.entry(receipt.debit.transaction_id).unwrap();
        let credit_entry = engine.entry(receipt.credit.transaction_id).unwrap();
        assert_eq!(
            debit_entry.metadata.get("transfer_id"),
            credit_entry.metadata.get("transfer_id")
        );

        // Agent rollups: one cash-in, 400.00 volume, 2% commission
        let stats = engine.owner_stats(agent).unwrap();
        assert_eq!(stats.cash_in_count, 1);
        assert_eq!(stats.total_volume, Decimal::new(40000, 2));
        assert_eq!(stats.today_volume, Decimal::new(40000, 2));
        assert_eq!(stats.total_commission, Decimal::new(800, 2));

        assert!(engine.verify_account(float.id).unwrap());
        assert!(engine.verify_account(wallet.id).unwrap());
    }

    /// An underfunded cash-in rejects whole: neither account moves and
    /// no ledger entries exist.
    #[tokio::test]
    async fn test_cash_in_insufficient_float_leaves_no_trace() {
        let (engine, _temp) = create_test_engine();
        let agent = OwnerId::new(Uuid::new_v4());
        let customer = OwnerId::new(Uuid::new_v4());

        let float = engine.open_float(agent, Currency::KES).unwrap();
        let wallet = engine.open_wallet(customer, Currency::KES).unwrap();

        engine
            .post(posting(
                float.id,
                Direction::Credit,
                Decimal::new(10000, 2),
                Category::Topup,
            ))
            .await
            .unwrap();

        let result = engine
            .cash_in(
                float.id,
                wallet.id,
                Decimal::new(40000, 2),
                Uuid::new_v4(),
                None,
            )
            .await;
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));

        assert_eq!(
            engine.account(float.id).unwrap().balance,
            Decimal::new(10000, 2)
        );
        assert_eq!(
            engine.account(wallet.id).unwrap().balance,
            Decimal::new(0, 2)
        );
        assert_eq!(engine.history(wallet.id, 1, 10).unwrap().total, 0);

        let stats = engine.owner_stats(agent).unwrap();
        assert_eq!(stats.cash_in_count, 0);
    }

    /// Retrying a transfer with the same key replays both legs.
    #[tokio::test]
    async fn test_cash_out_replay() {
        let (engine, _temp) = create_test_engine();
        let agent = OwnerId::new(Uuid::new_v4());
        let customer = OwnerId::new(Uuid::new_v4());

        let float = engine.open_float(agent, Currency::KES).unwrap();
        let wallet = engine.open_wallet(customer, Currency::KES).unwrap();

        engine
            .post(posting(
                wallet.id,
                Direction::Credit,
                Decimal::new(50000, 2),
                Category::Topup,
            ))
            .await
            .unwrap();

        let key = Uuid::new_v4();
        let first = engine
            .cash_out(wallet.id, float.id, Decimal::new(20000, 2), key, None)
            .await
            .unwrap();
        let second = engine
            .cash_out(wallet.id, float.id, Decimal::new(20000, 2), key, None)
            .await
            .unwrap();

        assert!(!first.idempotent);
        assert!(second.idempotent);
        assert_eq!(first.transfer_id, second.transfer_id);
        assert_eq!(
            engine.account(wallet.id).unwrap().balance,
            Decimal::new(30000, 2)
        );
        assert_eq!(
            engine.account(float.id).unwrap().balance,
            Decimal::new(20000, 2)
        );

        // One cash-out in the rollups, not two
        let stats = engine.owner_stats(agent).unwrap();
        assert_eq!(stats.cash_out_count, 1);
        assert_eq!(stats.total_volume, Decimal::new(20000, 2));
    }

    /// Registrations land in the agent's rollups without touching any
    /// balance.
    #[tokio::test]
    async fn test_registration_stats() {
        let (engine, _temp) = create_test_engine();
        let agent = OwnerId::new(Uuid::new_v4());
        engine.open_float(agent, Currency::KES).unwrap();

        engine.register_customer(agent).await.unwrap();
        engine.register_customer(agent).await.unwrap();

        let stats = engine.owner_stats(agent).unwrap();
        assert_eq!(stats.customers_registered, 2);
        assert!(stats.last_activity_at.is_some());
        assert_eq!(
            engine.account(engine.accounts_for_owner(agent).unwrap()[0].id)
                .unwrap()
                .balance,
            Decimal::new(0, 2)
        );
    }

    /// Search filters and renders both timestamp forms.
    #[tokio::test]
    async fn test_search_with_timezone() {
        let (engine, _temp) = create_test_engine();
        let owner = OwnerId::new(Uuid::new_v4());
        let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

        engine
            .post(credit(wallet.id, Decimal::new(100000, 2)))
            .await
            .unwrap();
        engine
            .post(debit(wallet.id, Decimal::new(2500, 2)))
            .await
            .unwrap();

        let filter = wallet_core::SearchFilter {
            account_id: Some(wallet.id),
            direction: Some(Direction::Debit),
            timezone: Some("+03:00".to_string()),
            ..Default::default()
        };
        let page = engine.search(&filter).unwrap();

        assert_eq!(page.total, 1);
        let hit = &page.items[0];
        assert_eq!(hit.entry.amount, Decimal::new(2500, 2));
        assert!(hit.created_at_utc.ends_with('Z'));
        assert!(hit.created_at_local.ends_with("+03:00"));
    }
}
