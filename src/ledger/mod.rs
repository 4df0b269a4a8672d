use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Ledger transaction identifier
pub type TransactionId = String;

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors returned by the ledger collaborator
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Submission rejected: {0}")]
    Submission(String),

    #[error("Transfer rejected: {0}")]
    Transfer(String),
}

/// External ledger collaborator: topic submission plus token transfer
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Submit a payload to a topic, returning the transaction id
    async fn submit(&self, topic_ref: &str, payload: Value) -> LedgerResult<TransactionId>;

    /// Transfer tokens between accounts, returning the transaction id
    async fn transfer(
        &self,
        amount: u64,
        from_account: &str,
        to_account: &str,
    ) -> LedgerResult<TransactionId>;
}

#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub tx_id: TransactionId,
    pub amount: u64,
    pub from_account: String,
    pub to_account: String,
}

#[derive(Default)]
struct LedgerState {
    topics: HashMap<String, Vec<Value>>,
    transfers: Vec<TransferRecord>,
    sequence: u64,
}

/// In-memory ledger used by the default wiring and by tests. Failure
/// injection lets tests exercise the retry and dead-letter paths.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    fail_submissions: Arc<AtomicU32>,
    fail_transfers: Arc<AtomicBool>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` submissions fail with a transient error
    pub fn fail_next_submissions(&self, count: u32) {
        self.fail_submissions.store(count, Ordering::SeqCst);
    }

    /// Toggle failure of all transfers
    pub fn set_fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::SeqCst);
    }

    pub fn topic_len(&self, topic_ref: &str) -> usize {
        self.state
            .lock()
            .topics
            .get(topic_ref)
            .map_or(0, Vec::len)
    }

    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.state.lock().transfers.clone()
    }

    fn next_tx_id(state: &mut LedgerState) -> TransactionId {
        state.sequence += 1;
        format!("tx-{:08}", state.sequence)
    }
}

#[async_trait]
impl LedgerService for InMemoryLedger {
    async fn submit(&self, topic_ref: &str, payload: Value) -> LedgerResult<TransactionId> {
        if self
            .fail_submissions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LedgerError::Submission(
                "simulated transient submission failure".to_string(),
            ));
        }

        let mut state = self.state.lock();
        let tx_id = Self::next_tx_id(&mut state);
        state
            .topics
            .entry(topic_ref.to_string())
            .or_default()
            .push(payload);
        Ok(tx_id)
    }

    async fn transfer(
        &self,
        amount: u64,
        from_account: &str,
        to_account: &str,
    ) -> LedgerResult<TransactionId> {
        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(LedgerError::Transfer(
                "simulated transfer failure".to_string(),
            ));
        }

        let mut state = self.state.lock();
        let tx_id = Self::next_tx_id(&mut state);
        let record = TransferRecord {
            tx_id: tx_id.clone(),
            amount,
            from_account: from_account.to_string(),
            to_account: to_account.to_string(),
        };
        state.transfers.push(record);
        Ok(tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_submit_appends_to_topic() {
        let ledger = InMemoryLedger::new();
        let tx = ledger
            .submit("topic/1", json!({"batch": "dev-a-1"}))
            .await
            .unwrap();

        assert!(tx.starts_with("tx-"));
        assert_eq!(ledger.topic_len("topic/1"), 1);
        assert_eq!(ledger.topic_len("topic/2"), 0);
    }

    #[tokio::test]
    async fn test_submission_failure_injection_is_bounded() {
        let ledger = InMemoryLedger::new();
        ledger.fail_next_submissions(2);

        assert!(ledger.submit("topic/1", json!({})).await.is_err());
        assert!(ledger.submit("topic/1", json!({})).await.is_err());
        assert!(ledger.submit("topic/1", json!({})).await.is_ok());
        assert_eq!(ledger.topic_len("topic/1"), 1);
    }

    #[tokio::test]
    async fn test_transfer_records() {
        let ledger = InMemoryLedger::new();
        ledger.transfer(10, "treasury", "owner-a").await.unwrap();

        let transfers = ledger.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount, 10);
        assert_eq!(transfers[0].to_account, "owner-a");
    }

    #[tokio::test]
    async fn test_transfer_failure_injection() {
        let ledger = InMemoryLedger::new();
        ledger.set_fail_transfers(true);
        assert!(ledger.transfer(10, "treasury", "owner-a").await.is_err());

        ledger.set_fail_transfers(false);
        assert!(ledger.transfer(10, "treasury", "owner-a").await.is_ok());
    }
}
