//! Conversational front end: routes free-text messages to the scoring
//! service and the account directory, keeping a small session per user.

pub mod accounts;
pub mod intent;
pub mod responses;

pub use accounts::{AccountDirectory, NoAccounts, SqliteAccounts, TransactionRecord, UserProfile};
pub use intent::{HistoryQuery, HistoryView, Intent, IntentKind};

use crate::models::Algorithm;
use crate::rules::{apply_rules, FALLBACK_BASE_SCORE};
use crate::service::FraudService;
use parking_lot::Mutex;
use responses::ScoredTransaction;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-user conversation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChatSession {
    /// Algorithm used for this user's fraud inquiries.
    pub algorithm: Algorithm,
    /// Intent of the most recent message.
    pub stage: IntentKind,
}

impl ChatSession {
    /// Fresh session scoring with `algorithm`.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            stage: IntentKind::Greeting,
        }
    }
}

pub struct Chatbot {
    service: Arc<FraudService>,
    accounts: Arc<dyn AccountDirectory>,
    sessions: Mutex<HashMap<String, Arc<Mutex<ChatSession>>>>,
}

impl Chatbot {
    pub fn new(service: Arc<FraudService>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self {
            service,
            accounts,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Answer one message. Never fails: every error becomes reply text.
    ///
    /// Messages from the same user are handled one at a time; the session map
    /// lock is only held while looking the session up.
    pub fn chat(&self, user_id: &str, message: &str) -> String {
        let session = self.session_handle(user_id);
        let mut session = session.lock();

        let intent = intent::parse(message);
        debug!(user_id, intent = ?intent.kind(), "Message routed");
        session.stage = intent.kind();

        match intent {
            Intent::Greeting => responses::greeting(self.profile(user_id).as_ref()),
            Intent::AccountInfo => match self.profile(user_id) {
                Some(profile) => responses::account_info(&profile),
                None => responses::ACCOUNT_NOT_FOUND.to_string(),
            },
            Intent::TransactionHistory(query) => self.transaction_history(user_id, query),
            Intent::SelectAlgorithm(algorithm) => self.select_algorithm(&mut session, algorithm),
            Intent::FraudInquiry { amount, merchant } => match amount.filter(|a| *a > 0.0) {
                Some(amount) => {
                    let assessment = self.service.assess(amount, merchant.as_deref(), session.algorithm);
                    responses::fraud_analysis(&assessment)
                }
                None => responses::AMOUNT_NEEDED.to_string(),
            },
            Intent::AlgorithmInfo => responses::algorithm_info(&self.service.list_algorithms()),
            Intent::Help => responses::help(),
        }
    }

    /// Snapshot of a user's session, if one exists.
    pub fn session(&self, user_id: &str) -> Option<ChatSession> {
        let handle = self.sessions.lock().get(user_id).cloned()?;
        let session = *handle.lock();
        Some(session)
    }

    /// Forget a user's session. Returns whether one existed.
    pub fn clear_session(&self, user_id: &str) -> bool {
        self.sessions.lock().remove(user_id).is_some()
    }

    /// New sessions start on the registry's active algorithm.
    fn session_handle(&self, user_id: &str) -> Arc<Mutex<ChatSession>> {
        let mut sessions = self.sessions.lock();
        Arc::clone(sessions.entry(user_id.to_string()).or_insert_with(|| {
            let algorithm = self.service.registry().active();
            info!(user_id, %algorithm, "New chat session");
            Arc::new(Mutex::new(ChatSession::new(algorithm)))
        }))
    }

    fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.accounts.profile(user_id).unwrap_or_else(|e| {
            warn!(user_id, error = %e, "Account lookup failed");
            None
        })
    }

    fn transaction_history(&self, user_id: &str, query: HistoryQuery) -> String {
        let transactions = self
            .accounts
            .recent_transactions(user_id, query.limit)
            .unwrap_or_else(|e| {
                warn!(user_id, error = %e, "Transaction lookup failed");
                Vec::new()
            });

        let thresholds = self.service.thresholds();
        let scored: Vec<ScoredTransaction<'_>> = transactions
            .iter()
            .map(|txn| {
                let score = apply_rules(txn.amount, txn.merchant.as_deref(), FALLBACK_BASE_SCORE);
                ScoredTransaction {
                    txn,
                    score,
                    is_fraud: thresholds.is_fraud(score),
                }
            })
            .filter(|s| !query.fraud_only || s.is_fraud)
            .collect();

        if scored.is_empty() {
            return if query.fraud_only {
                responses::NO_FRAUD.to_string()
            } else {
                responses::NO_TRANSACTIONS.to_string()
            };
        }

        match query.view {
            HistoryView::Largest => scored
                .iter()
                .max_by(|a, b| a.txn.amount.total_cmp(&b.txn.amount))
                .map(responses::largest_transaction)
                .unwrap_or_default(),
            HistoryView::Smallest => scored
                .iter()
                .min_by(|a, b| a.txn.amount.total_cmp(&b.txn.amount))
                .map(responses::smallest_transaction)
                .unwrap_or_default(),
            HistoryView::Summary => responses::transaction_summary(&scored),
            HistoryView::List => responses::transaction_list(&scored, query.fraud_only),
        }
    }

    fn select_algorithm(&self, session: &mut ChatSession, algorithm: Algorithm) -> String {
        if let Err(e) = self.service.registry().set_active(algorithm) {
            warn!(%algorithm, error = %e, "Algorithm switch failed");
            return responses::algorithm_switch_failed(algorithm, &e.to_string());
        }
        session.algorithm = algorithm;
        let metrics = self.service.metrics(Some(algorithm)).ok();
        responses::algorithm_switched(algorithm, metrics.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_reader::CsvDataSource;
    use crate::models::{ModelRegistry, ModelStore};
    use crate::rules::DecisionThresholds;

    /// Chatbot whose registry has no dataset, so every model call falls back.
    fn offline_bot(accounts: Arc<dyn AccountDirectory>) -> (Chatbot, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(
            CsvDataSource::new(dir.path().join("missing.csv")),
            ModelStore::new(dir.path()),
        );
        let service = FraudService::new(Arc::new(registry), DecisionThresholds::default(), "v1.0");
        (Chatbot::new(Arc::new(service), accounts), dir)
    }

    #[test]
    fn test_fraud_inquiry_falls_back_to_rules() {
        let (bot, _dir) = offline_bot(Arc::new(NoAccounts));
        let reply = bot.chat("u1", "Check transaction for $750 at Starbucks");
        assert!(reply.contains("Status: BLOCKED"), "{reply}");
        assert!(reply.contains("Risk Score: 8.0%"));
        assert!(reply.contains("ANN (business rules fallback)"));
        assert!(reply.contains("Confidence: 85.0%"));
        assert!(reply.contains("Model Version: v1.0"));
    }

    #[test]
    fn test_missing_amount_asks_for_clarification() {
        let (bot, _dir) = offline_bot(Arc::new(NoAccounts));
        assert_eq!(bot.chat("u1", "is this fraud?"), responses::AMOUNT_NEEDED);
        assert_eq!(bot.chat("u1", "is $0 fraud?"), responses::AMOUNT_NEEDED);
    }

    #[test]
    fn test_failed_switch_keeps_session_algorithm() {
        let (bot, _dir) = offline_bot(Arc::new(NoAccounts));
        let reply = bot.chat("u1", "use svm");
        assert!(reply.starts_with("Error selecting SVM"), "{reply}");

        let session = bot.session("u1").unwrap();
        assert_eq!(session.algorithm, Algorithm::Ann);
        assert_eq!(session.stage, IntentKind::SelectAlgorithm);
        assert_eq!(bot.service.registry().active(), Algorithm::Ann);
    }

    #[test]
    fn test_sessions_are_per_user() {
        let (bot, _dir) = offline_bot(Arc::new(NoAccounts));
        assert!(bot.session("a").is_none());
        bot.chat("a", "hello");
        bot.chat("b", "what algorithms are available?");

        assert_eq!(bot.session("a").unwrap().stage, IntentKind::Greeting);
        assert_eq!(bot.session("b").unwrap().stage, IntentKind::AlgorithmInfo);
        assert!(bot.clear_session("a"));
        assert!(!bot.clear_session("a"));
        assert!(bot.session("b").is_some());
    }

    #[test]
    fn test_unknown_user_account_info() {
        let (bot, _dir) = offline_bot(Arc::new(NoAccounts));
        assert_eq!(bot.chat("ghost", "my account"), responses::ACCOUNT_NOT_FOUND);
        assert_eq!(bot.chat("ghost", "show transactions"), responses::NO_TRANSACTIONS);
        assert!(bot.chat("ghost", "hi").contains("Welcome to Fraud Assistant"));
    }

    #[test]
    fn test_history_views_use_rule_flags() {
        let (bot, _dir) = offline_bot(Arc::new(accounts::tests::seeded()));

        let list = bot.chat("alice", "show transactions");
        assert!(list.starts_with("**Your Last 4 Transactions**"), "{list}");
        // Stored flag says fraud, but $4.50 at Starbucks is safe by the rules.
        assert!(list.contains("SAFE - $4.50 at Starbucks"));
        assert!(list.contains("FRAUD - $750.00 at Starbucks"));
        assert!(list.contains("Reason: Unknown merchant"));

        let fraud = bot.chat("alice", "fraud cases");
        assert!(fraud.starts_with("**Recent Fraud Cases**"));
        assert!(!fraud.contains("Amazon"));

        let largest = bot.chat("alice", "largest transaction");
        assert!(largest.contains("Amount: $750.00"));
        assert!(largest.contains("extremely high for a coffee shop"));

        let smallest = bot.chat("alice", "smallest transaction");
        assert!(smallest.contains("Amount: $0.05"));
        assert!(smallest.contains("Micro-transactions"));

        let summary = bot.chat("alice", "transaction summary");
        assert!(summary.contains("Total Transactions: 4"));
        assert!(summary.contains("Fraud Cases: 2"));
        assert!(summary.contains("Total Fraud Amount: $750.05"));
    }

    #[test]
    fn test_account_info_from_directory() {
        let (bot, _dir) = offline_bot(Arc::new(accounts::tests::seeded()));
        let reply = bot.chat("alice", "account info");
        assert!(reply.contains("**Account Information for Alice Smith**"));
        assert!(reply.contains("**Member Since**: 2024-01-15"));
        assert!(reply.contains("Fraud Rate: 25%"));
        assert!(reply.contains("Some fraud detected"));
    }
}
