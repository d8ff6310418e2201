//! Keyword and regex intent rules, plus entity extraction from free text.
//!
//! Rules are evaluated in table order and the first match wins, so a message
//! that both greets and asks about fraud is a greeting.

use crate::models::Algorithm;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Greeting,
    AccountInfo,
    TransactionHistory,
    SelectAlgorithm,
    FraudInquiry,
    AlgorithmInfo,
    Help,
}

/// How a transaction history request should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryView {
    List,
    Largest,
    Smallest,
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub view: HistoryView,
    pub fraud_only: bool,
    pub limit: usize,
}

/// A classified message with its extracted entities.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Greeting,
    AccountInfo,
    TransactionHistory(HistoryQuery),
    SelectAlgorithm(Algorithm),
    FraudInquiry {
        amount: Option<f64>,
        merchant: Option<String>,
    },
    AlgorithmInfo,
    Help,
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::Greeting => IntentKind::Greeting,
            Intent::AccountInfo => IntentKind::AccountInfo,
            Intent::TransactionHistory(_) => IntentKind::TransactionHistory,
            Intent::SelectAlgorithm(_) => IntentKind::SelectAlgorithm,
            Intent::FraudInquiry { .. } => IntentKind::FraudInquiry,
            Intent::AlgorithmInfo => IntentKind::AlgorithmInfo,
            Intent::Help => IntentKind::Help,
        }
    }
}

const ACCOUNT_KEYWORDS: &[&str] = &[
    "my account",
    "my profile",
    "my info",
    "my details",
    "account info",
    "profile",
    "who am i",
    "my stats",
    "my data",
    "about me",
];

const HISTORY_KEYWORDS: &[&str] = &[
    "my transactions",
    "transaction history",
    "recent transactions",
    "my purchases",
    "spending history",
    "show transactions",
    "list transactions",
    "my fraud",
    "fraud history",
    "transactions",
    "transaction",
    "largest transaction",
    "biggest transaction",
    "highest transaction",
    "smallest transaction",
    "lowest transaction",
    "transaction review",
    "review transactions",
    "analyze transactions",
    "check transactions",
    "transaction summary",
    "spending review",
    "expense review",
    "do i have fraud",
    "any fraud",
    "fraud cases",
    "show fraud",
    "fraud activity",
    "fraudulent",
    "suspicious activity",
];

const FRAUD_KEYWORDS: &[&str] = &[
    "fraud",
    "fraudulent",
    "suspicious",
    "check transaction",
    "is this fraud",
    "analyze",
    "score",
    "legitimate",
    "safe",
];

const ALGORITHM_INFO_KEYWORDS: &[&str] = &["algorithm", "model", "available"];

const DEFAULT_HISTORY_LIMIT: usize = 5;
const ANALYSIS_HISTORY_LIMIT: usize = 10;
const MAX_HISTORY_LIMIT: usize = 20;

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("intent patterns are valid regexes")
}

static GREETING: Lazy<Regex> = Lazy::new(|| pattern(r"\b(?:hello|hi|help|start)\b"));

/// An explicit money amount: `$N` or `N dollars`.
static MONEY: Lazy<Regex> = Lazy::new(|| pattern(r"\$\s*\d|\b\d+(?:\.\d+)?\s*dollars?\b"));

static AMOUNT_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        pattern(r"\$?(\d+(?:\.\d{2})?)"),
        pattern(r"(\d+) dollars?"),
        pattern(r"amount (?:of )?(\d+(?:\.\d{2})?)"),
    ]
});

static MERCHANT_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        pattern(r"\b(?:at|from|to) ([a-z]+(?:\s+[a-z]+)?)"),
        pattern(r"merchant (?:is )?([a-z]+(?:\s+[a-z]+)?)"),
        pattern(r"purchased (?:from )?([a-z]+(?:\s+[a-z]+)?)"),
    ]
});

static ALGORITHM_PATTERNS: Lazy<[(Algorithm, Regex); 3]> = Lazy::new(|| {
    [
        (
            Algorithm::Ann,
            pattern(r"\b(?:ann|artificial neural network|neural|mlp)\b"),
        ),
        (
            Algorithm::Svm,
            pattern(r"\b(?:svm|support vector machine|vector)\b"),
        ),
        (
            Algorithm::Knn,
            pattern(r"\b(?:knn|k-nearest|nearest neighbor)\b"),
        ),
    ]
});

static HISTORY_LIMIT: Lazy<Regex> = Lazy::new(|| pattern(r"(?:last|recent)\s+(\d+)"));

const KNOWN_MERCHANTS: &[(&str, &str)] = &[
    ("amazon", "Amazon"),
    ("starbucks", "Starbucks"),
    ("target", "Target"),
    ("walmart", "Walmart"),
    ("shell", "Shell"),
    ("uber", "Uber"),
    ("apple", "Apple"),
    ("stripe", "Stripe"),
    ("mcdonalds", "McDonald's"),
];

type Predicate = fn(&str) -> bool;

/// Priority-ordered rules over the lowercased message. Anything unmatched is
/// [`IntentKind::Help`].
const RULES: [(IntentKind, Predicate); 6] = [
    (IntentKind::Greeting, is_greeting),
    (IntentKind::AccountInfo, is_account_request),
    (IntentKind::TransactionHistory, is_history_request),
    (IntentKind::SelectAlgorithm, names_algorithm),
    (IntentKind::FraudInquiry, is_fraud_inquiry),
    (IntentKind::AlgorithmInfo, is_algorithm_info_request),
];

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

fn is_greeting(text: &str) -> bool {
    GREETING.is_match(text)
}

fn is_account_request(text: &str) -> bool {
    contains_any(text, ACCOUNT_KEYWORDS)
}

/// History keywords, unless the message names a concrete amount to check.
fn is_history_request(text: &str) -> bool {
    contains_any(text, HISTORY_KEYWORDS) && !MONEY.is_match(text)
}

fn names_algorithm(text: &str) -> bool {
    detect_algorithm(text).is_some()
}

fn is_fraud_inquiry(text: &str) -> bool {
    contains_any(text, FRAUD_KEYWORDS)
}

fn is_algorithm_info_request(text: &str) -> bool {
    contains_any(text, ALGORITHM_INFO_KEYWORDS)
}

pub fn classify(message: &str) -> IntentKind {
    let text = message.trim().to_lowercase();
    RULES
        .iter()
        .find(|(_, matches)| matches(text.as_str()))
        .map(|(kind, _)| *kind)
        .unwrap_or(IntentKind::Help)
}

/// Classify `message` and pull out the entities its intent needs.
pub fn parse(message: &str) -> Intent {
    let text = message.trim().to_lowercase();
    match classify(&text) {
        IntentKind::Greeting => Intent::Greeting,
        IntentKind::AccountInfo => Intent::AccountInfo,
        IntentKind::TransactionHistory => Intent::TransactionHistory(history_query(&text)),
        IntentKind::SelectAlgorithm => match detect_algorithm(&text) {
            Some(algorithm) => Intent::SelectAlgorithm(algorithm),
            None => Intent::Help,
        },
        IntentKind::FraudInquiry => Intent::FraudInquiry {
            amount: extract_amount(&text),
            merchant: extract_merchant(&text),
        },
        IntentKind::AlgorithmInfo => Intent::AlgorithmInfo,
        IntentKind::Help => Intent::Help,
    }
}

/// First amount found by the amount patterns, tried in order.
pub fn extract_amount(text: &str) -> Option<f64> {
    let text = text.to_lowercase();
    AMOUNT_PATTERNS.iter().find_map(|re| {
        re.captures(&text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    })
}

/// Merchant named after `at`/`from`/`to`, `merchant` or `purchased`,
/// canonicalised to a known brand or title-cased.
pub fn extract_merchant(text: &str) -> Option<String> {
    let text = text.to_lowercase();
    let raw = MERCHANT_PATTERNS.iter().find_map(|re| {
        re.captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    })?;
    Some(canonical_merchant(&raw))
}

fn canonical_merchant(raw: &str) -> String {
    KNOWN_MERCHANTS
        .iter()
        .find(|(key, _)| *key == raw)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| title_case(raw))
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn detect_algorithm(text: &str) -> Option<Algorithm> {
    let text = text.to_lowercase();
    ALGORITHM_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(&text))
        .map(|(algorithm, _)| *algorithm)
}

fn history_query(text: &str) -> HistoryQuery {
    let view = if contains_any(text, &["largest", "biggest", "highest"]) {
        HistoryView::Largest
    } else if contains_any(text, &["smallest", "lowest"]) {
        HistoryView::Smallest
    } else if contains_any(text, &["review", "summary", "analyze"]) {
        HistoryView::Summary
    } else {
        HistoryView::List
    };

    let default_limit = if view == HistoryView::List {
        DEFAULT_HISTORY_LIMIT
    } else {
        ANALYSIS_HISTORY_LIMIT
    };
    let limit = HISTORY_LIMIT
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .map(|n| n.min(MAX_HISTORY_LIMIT))
        .unwrap_or(default_limit);

    HistoryQuery {
        view,
        fraud_only: contains_any(text, &["fraud", "suspicious", "flagged"]),
        limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_needs_whole_word() {
        assert_eq!(classify("Hi there"), IntentKind::Greeting);
        assert_eq!(classify("help"), IntentKind::Greeting);
        // "this" and "shipping" contain "hi" but are not greetings
        assert_eq!(classify("is this fraud? $40"), IntentKind::FraudInquiry);
        assert_eq!(classify("shipping at Amazon"), IntentKind::Help);
    }

    #[test]
    fn test_rule_priority() {
        assert_eq!(classify("hello, show my account"), IntentKind::Greeting);
        assert_eq!(classify("my account"), IntentKind::AccountInfo);
        assert_eq!(classify("show transactions"), IntentKind::TransactionHistory);
        assert_eq!(classify("fraud cases"), IntentKind::TransactionHistory);
        assert_eq!(classify("Use SVM algorithm"), IntentKind::SelectAlgorithm);
        assert_eq!(classify("Is $1000 fraud?"), IntentKind::FraudInquiry);
        assert_eq!(classify("What algorithms are available?"), IntentKind::AlgorithmInfo);
        assert_eq!(classify("tell me a joke"), IntentKind::Help);
    }

    #[test]
    fn test_explicit_amount_is_a_fraud_inquiry_not_history() {
        assert_eq!(
            parse("Check transaction for $500 at Starbucks"),
            Intent::FraudInquiry {
                amount: Some(500.0),
                merchant: Some("Starbucks".to_string()),
            }
        );
        assert_eq!(
            classify("check transaction of 250 dollars"),
            IntentKind::FraudInquiry
        );
        // A count is not a money amount
        assert_eq!(classify("last 3 transactions"), IntentKind::TransactionHistory);
    }

    #[test]
    fn test_algorithm_detection_order() {
        assert_eq!(detect_algorithm("switch to neural network"), Some(Algorithm::Ann));
        assert_eq!(detect_algorithm("support vector machine please"), Some(Algorithm::Svm));
        assert_eq!(detect_algorithm("activate KNN"), Some(Algorithm::Knn));
        assert_eq!(detect_algorithm("use k-nearest"), Some(Algorithm::Knn));
        assert_eq!(detect_algorithm("annual report"), None);
    }

    #[test]
    fn test_extract_amount() {
        assert_eq!(extract_amount("is $75.50 ok"), Some(75.5));
        assert_eq!(extract_amount("250 dollars"), Some(250.0));
        assert_eq!(extract_amount("check the amount of 12"), Some(12.0));
        assert_eq!(extract_amount("is this fraud"), None);
    }

    #[test]
    fn test_extract_merchant() {
        assert_eq!(extract_merchant("$5 at mcdonalds"), Some("McDonald's".to_string()));
        assert_eq!(extract_merchant("purchased from Target"), Some("Target".to_string()));
        assert_eq!(
            extract_merchant("$20 at corner bakery"),
            Some("Corner Bakery".to_string())
        );
        // "at" inside a word does not start a merchant
        assert_eq!(extract_merchant("what is the status"), None);
        assert_eq!(extract_merchant("$30"), None);
    }

    #[test]
    fn test_history_sub_intents_and_limits() {
        let q = history_query("show my largest transaction");
        assert_eq!(q.view, HistoryView::Largest);
        assert_eq!(q.limit, 10);
        assert!(!q.fraud_only);

        let q = history_query("transactions");
        assert_eq!(q.view, HistoryView::List);
        assert_eq!(q.limit, 5);

        let q = history_query("transaction summary for the last 50");
        assert_eq!(q.view, HistoryView::Summary);
        assert_eq!(q.limit, 20);

        let q = history_query("show fraud in my recent 3 transactions");
        assert!(q.fraud_only);
        assert_eq!(q.limit, 3);

        let q = history_query("smallest flagged transaction");
        assert_eq!(q.view, HistoryView::Smallest);
        assert!(q.fraud_only);
    }
}
