//! Text rendering for chat replies.

use super::accounts::{TransactionRecord, UserProfile};
use crate::models::{Algorithm, EvaluationMetrics};
use crate::rules::{triggered_rules, Decision, RiskRule};
use crate::service::{AlgorithmListing, Assessment};
use std::fmt::Write;

pub const ACCOUNT_NOT_FOUND: &str =
    "Sorry, I couldn't find your account information. Please check if you're logged in correctly.";
pub const AMOUNT_NEEDED: &str =
    "I need the transaction amount. Try: 'Check transaction for $150' or 'Is $75 at Starbucks fraud?'";
pub const NO_TRANSACTIONS: &str = "I couldn't find any transactions for your account.";
pub const NO_FRAUD: &str = "Great news! You have no fraud cases in your transaction history.";

const COMMANDS: &str = "**Transaction History:**
  • \"transactions\" - Show recent transactions
  • \"transaction history\" - Show transaction list
  • \"largest transaction\" - Show biggest transaction
  • \"smallest transaction\" - Show smallest transaction
  • \"transaction summary\" - Complete spending analysis

**Fraud Detection:**
  • \"fraud activity\" - Show fraud cases only
  • \"fraud cases\" - Show detected fraud
  • \"do i have fraud\" - Check for fraud
  • \"Check transaction for $500 at Amazon\" - Analyze specific transaction
  • \"Is $1000 fraud?\" - Quick fraud check

**Account Information:**
  • \"account info\" - Show account details
  • \"my account\" - Show profile information
  • \"my stats\" - Show account statistics

**Algorithm Management:**
  • \"Use SVM algorithm\" - Switch to SVM
  • \"Use neural network\" - Switch to ANN
  • \"Use KNN\" - Switch to K-Nearest Neighbors
  • \"What algorithms are available?\" - Show algorithm options
  • \"Show algorithm performance\" - Display metrics

**Help & Navigation:**
  • \"help\" - Show this complete menu
  • \"hello\" - Restart conversation

What would you like to try?";

/// `1234567.891` -> `1,234,567.89`
pub fn money(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (int, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}{grouped}.{frac}")
}

fn percent(ratio: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, ratio * 100.0)
}

/// `2024-03-01T10:00:00` -> `2024-03-01 10:00`
fn short_time(txn_time: &str) -> String {
    txn_time.get(..16).unwrap_or(txn_time).replace('T', " ")
}

fn merchant_name(txn: &TransactionRecord) -> &str {
    txn.merchant.as_deref().filter(|m| !m.is_empty()).unwrap_or("Unknown")
}

fn location_name(txn: &TransactionRecord) -> &str {
    txn.location
        .as_deref()
        .filter(|l| !l.is_empty())
        .unwrap_or("Unknown location")
}

pub fn greeting(profile: Option<&UserProfile>) -> String {
    let mut out = String::new();
    match profile {
        Some(p) => {
            let _ = write!(
                out,
                "**Welcome back, {}!**\n\n\
                 **Your Account Summary:**\n\
                 • Total Transactions: {}\n\
                 • Fraud Rate: {}%\n\
                 • Total Spent: ${}\n\n",
                p.display_name(),
                p.stats.transaction_count,
                p.stats.fraud_rate,
                money(p.stats.total_amount),
            );
        }
        None => out.push_str("**Welcome to Fraud Assistant!**\n\n**AI-Powered Fraud Detection Assistant**\n\n"),
    }
    out.push_str("**Complete Command List:**\n\n");
    out.push_str(COMMANDS);
    out
}

pub fn account_info(profile: &UserProfile) -> String {
    let s = &profile.stats;
    let member_since = profile
        .created_at
        .as_deref()
        .map(|c| c.get(..10).unwrap_or(c))
        .unwrap_or("unknown");

    let mut out = format!(
        "**Account Information for {}**\n\n\
         **Email**: {}\n\
         **Member Since**: {}\n\n\
         **Transaction Statistics**:\n\
         • Total Transactions: {}\n\
         • Fraud Cases: {}\n\
         • Fraud Rate: {}%\n\
         • Total Spent: ${}\n\
         • Average Transaction: ${:.2}\n\
         • Largest Transaction: ${}\n\
         • Unique Merchants: {}\n\n",
        profile.display_name(),
        profile.email.as_deref().unwrap_or("not set"),
        member_since,
        s.transaction_count,
        s.fraud_count,
        s.fraud_rate,
        money(s.total_amount),
        s.avg_amount,
        money(s.max_amount),
        s.unique_merchants,
    );
    if s.fraud_count > 0 {
        out.push_str("**Risk Assessment**: Some fraud detected - consider reviewing your recent transactions.\n");
    } else {
        out.push_str("**Risk Assessment**: No fraud detected - account looks healthy!\n");
    }
    out.push_str("\nI can help you analyze specific transactions or switch fraud detection algorithms. What would you like to do?");
    out
}

/// A transaction paired with its rule-based risk score.
pub struct ScoredTransaction<'a> {
    pub txn: &'a TransactionRecord,
    pub score: f64,
    pub is_fraud: bool,
}

pub fn largest_transaction(item: &ScoredTransaction<'_>) -> String {
    let txn = item.txn;
    let mut out = String::from("**Your Largest Transaction:**\n\n");
    push_details(&mut out, txn, item.is_fraud);
    if item.is_fraud {
        let _ = writeln!(out, "**Fraud Risk: {}**", percent(item.score, 1));
        if RiskRule::CoffeeShopHighAmount.matches(txn.amount, txn.merchant.as_deref()) {
            let _ = writeln!(
                out,
                "**Alert**: ${} is extremely high for a coffee shop!",
                money(txn.amount)
            );
        }
    }
    out.push_str("\nWant me to analyze this transaction for fraud risk?");
    out
}

pub fn smallest_transaction(item: &ScoredTransaction<'_>) -> String {
    let txn = item.txn;
    let mut out = String::from("**Your Smallest Transaction:**\n\n");
    push_details(&mut out, txn, item.is_fraud);
    if txn.amount < 1.0 {
        out.push_str("**Note**: Micro-transactions are sometimes used to test stolen cards.\n");
    }
    out.push_str("\nWant me to check more small transactions?");
    out
}

fn push_details(out: &mut String, txn: &TransactionRecord, is_fraud: bool) {
    let _ = write!(
        out,
        "Status: {}\nAmount: ${}\nMerchant: {}\nLocation: {}\nDate: {}\n",
        if is_fraud { "FRAUD" } else { "SAFE" },
        money(txn.amount),
        merchant_name(txn),
        location_name(txn),
        short_time(&txn.txn_time),
    );
}

pub fn transaction_summary(items: &[ScoredTransaction<'_>]) -> String {
    let total: f64 = items.iter().map(|i| i.txn.amount).sum();
    let fraud: Vec<&ScoredTransaction<'_>> = items.iter().filter(|i| i.is_fraud).collect();
    let fraud_amount: f64 = fraud.iter().map(|i| i.txn.amount).sum();
    let avg = if items.is_empty() { 0.0 } else { total / items.len() as f64 };

    let mut out = format!(
        "**Transaction Analysis:**\n\n\
         Total Transactions: {}\n\
         Total Amount: ${}\n\
         Average Amount: ${}\n\
         Fraud Cases: {}\n",
        items.len(),
        money(total),
        money(avg),
        fraud.len(),
    );
    if fraud.is_empty() {
        out.push_str("\n**Status**: No fraud detected in recent transactions\n");
    } else {
        let _ = write!(
            out,
            "\n**Alert**: Found {} fraudulent transaction(s)\nTotal Fraud Amount: ${}\n",
            fraud.len(),
            money(fraud_amount)
        );
    }
    out.push_str("\nWant detailed transaction list or specific analysis?");
    out
}

pub fn transaction_list(items: &[ScoredTransaction<'_>], fraud_only: bool) -> String {
    let title = if fraud_only {
        "Recent Fraud Cases".to_string()
    } else {
        format!("Your Last {} Transactions", items.len())
    };
    let mut out = format!("**{title}**\n\n");

    for (i, item) in items.iter().enumerate() {
        let txn = item.txn;
        let _ = write!(
            out,
            "{}. {} - ${} at {}\n   {} on {}\n",
            i + 1,
            if item.is_fraud { "FRAUD" } else { "SAFE" },
            money(txn.amount),
            merchant_name(txn),
            location_name(txn),
            short_time(&txn.txn_time),
        );
        if item.is_fraud {
            let _ = writeln!(out, "   Fraud Risk: {} - Review required!", percent(item.score, 1));
            if let Some(rule) = triggered_rules(txn.amount, txn.merchant.as_deref())
                .into_iter()
                .max_by(|a, b| a.floor().total_cmp(&b.floor()))
            {
                let _ = writeln!(out, "   Reason: {}", rule.reason());
            }
        }
        out.push('\n');
    }
    out.push_str("Try: \"largest transaction\", \"transaction summary\", or ask about fraud!");
    out
}

pub fn algorithm_switched(algorithm: Algorithm, metrics: Option<&EvaluationMetrics>) -> String {
    let mut out = format!(
        "**Switched to {} Algorithm!**\n\n",
        algorithm.as_str().to_uppercase()
    );
    if let Some(m) = metrics {
        let _ = write!(
            out,
            "**Performance Metrics:**\n\
             • Accuracy: {}\n\
             • Precision: {}\n\
             • Recall: {}\n\n",
            percent(m.accuracy, 2),
            percent(m.precision, 2),
            percent(m.recall, 2),
        );
    }
    out.push_str("Now you can ask me to check transactions using this algorithm!");
    out
}

pub fn algorithm_switch_failed(algorithm: Algorithm, error: &str) -> String {
    format!(
        "Error selecting {}: {error}",
        algorithm.as_str().to_uppercase()
    )
}

pub fn fraud_analysis(assessment: &Assessment) -> String {
    let d = &assessment.decision;
    let (status, risk_level, advice) = match d.decision {
        Decision::Allow => ("LEGITIMATE", "LOW RISK", "This transaction appears safe to proceed."),
        Decision::Challenge => (
            "REQUIRES REVIEW",
            "MEDIUM RISK",
            "Additional verification recommended.",
        ),
        Decision::Block => (
            "BLOCKED",
            "HIGH RISK",
            "This transaction should be blocked immediately!",
        ),
    };
    let merchant = assessment
        .merchant
        .as_deref()
        .map(|m| format!(" at {m}"))
        .unwrap_or_default();
    let algorithm = if assessment.fallback {
        format!("{} (business rules fallback)", d.algorithm.as_str().to_uppercase())
    } else {
        d.algorithm.as_str().to_uppercase()
    };

    format!(
        "**Transaction Analysis Complete**\n\n\
         **Transaction Details**\n\
         • Amount: ${:.2}{merchant}\n\
         • Algorithm: {algorithm}\n\
         • Risk Score: {}\n\n\
         **Risk Assessment**\n\
         • Status: {status}\n\
         • Risk Level: {risk_level}\n\
         • Confidence: {}\n\n\
         **Recommendation**\n\
         {advice}\n\n\
         **Technical Details**\n\
         • Model Version: {}\n\
         • Analysis Time: Real-time\n\n\
         Want to analyze another transaction or try a different algorithm?",
        assessment.amount,
        percent(d.score, 1),
        percent(d.confidence, 1),
        d.model_version,
    )
}

fn algorithm_description(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::Ann => "Deep learning with multiple layers for complex pattern recognition",
        Algorithm::Svm => "High precision classification with optimal decision boundaries",
        Algorithm::Knn => "Pattern matching algorithm based on similarity analysis",
    }
}

pub fn algorithm_info(listing: &AlgorithmListing) -> String {
    let mut out = format!(
        "**ML Algorithm Information**\n\n\
         **Currently Active**: {}\n\n\
         **Available Algorithms**:\n\n",
        listing.active.as_str().to_uppercase()
    );
    for &algorithm in &listing.all {
        let status = if listing.available.contains(&algorithm) {
            "Ready"
        } else {
            "Not Available"
        };
        let _ = write!(
            out,
            "**{}** - {}\n• Status: {status}\n\n",
            algorithm.display_name(),
            algorithm_description(algorithm),
        );
    }
    out.push_str(
        "**Switch Algorithms**:\n\
         • 'Use SVM algorithm'\n\
         • 'Switch to neural network'\n\
         • 'Activate KNN'\n\n\
         Want to see performance metrics for any algorithm?",
    );
    out
}

pub fn help() -> String {
    format!("I'm not sure how to help with that. Here's what I can do:\n\n{COMMANDS}")
}
