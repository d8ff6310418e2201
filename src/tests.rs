use crate::chat::{Chatbot, NoAccounts};
use crate::csv_reader::CsvDataSource;
use crate::error::{DataError, RegistryError};
use crate::features::{FeatureName, TransactionFeatures};
use crate::models::{Algorithm, ModelRegistry, ModelStore};
use crate::rules::{Decision, DecisionThresholds};
use crate::service::FraudService;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(test)]
mod tests {
    use super::*;

    const ROWS: usize = 200;

    // Writes a small credit-card style dataset: every 10th row is fraud and sits far
    // away from the legitimate rows in V1..V28 and Amount
    fn write_dataset(dir: &Path) -> PathBuf {
        let path = dir.join("creditcard.csv");
        let mut header: Vec<String> = vec!["Time".to_string()];
        header.extend((1..=28).map(|j| format!("V{j}")));
        header.push("Amount".to_string());
        header.push("Class".to_string());

        let mut text = header.join(",");
        text.push('\n');
        for i in 0..ROWS {
            let fraud = i % 10 == 0;
            let mut row = vec![format!("{}", i * 10)];
            for j in 1..=28 {
                let v = if fraud {
                    4.0 + ((i * j) % 7) as f64 * 0.1
                } else {
                    ((i + j) % 5) as f64 * 0.2 - 0.4
                };
                row.push(format!("{v}"));
            }
            let amount = if fraud { 900.0 + i as f64 } else { 20.0 + (i % 50) as f64 };
            row.push(format!("{amount}"));
            row.push(if fraud { "\"1\"" } else { "\"0\"" }.to_string());
            text.push_str(&row.join(","));
            text.push('\n');
        }
        fs::write(&path, text).unwrap();
        path
    }

    fn registry_in(dir: &Path, data: PathBuf) -> ModelRegistry {
        ModelRegistry::new(CsvDataSource::new(data), ModelStore::new(dir.join("models")))
    }

    fn fraud_like() -> TransactionFeatures {
        let mut pairs: Vec<(String, f64)> = (1..=28).map(|j| (format!("V{j}"), 4.2)).collect();
        pairs.push(("Amount".to_string(), 1000.0));
        pairs.push(("Time".to_string(), 500.0));
        TransactionFeatures::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), *v)))
    }

    fn legit_like() -> TransactionFeatures {
        let mut pairs: Vec<(&str, f64)> = vec![("Amount", 35.0), ("Time", 510.0)];
        pairs.push(("V1", 0.0));
        TransactionFeatures::from_pairs(pairs)
    }

    #[test]
    fn test_train_knn_evaluates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path(), write_dataset(dir.path()));

        let bundle = registry.train(Algorithm::Knn, false).unwrap();
        let m = &bundle.metrics;
        assert_eq!(m.algorithm, Algorithm::Knn);
        assert_eq!(m.n_test, 40);
        assert_eq!(m.n_fraud, 4);
        assert_eq!(m.n_valid, 36);
        assert_eq!(m.n_train, 160);
        assert!(m.accuracy >= 0.95, "accuracy {}", m.accuracy);
        assert_eq!(bundle.feature_order.len(), 30);
        assert_eq!(bundle.feature_order[0], "Time");
        assert_eq!(bundle.feature_order[29], "Amount");

        assert!(registry.store().exists(Algorithm::Knn));
        assert!(registry.is_ready(Some(Algorithm::Knn)));
        assert!(registry.list_available().contains(&Algorithm::Knn));
        assert!(!registry.list_available().contains(&Algorithm::Svm));

        let fraud = registry.predict(&fraud_like(), Some(Algorithm::Knn)).unwrap();
        assert!(fraud.score > 0.5, "score {}", fraud.score);
        let legit = registry.predict(&legit_like(), Some(Algorithm::Knn)).unwrap();
        assert!(legit.score < 0.5, "score {}", legit.score);
    }

    #[test]
    fn test_persisted_bundle_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_dataset(dir.path());
        let first = registry_in(dir.path(), data);
        let trained = first.train(Algorithm::Knn, false).unwrap();
        let expected = first.predict(&fraud_like(), Some(Algorithm::Knn)).unwrap();

        // A second registry with no dataset must load from disk.
        let second = registry_in(dir.path(), dir.path().join("gone.csv"));
        assert!(!second.is_ready(Some(Algorithm::Knn)));
        let loaded = second.train(Algorithm::Knn, false).unwrap();
        assert_eq!(loaded.metrics, trained.metrics);
        assert_eq!(loaded.feature_order, trained.feature_order);
        assert_eq!(
            second.predict(&fraud_like(), Some(Algorithm::Knn)).unwrap(),
            expected
        );
    }

    #[test]
    fn test_failed_retrain_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_dataset(dir.path());
        let registry = registry_in(dir.path(), data.clone());
        let before = registry.train(Algorithm::Knn, false).unwrap();
        let on_disk = fs::read(registry.store().path_for(Algorithm::Knn)).unwrap();

        fs::remove_file(&data).unwrap();
        let err = registry.train(Algorithm::Knn, true).unwrap_err();
        assert!(matches!(err, RegistryError::Data(DataError::Io(_))));

        let after = registry.bundle(Some(Algorithm::Knn)).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(fs::read(registry.store().path_for(Algorithm::Knn)).unwrap(), on_disk);
    }

    #[test]
    fn test_missing_label_column_fails_training() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("nolabel.csv");
        fs::write(&data, "Time,Amount\n0,10.0\n1,20.0\n").unwrap();
        let registry = registry_in(dir.path(), data);

        let err = registry.train(Algorithm::Ann, false).unwrap_err();
        assert!(matches!(err, RegistryError::Data(DataError::MissingLabel(_))));
        assert!(!registry.store().exists(Algorithm::Ann));
        assert!(registry.list_available().is_empty());
    }

    #[test]
    fn test_single_class_dataset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("legit.csv");
        fs::write(&data, "Amount,Class\n10,0\n20,0\n30,0\n").unwrap();
        let registry = registry_in(dir.path(), data);
        assert!(matches!(
            registry.train(Algorithm::Knn, false),
            Err(RegistryError::Data(DataError::SingleClass(0)))
        ));
    }

    #[test]
    fn test_not_loaded_is_an_error_value() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path(), dir.path().join("none.csv"));
        assert!(!registry.is_ready(None));
        assert!(matches!(
            registry.predict(&legit_like(), None),
            Err(RegistryError::NotLoaded(Algorithm::Ann))
        ));
        assert!(matches!(
            registry.metrics(Some(Algorithm::Svm)),
            Err(RegistryError::NotLoaded(Algorithm::Svm))
        ));
    }

    #[test]
    fn test_train_ann_and_svm() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path(), write_dataset(dir.path()));

        for algorithm in [Algorithm::Ann, Algorithm::Svm] {
            let bundle = registry.train(algorithm, false).unwrap();
            assert_eq!(bundle.algorithm(), algorithm);
            let m = &bundle.metrics;
            assert_eq!(m.n_test, 40);
            assert_eq!(m.confusion_matrix.total(), 40);
            assert!((0.0..=1.0).contains(&m.accuracy), "{algorithm}: {m:?}");

            let p = registry.predict(&fraud_like(), Some(algorithm)).unwrap();
            assert!((0.0..=1.0).contains(&p.score));
            assert!(p.confidence >= 0.5);
        }
        assert_eq!(registry.list_available().len(), 2);
    }

    #[test]
    fn test_select_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(registry_in(dir.path(), write_dataset(dir.path())));
        let service = FraudService::new(registry, DecisionThresholds::default(), "v1.0");

        assert!(matches!(
            service.select_algorithm("rf"),
            Err(RegistryError::UnknownAlgorithm(ref s)) if s == "rf"
        ));
        assert_eq!(service.list_algorithms().active, Algorithm::Ann);

        let selection = service.select_algorithm("KNN").unwrap();
        assert_eq!(selection.active_algorithm, Algorithm::Knn);

        let listing = service.list_algorithms();
        assert_eq!(listing.active, Algorithm::Knn);
        assert_eq!(listing.all, Algorithm::ALL.to_vec());
        assert!(listing.available.contains(&Algorithm::Knn));

        // Active algorithm is the default for scoring.
        let decision = service.score(&fraud_like(), None).unwrap();
        assert_eq!(decision.algorithm, Algorithm::Knn);
        assert_eq!(decision.decision, Decision::Block);
        assert_eq!(decision.model_version, "v1.0");
        assert_eq!(decision.reasons, vec!["score_above_challenge_threshold"]);
    }

    #[test]
    fn test_assess_applies_rule_floors_over_model() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(registry_in(dir.path(), write_dataset(dir.path())));
        registry.train(Algorithm::Knn, false).unwrap();
        let service = FraudService::new(registry, DecisionThresholds::default(), "v1.0");

        let a = service.assess(40.0, Some("Unknown Shop"), Algorithm::Knn);
        assert!(!a.fallback);
        assert!(a.decision.score >= 0.12);
        assert_eq!(a.decision.decision, Decision::Block);
        assert_eq!(a.decision.reasons[0], "Unknown merchant");

        // SVM was never trained, so the rules decide alone.
        let b = service.assess(350.0, Some("Uber"), Algorithm::Svm);
        assert!(b.fallback);
        assert_eq!(b.decision.score, 0.04);
        assert_eq!(b.decision.confidence, 0.85);
        assert_eq!(b.decision.decision, Decision::Challenge);
    }

    #[test]
    fn test_chat_switches_algorithm_and_scores() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(registry_in(dir.path(), write_dataset(dir.path())));
        let service = Arc::new(FraudService::new(
            registry,
            DecisionThresholds::default(),
            "v1.0",
        ));
        let bot = Chatbot::new(Arc::clone(&service), Arc::new(NoAccounts));

        // A session opened before the switch keeps its algorithm.
        bot.chat("erin", "hello");
        let reply = bot.chat("dana", "Use KNN");
        assert!(reply.starts_with("**Switched to KNN Algorithm!**"), "{reply}");
        assert!(reply.contains("• Accuracy: "));
        assert_eq!(bot.session("dana").unwrap().algorithm, Algorithm::Knn);
        assert_eq!(bot.session("erin").unwrap().algorithm, Algorithm::Ann);

        let reply = bot.chat("dana", "Is $750 at Starbucks fraud?");
        assert!(reply.contains("• Algorithm: KNN\n"), "{reply}");
        assert!(reply.contains("Status: BLOCKED"));

        let info = bot.chat("erin", "which models are available");
        assert!(info.contains("**Currently Active**: KNN"));
        assert!(info.contains("**K-Nearest Neighbors** - Pattern matching algorithm based on similarity analysis\n• Status: Ready"));
        assert!(info.contains("**Support Vector Machine** - High precision classification with optimal decision boundaries\n• Status: Not Available"));
    }

    #[test]
    fn test_new_chat_sessions_use_the_active_model() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(registry_in(dir.path(), write_dataset(dir.path())));
        registry.set_active(Algorithm::Knn).unwrap();
        let service = Arc::new(FraudService::new(
            registry,
            DecisionThresholds::default(),
            "v1.0",
        ));
        let bot = Chatbot::new(service, Arc::new(NoAccounts));

        let reply = bot.chat("fresh", "Is $40 at Amazon fraud?");
        assert!(reply.contains("• Algorithm: KNN\n"), "{reply}");
        assert!(!reply.contains("business rules fallback"));
        assert_eq!(bot.session("fresh").unwrap().algorithm, Algorithm::Knn);
    }

    #[test]
    fn test_every_bundle_kind_survives_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let first = registry_in(dir.path(), write_dataset(dir.path()));
        let second = registry_in(dir.path(), dir.path().join("gone.csv"));

        for algorithm in Algorithm::ALL {
            first.train(algorithm, false).unwrap();
            let loaded = second.train(algorithm, false).unwrap();
            assert_eq!(loaded.algorithm(), algorithm);
            for features in [fraud_like(), legit_like()] {
                assert_eq!(
                    second.predict(&features, Some(algorithm)).unwrap(),
                    first.predict(&features, Some(algorithm)).unwrap(),
                    "{algorithm}"
                );
            }
        }
    }

    #[test]
    fn test_feature_payload_ignores_unknown_keys() {
        let features: TransactionFeatures =
            serde_json::from_str(r#"{"Amount": 12.5, "V3": -1.0, "merchant_id": 7}"#).unwrap();
        assert_eq!(features.get(FeatureName::Amount), 12.5);
        assert_eq!(features.get(FeatureName::V3), -1.0);
        assert_eq!(features.get(FeatureName::Time), 0.0);
        assert_eq!(features.len(), 30);
    }
}
