//! Stage-level tests through the public API
//!
//! Quality gates on known metrics, and push idempotence.

use sensor_pipeline::core::artifact_store::PusherPaths;
use sensor_pipeline::core::{QualityGates, QualityViolation};
use sensor_pipeline::domain::{ClassificationMetric, EvaluationArtifact};
use sensor_pipeline::stages::ModelPusher;
use tempfile::TempDir;

fn metric(f1: f64) -> ClassificationMetric {
    ClassificationMetric {
        f1_score: f1,
        precision_score: f1,
        recall_score: f1,
    }
}

#[test]
fn test_train_score_below_expected_is_fatal() {
    let gates = QualityGates {
        expected_score: 0.95,
        ..Default::default()
    };

    let err = gates.check_train_score(&metric(0.9)).unwrap_err();
    assert_eq!(
        err,
        QualityViolation::BelowExpectedScore {
            actual: 0.9,
            expected: 0.95
        }
    );
    assert!(err.to_string().contains("not good enough"));
}

#[test]
fn test_overfit_gap_is_fatal() {
    let gates = QualityGates {
        overfitting_underfitting_threshold: 0.05,
        ..Default::default()
    };

    let err = gates
        .check_generalisation(&metric(0.95), &metric(0.60))
        .unwrap_err();
    match err {
        QualityViolation::OverfitGap { diff, threshold } => {
            assert!((diff - 0.35).abs() < 1e-9);
            assert_eq!(threshold, 0.05);
        }
        other => panic!("expected overfit gap, got {:?}", other),
    }
}

#[tokio::test]
async fn test_pushing_twice_is_byte_identical() {
    let temp = TempDir::new().unwrap();
    let trained = temp.path().join("model_trainer/trained_model/model.json");
    std::fs::create_dir_all(trained.parent().unwrap()).unwrap();
    std::fs::write(&trained, br#"{"preprocessor":{},"model":{}}"#).unwrap();

    let evaluation = EvaluationArtifact {
        is_model_accepted: true,
        improved_accuracy: Some(0.04),
        best_model_path: None,
        trained_model_path: trained,
        train_model_metric_artifact: metric(0.97),
        best_model_metric_artifact: Some(metric(0.93)),
    };
    let paths = PusherPaths {
        model_file_path: temp.path().join("model_pusher/model.json"),
        saved_model_path: temp.path().join("saved_models/1760779800/model.json"),
    };
    let pusher = ModelPusher::new(paths.clone());

    let first = pusher.initiate_model_pusher(&evaluation).await.unwrap();
    let serving_first = std::fs::read(&paths.model_file_path).unwrap();

    let second = pusher.initiate_model_pusher(&evaluation).await.unwrap();
    let serving_second = std::fs::read(&paths.model_file_path).unwrap();

    assert_eq!(serving_first, serving_second);
    assert_eq!(first.model_sha256, second.model_sha256);
    assert_eq!(
        std::fs::read(&paths.saved_model_path).unwrap(),
        serving_second
    );
}
