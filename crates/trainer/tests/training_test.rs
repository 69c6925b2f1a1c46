//! Training runs over synthetic processed tables

use anyhow::Result;
use hotel_core::{ArtifactPaths, DataFrame, ModelParams, Telemetry, LABEL_COLUMN};
use hotel_trainer::{ModelArtifact, ModelTraining};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const PARAMS_YAML: &str = r#"
lightgbm_params:
  n_estimators: { int_range: [10, 30] }
  num_leaves: { int_range: [4, 16] }
  learning_rate: { float_range: [0.05, 0.2] }
  subsample: { choice: [0.8, 1.0] }
random_search_params:
  n_iter: 3
  scoring: f1
  n_jobs: -1
  cv: 3
  verbose: 1
  random_state: 42
"#;

fn write_processed(path: &Path, rows: usize, seed: u64, labels: Option<f64>) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut lead = Vec::with_capacity(rows);
    let mut price = Vec::with_capacity(rows);
    let mut requests = Vec::with_capacity(rows);
    let mut status = Vec::with_capacity(rows);
    for i in 0..rows {
        let canceled = i % 2 == 0;
        lead.push(if canceled {
            rng.gen_range(3.0..6.0)
        } else {
            rng.gen_range(0.0..4.0)
        });
        price.push(rng.gen_range(50.0..200.0));
        requests.push(f64::from(rng.gen_range(0..3u8)));
        status.push(labels.unwrap_or(if canceled { 0.0 } else { 1.0 }));
    }
    let frame = DataFrame::from_numeric_rows(
        vec![
            "lead_time".into(),
            "avg_price_per_room".into(),
            "no_of_special_requests".into(),
            LABEL_COLUMN.into(),
        ],
        &(0..rows)
            .map(|i| vec![lead[i], price[i], requests[i], status[i]])
            .collect::<Vec<_>>(),
    )?;
    frame.write_csv(path)?;
    Ok(())
}

fn setup(root: &Path, labels: Option<f64>) -> Result<ArtifactPaths> {
    let paths = ArtifactPaths::new(root);
    write_processed(&paths.processed_train_file(), 300, 1, labels)?;
    write_processed(&paths.processed_test_file(), 80, 2, labels)?;
    Ok(paths)
}

fn only_run_dir(paths: &ArtifactPaths) -> Result<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(paths.tracking_dir())?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    assert_eq!(dirs.len(), 1);
    Ok(dirs.remove(0))
}

#[test]
fn test_training_persists_model_and_tracking_records() -> Result<()> {
    let root = tempfile::tempdir()?;
    let paths = setup(root.path(), None)?;
    let params = ModelParams::from_yaml_str(PARAMS_YAML)?;

    let report = ModelTraining::new(paths.clone(), params, Telemetry::silent()).run()?;

    assert_eq!(report.model_path, paths.model_file());
    let artifact = ModelArtifact::load(&paths.model_file())?;
    assert_eq!(artifact.hash, report.model_hash);
    assert_eq!(
        std::fs::read_to_string(paths.model_hash_file())?.trim(),
        report.model_hash
    );
    assert_eq!(
        artifact.feature_columns,
        ["lead_time", "avg_price_per_room", "no_of_special_requests"]
    );
    assert_eq!(artifact.best_params.len(), 4);

    let run_dir = only_run_dir(&paths)?;
    let metrics: BTreeMap<String, f64> =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("metrics.json"))?)?;
    for key in ["accuracy", "precision", "recall", "f1"] {
        let value = metrics[key];
        assert!((0.0..=1.0).contains(&value), "{key} = {value}");
    }
    assert!(metrics["accuracy"] > 0.6);

    let params: BTreeMap<String, String> =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("params.json"))?)?;
    assert_eq!(params["random_state"], "42");
    assert!(run_dir.join("artifacts/datasets/processed_train.csv").exists());
    assert!(run_dir.join("artifacts/datasets/processed_test.csv").exists());
    assert!(run_dir.join("artifacts/lgbm_model.json").exists());

    let meta: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("meta.json"))?)?;
    assert_eq!(meta["status"], "FINISHED");
    Ok(())
}

#[test]
fn test_training_is_deterministic() -> Result<()> {
    let a = tempfile::tempdir()?;
    let b = tempfile::tempdir()?;
    let paths_a = setup(a.path(), None)?;
    let paths_b = setup(b.path(), None)?;
    let params = ModelParams::from_yaml_str(PARAMS_YAML)?;

    let ra = ModelTraining::new(paths_a.clone(), params.clone(), Telemetry::silent()).run()?;
    let rb = ModelTraining::new(paths_b.clone(), params, Telemetry::silent()).run()?;

    let ma = ModelArtifact::load(&paths_a.model_file())?;
    let mb = ModelArtifact::load(&paths_b.model_file())?;
    assert_eq!(ma.model, mb.model);
    assert_eq!(ma.best_params, mb.best_params);
    assert_eq!(ra.metrics, rb.metrics);
    Ok(())
}

#[test]
fn test_failed_run_is_marked_and_leaves_no_model() -> Result<()> {
    let root = tempfile::tempdir()?;
    let paths = setup(root.path(), Some(2.0))?;
    let params = ModelParams::from_yaml_str(PARAMS_YAML)?;

    let err = ModelTraining::new(paths.clone(), params, Telemetry::silent())
        .run()
        .unwrap_err();
    assert_eq!(err.stage, hotel_core::Stage::Training);
    assert!(!paths.model_file().exists());

    let meta: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
        only_run_dir(&paths)?.join("meta.json"),
    )?)?;
    assert_eq!(meta["status"], "FAILED");
    Ok(())
}
