//! End-to-end runs against a local bucket

use anyhow::Result;
use hotel_core::{DataFrame, Stage, Telemetry, LABEL_COLUMN};
use hotel_pipeline::{run, Args};
use std::io::Write;
use std::path::{Path, PathBuf};

const MEAL_PLANS: [&str; 3] = ["Meal Plan 1", "Meal Plan 2", "Not Selected"];
const ROOM_TYPES: [&str; 3] = ["Room_Type 1", "Room_Type 2", "Room_Type 4"];
const SEGMENTS: [&str; 4] = ["Offline", "Online", "Corporate", "Complementary"];

const MODEL_PARAMS: &str = r#"
lightgbm_params:
  n_estimators: { int_range: [10, 25] }
  num_leaves: { int_range: [4, 12] }
  learning_rate: { float_range: [0.05, 0.2] }
random_search_params:
  n_iter: 2
  scoring: accuracy
  n_jobs: -1
  cv: 3
  verbose: 1
  random_state: 42
"#;

fn write_raw(path: &Path, rows: usize) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(
        file,
        "Booking_ID,no_of_adults,no_of_children,type_of_meal_plan,room_type_reserved,lead_time,\
         arrival_month,market_segment_type,avg_price_per_room,no_of_special_requests,booking_status"
    )?;
    for i in 0..rows {
        let lead_time = if i % 5 == 0 { 150 + (i * 13) % 200 } else { (i * 7) % 60 };
        let requests = i % 3;
        let canceled = lead_time > 120 || (requests == 0 && i % 4 == 0);
        writeln!(
            file,
            "INN{:05},{},{},{},{},{},{},{},{:.2},{},{}",
            i,
            1 + i % 3,
            i % 2,
            MEAL_PLANS[i % MEAL_PLANS.len()],
            ROOM_TYPES[i % ROOM_TYPES.len()],
            lead_time,
            1 + i % 12,
            SEGMENTS[i % SEGMENTS.len()],
            60.0 + ((i * 37) % 120) as f64,
            requests,
            if canceled { "Canceled" } else { "Not_Canceled" }
        )?;
    }
    Ok(())
}

fn write_config(root: &Path, bucket: &Path, no_of_features: usize) -> Result<()> {
    std::fs::create_dir_all(root.join("config"))?;
    std::fs::write(
        root.join("config/config.yaml"),
        format!(
            r#"
data_ingestion:
  bucket_name: "file://{}"
  bucket_file_name: "Hotel_Reservations.csv"
  train_ratio: 0.8

data_processing:
  categorical_columns:
    - type_of_meal_plan
    - room_type_reserved
    - market_segment_type
    - booking_status
  numerical_columns:
    - no_of_adults
    - no_of_children
    - lead_time
    - arrival_month
    - avg_price_per_room
    - no_of_special_requests
  skewness_threshold: 5
  no_of_features: {}
  importance_trees: 20
"#,
            bucket.display(),
            no_of_features
        ),
    )?;
    std::fs::write(root.join("config/model_params.yaml"), MODEL_PARAMS)?;
    Ok(())
}

fn args(root: &Path) -> Args {
    Args {
        config: None,
        params: None,
        root: PathBuf::from(root),
        verbose: 0,
    }
}

#[test]
fn test_full_pipeline_produces_model_and_metrics() -> Result<()> {
    let bucket = tempfile::tempdir()?;
    write_raw(&bucket.path().join("Hotel_Reservations.csv"), 1000)?;
    let root = tempfile::tempdir()?;
    write_config(root.path(), bucket.path(), 4)?;

    let summary = run(&args(root.path()), &Telemetry::silent())?;

    assert_eq!(summary.ingestion.raw_rows, 1000);
    assert_eq!(summary.ingestion.train_rows, 800);
    assert_eq!(summary.ingestion.test_rows, 200);

    let train = DataFrame::read_csv(root.path().join("artifacts/processed/processed_train.csv"))?;
    let test = DataFrame::read_csv(root.path().join("artifacts/processed/processed_test.csv"))?;
    assert_eq!(train.width(), 5);
    assert_eq!(train.names(), test.names());
    assert_eq!(train.names().last().map(String::as_str), Some(LABEL_COLUMN));
    assert!(!train.names().iter().any(|n| n == "Booking_ID"));

    assert!(root.path().join("artifacts/models/lgbm_model.json").exists());
    assert!(root.path().join("artifacts/models/lgbm_model.hash").exists());
    assert_eq!(summary.training.model_hash.len(), 64);

    for (name, value) in summary.training.metrics.to_map() {
        assert!((0.0..=1.0).contains(&value), "{name} = {value}");
    }
    Ok(())
}

#[test]
fn test_explicit_config_paths_resolve_against_root() -> Result<()> {
    let root = tempfile::tempdir()?;
    let mut args = args(root.path());
    args.config = Some(PathBuf::from("custom/pipeline.yaml"));
    assert_eq!(args.config_path(), root.path().join("custom/pipeline.yaml"));
    assert_eq!(args.params_path(), root.path().join("config/model_params.yaml"));

    let absolute = root.path().join("elsewhere.yaml");
    args.params = Some(absolute.clone());
    assert_eq!(args.params_path(), absolute);
    Ok(())
}

#[test]
fn test_invalid_config_aborts_before_any_stage() -> Result<()> {
    let bucket = tempfile::tempdir()?;
    write_raw(&bucket.path().join("Hotel_Reservations.csv"), 50)?;
    let root = tempfile::tempdir()?;
    write_config(root.path(), bucket.path(), 0)?;

    let err = run(&args(root.path()), &Telemetry::silent()).unwrap_err();

    assert_eq!(err.stage, Stage::Config);
    assert!(err.to_string().contains("no_of_features"));
    assert!(!root.path().join("artifacts").exists());
    assert!(!root.path().join("mlruns").exists());
    Ok(())
}

#[test]
fn test_missing_params_document_aborts() -> Result<()> {
    let bucket = tempfile::tempdir()?;
    let root = tempfile::tempdir()?;
    write_config(root.path(), bucket.path(), 3)?;
    std::fs::remove_file(root.path().join("config/model_params.yaml"))?;

    let err = run(&args(root.path()), &Telemetry::silent()).unwrap_err();

    assert_eq!(err.stage, Stage::Config);
    assert!(!root.path().join("artifacts").exists());
    Ok(())
}
