//! The preprocessing stage
//!
//! Reads the raw train/test split, cleans and encodes both tables, balances
//! and feature-selects the training table, projects the test table onto the
//! same columns and writes the processed CSVs.

use crate::encoding::LabelEncoder;
use crate::forest::{ForestConfig, RandomForest};
use crate::selection::{rank_features, FeatureSelection};
use crate::skew::{log1p_column, skewness};
use crate::smote::Smote;
use hotel_core::errors::{PipelineError, Result, ResultExt, Stage};
use hotel_core::{
    ArtifactPaths, Column, DataFrame, EncodingPolicy, ProcessingConfig, Telemetry, LABEL_COLUMN,
};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Category vocabularies learned from one table
#[derive(Debug, Clone, Default)]
pub struct FittedEncoders {
    encoders: BTreeMap<String, LabelEncoder>,
}

impl FittedEncoders {
    pub fn fit(frame: &DataFrame, config: &ProcessingConfig) -> Result<Self> {
        let mut encoders = BTreeMap::new();
        for name in &config.categorical_columns {
            let column = frame.column(name).ok_or_else(|| {
                PipelineError::new(Stage::Preprocessing, "fit encoders", "column not found")
                    .with_context("column", name)
            })?;
            encoders.insert(name.clone(), LabelEncoder::fit(column));
        }
        Ok(Self { encoders })
    }

    pub fn encoders(&self) -> &BTreeMap<String, LabelEncoder> {
        &self.encoders
    }

    /// Replace every categorical column with its codes
    pub fn apply(&self, frame: &mut DataFrame) -> Result<()> {
        for (name, encoder) in &self.encoders {
            let column = frame.column(name).ok_or_else(|| {
                PipelineError::new(Stage::Preprocessing, "encode categorical column", "column not found")
                    .with_context("column", name)
            })?;
            let encoded = encoder
                .transform(column)
                .map_err(|e| e.with_context("column", name))?;
            frame.replace_column(name, encoded)?;
        }
        Ok(())
    }

    fn log_summary(&self, table: &str) {
        for (name, encoder) in &self.encoders {
            info!("Label mapping for {} ({}): {:?}", name, table, encoder.mapping());
        }
    }
}

/// Apply `log1p` to the numerical columns of `frame` whose own skewness
/// exceeds the threshold, returning their names
pub fn deskew(frame: &mut DataFrame, config: &ProcessingConfig, table: &str) -> Result<Vec<String>> {
    let mut skewed = Vec::new();
    for name in &config.numerical_columns {
        let skew = skewness(frame.numeric_column(name)?);
        debug!("Skewness of {} ({}): {:.4}", name, table, skew);
        if skew > config.skewness_threshold {
            skewed.push(name.clone());
        }
    }

    for name in &skewed {
        let transformed = log1p_column(frame.numeric_column(name)?)
            .map_err(|e| e.with_context("column", name))?;
        frame.replace_column(name, Column::Numeric(transformed))?;
    }
    if !skewed.is_empty() {
        info!("Applying log1p to skewed columns ({}): {}", table, skewed.join(", "));
    }
    Ok(skewed)
}

/// Outcome of one preprocessing run
#[derive(Debug, Clone)]
pub struct ProcessingReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub selection: FeatureSelection,
}

pub struct DataProcessor {
    config: ProcessingConfig,
    paths: ArtifactPaths,
    telemetry: Telemetry,
}

impl DataProcessor {
    pub fn new(config: ProcessingConfig, paths: ArtifactPaths, telemetry: Telemetry) -> Self {
        Self {
            config,
            paths,
            telemetry: telemetry.for_component("preprocessing"),
        }
    }

    /// Run every preprocessing step and persist the processed tables
    pub fn process(&self) -> Result<ProcessingReport> {
        self.telemetry.scope(|| {
            info!("Starting data processing");
            let result = self
                .run_steps()
                .map_err(|e| e.with_stage(Stage::Preprocessing));
            match &result {
                Ok(report) => info!(
                    "Data processing completed: {} train rows, {} test rows, {} features",
                    report.train_rows,
                    report.test_rows,
                    report.selection.features().len()
                ),
                Err(e) => error!("Data processing failed: {}", e),
            }
            result
        })
    }

    fn run_steps(&self) -> Result<ProcessingReport> {
        let mut train = DataFrame::read_csv(self.paths.train_file())?;
        let mut test = DataFrame::read_csv(self.paths.test_file())?;

        self.clean(&mut train, "train")?;
        self.clean(&mut test, "test")?;

        match self.config.encoding {
            EncodingPolicy::Shared => {
                let encoders = FittedEncoders::fit(&train, &self.config)?;
                encoders.log_summary("train");
                encoders.apply(&mut train)?;
                encoders
                    .apply(&mut test)
                    .map_err(|e| e.with_context("table", "test"))?;
            }
            EncodingPolicy::Independent => {
                for (frame, table) in [(&mut train, "train"), (&mut test, "test")] {
                    let encoders = FittedEncoders::fit(frame, &self.config)?;
                    encoders.log_summary(table);
                    encoders.apply(frame)?;
                }
            }
        }
        deskew(&mut train, &self.config, "train")?;
        deskew(&mut test, &self.config, "test").map_err(|e| e.with_context("table", "test"))?;

        let balanced = self.balance(&train)?;
        let selection = self.select_features(&balanced)?;

        let train_out = selection.project(&balanced)?;
        let test_out = selection
            .project(&test)
            .map_err(|e| e.with_context("table", "test"))?;

        let processed_dir = self.paths.processed_dir();
        std::fs::create_dir_all(&processed_dir)
            .op(Stage::Preprocessing, "save processed data")
            .map_err(|e| e.with_context("path", processed_dir.display()))?;
        train_out.write_csv(self.paths.processed_train_file())?;
        test_out.write_csv(self.paths.processed_test_file())?;
        info!(
            "Saved processed data to {}",
            processed_dir.display()
        );

        Ok(ProcessingReport {
            train_rows: train_out.height(),
            test_rows: test_out.height(),
            selection,
        })
    }

    /// Drop identifier columns and duplicate rows, then check the schema
    pub fn clean(&self, frame: &mut DataFrame, table: &str) -> Result<()> {
        let dropped = frame.drop_columns(&self.config.id_columns);
        let duplicates = frame.drop_duplicates();
        debug!(
            "{}: dropped {} id columns and {} duplicate rows",
            table, dropped, duplicates
        );

        let mut required: Vec<String> = Vec::new();
        for name in self
            .config
            .categorical_columns
            .iter()
            .chain(&self.config.numerical_columns)
            .map(String::as_str)
            .chain([LABEL_COLUMN])
        {
            if !required.iter().any(|r| r == name) {
                required.push(name.to_string());
            }
        }
        frame
            .require_columns(&required)
            .map_err(|e| e.with_stage(Stage::Preprocessing).with_context("table", table))
    }

    /// Oversample the training table so every label has the majority count
    pub fn balance(&self, frame: &DataFrame) -> Result<DataFrame> {
        let feature_names = self.feature_names(frame)?;
        let features = frame.numeric_rows(&feature_names)?;
        let labels = frame.numeric_column(LABEL_COLUMN)?;

        let (features, labels) = Smote::default().fit_resample(&features, labels)?;

        let mut balanced = DataFrame::from_numeric_rows(feature_names, &features)?;
        balanced.push_column(LABEL_COLUMN, Column::Numeric(labels))?;
        Ok(balanced)
    }

    /// Rank features with a random forest and keep the configured top `K`
    pub fn select_features(&self, frame: &DataFrame) -> Result<FeatureSelection> {
        let feature_names = self.feature_names(frame)?;
        let rows = frame.numeric_rows(&feature_names)?;
        let labels = class_indices(frame.numeric_column(LABEL_COLUMN)?);

        let forest_config = ForestConfig {
            n_trees: self.config.importance_trees,
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(&rows, &labels, &forest_config)?;
        let ranking = rank_features(&feature_names, forest.feature_importances());

        if self.config.no_of_features > ranking.len() {
            warn!(
                "no_of_features is {} but only {} features exist; keeping all",
                self.config.no_of_features,
                ranking.len()
            );
        }
        let selection = FeatureSelection::top_k(ranking, self.config.no_of_features, LABEL_COLUMN);
        for (name, score) in selection.features() {
            info!("Selected feature {} (importance {:.4})", name, score);
        }
        Ok(selection)
    }

    /// Every column except the label; all must be numeric by now
    fn feature_names(&self, frame: &DataFrame) -> Result<Vec<String>> {
        let names: Vec<String> = frame
            .names()
            .iter()
            .filter(|n| n.as_str() != LABEL_COLUMN)
            .cloned()
            .collect();
        let text: Vec<&str> = names
            .iter()
            .filter(|n| frame.column(n).is_some_and(|c| !c.is_numeric()))
            .map(String::as_str)
            .collect();
        if !text.is_empty() {
            return Err(PipelineError::new(
                Stage::Preprocessing,
                "prepare features",
                "non-numeric columns must be listed as categorical",
            )
            .with_context("columns", text.join(",")));
        }
        if frame.column(LABEL_COLUMN).is_some_and(|c| !c.is_numeric()) {
            return Err(PipelineError::new(
                Stage::Preprocessing,
                "prepare features",
                "label column must be numeric or listed as categorical",
            )
            .with_context("column", LABEL_COLUMN));
        }
        Ok(names)
    }
}

/// Dense class indices in ascending label order
fn class_indices(labels: &[f64]) -> Vec<usize> {
    let mut classes = labels.to_vec();
    classes.sort_by(f64::total_cmp);
    classes.dedup();
    labels
        .iter()
        .map(|l| classes.partition_point(|c| c < l))
        .collect()
}
